//! Create, update and delete arguments to mutation operations.
//!
//! Argument shapes:
//! - create: `input: [{ <attr>: value, <rel>: { create: [{ node, edge }], connect: [{ where: { node }, edge }] } }]`
//! - update: `where`, `update: { <attr>: value, <rel>: [{ where, update: { node, edge }, ... }] }`
//!   and top-level `create`/`connect`/`disconnect`/`delete` keyed by relationship
//! - delete: `where`, `delete: { <rel>: [{ where, delete }] }`

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::graph_catalog::authorization::{AuthorizationOperation, AuthorizationWhen};
use crate::graph_catalog::graph_schema::{
    Attribute, ConcreteEntity, Entity, NestedOperation, Relationship, RelationshipProperties,
};
use crate::query_planner::ast::{
    Assignment, CreateInput, CreateOperation, DeleteOperation, Filter, NestedMutation,
    UpdateOperation,
};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::FieldSelection;

use super::filter_factory::FilterSubject;
use super::{as_object, child_path, effective_selection, list_arg, object_arg, AstFactory};

type OnTypes = IndexMap<String, Vec<FieldSelection>>;

/// Input keys split into attribute assignments and relationship entries
struct NodeInput<'s, 'a> {
    assignments: Vec<Assignment<'s>>,
    relationships: Vec<(&'s Relationship, &'a Value, String)>,
}

fn writable<'s>(
    owner: &str,
    attribute: Option<&'s Attribute>,
    name: &str,
) -> Result<&'s Attribute, CompilationError> {
    match attribute {
        Some(attribute) if !attribute.is_computed() => Ok(attribute),
        _ => Err(CompilationError::unknown_field(owner, name)),
    }
}

fn written_attributes<'s>(assignments: &[Assignment<'s>]) -> Vec<&'s Attribute> {
    assignments.iter().map(|assignment| assignment.attribute).collect()
}

/// `[{..}, {..}]` or a single object, each item paired with its path
fn items<'a>(value: &'a Value, path: &str) -> Result<Vec<(&'a Map<String, Value>, String)>, CompilationError> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let item_path = format!("{}[{}]", path, index);
                Ok((as_object(item, &item_path)?, item_path))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        single => Ok(vec![(as_object(single, path)?, path.to_string())]),
    }
}

impl<'s> AstFactory<'s> {
    pub(crate) fn create_operation(
        &self,
        entity: &'s ConcreteEntity,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        on_types: &OnTypes,
        path: &str,
    ) -> Result<CreateOperation<'s>, CompilationError> {
        let input_path = child_path(path, "input");
        let values = list_arg(args, "input", path)?;
        if values.is_empty() {
            return Err(CompilationError::mutation_with_context(
                input_path,
                "create needs at least one input",
            ));
        }
        let mut inputs = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let item_path = format!("{}[{}]", input_path, index);
            inputs.push(self.create_input(entity, as_object(value, &item_path)?, &item_path)?);
        }
        log::debug!("Creating {} {} node(s)", inputs.len(), entity.name);
        let fields = self.fields(
            entity,
            &effective_selection(&entity.name, selection, on_types),
            path,
        )?;
        Ok(CreateOperation {
            entity,
            inputs,
            fields,
        })
    }

    pub(crate) fn update_operation(
        &self,
        entity: &'s ConcreteEntity,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        on_types: &OnTypes,
        path: &str,
    ) -> Result<UpdateOperation<'s>, CompilationError> {
        let update_path = child_path(path, "update");
        let (assignments, mut nested) = match object_arg(args, "update", path)? {
            Some(object) => {
                let input = self.node_input(entity, object, &update_path)?;
                let mut nested = Vec::new();
                for (relationship, value, rel_path) in input.relationships {
                    for (entry, entry_path) in items(value, &rel_path)? {
                        nested.extend(self.update_entry(entity, relationship, entry, &entry_path)?);
                    }
                }
                (input.assignments, nested)
            }
            None => (Vec::new(), Vec::new()),
        };
        nested.extend(self.relationship_operations(entity, args, path)?);

        let written = written_attributes(&assignments);
        let user = self.where_filter(entity, object_arg(args, "where", path)?, path)?;
        let auth = self.authorization_filter(entity, &written, AuthorizationOperation::Update)?;
        let before = self.authorization_validations(
            entity,
            &written,
            AuthorizationOperation::Update,
            AuthorizationWhen::Before,
        )?;
        let after = self.authorization_validations(
            entity,
            &written,
            AuthorizationOperation::Update,
            AuthorizationWhen::After,
        )?;
        let fields = self.fields(
            entity,
            &effective_selection(&entity.name, selection, on_types),
            path,
        )?;
        Ok(UpdateOperation {
            entity,
            filter: Filter::and(user.into_iter().chain(auth).collect()),
            before,
            assignments,
            nested,
            after,
            fields,
        })
    }

    pub(crate) fn delete_operation(
        &self,
        entity: &'s ConcreteEntity,
        args: &Map<String, Value>,
        path: &str,
    ) -> Result<DeleteOperation<'s>, CompilationError> {
        let user = self.where_filter(entity, object_arg(args, "where", path)?, path)?;
        let auth = self.authorization_filter(entity, &[], AuthorizationOperation::Delete)?;
        let before = self.authorization_validations(
            entity,
            &[],
            AuthorizationOperation::Delete,
            AuthorizationWhen::Before,
        )?;
        let nested = match object_arg(args, "delete", path)? {
            Some(object) => self.nested_deletes(entity, object, &child_path(path, "delete"))?,
            None => Vec::new(),
        };
        Ok(DeleteOperation {
            entity,
            filter: Filter::and(user.into_iter().chain(auth).collect()),
            before,
            nested,
        })
    }

    fn node_input<'a>(
        &self,
        entity: &'s ConcreteEntity,
        object: &'a Map<String, Value>,
        path: &str,
    ) -> Result<NodeInput<'s, 'a>, CompilationError> {
        let mut input = NodeInput {
            assignments: Vec::new(),
            relationships: Vec::new(),
        };
        for (key, value) in object {
            if let Some(relationship) = entity.relationship(key) {
                input.relationships.push((relationship, value, child_path(path, key)));
                continue;
            }
            let attribute = writable(&entity.name, entity.attribute(key), key)?;
            input.assignments.push(Assignment {
                attribute,
                value: value.clone(),
            });
        }
        Ok(input)
    }

    fn edge_assignments(
        &self,
        relationship: &'s Relationship,
        object: Option<&Map<String, Value>>,
    ) -> Result<Vec<Assignment<'s>>, CompilationError> {
        let Some(object) = object else {
            return Ok(Vec::new());
        };
        let properties = self
            .schema
            .relationship_properties(relationship)
            .ok_or_else(|| CompilationError::unknown_field(&relationship.name, "edge"))?;
        object
            .iter()
            .map(|(key, value)| {
                Ok(Assignment {
                    attribute: writable(&properties.name, properties.attribute(key), key)?,
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Target of a nested `operation`, when the relationship allows it
    fn nested_target(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        operation: NestedOperation,
        path: &str,
    ) -> Result<&'s ConcreteEntity, CompilationError> {
        if !relationship.allows(operation) {
            return Err(CompilationError::NestedOperationNotPermitted {
                entity: parent.name.clone(),
                relationship: relationship.name.clone(),
                operation: operation.to_string(),
            });
        }
        match self.schema.relationship_target(relationship)? {
            Entity::Concrete(target) => Ok(target),
            Entity::Composite(composite) => Err(CompilationError::mutation_with_context(
                path,
                format!("`{}` is an interface or union", composite.name),
            )),
        }
    }

    /// `where: { node, edge }` of a nested mutation plus the target's filter
    /// rules for `operation`
    fn nested_filter(
        &self,
        target: &'s ConcreteEntity,
        properties: Option<&'s RelationshipProperties>,
        relationship: &Relationship,
        entry: &Map<String, Value>,
        operation: AuthorizationOperation,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let mut parts = Vec::new();
        if let Some(object) = object_arg(entry, "where", path)? {
            let where_path = child_path(path, "where");
            for (key, value) in object {
                let key_path = child_path(&where_path, key);
                if value.is_null() {
                    continue;
                }
                let subject = match key.as_str() {
                    "node" => FilterSubject::Node(target),
                    "edge" => FilterSubject::Edge(properties.ok_or_else(|| {
                        CompilationError::unknown_field(&relationship.name, "edge")
                    })?),
                    _ => {
                        return Err(CompilationError::filter_with_context(
                            key_path,
                            "relationship filters take `node` and `edge` only",
                        ))
                    }
                };
                parts.extend(self.subject_filter(subject, Some(as_object(value, &key_path)?), &key_path)?);
            }
        }
        parts.extend(self.authorization_filter(target, &[], operation)?);
        Ok(Filter::and(parts))
    }

    fn create_input(
        &self,
        entity: &'s ConcreteEntity,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<CreateInput<'s>, CompilationError> {
        let input = self.node_input(entity, object, path)?;
        let mut nested = Vec::new();
        for (relationship, value, rel_path) in input.relationships {
            let operations = as_object(value, &rel_path)?;
            for (operation, value) in operations {
                let op_path = child_path(&rel_path, operation);
                for (item, item_path) in items(value, &op_path)? {
                    nested.push(match operation.as_str() {
                        "create" => self.nested_create(entity, relationship, item, &item_path)?,
                        "connect" => self.nested_connect(entity, relationship, item, &item_path)?,
                        _ => {
                            return Err(CompilationError::mutation_with_context(
                                op_path,
                                "only `create` and `connect` apply to a new node",
                            ))
                        }
                    });
                }
            }
        }
        let validations = self.authorization_validations(
            entity,
            &written_attributes(&input.assignments),
            AuthorizationOperation::Create,
            AuthorizationWhen::After,
        )?;
        Ok(CreateInput {
            assignments: input.assignments,
            nested,
            validations,
        })
    }

    /// `{ node: {..}, edge: {..} }`
    fn nested_create(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        let target = self.nested_target(parent, relationship, NestedOperation::Create, path)?;
        let empty = Map::new();
        let node = object_arg(item, "node", path)?.unwrap_or(&empty);
        let mut input = self.create_input(target, node, &child_path(path, "node"))?;
        input.validations.extend(self.authorization_validations(
            target,
            &[],
            AuthorizationOperation::CreateRelationship,
            AuthorizationWhen::After,
        )?);
        Ok(NestedMutation::Create {
            relationship,
            target,
            input,
            edge: self.edge_assignments(relationship, object_arg(item, "edge", path)?)?,
        })
    }

    /// `{ where: { node }, edge: {..} }`
    fn nested_connect(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        let target = self.nested_target(parent, relationship, NestedOperation::Connect, path)?;
        let filter = self.nested_filter(
            target,
            None,
            relationship,
            item,
            AuthorizationOperation::CreateRelationship,
            path,
        )?;
        let validations = self.authorization_validations(
            target,
            &[],
            AuthorizationOperation::CreateRelationship,
            AuthorizationWhen::After,
        )?;
        Ok(NestedMutation::Connect {
            relationship,
            target,
            filter,
            edge: self.edge_assignments(relationship, object_arg(item, "edge", path)?)?,
            validations,
        })
    }

    /// `{ where: { node, edge } }`
    fn nested_disconnect(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        let target = self.nested_target(parent, relationship, NestedOperation::Disconnect, path)?;
        let properties = self.schema.relationship_properties(relationship);
        let filter = self.nested_filter(
            target,
            properties,
            relationship,
            item,
            AuthorizationOperation::DeleteRelationship,
            path,
        )?;
        let validations = self.authorization_validations(
            target,
            &[],
            AuthorizationOperation::DeleteRelationship,
            AuthorizationWhen::Before,
        )?;
        Ok(NestedMutation::Disconnect {
            relationship,
            target,
            filter,
            validations,
        })
    }

    /// `{ where: { node, edge }, update: { node: {..}, edge: {..} } }`; the
    /// node input takes attributes only
    fn nested_update(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        let target = self.nested_target(parent, relationship, NestedOperation::Update, path)?;
        let properties = self.schema.relationship_properties(relationship);
        let filter = self.nested_filter(
            target,
            properties,
            relationship,
            item,
            AuthorizationOperation::Update,
            path,
        )?;
        let update_path = child_path(path, "update");
        let update = object_arg(item, "update", path)?;
        let node = match update.map(|update| object_arg(update, "node", &update_path)).transpose()? {
            Some(Some(object)) => object
                .iter()
                .map(|(key, value)| {
                    Ok(Assignment {
                        attribute: writable(&target.name, target.attribute(key), key)?,
                        value: value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, CompilationError>>()?,
            _ => Vec::new(),
        };
        let edge = match update {
            Some(update) => {
                self.edge_assignments(relationship, object_arg(update, "edge", &update_path)?)?
            }
            None => Vec::new(),
        };
        let written = written_attributes(&node);
        let validations = |when| {
            self.authorization_validations(target, &written, AuthorizationOperation::Update, when)
        };
        Ok(NestedMutation::Update {
            relationship,
            target,
            filter,
            before: validations(AuthorizationWhen::Before)?,
            node,
            edge,
            after: validations(AuthorizationWhen::After)?,
        })
    }

    /// `{ where: { node, edge }, delete: { <rel>: [..] } }`
    fn nested_delete(
        &self,
        parent: &ConcreteEntity,
        relationship: &'s Relationship,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        let target = self.nested_target(parent, relationship, NestedOperation::Delete, path)?;
        let properties = self.schema.relationship_properties(relationship);
        let filter = self.nested_filter(
            target,
            properties,
            relationship,
            item,
            AuthorizationOperation::Delete,
            path,
        )?;
        let before = self.authorization_validations(
            target,
            &[],
            AuthorizationOperation::Delete,
            AuthorizationWhen::Before,
        )?;
        let nested = match object_arg(item, "delete", path)? {
            Some(object) => self.nested_deletes(target, object, &child_path(path, "delete"))?,
            None => Vec::new(),
        };
        Ok(NestedMutation::Delete {
            relationship,
            target,
            filter,
            before,
            nested,
        })
    }

    fn nested_deletes(
        &self,
        entity: &'s ConcreteEntity,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Vec<NestedMutation<'s>>, CompilationError> {
        let mut nested = Vec::new();
        for (name, value) in object {
            let relationship = entity
                .relationship(name)
                .ok_or_else(|| CompilationError::unknown_field(&entity.name, name))?;
            for (item, item_path) in items(value, &child_path(path, name))? {
                nested.push(self.nested_delete(entity, relationship, item, &item_path)?);
            }
        }
        Ok(nested)
    }

    /// One entry of `update: { <rel>: [..] }`
    fn update_entry(
        &self,
        entity: &'s ConcreteEntity,
        relationship: &'s Relationship,
        entry: &Map<String, Value>,
        path: &str,
    ) -> Result<Vec<NestedMutation<'s>>, CompilationError> {
        let mut nested = Vec::new();
        if entry.get("update").is_some_and(|update| !update.is_null()) {
            nested.push(self.nested_update(entity, relationship, entry, path)?);
        }
        for (key, value) in entry {
            let key_path = child_path(path, key);
            match key.as_str() {
                "where" | "update" => {}
                "create" | "connect" | "disconnect" | "delete" => {
                    for (item, item_path) in items(value, &key_path)? {
                        nested.push(self.relationship_operation(entity, relationship, key, item, &item_path)?);
                    }
                }
                _ => {
                    return Err(CompilationError::mutation_with_context(
                        key_path,
                        format!("unknown update of `{}`", relationship.name),
                    ))
                }
            }
        }
        Ok(nested)
    }

    fn relationship_operation(
        &self,
        entity: &'s ConcreteEntity,
        relationship: &'s Relationship,
        operation: &str,
        item: &Map<String, Value>,
        path: &str,
    ) -> Result<NestedMutation<'s>, CompilationError> {
        match operation {
            "create" => self.nested_create(entity, relationship, item, path),
            "connect" => self.nested_connect(entity, relationship, item, path),
            "disconnect" => self.nested_disconnect(entity, relationship, item, path),
            _ => self.nested_delete(entity, relationship, item, path),
        }
    }

    /// Top-level `create`, `connect`, `disconnect` and `delete` arguments of
    /// an update, each keyed by relationship
    fn relationship_operations(
        &self,
        entity: &'s ConcreteEntity,
        args: &Map<String, Value>,
        path: &str,
    ) -> Result<Vec<NestedMutation<'s>>, CompilationError> {
        let mut nested = Vec::new();
        for operation in ["create", "connect", "disconnect", "delete"] {
            let Some(object) = object_arg(args, operation, path)? else {
                continue;
            };
            let op_path = child_path(path, operation);
            for (name, value) in object {
                let relationship = entity
                    .relationship(name)
                    .ok_or_else(|| CompilationError::unknown_field(&entity.name, name))?;
                for (item, item_path) in items(value, &child_path(&op_path, name))? {
                    nested.push(self.relationship_operation(entity, relationship, operation, item, &item_path)?);
                }
            }
        }
        Ok(nested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::ast::Operation;
    use crate::query_planner::request::{OperationKind, Principal, QueryRequest};
    use serde_json::json;

    fn build(request: &QueryRequest) -> Result<usize, CompilationError> {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        Ok(match factory.build(request)? {
            Operation::Create(op) => op.inputs.iter().map(|input| input.nested.len()).sum(),
            Operation::Update(op) => op.nested.len(),
            Operation::Delete(op) => op.nested.len(),
            _ => panic!("expected a mutation"),
        })
    }

    #[test]
    fn test_create_with_nested_create_and_connect() {
        let request = QueryRequest::new(OperationKind::Create, "Movie")
            .arg(
                "input",
                json!([{
                    "title": "The Matrix",
                    "actors": {
                        "create": [{ "node": { "name": "Keanu" }, "edge": { "role": "Neo" } }],
                        "connect": [{ "where": { "node": { "name": "Carrie" } } }]
                    }
                }]),
            )
            .select(FieldSelection::leaves(&["title"]));
        assert_eq!(build(&request).unwrap(), 2);
    }

    #[test]
    fn test_nested_operation_must_be_allowed() {
        let request = QueryRequest::new(OperationKind::Create, "Movie").arg(
            "input",
            json!({ "director": { "create": { "node": { "name": "Lana" } } } }),
        );
        assert_eq!(
            build(&request).unwrap_err(),
            CompilationError::NestedOperationNotPermitted {
                entity: "Movie".to_string(),
                relationship: "director".to_string(),
                operation: "create".to_string(),
            }
        );
    }

    #[test]
    fn test_computed_attributes_are_not_writable() {
        let request = QueryRequest::new(OperationKind::Update, "Movie")
            .arg("update", json!({ "actorCount": 3 }));
        assert_eq!(
            build(&request).unwrap_err(),
            CompilationError::unknown_field("Movie", "actorCount")
        );
    }

    #[test]
    fn test_update_collects_nested_operations() {
        let request = QueryRequest::new(OperationKind::Update, "Movie")
            .arg("where", json!({ "title": "The Matrix" }))
            .arg(
                "update",
                json!({
                    "released": 1999,
                    "actors": [{
                        "where": { "node": { "name": "Keanu" } },
                        "update": { "edge": { "screenTime": 120 } }
                    }]
                }),
            )
            .arg("disconnect", json!({ "director": { "where": { "node": { "name": "X" } } } }))
            .arg("connect", json!({ "director": { "where": { "node": { "name": "Lana" } } } }));
        assert_eq!(build(&request).unwrap(), 3);
    }

    #[test]
    fn test_delete_with_nested_delete() {
        let request = QueryRequest::new(OperationKind::Delete, "User")
            .arg("where", json!({ "id": "u1" }))
            .arg("delete", json!({ "posts": [{ "where": { "node": { "content_CONTAINS": "spam" } } }] }));
        assert_eq!(build(&request).unwrap(), 1);
    }

    #[test]
    fn test_edge_input_needs_properties() {
        let request = QueryRequest::new(OperationKind::Update, "Movie").arg(
            "connect",
            json!({ "director": { "where": { "node": { "name": "Lana" } }, "edge": { "year": 1 } } }),
        );
        assert_eq!(
            build(&request).unwrap_err(),
            CompilationError::unknown_field("director", "edge")
        );
    }
}
