//! Selection sets to read operations.
//!
//! One method per operation shape. Relationship fields recurse into the
//! target entity with a [`Via`] so nested scopes know the relationship they
//! traverse; composite targets expand into one branch per constituent.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::graph_catalog::authorization::AuthorizationOperation;
use crate::graph_catalog::graph_schema::{
    Attribute, CompositeEntity, ConcreteEntity, Entity, Relationship, RelationshipProperties,
};
use crate::query_planner::ast::composite::ConnectionBranch;
use crate::query_planner::ast::{
    AggregateOperation, AggregationFunction, AggregationItem, AggregationMeasure,
    CompositeConnectionReadOperation, CompositeReadOperation, ConnectionItem,
    ConnectionReadOperation, Field, Filter, Operation, PageInfoField, ReadOperation, Sort,
};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::FieldSelection;

use super::auth_factory::selected_attributes;
use super::filter_factory::FilterSubject;
use super::sort_and_pagination::{Ordering, SortableAttributes};
use super::{as_object, child_path, effective_selection, object_arg, AstFactory, Via};

type OnTypes = IndexMap<String, Vec<FieldSelection>>;

/// Type names reported by `__typename` inside a connection
struct ConnectionNames {
    connection: String,
    edge: String,
    /// Prefix of the aggregate selection type names
    aggregate: String,
}

impl ConnectionNames {
    fn new(entity: &str, via: Option<Via<'_>>) -> Self {
        match via {
            None => ConnectionNames {
                connection: format!("{}Connection", entity),
                edge: format!("{}Edge", entity),
                aggregate: entity.to_string(),
            },
            Some(via) => {
                let prefix = via.type_prefix();
                ConnectionNames {
                    connection: format!("{}Connection", prefix),
                    edge: format!("{}Relationship", prefix),
                    aggregate: prefix,
                }
            }
        }
    }
}

/// What an aggregate selection may reduce
struct AggregationScope<'s> {
    target: &'s ConcreteEntity,
    properties: Option<&'s RelationshipProperties>,
    /// Attribute groups sit directly in the selection (root aggregates)
    direct: bool,
    /// There is a relationship whose edges can be counted
    traversed: bool,
    type_prefix: String,
}

/// `where` of a connection: plain node filter at the root, `{ node, edge }`
/// across a relationship
type ConnectionWhere<'a> = (
    Option<(&'a Map<String, Value>, String)>,
    Option<(&'a Map<String, Value>, String)>,
);

fn split_connection_where<'a>(
    args: &'a Map<String, Value>,
    nested: bool,
    path: &str,
) -> Result<ConnectionWhere<'a>, CompilationError> {
    let where_path = child_path(path, "where");
    let Some(object) = object_arg(args, "where", path)? else {
        return Ok((None, None));
    };
    if !nested {
        return Ok((Some((object, where_path)), None));
    }
    let mut node = None;
    let mut edge = None;
    for (key, value) in object {
        let key_path = child_path(&where_path, key);
        match key.as_str() {
            "node" if !value.is_null() => node = Some((as_object(value, &key_path)?, key_path)),
            "edge" if !value.is_null() => edge = Some((as_object(value, &key_path)?, key_path)),
            "node" | "edge" => {}
            _ => {
                return Err(CompilationError::filter_with_context(
                    key_path,
                    "connection filters take `node` and `edge` only",
                ))
            }
        }
    }
    Ok((node, edge))
}

/// Every UNION branch carries its concrete type name
fn ensure_typename<'s>(fields: &mut Vec<Field<'s>>, entity: &ConcreteEntity) {
    if !fields.iter().any(|field| field.key() == "__typename") {
        fields.push(Field::Typename {
            key: "__typename".to_string(),
            type_name: entity.name.clone(),
        });
    }
}

/// Branch ordering of a composite read: the merged sort resolved against
/// `member`, paging left to the merged rows
fn member_ordering<'s>(
    member: &'s ConcreteEntity,
    sort: &[Sort<'s>],
) -> Result<Ordering<'s>, CompilationError> {
    Ok(Ordering {
        sort: sort
            .iter()
            .map(|sort| sort.for_member(member))
            .collect::<Result<_, _>>()?,
        pagination: Default::default(),
    })
}

/// Entity attributes reduced by an aggregate selection
fn measured_attributes<'s>(items: &[AggregationItem<'s>], out: &mut Vec<&'s Attribute>) {
    for item in items {
        match item {
            AggregationItem::Measure {
                measure: AggregationMeasure::Node(attribute, _),
                ..
            } => out.push(attribute),
            AggregationItem::Group { items, .. } => measured_attributes(items, out),
            _ => {}
        }
    }
}

fn merge_selections<'a>(into: &mut Vec<&'a FieldSelection>, more: Vec<&'a FieldSelection>) {
    for field in more {
        if !into
            .iter()
            .any(|seen| seen.response_key() == field.response_key())
        {
            into.push(field);
        }
    }
}

impl<'s> AstFactory<'s> {
    pub(crate) fn read_operation(
        &self,
        entity: &'s ConcreteEntity,
        via: Option<Via<'s>>,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        on_types: &OnTypes,
        path: &str,
    ) -> Result<ReadOperation<'s>, CompilationError> {
        let fields = self.fields(
            entity,
            &effective_selection(&entity.name, selection, on_types),
            path,
        )?;
        let is_list = via.is_none_or(|via| via.relationship.is_list);
        let ordering = self.list_ordering(&entity.attributes, args, entity.limit, is_list, path)?;
        self.read_scope(
            entity,
            via,
            object_arg(args, "where", path)?,
            fields,
            ordering,
            path,
        )
    }

    /// Read of `entity` with its user filter and read authorization
    fn read_scope(
        &self,
        entity: &'s ConcreteEntity,
        via: Option<Via<'s>>,
        where_arg: Option<&Map<String, Value>>,
        fields: Vec<Field<'s>>,
        ordering: Ordering<'s>,
        path: &str,
    ) -> Result<ReadOperation<'s>, CompilationError> {
        let user = self.where_filter(entity, where_arg, path)?;
        let auth = self.read_authorization(
            entity,
            &selected_attributes(&fields),
            AuthorizationOperation::Read,
        )?;
        Ok(ReadOperation {
            entity,
            relationship: via.map(|via| via.relationship),
            filter: Filter::and(user.into_iter().chain(auth.filter).collect()),
            validations: auth.validations,
            fields,
            sort: ordering.sort,
            pagination: ordering.pagination,
        })
    }

    pub(crate) fn fields(
        &self,
        entity: &'s ConcreteEntity,
        selection: &[&FieldSelection],
        path: &str,
    ) -> Result<Vec<Field<'s>>, CompilationError> {
        selection
            .iter()
            .map(|field| self.field(entity, field, path))
            .collect()
    }

    fn field(
        &self,
        entity: &'s ConcreteEntity,
        selection: &FieldSelection,
        path: &str,
    ) -> Result<Field<'s>, CompilationError> {
        let key = selection.response_key().to_string();
        let name = selection.name.as_str();
        let field_path = child_path(path, &key);

        if name == "__typename" {
            return Ok(Field::Typename {
                key,
                type_name: entity.name.clone(),
            });
        }
        if let Some(attribute) = entity.attribute(name) {
            return Ok(if attribute.is_computed() {
                Field::Computed { key, attribute }
            } else {
                Field::Attribute { key, attribute }
            });
        }
        if let Some(relationship) = entity.relationship(name) {
            let via = Via {
                parent: &entity.name,
                relationship,
            };
            let operation = match self.schema.relationship_target(relationship)? {
                Entity::Concrete(target) => Operation::Read(self.read_operation(
                    target,
                    Some(via),
                    &selection.args,
                    &selection.selection,
                    &selection.on_types,
                    &field_path,
                )?),
                Entity::Composite(target) => Operation::CompositeRead(self.composite_read(
                    target,
                    Some(via),
                    &selection.args,
                    &selection.selection,
                    &selection.on_types,
                    &field_path,
                )?),
            };
            return Ok(Field::Relationship {
                key,
                operation: Box::new(operation),
            });
        }
        if let Some(relationship) = name
            .strip_suffix("Connection")
            .and_then(|base| entity.relationship(base))
        {
            let via = Via {
                parent: &entity.name,
                relationship,
            };
            let operation = match self.schema.relationship_target(relationship)? {
                Entity::Concrete(target) => Operation::ConnectionRead(self.connection_operation(
                    target,
                    Some(via),
                    &selection.args,
                    &selection.selection,
                    &field_path,
                )?),
                Entity::Composite(target) => {
                    Operation::CompositeConnectionRead(self.composite_connection(
                        target,
                        Some(via),
                        &selection.args,
                        &selection.selection,
                        &field_path,
                    )?)
                }
            };
            return Ok(Field::Relationship {
                key,
                operation: Box::new(operation),
            });
        }
        if let Some(relationship) = name
            .strip_suffix("Aggregate")
            .and_then(|base| entity.relationship(base))
        {
            let via = Via {
                parent: &entity.name,
                relationship,
            };
            let operation = self.aggregation_field(via, selection, &field_path)?;
            return Ok(Field::Aggregation {
                key,
                operation: Box::new(Operation::Aggregate(operation)),
            });
        }
        Err(CompilationError::unknown_field(&entity.name, name))
    }

    pub(crate) fn composite_read(
        &self,
        composite: &'s CompositeEntity,
        via: Option<Via<'s>>,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        on_types: &OnTypes,
        path: &str,
    ) -> Result<CompositeReadOperation<'s>, CompilationError> {
        let members = self.narrow_composite(
            composite,
            object_arg(args, "where", path)?,
            &child_path(path, "where"),
        )?;
        let is_list = via.is_none_or(|via| via.relationship.is_list);
        let ordering =
            self.list_ordering(&composite.shared_attributes, args, None, is_list, path)?;

        let mut branches = Vec::with_capacity(members.len());
        for (member, rest) in members {
            let mut fields = self.fields(
                member,
                &effective_selection(&member.name, selection, on_types),
                path,
            )?;
            ensure_typename(&mut fields, member);
            branches.push(self.read_scope(
                member,
                via,
                rest.as_ref(),
                fields,
                member_ordering(member, &ordering.sort)?,
                path,
            )?);
        }
        log::debug!(
            "{} expands to {} UNION branch(es)",
            composite.name,
            branches.len()
        );
        Ok(CompositeReadOperation {
            composite,
            relationship: via.map(|via| via.relationship),
            branches,
            sort: ordering.sort,
            pagination: ordering.pagination,
        })
    }

    pub(crate) fn connection_operation(
        &self,
        entity: &'s ConcreteEntity,
        via: Option<Via<'s>>,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        path: &str,
    ) -> Result<ConnectionReadOperation<'s>, CompilationError> {
        let properties = via.and_then(|via| self.schema.relationship_properties(via.relationship));
        let names = ConnectionNames::new(&entity.name, via);
        let scope = AggregationScope {
            target: entity,
            properties,
            direct: false,
            traversed: via.is_some(),
            type_prefix: names.aggregate.clone(),
        };
        let items = self.connection_items(
            &names,
            selection,
            &mut |node, node_path| {
                self.fields(
                    entity,
                    &effective_selection(&entity.name, &node.selection, &node.on_types),
                    node_path,
                )
            },
            properties,
            Some(&scope),
            path,
        )?;

        let (node_where, edge_where) = split_connection_where(args, via.is_some(), path)?;
        let node_filter = match node_where {
            Some((object, node_path)) => {
                self.subject_filter(FilterSubject::Node(entity), Some(object), &node_path)?
            }
            None => None,
        };
        let edge_filter = self.edge_where(via.map(|via| via.relationship), properties, edge_where)?;

        let mut attributes = Vec::new();
        for item in &items {
            if let ConnectionItem::Edges {
                node: Some((_, fields)),
                ..
            } = item
            {
                attributes.extend(selected_attributes(fields));
            }
        }
        let auth = self.read_authorization(entity, &attributes, AuthorizationOperation::Read)?;
        let ordering = self.connection_ordering(
            SortableAttributes {
                node: &entity.attributes,
                edge: properties.map(|properties| &properties.attributes),
            },
            args,
            entity.limit,
            path,
        )?;

        Ok(ConnectionReadOperation {
            entity,
            relationship: via.map(|via| via.relationship),
            filter: Filter::and(
                node_filter
                    .into_iter()
                    .chain(edge_filter)
                    .chain(auth.filter)
                    .collect(),
            ),
            validations: auth.validations,
            sort: ordering.sort,
            pagination: ordering.pagination,
            items,
        })
    }

    pub(crate) fn composite_connection(
        &self,
        composite: &'s CompositeEntity,
        via: Option<Via<'s>>,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        path: &str,
    ) -> Result<CompositeConnectionReadOperation<'s>, CompilationError> {
        let properties = via.and_then(|via| self.schema.relationship_properties(via.relationship));
        let names = ConnectionNames::new(&composite.name, via);
        // Node fields live in each branch; the edge windows only reference them
        let items = self.connection_items(
            &names,
            selection,
            &mut |_, _| Ok(Vec::new()),
            properties,
            None,
            path,
        )?;

        let (node_where, edge_where) = split_connection_where(args, via.is_some(), path)?;
        let node_path = node_where
            .as_ref()
            .map(|(_, node_path)| node_path.clone())
            .unwrap_or_else(|| child_path(path, "where"));
        let members = self.narrow_composite(
            composite,
            node_where.map(|(object, _)| object),
            &node_path,
        )?;
        let edge_filter = self.edge_where(via.map(|via| via.relationship), properties, edge_where)?;
        let ordering = self.connection_ordering(
            SortableAttributes {
                node: &composite.shared_attributes,
                edge: properties.map(|properties| &properties.attributes),
            },
            args,
            None,
            path,
        )?;

        let node_selections: Vec<&FieldSelection> = selection
            .iter()
            .filter(|field| field.name == "edges")
            .flat_map(|edges| edges.selection.iter().filter(|field| field.name == "node"))
            .collect();
        let mut edge_fields = Vec::new();
        for item in &items {
            if let ConnectionItem::Edges {
                properties: Some((_, fields)),
                ..
            } = item
            {
                for field in fields {
                    if !edge_fields.iter().any(|seen: &Field<'_>| seen.key() == field.key()) {
                        edge_fields.push(field.clone());
                    }
                }
            }
        }

        let mut branches = Vec::with_capacity(members.len());
        for (member, rest) in members {
            let mut merged = Vec::new();
            for node in &node_selections {
                merge_selections(
                    &mut merged,
                    effective_selection(&member.name, &node.selection, &node.on_types),
                );
            }
            let mut fields = self.fields(member, &merged, &child_path(path, "edges.node"))?;
            ensure_typename(&mut fields, member);
            let mut read = self.read_scope(
                member,
                via,
                rest.as_ref(),
                fields,
                member_ordering(member, &ordering.sort)?,
                &node_path,
            )?;
            read.filter = Filter::and(read.filter.into_iter().chain(edge_filter.clone()).collect());
            branches.push(ConnectionBranch {
                read,
                edge_fields: edge_fields.clone(),
            });
        }
        log::debug!(
            "{} connection expands to {} UNION branch(es)",
            composite.name,
            branches.len()
        );

        Ok(CompositeConnectionReadOperation {
            composite,
            relationship: via.map(|via| via.relationship),
            branches,
            sort: ordering.sort,
            pagination: ordering.pagination,
            items,
        })
    }

    fn edge_where(
        &self,
        relationship: Option<&'s Relationship>,
        properties: Option<&'s RelationshipProperties>,
        edge_where: Option<(&Map<String, Value>, String)>,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let Some((object, path)) = edge_where else {
            return Ok(None);
        };
        let properties = properties.ok_or_else(|| {
            CompilationError::unknown_field(
                relationship.map(|r| r.name.as_str()).unwrap_or_default(),
                "edge",
            )
        })?;
        self.subject_filter(FilterSubject::Edge(properties), Some(object), &path)
    }

    fn connection_items<F>(
        &self,
        names: &ConnectionNames,
        selection: &[FieldSelection],
        node_fields: &mut F,
        properties: Option<&'s RelationshipProperties>,
        aggregate: Option<&AggregationScope<'s>>,
        path: &str,
    ) -> Result<Vec<ConnectionItem<'s>>, CompilationError>
    where
        F: FnMut(&FieldSelection, &str) -> Result<Vec<Field<'s>>, CompilationError>,
    {
        let mut items = Vec::with_capacity(selection.len());
        for field in selection {
            let key = field.response_key().to_string();
            let field_path = child_path(path, &key);
            let item = match field.name.as_str() {
                "totalCount" => ConnectionItem::TotalCount { key },
                "__typename" => ConnectionItem::Typename {
                    key,
                    type_name: names.connection.clone(),
                },
                "pageInfo" => {
                    let mut fields = Vec::with_capacity(field.selection.len());
                    for info in &field.selection {
                        let info_key = info.response_key().to_string();
                        fields.push(match info.name.as_str() {
                            "hasNextPage" => PageInfoField::HasNextPage(info_key),
                            "hasPreviousPage" => PageInfoField::HasPreviousPage(info_key),
                            "__typename" => PageInfoField::Typename(info_key),
                            "startCursor" | "endCursor" => {
                                return Err(CompilationError::argument_with_context(
                                    child_path(&field_path, &info_key),
                                    "cursors are not projected",
                                ))
                            }
                            other => return Err(CompilationError::unknown_field("PageInfo", other)),
                        });
                    }
                    ConnectionItem::PageInfo { key, fields }
                }
                "edges" => {
                    let mut node = None;
                    let mut edge_properties = None;
                    let mut typename = None;
                    for part in &field.selection {
                        let part_key = part.response_key().to_string();
                        let part_path = child_path(&field_path, &part_key);
                        match part.name.as_str() {
                            "node" => node = Some((part_key, node_fields(part, &part_path)?)),
                            "properties" => {
                                let properties = properties.ok_or_else(|| {
                                    CompilationError::unknown_field(&names.edge, "properties")
                                })?;
                                edge_properties =
                                    Some((part_key, self.edge_fields(properties, part)?));
                            }
                            "__typename" => typename = Some((part_key, names.edge.clone())),
                            "cursor" => {
                                return Err(CompilationError::argument_with_context(
                                    part_path,
                                    "cursors are not projected",
                                ))
                            }
                            other => return Err(CompilationError::unknown_field(&names.edge, other)),
                        }
                    }
                    ConnectionItem::Edges {
                        key,
                        node,
                        properties: edge_properties,
                        typename,
                    }
                }
                "aggregate" => {
                    let scope = aggregate.ok_or_else(|| {
                        CompilationError::aggregation_with_context(
                            &field_path,
                            "interfaces and unions cannot be aggregated",
                        )
                    })?;
                    ConnectionItem::Aggregate {
                        key,
                        items: self.aggregation_items(scope, &field.selection, &field_path)?,
                    }
                }
                other => return Err(CompilationError::unknown_field(&names.connection, other)),
            };
            items.push(item);
        }
        Ok(items)
    }

    fn edge_fields(
        &self,
        properties: &'s RelationshipProperties,
        selection: &FieldSelection,
    ) -> Result<Vec<Field<'s>>, CompilationError> {
        selection
            .selection
            .iter()
            .map(|field| {
                let key = field.response_key().to_string();
                if field.name == "__typename" {
                    return Ok(Field::Typename {
                        key,
                        type_name: properties.name.clone(),
                    });
                }
                let attribute = properties
                    .attribute(&field.name)
                    .ok_or_else(|| CompilationError::unknown_field(&properties.name, &field.name))?;
                Ok(Field::Attribute { key, attribute })
            })
            .collect()
    }

    pub(crate) fn aggregate_operation(
        &self,
        entity: &'s ConcreteEntity,
        args: &Map<String, Value>,
        selection: &[FieldSelection],
        path: &str,
    ) -> Result<AggregateOperation<'s>, CompilationError> {
        let scope = AggregationScope {
            target: entity,
            properties: None,
            direct: true,
            traversed: false,
            type_prefix: entity.name.clone(),
        };
        let items = self.aggregation_items(&scope, selection, path)?;
        self.aggregate_scope(entity, None, object_arg(args, "where", path)?, items, path)
    }

    /// `<relationship>Aggregate { count node { .. } edge { .. } }`
    fn aggregation_field(
        &self,
        via: Via<'s>,
        selection: &FieldSelection,
        path: &str,
    ) -> Result<AggregateOperation<'s>, CompilationError> {
        let target = match self.schema.relationship_target(via.relationship)? {
            Entity::Concrete(target) => target,
            Entity::Composite(composite) => {
                return Err(CompilationError::aggregation_with_context(
                    path,
                    format!("`{}` is an interface or union", composite.name),
                ))
            }
        };
        let scope = AggregationScope {
            target,
            properties: self.schema.relationship_properties(via.relationship),
            direct: false,
            traversed: true,
            type_prefix: via.type_prefix(),
        };
        let items = self.aggregation_items(&scope, &selection.selection, path)?;
        self.aggregate_scope(
            target,
            Some(via.relationship),
            object_arg(&selection.args, "where", path)?,
            items,
            path,
        )
    }

    fn aggregate_scope(
        &self,
        entity: &'s ConcreteEntity,
        relationship: Option<&'s Relationship>,
        where_arg: Option<&Map<String, Value>>,
        items: Vec<AggregationItem<'s>>,
        path: &str,
    ) -> Result<AggregateOperation<'s>, CompilationError> {
        let user = self.where_filter(entity, where_arg, path)?;
        let mut attributes = Vec::new();
        measured_attributes(&items, &mut attributes);
        let auth =
            self.read_authorization(entity, &attributes, AuthorizationOperation::Aggregate)?;
        Ok(AggregateOperation {
            entity,
            relationship,
            filter: Filter::and(user.into_iter().chain(auth.filter).collect()),
            validations: auth.validations,
            items,
        })
    }

    fn aggregation_items(
        &self,
        scope: &AggregationScope<'s>,
        selection: &[FieldSelection],
        path: &str,
    ) -> Result<Vec<AggregationItem<'s>>, CompilationError> {
        let type_name = format!("{}AggregateSelection", scope.type_prefix);
        let mut items = Vec::with_capacity(selection.len());
        for field in selection {
            let key = field.response_key().to_string();
            let field_path = child_path(path, &key);
            let item = match field.name.as_str() {
                "__typename" => AggregationItem::Typename {
                    key,
                    type_name: type_name.clone(),
                },
                "count" if field.selection.is_empty() => AggregationItem::Measure {
                    key,
                    measure: AggregationMeasure::CountNodes,
                },
                "count" => {
                    let mut counts = Vec::with_capacity(field.selection.len());
                    for count in &field.selection {
                        let count_key = count.response_key().to_string();
                        counts.push(match count.name.as_str() {
                            "nodes" => AggregationItem::Measure {
                                key: count_key,
                                measure: AggregationMeasure::CountNodes,
                            },
                            "edges" if scope.traversed => AggregationItem::Measure {
                                key: count_key,
                                measure: AggregationMeasure::CountEdges,
                            },
                            "__typename" => AggregationItem::Typename {
                                key: count_key,
                                type_name: "Count".to_string(),
                            },
                            other => return Err(CompilationError::unknown_field("Count", other)),
                        });
                    }
                    AggregationItem::Group { key, items: counts }
                }
                "node" if !scope.direct => AggregationItem::Group {
                    key,
                    items: attribute_groups(
                        &scope.target.name,
                        |name| scope.target.attribute(name),
                        AggregationMeasure::Node,
                        &field.selection,
                        format!("{}NodeAggregateSelection", scope.type_prefix),
                        &field_path,
                    )?,
                },
                "edge" if !scope.direct && scope.traversed => {
                    let properties = scope.properties.ok_or_else(|| {
                        CompilationError::unknown_field(&type_name, "edge")
                    })?;
                    AggregationItem::Group {
                        key,
                        items: attribute_groups(
                            &properties.name,
                            |name| properties.attribute(name),
                            AggregationMeasure::Edge,
                            &field.selection,
                            format!("{}EdgeAggregateSelection", scope.type_prefix),
                            &field_path,
                        )?,
                    }
                }
                name if scope.direct => {
                    let attribute = scope
                        .target
                        .attribute(name)
                        .ok_or_else(|| CompilationError::unknown_field(&scope.target.name, name))?;
                    attribute_group(key, attribute, field, AggregationMeasure::Node, &field_path)?
                }
                other => return Err(CompilationError::unknown_field(&type_name, other)),
            };
            items.push(item);
        }
        Ok(items)
    }
}

fn attribute_groups<'s, L>(
    owner: &str,
    lookup: L,
    make: fn(&'s Attribute, AggregationFunction) -> AggregationMeasure<'s>,
    selection: &[FieldSelection],
    type_name: String,
    path: &str,
) -> Result<Vec<AggregationItem<'s>>, CompilationError>
where
    L: Fn(&str) -> Option<&'s Attribute>,
{
    let mut groups = Vec::with_capacity(selection.len());
    for field in selection {
        let key = field.response_key().to_string();
        if field.name == "__typename" {
            groups.push(AggregationItem::Typename {
                key,
                type_name: type_name.clone(),
            });
            continue;
        }
        let attribute =
            lookup(&field.name).ok_or_else(|| CompilationError::unknown_field(owner, &field.name))?;
        let group_path = child_path(path, &key);
        groups.push(attribute_group(key, attribute, field, make, &group_path)?);
    }
    Ok(groups)
}

/// `age { min max }`
fn attribute_group<'s>(
    key: String,
    attribute: &'s Attribute,
    selection: &FieldSelection,
    make: fn(&'s Attribute, AggregationFunction) -> AggregationMeasure<'s>,
    path: &str,
) -> Result<AggregationItem<'s>, CompilationError> {
    if attribute.is_computed() {
        return Err(CompilationError::aggregation_with_context(
            path,
            format!("computed field `{}` cannot be aggregated", attribute.name),
        ));
    }
    let mut items = Vec::with_capacity(selection.selection.len());
    for reduction in &selection.selection {
        let reduction_key = reduction.response_key().to_string();
        if reduction.name == "__typename" {
            items.push(AggregationItem::Typename {
                key: reduction_key,
                type_name: format!("{}AggregateSelection", attribute.kind),
            });
            continue;
        }
        let function = AggregationFunction::from_selection(&reduction.name).ok_or_else(|| {
            CompilationError::aggregation_with_context(
                child_path(path, &reduction_key),
                format!("unknown aggregation `{}`", reduction.name),
            )
        })?;
        function.check(attribute, path)?;
        items.push(AggregationItem::Measure {
            key: reduction_key,
            measure: make(attribute, function),
        });
    }
    Ok(AggregationItem::Group { key, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::request::{Principal, QueryRequest};
    use serde_json::json;

    #[test]
    fn test_relationship_connection_and_aggregate_fields() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::read("Movie").select(vec![
            FieldSelection::new("title"),
            FieldSelection::new("actors").select(FieldSelection::leaves(&["name"])),
            FieldSelection::new("actorsConnection").select(vec![FieldSelection::new("totalCount")]),
            FieldSelection::new("actorsAggregate")
                .alias("stats")
                .select(vec![FieldSelection::new("count")]),
        ]);
        let Operation::Read(read) = factory.build(&request).unwrap() else {
            panic!("expected a read");
        };
        let keys: Vec<_> = read.fields.iter().map(Field::key).collect();
        assert_eq!(keys, vec!["title", "actors", "actorsConnection", "stats"]);
        assert!(matches!(
            &read.fields[2],
            Field::Relationship { operation, .. } if matches!(**operation, Operation::ConnectionRead(_))
        ));
        assert!(matches!(&read.fields[3], Field::Aggregation { .. }));
    }

    #[test]
    fn test_unknown_field_names_entity() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::read("Movie").select(FieldSelection::leaves(&["rating"]));
        assert_eq!(
            factory.build(&request).unwrap_err(),
            CompilationError::unknown_field("Movie", "rating")
        );
    }

    #[test]
    fn test_union_branches_follow_fragments() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::read("Search")
            .arg("where", json!({ "Person": { "name": "Lana" } }))
            .on("Movie", FieldSelection::leaves(&["title"]))
            .on("Person", FieldSelection::leaves(&["name"]));
        let Operation::CompositeRead(read) = factory.build(&request).unwrap() else {
            panic!("expected a composite read");
        };
        assert_eq!(read.branches.len(), 1);
        let keys: Vec<_> = read.branches[0].fields.iter().map(Field::key).collect();
        assert_eq!(keys, vec!["name", "__typename"]);
        assert!(read.branches[0].filter.is_some());
    }

    #[test]
    fn test_interface_sort_resolves_per_branch() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::read("Production")
            .arg("sort", json!([{ "title": "ASC" }]))
            .select(FieldSelection::leaves(&["id"]));
        let Operation::CompositeRead(read) = factory.build(&request).unwrap() else {
            panic!("expected a composite read");
        };
        for branch in &read.branches {
            let keys: Vec<_> = branch.fields.iter().map(Field::key).collect();
            assert_eq!(keys, vec!["id", "__typename"]);
            let [sort] = branch.sort.as_slice() else {
                panic!("expected one branch sort");
            };
            assert!(std::ptr::eq(
                sort.target.attribute(),
                branch.entity.attribute("title").unwrap()
            ));
            assert!(branch.pagination.is_empty());
        }
        let union_sort = QueryRequest::read("Search").arg("sort", json!([{ "title": "ASC" }]));
        assert!(matches!(
            factory.build(&union_sort),
            Err(CompilationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_aggregate_rejects_unsupported_reduction() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::aggregate("Movie").select(vec![
            FieldSelection::new("title").select(FieldSelection::leaves(&["average"])),
        ]);
        assert!(matches!(
            factory.build(&request),
            Err(CompilationError::UnsupportedAggregation { .. })
        ));
    }

    #[test]
    fn test_cursor_selection_rejected() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let request = QueryRequest::connection("Movie").select(vec![
            FieldSelection::new("edges").select(FieldSelection::leaves(&["cursor"])),
        ]);
        assert!(matches!(
            factory.build(&request),
            Err(CompilationError::InvalidArgument { .. })
        ));
    }
}
