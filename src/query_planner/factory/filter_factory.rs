//! `where` argument parsing.
//!
//! Two spellings reach this module: legacy suffixed keys (`title_GT`,
//! `actors_SOME`, `name_LONGEST_LENGTH_GT`) and generic nested objects
//! (`title: { gt }`, `actors: { some }`, `name: { longestLength: { gt } }`).
//! Both produce the same [`Filter`] trees; mixing them for one field of one
//! object is rejected.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::graph_catalog::graph_schema::{
    Attribute, CompositeEntity, ConcreteEntity, Entity, Relationship, RelationshipProperties,
};
use crate::query_planner::ast::{
    AggregationFilter, AggregationFunction, AggregationMeasure, Filter, FilterOperator,
    FilterValue, NullFilter, PropertyFilter, PropertyTarget, Quantifier, RelationshipFilter,
    RelationshipFilterTarget,
};
use crate::query_planner::errors::CompilationError;

use super::{as_object, child_path, AstFactory};

/// Prefix of string values that reference a principal claim
const CLAIM_PREFIX: &str = "$jwt.";

lazy_static::lazy_static! {
    static ref PROPERTY_SUFFIXES: Vec<(&'static str, FilterOperator)> = vec![
        ("_STARTS_WITH", FilterOperator::StartsWith),
        ("_ENDS_WITH", FilterOperator::EndsWith),
        ("_CONTAINS", FilterOperator::Contains),
        ("_INCLUDES", FilterOperator::Includes),
        ("_GTE", FilterOperator::Gte),
        ("_LTE", FilterOperator::Lte),
        ("_GT", FilterOperator::Gt),
        ("_LT", FilterOperator::Lt),
        ("_EQ", FilterOperator::Eq),
        ("_IN", FilterOperator::In),
    ];

    static ref COMPARISON_SUFFIXES: Vec<(&'static str, FilterOperator)> = vec![
        ("_EQUAL", FilterOperator::Eq),
        ("_GTE", FilterOperator::Gte),
        ("_LTE", FilterOperator::Lte),
        ("_GT", FilterOperator::Gt),
        ("_LT", FilterOperator::Lt),
        ("_EQ", FilterOperator::Eq),
    ];

    static ref REDUCTION_SUFFIXES: Vec<(&'static str, AggregationFunction)> = vec![
        ("_SHORTEST_LENGTH", AggregationFunction::Shortest),
        ("_LONGEST_LENGTH", AggregationFunction::Longest),
        ("_AVERAGE_LENGTH", AggregationFunction::AverageLength),
        ("_AVERAGE", AggregationFunction::Average),
        ("_MIN", AggregationFunction::Min),
        ("_MAX", AggregationFunction::Max),
        ("_SUM", AggregationFunction::Sum),
    ];

    static ref QUANTIFIER_SUFFIXES: Vec<(&'static str, Quantifier)> = vec![
        ("_SOME", Quantifier::Some),
        ("_ALL", Quantifier::All),
        ("_NONE", Quantifier::None),
        ("_SINGLE", Quantifier::Single),
    ];
}

fn reduction_from_generic(name: &str) -> Option<AggregationFunction> {
    Some(match name {
        "min" => AggregationFunction::Min,
        "max" => AggregationFunction::Max,
        "average" => AggregationFunction::Average,
        "sum" => AggregationFunction::Sum,
        "shortestLength" => AggregationFunction::Shortest,
        "longestLength" => AggregationFunction::Longest,
        "averageLength" => AggregationFunction::AverageLength,
        _ => return None,
    })
}

fn strip_any<'k, T: Copy>(key: &'k str, table: &[(&'static str, T)]) -> Option<(&'k str, T)> {
    table
        .iter()
        .find_map(|(suffix, value)| key.strip_suffix(suffix).map(|base| (base, *value)))
}

/// `{ eq: 1, gt: 0 }`, `{ caseInsensitive: { contains: "x" } }`
fn is_operator_object(object: &Map<String, Value>) -> bool {
    !object.is_empty()
        && object
            .keys()
            .all(|key| key == "caseInsensitive" || FilterOperator::from_generic(key).is_some())
}

fn is_quantifier_object(object: &Map<String, Value>) -> bool {
    object.keys().any(|key| Quantifier::parse(key).is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spelling {
    Suffixed,
    Nested,
}

/// What the keys of a `where` object refer to
#[derive(Debug, Clone, Copy)]
pub(crate) enum FilterSubject<'s> {
    Node(&'s ConcreteEntity),
    Edge(&'s RelationshipProperties),
    /// Keys are claim paths of the principal
    Claims,
}

impl<'s> FilterSubject<'s> {
    fn name(&self) -> &'s str {
        match self {
            FilterSubject::Node(entity) => &entity.name,
            FilterSubject::Edge(properties) => &properties.name,
            FilterSubject::Claims => "jwt",
        }
    }
}

/// One constituent of a narrowed composite and the `where` left for it
pub(crate) type NarrowedMember<'s> = (&'s ConcreteEntity, Option<Map<String, Value>>);

pub(crate) struct FilterBuilder<'f, 's> {
    factory: &'f AstFactory<'s>,
    /// Resolve `"$jwt.<path>"` string values against the principal
    resolve_claims: bool,
    spellings: HashMap<String, Spelling>,
}

impl<'s> AstFactory<'s> {
    /// User `where` over a concrete entity
    pub(crate) fn where_filter(
        &self,
        entity: &'s ConcreteEntity,
        where_arg: Option<&Map<String, Value>>,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        match where_arg {
            Some(object) => FilterBuilder::new(self, false).parse(
                FilterSubject::Node(entity),
                object,
                &child_path(path, "where"),
            ),
            None => Ok(None),
        }
    }

    /// Request filter over `subject`, reported under `path` as given
    pub(crate) fn subject_filter(
        &self,
        subject: FilterSubject<'s>,
        object: Option<&Map<String, Value>>,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        match object {
            Some(object) => FilterBuilder::new(self, false).parse(subject, object, path),
            None => Ok(None),
        }
    }

    /// Authorization rule predicate, with claim references resolved
    pub(crate) fn claims_filter(
        &self,
        subject: FilterSubject<'s>,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        FilterBuilder::new(self, true).parse(subject, object, path)
    }

    /// Constituents of `composite` selected by `where`: an interface narrows
    /// by `typename`, a union by member keys
    pub(crate) fn narrow_composite(
        &self,
        composite: &'s CompositeEntity,
        where_arg: Option<&Map<String, Value>>,
        path: &str,
    ) -> Result<Vec<NarrowedMember<'s>>, CompilationError> {
        let members = self.schema.constituents(composite)?;
        let Some(object) = where_arg.filter(|object| !object.is_empty()) else {
            return Ok(members.into_iter().map(|member| (member, None)).collect());
        };

        if composite.is_union() {
            for key in object.keys() {
                if !composite.has_constituent(key) {
                    return Err(CompilationError::unknown_field(&composite.name, key));
                }
            }
            let mut narrowed = Vec::new();
            for member in members {
                match object.get(&member.name) {
                    None => {}
                    Some(Value::Null) => narrowed.push((member, None)),
                    Some(value) => narrowed.push((
                        member,
                        Some(as_object(value, &child_path(path, &member.name))?.clone()),
                    )),
                }
            }
            return Ok(narrowed);
        }

        let allowed = match (object.get("typename"), object.get("typename_IN")) {
            (Some(_), Some(_)) => {
                return Err(CompilationError::filter_with_context(
                    child_path(path, "typename"),
                    "`typename` and `typename_IN` cannot be combined",
                ))
            }
            (Some(names), None) | (None, Some(names)) => {
                Some(typename_list(composite, names, &child_path(path, "typename"))?)
            }
            (None, None) => None,
        };
        let mut rest = object.clone();
        rest.remove("typename");
        rest.remove("typename_IN");
        let rest = (!rest.is_empty()).then_some(rest);

        Ok(members
            .into_iter()
            .filter(|member| {
                allowed
                    .as_ref()
                    .is_none_or(|names| names.iter().any(|name| *name == member.name))
            })
            .map(|member| (member, rest.clone()))
            .collect())
    }
}

fn typename_list<'v>(
    composite: &CompositeEntity,
    value: &'v Value,
    path: &str,
) -> Result<Vec<&'v str>, CompilationError> {
    let names: Vec<&str> = match value {
        Value::String(name) => vec![name.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    CompilationError::argument_with_context(path, "expected type names")
                })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(CompilationError::argument_with_context(
                path,
                "expected a list of type names",
            ))
        }
    };
    if let Some(unknown) = names.iter().find(|name| !composite.has_constituent(name)) {
        return Err(CompilationError::argument_with_context(
            path,
            format!("`{}` does not implement `{}`", unknown, composite.name),
        ));
    }
    Ok(names)
}

impl<'f, 's> FilterBuilder<'f, 's> {
    fn new(factory: &'f AstFactory<'s>, resolve_claims: bool) -> Self {
        FilterBuilder {
            factory,
            resolve_claims,
            spellings: HashMap::new(),
        }
    }

    /// Nested objects get their own spelling bookkeeping
    fn nested(&self) -> FilterBuilder<'f, 's> {
        FilterBuilder::new(self.factory, self.resolve_claims)
    }

    pub fn parse(
        mut self,
        subject: FilterSubject<'s>,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let mut parts = Vec::with_capacity(object.len());
        for (key, value) in object {
            let key_path = child_path(path, key);
            match key.as_str() {
                "AND" | "OR" => {
                    let items = value.as_array().ok_or_else(|| {
                        CompilationError::argument_with_context(&key_path, "expected a list")
                    })?;
                    let mut operands = Vec::with_capacity(items.len());
                    for (index, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", key_path, index);
                        let item = as_object(item, &item_path)?;
                        operands.extend(self.nested().parse(subject, item, &item_path)?);
                    }
                    if !operands.is_empty() {
                        parts.push(if key == "AND" {
                            Filter::And(operands)
                        } else {
                            Filter::Or(operands)
                        });
                    }
                }
                "NOT" => {
                    let inner = as_object(value, &key_path)?;
                    if let Some(inner) = self.nested().parse(subject, inner, &key_path)? {
                        parts.push(Filter::Not(Box::new(inner)));
                    }
                }
                _ => parts.extend(self.field(subject, key, value, &key_path)?),
            }
        }
        Ok(Filter::and(parts))
    }

    fn field(
        &mut self,
        subject: FilterSubject<'s>,
        key: &str,
        value: &Value,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        if let FilterSubject::Claims = subject {
            return match strip_any(key, &PROPERTY_SUFFIXES) {
                Some((base, operator)) => {
                    self.record(base, Spelling::Suffixed, path)?;
                    self.property(claim_target(self.factory, base), None, operator, value, false, path)
                        .map(Some)
                }
                None => self.attribute_value(claim_target(self.factory, key), None, key, value, path),
            };
        }

        if let Some((target, attribute)) = self.attribute_target(subject, key) {
            return self.attribute_value(target, Some(attribute), key, value, path);
        }
        if let FilterSubject::Node(entity) = subject {
            if let Some(relationship) = entity.relationship(key) {
                return self.relationship_value(relationship, key, value, path);
            }
            if let Some(filter) = self.relationship_variant(entity, key, value, path)? {
                return Ok(Some(filter));
            }
        }
        if let Some((base, operator)) = strip_any(key, &PROPERTY_SUFFIXES) {
            if let Some((target, attribute)) = self.attribute_target(subject, base) {
                self.record(base, Spelling::Suffixed, path)?;
                return self
                    .property(target, Some(attribute), operator, value, false, path)
                    .map(Some);
            }
        }
        Err(CompilationError::unknown_field(subject.name(), key))
    }

    /// `<rel>_SOME`, `<rel>Connection[_ALL]`, `<rel>Aggregate`
    fn relationship_variant(
        &mut self,
        entity: &'s ConcreteEntity,
        key: &str,
        value: &Value,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let (base, quantifier) = match strip_any(key, &QUANTIFIER_SUFFIXES) {
            Some((base, quantifier)) => (base, Some(quantifier)),
            None => (key, None),
        };
        if let (Some(quantifier), Some(relationship)) = (quantifier, entity.relationship(base)) {
            self.record(base, Spelling::Suffixed, path)?;
            return self
                .relationship(relationship, quantifier, Some(value), None, path)
                .map(Some);
        }
        if let Some(relationship) = base
            .strip_suffix("Connection")
            .and_then(|name| entity.relationship(name))
        {
            return match quantifier {
                Some(quantifier) => {
                    self.record(base, Spelling::Suffixed, path)?;
                    self.connection(relationship, quantifier, value, path).map(Some)
                }
                None => self.connection_value(relationship, base, value, path),
            };
        }
        if quantifier.is_none() {
            if let Some(relationship) = key
                .strip_suffix("Aggregate")
                .and_then(|name| entity.relationship(name))
            {
                let object = as_object(value, path)?;
                return self.aggregation(relationship, object, path);
            }
        }
        Ok(None)
    }

    fn record(&mut self, field: &str, spelling: Spelling, path: &str) -> Result<(), CompilationError> {
        match self.spellings.insert(field.to_string(), spelling) {
            Some(previous) if previous != spelling => Err(CompilationError::filter_with_context(
                path,
                format!(
                    "`{}` mixes suffixed keys with a nested operator object",
                    field
                ),
            )),
            _ => Ok(()),
        }
    }

    fn attribute_target(
        &self,
        subject: FilterSubject<'s>,
        name: &str,
    ) -> Option<(PropertyTarget<'s>, &'s Attribute)> {
        match subject {
            FilterSubject::Node(entity) => entity.attribute(name).map(|attribute| {
                let target = if attribute.is_computed() {
                    PropertyTarget::Computed(attribute)
                } else {
                    PropertyTarget::NodeAttribute(attribute)
                };
                (target, attribute)
            }),
            FilterSubject::Edge(properties) => properties
                .attribute(name)
                .map(|attribute| (PropertyTarget::EdgeAttribute(attribute), attribute)),
            FilterSubject::Claims => None,
        }
    }

    /// `title: "x"`, `title: null` or `title: { eq, gt, caseInsensitive }`
    fn attribute_value(
        &mut self,
        target: PropertyTarget<'s>,
        attribute: Option<&'s Attribute>,
        field: &str,
        value: &Value,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let operators = match value {
            Value::Object(object) if is_operator_object(object) => object,
            Value::Object(object) if !attribute.is_some_and(|a| a.kind.is_spatial()) => {
                let unknown = object.keys().next().map(String::as_str).unwrap_or_default();
                return Err(CompilationError::filter_with_context(
                    path,
                    format!("unknown filter operator `{}`", unknown),
                ));
            }
            _ => {
                self.record(field, Spelling::Suffixed, path)?;
                return self
                    .property(target, attribute, FilterOperator::Eq, value, false, path)
                    .map(Some);
            }
        };
        self.record(field, Spelling::Nested, path)?;
        let mut parts = Vec::with_capacity(operators.len());
        for (name, operand) in operators {
            let operand_path = child_path(path, name);
            if name == "caseInsensitive" {
                let inner = as_object(operand, &operand_path)?;
                for (name, operand) in inner {
                    let operator = generic_operator(name, &operand_path)?;
                    parts.push(self.property(
                        target.clone(),
                        attribute,
                        operator,
                        operand,
                        true,
                        &child_path(&operand_path, name),
                    )?);
                }
                continue;
            }
            let operator = generic_operator(name, &operand_path)?;
            parts.push(self.property(target.clone(), attribute, operator, operand, false, &operand_path)?);
        }
        Ok(Filter::and(parts))
    }

    fn property(
        &self,
        target: PropertyTarget<'s>,
        attribute: Option<&'s Attribute>,
        operator: FilterOperator,
        value: &Value,
        case_insensitive: bool,
        path: &str,
    ) -> Result<Filter<'s>, CompilationError> {
        if value.is_null() {
            if operator != FilterOperator::Eq || case_insensitive {
                return Err(CompilationError::filter_with_context(
                    path,
                    "null can only be compared for equality",
                ));
            }
            return Ok(Filter::Null(NullFilter {
                target,
                is_null: true,
            }));
        }
        if let Some(attribute) = attribute {
            check_operator(attribute, operator, value, case_insensitive, path)?;
        } else if operator == FilterOperator::In && !value.is_array() {
            return Err(CompilationError::filter_with_context(path, "`in` expects a list"));
        }
        let value = match value {
            Value::String(text) if self.resolve_claims && text.starts_with(CLAIM_PREFIX) => {
                let claim = &text[CLAIM_PREFIX.len()..];
                FilterValue::Claim {
                    path: claim.to_string(),
                    value: self.factory.principal.claim(claim).cloned(),
                }
            }
            other => FilterValue::Literal(other.clone()),
        };
        Ok(Filter::Property(PropertyFilter {
            target,
            operator,
            value,
            case_insensitive,
        }))
    }

    /// `actors: { name: "x" }`, `actors: null`, `actors: { some: {}, none: {} }`
    fn relationship_value(
        &mut self,
        relationship: &'s Relationship,
        field: &str,
        value: &Value,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let object = match value {
            Value::Null => {
                self.record(field, Spelling::Suffixed, path)?;
                return self
                    .relationship(relationship, Quantifier::None, None, None, path)
                    .map(Some);
            }
            other => as_object(other, path)?,
        };
        if !is_quantifier_object(object) {
            self.record(field, Spelling::Suffixed, path)?;
            return self
                .relationship(relationship, Quantifier::Some, Some(value), None, path)
                .map(Some);
        }
        self.record(field, Spelling::Nested, path)?;
        let mut parts = Vec::with_capacity(object.len());
        for (name, inner) in object {
            let quantifier = Quantifier::parse(name).ok_or_else(|| {
                CompilationError::filter_with_context(
                    path,
                    format!("`{}` cannot be combined with relationship quantifiers", name),
                )
            })?;
            parts.push(self.relationship(
                relationship,
                quantifier,
                Some(inner),
                None,
                &child_path(path, name),
            )?);
        }
        Ok(Filter::and(parts))
    }

    /// `actorsConnection: { node, edge }` or `{ some: { node, edge }, aggregate }`
    fn connection_value(
        &mut self,
        relationship: &'s Relationship,
        field: &str,
        value: &Value,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let object = match value {
            Value::Null => {
                self.record(field, Spelling::Suffixed, path)?;
                return self
                    .relationship(relationship, Quantifier::None, None, None, path)
                    .map(Some);
            }
            other => as_object(other, path)?,
        };
        let nested = object
            .keys()
            .any(|key| key == "aggregate" || Quantifier::parse(key).is_some());
        if !nested {
            self.record(field, Spelling::Suffixed, path)?;
            return self
                .connection(relationship, Quantifier::Some, value, path)
                .map(Some);
        }
        self.record(field, Spelling::Nested, path)?;
        let mut parts = Vec::with_capacity(object.len());
        for (name, inner) in object {
            let inner_path = child_path(path, name);
            if name == "aggregate" {
                let aggregate = as_object(inner, &inner_path)?;
                parts.extend(self.aggregation(relationship, aggregate, &inner_path)?);
                continue;
            }
            let quantifier = Quantifier::parse(name).ok_or_else(|| {
                CompilationError::filter_with_context(
                    path,
                    format!("`{}` cannot be combined with relationship quantifiers", name),
                )
            })?;
            parts.push(self.connection(relationship, quantifier, inner, &inner_path)?);
        }
        Ok(Filter::and(parts))
    }

    fn connection(
        &self,
        relationship: &'s Relationship,
        quantifier: Quantifier,
        value: &Value,
        path: &str,
    ) -> Result<Filter<'s>, CompilationError> {
        if value.is_null() {
            return self.relationship(relationship, quantifier, None, None, path);
        }
        let object = as_object(value, path)?;
        if let Some(unknown) = object.keys().find(|key| *key != "node" && *key != "edge") {
            return Err(CompilationError::filter_with_context(
                child_path(path, unknown),
                "connection filters take `node` and `edge` only",
            ));
        }
        self.relationship(
            relationship,
            quantifier,
            object.get("node"),
            object.get("edge"),
            path,
        )
    }

    fn relationship(
        &self,
        relationship: &'s Relationship,
        quantifier: Quantifier,
        node: Option<&Value>,
        edge: Option<&Value>,
        path: &str,
    ) -> Result<Filter<'s>, CompilationError> {
        let schema = self.factory.schema;
        let node = match node {
            None | Some(Value::Null) => None,
            Some(value) => Some(as_object(value, &child_path(path, "node"))?),
        };
        let (targets, composite) = match schema.relationship_target(relationship)? {
            Entity::Concrete(entity) => {
                let filter = match node {
                    Some(object) => self.nested().parse(FilterSubject::Node(entity), object, path)?,
                    None => None,
                };
                (vec![RelationshipFilterTarget { entity, filter }], false)
            }
            Entity::Composite(composite) => {
                let mut targets = Vec::new();
                for (entity, rest) in self.factory.narrow_composite(composite, node, path)? {
                    let filter = match rest {
                        Some(object) => {
                            self.nested()
                                .parse(FilterSubject::Node(entity), &object, path)?
                        }
                        None => None,
                    };
                    targets.push(RelationshipFilterTarget { entity, filter });
                }
                (targets, true)
            }
        };
        let edge_filter = match edge {
            None | Some(Value::Null) => None,
            Some(value) => {
                let edge_path = child_path(path, "edge");
                let properties = schema.relationship_properties(relationship).ok_or_else(|| {
                    CompilationError::unknown_field(&relationship.name, "edge")
                })?;
                let object = as_object(value, &edge_path)?;
                self.nested()
                    .parse(FilterSubject::Edge(properties), object, &edge_path)?
                    .map(Box::new)
            }
        };
        Ok(Filter::Relationship(RelationshipFilter {
            relationship,
            quantifier,
            targets,
            composite,
            edge_filter,
        }))
    }

    /// `actorsAggregate: { count_GT, count: { nodes, edges }, node: {}, edge: {} }`
    fn aggregation(
        &self,
        relationship: &'s Relationship,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let target = match self.factory.schema.relationship_target(relationship)? {
            Entity::Concrete(entity) => entity,
            Entity::Composite(composite) => {
                return Err(CompilationError::aggregation_with_context(
                    path,
                    format!("`{}` is an interface or union", composite.name),
                ))
            }
        };
        let measures = Measures {
            relationship,
            target,
        };
        let mut parts = Vec::with_capacity(object.len());
        for (key, value) in object {
            let key_path = child_path(path, key);
            match key.as_str() {
                "AND" | "OR" => {
                    let items = value.as_array().ok_or_else(|| {
                        CompilationError::argument_with_context(&key_path, "expected a list")
                    })?;
                    let mut operands = Vec::with_capacity(items.len());
                    for item in items {
                        operands.extend(self.aggregation(
                            relationship,
                            as_object(item, &key_path)?,
                            &key_path,
                        )?);
                    }
                    if !operands.is_empty() {
                        parts.push(if key == "AND" {
                            Filter::And(operands)
                        } else {
                            Filter::Or(operands)
                        });
                    }
                }
                "NOT" => {
                    let inner = as_object(value, &key_path)?;
                    if let Some(inner) = self.aggregation(relationship, inner, &key_path)? {
                        parts.push(Filter::Not(Box::new(inner)));
                    }
                }
                "count" => parts.extend(measures.count(value, &key_path)?),
                "node" => {
                    let object = as_object(value, &key_path)?;
                    parts.extend(measures.attributes(
                        object,
                        |name| target.attribute(name),
                        AggregationMeasure::Node,
                        &key_path,
                    )?);
                }
                "edge" => {
                    let properties = self
                        .factory
                        .schema
                        .relationship_properties(relationship)
                        .ok_or_else(|| CompilationError::unknown_field(&relationship.name, "edge"))?;
                    let object = as_object(value, &key_path)?;
                    parts.extend(measures.attributes(
                        object,
                        |name| properties.attribute(name),
                        AggregationMeasure::Edge,
                        &key_path,
                    )?);
                }
                other => match other
                    .strip_prefix("count")
                    .and_then(|suffix| strip_any(suffix, &COMPARISON_SUFFIXES))
                {
                    Some(("", operator)) => {
                        parts.push(measures.leaf(AggregationMeasure::CountNodes, operator, value, &key_path)?)
                    }
                    _ => {
                        return Err(CompilationError::filter_with_context(
                            key_path,
                            format!("`{}` is not an aggregation filter", other),
                        ))
                    }
                },
            }
        }
        Ok(Filter::and(parts))
    }
}

fn claim_target<'s>(factory: &AstFactory<'s>, path: &str) -> PropertyTarget<'s> {
    PropertyTarget::Claim {
        path: path.to_string(),
        value: factory.principal.claim(path).cloned(),
    }
}

fn generic_operator(name: &str, path: &str) -> Result<FilterOperator, CompilationError> {
    FilterOperator::from_generic(name).ok_or_else(|| {
        CompilationError::filter_with_context(path, format!("unknown filter operator `{}`", name))
    })
}

/// Reject operators the attribute's kind and cardinality do not support
fn check_operator(
    attribute: &Attribute,
    operator: FilterOperator,
    value: &Value,
    case_insensitive: bool,
    path: &str,
) -> Result<(), CompilationError> {
    let reason = match operator {
        _ if case_insensitive
            && !(attribute.kind.is_textual()
                && !attribute.is_list
                && (operator == FilterOperator::Eq || operator.is_textual())) =>
        {
            Some("case-insensitive matching needs a textual attribute")
        }
        op if op.is_textual() && (!attribute.kind.is_textual() || attribute.is_list) => {
            Some("string operators need a textual attribute")
        }
        op if op.is_ordering() && (!attribute.kind.is_ordered() || attribute.is_list) => {
            Some("ordering operators need an ordered attribute")
        }
        FilterOperator::In if attribute.is_list => Some("`in` is not defined for list attributes"),
        FilterOperator::In if !value.is_array() => Some("`in` expects a list"),
        FilterOperator::Includes if !attribute.is_list => {
            Some("`includes` needs a list attribute")
        }
        _ => None,
    };
    match reason {
        Some(reason) => Err(CompilationError::filter_with_context(
            path,
            format!("{} (`{}` is {})", reason, attribute.name, attribute.kind),
        )),
        None => Ok(()),
    }
}

/// Leaf builder for one aggregation filter object
struct Measures<'s> {
    relationship: &'s Relationship,
    target: &'s ConcreteEntity,
}

impl<'s> Measures<'s> {
    fn leaf(
        &self,
        measure: AggregationMeasure<'s>,
        operator: FilterOperator,
        value: &Value,
        path: &str,
    ) -> Result<Filter<'s>, CompilationError> {
        if !operator.is_comparison() {
            return Err(CompilationError::filter_with_context(
                path,
                "aggregations compare with eq, gt, gte, lt or lte",
            ));
        }
        if value.is_null() {
            return Err(CompilationError::filter_with_context(
                path,
                "aggregations cannot be compared with null",
            ));
        }
        Ok(Filter::Aggregation(AggregationFilter {
            relationship: self.relationship,
            target: self.target,
            measure,
            operator,
            value: value.clone(),
        }))
    }

    /// `{ eq: 1, gt: 0 }` against one measure
    fn operators(
        &self,
        measure: AggregationMeasure<'s>,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Vec<Filter<'s>>, CompilationError> {
        object
            .iter()
            .map(|(name, value)| {
                let operator = generic_operator(name, path)?;
                self.leaf(measure, operator, value, &child_path(path, name))
            })
            .collect()
    }

    /// `count: 2`, `count: { eq: 2 }` or `count: { nodes: {..}, edges: {..} }`
    fn count(&self, value: &Value, path: &str) -> Result<Vec<Filter<'s>>, CompilationError> {
        let Value::Object(object) = value else {
            return Ok(vec![self.leaf(
                AggregationMeasure::CountNodes,
                FilterOperator::Eq,
                value,
                path,
            )?]);
        };
        if is_operator_object(object) {
            return self.operators(AggregationMeasure::CountNodes, object, path);
        }
        let mut parts = Vec::new();
        for (name, inner) in object {
            let inner_path = child_path(path, name);
            let measure = match name.as_str() {
                "nodes" => AggregationMeasure::CountNodes,
                "edges" => AggregationMeasure::CountEdges,
                _ => {
                    return Err(CompilationError::filter_with_context(
                        inner_path,
                        "count filters take `nodes` and `edges`",
                    ))
                }
            };
            parts.extend(self.operators(measure, as_object(inner, &inner_path)?, &inner_path)?);
        }
        Ok(parts)
    }

    /// `name_LONGEST_LENGTH_GT: 3` or `name: { longestLength: { gt: 3 } }`
    fn attributes<L, M>(
        &self,
        object: &Map<String, Value>,
        lookup: L,
        make: M,
        path: &str,
    ) -> Result<Vec<Filter<'s>>, CompilationError>
    where
        L: Fn(&str) -> Option<&'s Attribute>,
        M: Fn(&'s Attribute, AggregationFunction) -> AggregationMeasure<'s>,
    {
        let mut parts = Vec::new();
        for (key, value) in object {
            let key_path = child_path(path, key);
            if let Some(attribute) = lookup(key) {
                let reductions = as_object(value, &key_path)?;
                for (name, operators) in reductions {
                    let reduction_path = child_path(&key_path, name);
                    let function = reduction_from_generic(name).ok_or_else(|| {
                        CompilationError::aggregation_with_context(
                            &reduction_path,
                            format!("unknown aggregation `{}`", name),
                        )
                    })?;
                    let measure = self.measure(attribute, function, &make, &reduction_path)?;
                    parts.extend(self.operators(
                        measure,
                        as_object(operators, &reduction_path)?,
                        &reduction_path,
                    )?);
                }
                continue;
            }
            let parsed = strip_any(key, &COMPARISON_SUFFIXES).and_then(|(rest, operator)| {
                strip_any(rest, &REDUCTION_SUFFIXES)
                    .and_then(|(base, function)| lookup(base).map(|a| (a, function, operator)))
            });
            let Some((attribute, function, operator)) = parsed else {
                return Err(CompilationError::filter_with_context(
                    key_path,
                    format!("`{}` is not an aggregation filter", key),
                ));
            };
            let measure = self.measure(attribute, function, &make, &key_path)?;
            parts.push(self.leaf(measure, operator, value, &key_path)?);
        }
        Ok(parts)
    }

    fn measure<M>(
        &self,
        attribute: &'s Attribute,
        function: AggregationFunction,
        make: &M,
        path: &str,
    ) -> Result<AggregationMeasure<'s>, CompilationError>
    where
        M: Fn(&'s Attribute, AggregationFunction) -> AggregationMeasure<'s>,
    {
        if attribute.is_computed() {
            return Err(CompilationError::aggregation_with_context(
                path,
                format!("computed field `{}` cannot be aggregated", attribute.name),
            ));
        }
        function.check(attribute, path)?;
        Ok(make(attribute, function))
    }
}
