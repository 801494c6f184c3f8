use serde::Serialize;

use super::clauses::Clause;

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Addition,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum MapProjectionItem {
    /// `.name` shorthand
    Property(String),
    /// `key: expr`
    Entry(String, RenderExpr),
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum RenderExpr {
    Variable(String),

    /// A bound parameter, rendered as `$name`
    Parameter(String),

    Literal(Literal),

    /// Property access on any expression (`this0.title`, `edge.node`)
    Property {
        base: Box<RenderExpr>,
        key: String,
    },

    Binary {
        left: Box<RenderExpr>,
        operator: BinaryOperator,
        right: Box<RenderExpr>,
    },

    And(Vec<RenderExpr>),
    Or(Vec<RenderExpr>),
    Not(Box<RenderExpr>),
    IsNull(Box<RenderExpr>),
    IsNotNull(Box<RenderExpr>),

    Function {
        name: String,
        args: Vec<RenderExpr>,
    },

    /// `DISTINCT expr`, only valid as an aggregation argument
    Distinct(Box<RenderExpr>),

    /// Label predicate: `this0:Movie`
    HasLabels {
        variable: String,
        labels: Vec<String>,
    },

    Map(Vec<(String, RenderExpr)>),

    /// `this0 { .title, actors: var3 }`
    MapProjection {
        variable: String,
        items: Vec<MapProjectionItem>,
    },

    List(Vec<RenderExpr>),

    /// `CASE WHEN condition THEN then ELSE otherwise END`
    Case {
        condition: Box<RenderExpr>,
        then: Box<RenderExpr>,
        otherwise: Box<RenderExpr>,
    },

    /// `[variable IN list | projection]`
    ListComprehension {
        variable: String,
        list: Box<RenderExpr>,
        projection: Box<RenderExpr>,
    },

    /// `EXISTS { ... }`
    Exists(Vec<Clause>),

    /// `COUNT { ... }`
    CountSubquery(Vec<Clause>),

    Star,
}

impl RenderExpr {
    pub fn variable(name: impl Into<String>) -> Self {
        RenderExpr::Variable(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        RenderExpr::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        RenderExpr::Literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        RenderExpr::Literal(Literal::Boolean(value))
    }

    pub fn null() -> Self {
        RenderExpr::Literal(Literal::Null)
    }

    /// `variable.key`
    pub fn property(variable: &str, key: impl Into<String>) -> Self {
        RenderExpr::Property {
            base: Box::new(RenderExpr::Variable(variable.to_string())),
            key: key.into(),
        }
    }

    pub fn dot(self, key: impl Into<String>) -> Self {
        RenderExpr::Property {
            base: Box::new(self),
            key: key.into(),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<RenderExpr>) -> Self {
        RenderExpr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn binary(left: RenderExpr, operator: BinaryOperator, right: RenderExpr) -> Self {
        RenderExpr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn equals(left: RenderExpr, right: RenderExpr) -> Self {
        Self::binary(left, BinaryOperator::Equal, right)
    }

    pub fn negate(self) -> Self {
        RenderExpr::Not(Box::new(self))
    }

    /// AND-combine, flattening nested conjunctions. `None` when there is nothing to combine.
    pub fn and_all(exprs: Vec<RenderExpr>) -> Option<RenderExpr> {
        let mut flat = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                RenderExpr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(RenderExpr::And(flat)),
        }
    }

    pub fn or_all(exprs: Vec<RenderExpr>) -> Option<RenderExpr> {
        let mut flat = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                RenderExpr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(RenderExpr::Or(flat)),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ProjectionItem {
    pub expression: RenderExpr,
    pub alias: Option<String>,
}

impl ProjectionItem {
    pub fn star() -> Self {
        ProjectionItem {
            expression: RenderExpr::Star,
            alias: None,
        }
    }

    pub fn variable(name: &str) -> Self {
        ProjectionItem {
            expression: RenderExpr::variable(name),
            alias: None,
        }
    }

    pub fn aliased(expression: RenderExpr, alias: impl Into<String>) -> Self {
        ProjectionItem {
            expression,
            alias: Some(alias.into()),
        }
    }

    /// Column name this item exposes to the following clause
    pub fn column_name(&self) -> Option<&str> {
        match (&self.alias, &self.expression) {
            (Some(alias), _) => Some(alias),
            (None, RenderExpr::Variable(name)) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct OrderByItem {
    pub expression: RenderExpr,
    pub descending: bool,
}
