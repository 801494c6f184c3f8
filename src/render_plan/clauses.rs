use serde::Serialize;

use super::render_expr::{OrderByItem, ProjectionItem, RenderExpr};

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
}

impl NodePattern {
    pub fn new(variable: impl Into<String>, labels: &[String]) -> Self {
        NodePattern {
            variable: Some(variable.into()),
            labels: labels.to_vec(),
        }
    }

    /// A bound variable, without labels
    pub fn bound(variable: impl Into<String>) -> Self {
        NodePattern {
            variable: Some(variable.into()),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum PatternDirection {
    /// `-[]->`
    Right,
    /// `<-[]-`
    Left,
    /// `-[]-`
    Undirected,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub rel_type: Option<String>,
    pub direction: PatternDirection,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Pattern {
    pub start: NodePattern,
    pub chain: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    pub fn node(node: NodePattern) -> Self {
        Pattern {
            start: node,
            chain: Vec::new(),
        }
    }

    pub fn related(mut self, relationship: RelationshipPattern, node: NodePattern) -> Self {
        self.chain.push((relationship, node));
        self
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct MatchClause {
    pub pattern: Pattern,
    pub optional: bool,
    pub predicate: Option<RenderExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct WithClause {
    pub items: Vec<ProjectionItem>,
    pub distinct: bool,
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<RenderExpr>,
    pub limit: Option<RenderExpr>,
    pub predicate: Option<RenderExpr>,
}

impl WithClause {
    pub fn new(items: Vec<ProjectionItem>) -> Self {
        WithClause {
            items,
            distinct: false,
            order_by: Vec::new(),
            skip: None,
            limit: None,
            predicate: None,
        }
    }

    /// `WITH *`
    pub fn star() -> Self {
        Self::new(vec![ProjectionItem::star()])
    }

    pub fn filtered(predicate: RenderExpr) -> Self {
        WithClause {
            predicate: Some(predicate),
            ..Self::star()
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct CallClause {
    /// Variables imported from the enclosing scope (`WITH a, b` as the first line)
    pub imports: Vec<String>,
    pub body: Vec<Clause>,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ReturnClause {
    pub items: Vec<ProjectionItem>,
    pub distinct: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Clause {
    Match(MatchClause),
    With(WithClause),
    Unwind {
        expression: RenderExpr,
        alias: String,
    },
    /// Correlated subquery
    Call(CallClause),
    /// Branches of a UNION; only valid as the whole body of a CALL
    Union(Vec<Vec<Clause>>),
    Create(Pattern),
    Merge(Pattern),
    Set(Vec<(RenderExpr, RenderExpr)>),
    Delete {
        detach: bool,
        variables: Vec<String>,
    },
    Return(ReturnClause),
    /// Statement text supplied by the schema (custom Cypher fields)
    Raw(String),
}

impl Clause {
    pub fn matching(pattern: Pattern, predicate: Option<RenderExpr>) -> Self {
        Clause::Match(MatchClause {
            pattern,
            optional: false,
            predicate,
        })
    }

    pub fn call(imports: Vec<String>, body: Vec<Clause>) -> Self {
        Clause::Call(CallClause { imports, body })
    }

    pub fn returning(items: Vec<ProjectionItem>) -> Self {
        Clause::Return(ReturnClause {
            items,
            distinct: false,
        })
    }

    /// `RETURN expr AS alias`
    pub fn return_as(expression: RenderExpr, alias: impl Into<String>) -> Self {
        Self::returning(vec![ProjectionItem::aliased(expression, alias)])
    }

    /// Columns exposed by a RETURN clause, in order
    pub fn returned_columns(&self) -> Option<Vec<Option<&str>>> {
        match self {
            Clause::Return(ret) => Some(ret.items.iter().map(|i| i.column_name()).collect()),
            _ => None,
        }
    }
}
