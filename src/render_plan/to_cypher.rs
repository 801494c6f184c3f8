//! Statement text rendering for the clause model.
//!
//! Everything a request can influence reaches the text either as a parameter
//! reference or through [`escape_name`]; literal strings only come from the
//! schema or the compiler itself.

use super::clauses::{
    CallClause, Clause, MatchClause, NodePattern, Pattern, PatternDirection, RelationshipPattern,
    ReturnClause, WithClause,
};
use super::render_expr::{
    BinaryOperator, Literal, MapProjectionItem, OrderByItem, ProjectionItem, RenderExpr,
};
use super::ToCypher;

const INDENT: &str = "    ";

/// Quote a label, relationship type or property key unless it is a plain identifier
pub fn escape_name(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn escape_string(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{}\"", escaped)
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_clauses(clauses: &[Clause]) -> String {
    clauses
        .iter()
        .map(|c| c.to_cypher())
        .collect::<Vec<_>>()
        .join("\n")
}

fn join<T: ToCypher>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_cypher())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToCypher for Literal {
    fn to_cypher(&self) -> String {
        match self {
            Literal::Null => "NULL".to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Integer(i) => i.to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::String(s) => escape_string(s),
        }
    }
}

impl ToCypher for BinaryOperator {
    fn to_cypher(&self) -> String {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Contains => "CONTAINS",
            BinaryOperator::StartsWith => "STARTS WITH",
            BinaryOperator::EndsWith => "ENDS WITH",
            BinaryOperator::In => "IN",
            BinaryOperator::Addition => "+",
        }
        .to_string()
    }
}

impl ToCypher for RenderExpr {
    fn to_cypher(&self) -> String {
        match self {
            RenderExpr::Variable(name) => name.clone(),
            RenderExpr::Parameter(name) => format!("${}", name),
            RenderExpr::Literal(literal) => literal.to_cypher(),
            RenderExpr::Property { base, key } => {
                let base_text = match base.as_ref() {
                    RenderExpr::Variable(_)
                    | RenderExpr::Parameter(_)
                    | RenderExpr::Property { .. }
                    | RenderExpr::Function { .. } => base.to_cypher(),
                    other => format!("({})", other.to_cypher()),
                };
                format!("{}.{}", base_text, escape_name(key))
            }
            RenderExpr::Binary {
                left,
                operator,
                right,
            } => format!(
                "{} {} {}",
                left.to_cypher(),
                operator.to_cypher(),
                right.to_cypher()
            ),
            RenderExpr::And(items) => render_junction(items, " AND "),
            RenderExpr::Or(items) => render_junction(items, " OR "),
            RenderExpr::Not(inner) => match inner.as_ref() {
                RenderExpr::And(items) | RenderExpr::Or(items) if items.len() > 1 => {
                    format!("NOT {}", inner.to_cypher())
                }
                _ => format!("NOT ({})", inner.to_cypher()),
            },
            RenderExpr::IsNull(inner) => format!("{} IS NULL", inner.to_cypher()),
            RenderExpr::IsNotNull(inner) => format!("{} IS NOT NULL", inner.to_cypher()),
            RenderExpr::Function { name, args } => format!("{}({})", name, join(args)),
            RenderExpr::Distinct(inner) => format!("DISTINCT {}", inner.to_cypher()),
            RenderExpr::HasLabels { variable, labels } => {
                let labels = labels
                    .iter()
                    .map(|l| escape_name(l))
                    .collect::<Vec<_>>()
                    .join(":");
                format!("{}:{}", variable, labels)
            }
            RenderExpr::Map(entries) => {
                if entries.is_empty() {
                    return "{}".to_string();
                }
                let body = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", escape_name(k), v.to_cypher()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{ {} }}", body)
            }
            RenderExpr::MapProjection { variable, items } => {
                if items.is_empty() {
                    return format!("{} {{}}", variable);
                }
                let body = items
                    .iter()
                    .map(|item| match item {
                        MapProjectionItem::Property(key) => format!(".{}", escape_name(key)),
                        MapProjectionItem::Entry(key, value) => {
                            format!("{}: {}", escape_name(key), value.to_cypher())
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {{ {} }}", variable, body)
            }
            RenderExpr::List(items) => format!("[{}]", join(items)),
            RenderExpr::Case {
                condition,
                then,
                otherwise,
            } => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                condition.to_cypher(),
                then.to_cypher(),
                otherwise.to_cypher()
            ),
            RenderExpr::ListComprehension {
                variable,
                list,
                projection,
            } => format!(
                "[{} IN {} | {}]",
                variable,
                list.to_cypher(),
                projection.to_cypher()
            ),
            RenderExpr::Exists(clauses) => {
                format!("EXISTS {{\n{}\n}}", indent(&render_clauses(clauses)))
            }
            RenderExpr::CountSubquery(clauses) => {
                format!("COUNT {{\n{}\n}}", indent(&render_clauses(clauses)))
            }
            RenderExpr::Star => "*".to_string(),
        }
    }
}

fn render_junction(items: &[RenderExpr], separator: &str) -> String {
    match items {
        [] => "true".to_string(),
        [single] => single.to_cypher(),
        _ => format!(
            "({})",
            items
                .iter()
                .map(|i| i.to_cypher())
                .collect::<Vec<_>>()
                .join(separator)
        ),
    }
}

impl ToCypher for ProjectionItem {
    fn to_cypher(&self) -> String {
        match &self.alias {
            Some(alias) if self.column_name_differs(alias) => {
                format!("{} AS {}", self.expression.to_cypher(), alias)
            }
            _ => self.expression.to_cypher(),
        }
    }
}

impl ProjectionItem {
    fn column_name_differs(&self, alias: &str) -> bool {
        !matches!(&self.expression, RenderExpr::Variable(name) if name == alias)
    }
}

impl ToCypher for OrderByItem {
    fn to_cypher(&self) -> String {
        format!(
            "{} {}",
            self.expression.to_cypher(),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

impl ToCypher for NodePattern {
    fn to_cypher(&self) -> String {
        let mut text = self.variable.clone().unwrap_or_default();
        for label in &self.labels {
            text.push(':');
            text.push_str(&escape_name(label));
        }
        format!("({})", text)
    }
}

impl ToCypher for RelationshipPattern {
    fn to_cypher(&self) -> String {
        let mut inner = self.variable.clone().unwrap_or_default();
        if let Some(rel_type) = &self.rel_type {
            inner.push(':');
            inner.push_str(&escape_name(rel_type));
        }
        match self.direction {
            PatternDirection::Right => format!("-[{}]->", inner),
            PatternDirection::Left => format!("<-[{}]-", inner),
            PatternDirection::Undirected => format!("-[{}]-", inner),
        }
    }
}

impl ToCypher for Pattern {
    fn to_cypher(&self) -> String {
        let mut text = self.start.to_cypher();
        for (relationship, node) in &self.chain {
            text.push_str(&relationship.to_cypher());
            text.push_str(&node.to_cypher());
        }
        text
    }
}

impl ToCypher for MatchClause {
    fn to_cypher(&self) -> String {
        let keyword = if self.optional { "OPTIONAL MATCH" } else { "MATCH" };
        let mut text = format!("{} {}", keyword, self.pattern.to_cypher());
        if let Some(predicate) = &self.predicate {
            text.push_str(&format!("\nWHERE {}", predicate.to_cypher()));
        }
        text
    }
}

impl ToCypher for WithClause {
    fn to_cypher(&self) -> String {
        let mut text = format!(
            "WITH {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            join(&self.items)
        );
        if !self.order_by.is_empty() {
            text.push_str(&format!("\nORDER BY {}", join(&self.order_by)));
        }
        if let Some(skip) = &self.skip {
            text.push_str(&format!("\nSKIP {}", skip.to_cypher()));
        }
        if let Some(limit) = &self.limit {
            text.push_str(&format!("\nLIMIT {}", limit.to_cypher()));
        }
        if let Some(predicate) = &self.predicate {
            text.push_str(&format!("\nWHERE {}", predicate.to_cypher()));
        }
        text
    }
}

impl ToCypher for CallClause {
    fn to_cypher(&self) -> String {
        let mut body = String::new();
        if !self.imports.is_empty() {
            body.push_str(&format!("WITH {}\n", self.imports.join(", ")));
        }
        body.push_str(&render_clauses(&self.body));
        format!("CALL {{\n{}\n}}", indent(&body))
    }
}

impl ToCypher for ReturnClause {
    fn to_cypher(&self) -> String {
        format!(
            "RETURN {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            join(&self.items)
        )
    }
}

impl ToCypher for Clause {
    fn to_cypher(&self) -> String {
        match self {
            Clause::Match(m) => m.to_cypher(),
            Clause::With(w) => w.to_cypher(),
            Clause::Unwind { expression, alias } => {
                format!("UNWIND {} AS {}", expression.to_cypher(), alias)
            }
            Clause::Call(c) => c.to_cypher(),
            Clause::Union(branches) => branches
                .iter()
                .map(|b| render_clauses(b))
                .collect::<Vec<_>>()
                .join("\nUNION\n"),
            Clause::Create(pattern) => format!("CREATE {}", pattern.to_cypher()),
            Clause::Merge(pattern) => format!("MERGE {}", pattern.to_cypher()),
            Clause::Set(assignments) => {
                let items = assignments
                    .iter()
                    .map(|(target, value)| format!("{} = {}", target.to_cypher(), value.to_cypher()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("SET {}", items)
            }
            Clause::Delete { detach, variables } => format!(
                "{}DELETE {}",
                if *detach { "DETACH " } else { "" },
                variables.join(", ")
            ),
            Clause::Return(r) => r.to_cypher(),
            Clause::Raw(statement) => statement.trim().to_string(),
        }
    }
}
