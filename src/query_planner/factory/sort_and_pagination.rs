//! `sort`, `limit`/`offset`, `options` and `first`/`after` arguments.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::graph_catalog::graph_schema::{Attribute, LimitPolicy};
use crate::query_planner::ast::{Pagination, Sort, SortTarget};
use crate::query_planner::errors::CompilationError;
use crate::utils::cursor::cursor_to_offset;

use super::{as_object, as_u64, child_path, list_arg, AstFactory};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Ordering<'s> {
    pub sort: Vec<Sort<'s>>,
    pub pagination: Pagination,
}

/// Attributes sort keys resolve against
#[derive(Debug, Clone, Copy)]
pub(crate) struct SortableAttributes<'s> {
    pub node: &'s IndexMap<String, Attribute>,
    pub edge: Option<&'s IndexMap<String, Attribute>>,
}

fn descending(value: &Value, path: &str) -> Result<bool, CompilationError> {
    match value.as_str() {
        Some("ASC") => Ok(false),
        Some("DESC") => Ok(true),
        _ => Err(CompilationError::argument_with_context(
            path,
            "sort direction must be ASC or DESC",
        )),
    }
}

fn node_sort<'s>(
    attributes: &'s IndexMap<String, Attribute>,
    object: &Map<String, Value>,
    path: &str,
    out: &mut Vec<Sort<'s>>,
) -> Result<(), CompilationError> {
    for (name, direction) in object {
        let key_path = child_path(path, name);
        let attribute = attributes.get(name).ok_or_else(|| {
            CompilationError::argument_with_context(&key_path, format!("cannot sort by `{}`", name))
        })?;
        let target = if attribute.is_computed() {
            SortTarget::Computed(attribute)
        } else {
            SortTarget::NodeAttribute(attribute)
        };
        out.push(Sort {
            target,
            descending: descending(direction, &key_path)?,
        });
    }
    Ok(())
}

/// Argument given directly or inside legacy `options`, with its path
fn pick_argument<'a>(
    args: &'a Map<String, Value>,
    options: Option<&'a Map<String, Value>>,
    name: &str,
    path: &str,
) -> Result<Option<(&'a Value, String)>, CompilationError> {
    let direct = args.get(name).filter(|value| !value.is_null());
    let nested = options
        .and_then(|options| options.get(name))
        .filter(|value| !value.is_null());
    match (direct, nested) {
        (Some(_), Some(_)) => Err(CompilationError::filter_with_context(
            child_path(path, name),
            format!("`{}` given both directly and in `options`", name),
        )),
        (Some(value), None) => Ok(Some((value, child_path(path, name)))),
        (None, Some(value)) => Ok(Some((value, child_path(&child_path(path, "options"), name)))),
        (None, None) => Ok(None),
    }
}

impl<'s> AstFactory<'s> {
    /// Sort and page bounds of a list read. The effective limit only applies
    /// to list results.
    pub(crate) fn list_ordering(
        &self,
        attributes: &'s IndexMap<String, Attribute>,
        args: &Map<String, Value>,
        policy: Option<LimitPolicy>,
        is_list: bool,
        path: &str,
    ) -> Result<Ordering<'s>, CompilationError> {
        let options = super::object_arg(args, "options", path)?;
        let pick = |name: &str| pick_argument(args, options, name, path);
        let mut sort = Vec::new();
        if let Some((value, sort_path)) = pick("sort")? {
            let items: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for (index, item) in items.into_iter().enumerate() {
                let item_path = format!("{}[{}]", sort_path, index);
                node_sort(attributes, as_object(item, &item_path)?, &item_path, &mut sort)?;
            }
        }
        let skip = pick("offset")?
            .map(|(value, offset_path)| as_u64(value, &offset_path))
            .transpose()?
            .filter(|skip| *skip > 0);
        let requested = pick("limit")?
            .map(|(value, limit_path)| as_u64(value, &limit_path))
            .transpose()?;

        let limit = if is_list {
            self.config.effective_limit(
                requested,
                policy.and_then(|p| p.default),
                policy.and_then(|p| p.max),
            )
        } else {
            requested
        };
        Ok(Ordering {
            sort,
            pagination: Pagination { skip, limit },
        })
    }

    /// Sort and page bounds of a connection: `sort` entries are
    /// `{ node: {..} }`, `{ edge: {..} }` or plain node keys; `first`/`after`
    /// page the edges
    pub(crate) fn connection_ordering(
        &self,
        attributes: SortableAttributes<'s>,
        args: &Map<String, Value>,
        policy: Option<LimitPolicy>,
        path: &str,
    ) -> Result<Ordering<'s>, CompilationError> {
        let mut sort = Vec::new();
        for (index, item) in list_arg(args, "sort", path)?.into_iter().enumerate() {
            let item_path = format!("{}.sort[{}]", path, index);
            let object = as_object(item, &item_path)?;
            let wrapped = object.keys().all(|key| key == "node" || key == "edge");
            if !wrapped {
                node_sort(attributes.node, object, &item_path, &mut sort)?;
                continue;
            }
            for (scope, inner) in object {
                let scope_path = child_path(&item_path, scope);
                let inner = as_object(inner, &scope_path)?;
                if scope == "node" {
                    node_sort(attributes.node, inner, &scope_path, &mut sort)?;
                    continue;
                }
                let edge = attributes.edge.ok_or_else(|| {
                    CompilationError::argument_with_context(
                        &scope_path,
                        "relationship has no properties to sort by",
                    )
                })?;
                for (name, direction) in inner {
                    let key_path = child_path(&scope_path, name);
                    let attribute = edge.get(name).ok_or_else(|| {
                        CompilationError::argument_with_context(
                            &key_path,
                            format!("cannot sort by `{}`", name),
                        )
                    })?;
                    sort.push(Sort {
                        target: SortTarget::EdgeAttribute(attribute),
                        descending: descending(direction, &key_path)?,
                    });
                }
            }
        }

        let requested = match args.get("first") {
            None | Some(Value::Null) => None,
            Some(value) => Some(as_u64(value, &child_path(path, "first"))?),
        };
        let skip = match args.get("after") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let after_path = child_path(path, "after");
                let skip = value
                    .as_str()
                    .and_then(cursor_to_offset)
                    .and_then(|offset| offset.checked_add(1))
                    .ok_or_else(|| CompilationError::argument_with_context(&after_path, "invalid cursor"))?;
                Some(skip)
            }
        };
        let limit = self.config.effective_limit(
            requested,
            policy.and_then(|p| p.default),
            policy.and_then(|p| p.max),
        );
        Ok(Ordering {
            sort,
            pagination: Pagination { skip, limit },
        })
    }
}
