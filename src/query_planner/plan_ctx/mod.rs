//! Compilation state.
//!
//! [`Environment`] is the per-compilation mutable state: a single monotonic
//! counter shared by variable and parameter names, and the parameter map.
//! It uses interior mutability and is therefore `!Sync`; every compilation
//! creates its own.
//!
//! [`QueryContext`] is the per-scope record threaded through transpilation.
//! It is never mutated: entering a nested scope builds a new context whose
//! parent is the current one.
//!
//! # Scope Chain
//!
//! ```text
//! MATCH (this0:Movie)                           root: subject this0
//! CALL {
//!     WITH this0
//!     MATCH (this0)<-[this1:ACTED_IN]-(this2)   child: subject this2, relationship this1
//!     ...                                              parent -> root
//! }
//! ```

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::CompilerConfig;
use crate::graph_catalog::graph_schema::GraphSchema;
use crate::graph_catalog::schema_types::ScalarKind;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::Principal;
use crate::render_plan::render_expr::RenderExpr;

#[derive(Debug)]
pub struct Environment<'a> {
    pub schema: &'a GraphSchema,
    pub config: &'a CompilerConfig,
    pub principal: &'a Principal,
    counter: Cell<usize>,
    params: RefCell<IndexMap<String, Value>>,
}

impl<'a> Environment<'a> {
    pub fn new(schema: &'a GraphSchema, config: &'a CompilerConfig, principal: &'a Principal) -> Self {
        Environment {
            schema,
            config,
            principal,
            counter: Cell::new(0),
            params: RefCell::new(IndexMap::new()),
        }
    }

    /// Fresh binding name: `{hint}{n}`
    pub fn next_binding(&self, hint: &str) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        format!("{}{}", hint, n)
    }

    /// Record `value` under a fresh `param{n}` name and return a reference to it
    pub fn add_param(&self, value: Value) -> RenderExpr {
        let name = self.next_binding("param");
        self.params.borrow_mut().insert(name.clone(), value);
        RenderExpr::Parameter(name)
    }

    /// Parameter for an attribute value, converted back to the attribute's
    /// Cypher type where the driver sends it as a string or map
    pub fn add_typed_param(&self, value: Value, kind: Option<&ScalarKind>) -> RenderExpr {
        let param = self.add_param(value);
        match kind.and_then(|k| k.cypher_constructor()) {
            Some(constructor) => RenderExpr::function(constructor, vec![param]),
            None => param,
        }
    }

    /// List parameter whose elements are converted one by one:
    /// `[value IN $param | datetime(value)]`
    pub fn add_typed_list_param(&self, value: Value, kind: Option<&ScalarKind>) -> RenderExpr {
        let param = self.add_param(value);
        match kind.and_then(|k| k.cypher_constructor()) {
            Some(constructor) => RenderExpr::ListComprehension {
                variable: "value".to_string(),
                list: Box::new(param),
                projection: Box::new(RenderExpr::function(
                    constructor,
                    vec![RenderExpr::variable("value")],
                )),
            },
            None => param,
        }
    }

    pub fn forbidden_message(&self) -> &str {
        &self.config.forbidden_message
    }

    pub fn param_count(&self) -> usize {
        self.params.borrow().len()
    }

    pub fn into_params(self) -> IndexMap<String, Value> {
        self.params.into_inner()
    }
}

#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    env: &'a Environment<'a>,
    /// Node variable of the current scope
    pub subject: String,
    /// Relationship variable connecting `subject` to the parent scope
    pub relationship: Option<String>,
    pub parent: Option<Rc<QueryContext<'a>>>,
    /// Column the current scope must return its result as
    pub return_binding: String,
}

impl<'a> QueryContext<'a> {
    pub fn root(env: &'a Environment<'a>, subject: String, return_binding: impl Into<String>) -> Self {
        QueryContext {
            env,
            subject,
            relationship: None,
            parent: None,
            return_binding: return_binding.into(),
        }
    }

    pub fn env(&self) -> &'a Environment<'a> {
        self.env
    }

    /// Child scope reached from this one
    pub fn enter(
        &self,
        subject: String,
        relationship: Option<String>,
        return_binding: String,
    ) -> QueryContext<'a> {
        QueryContext {
            env: self.env,
            subject,
            relationship,
            parent: Some(Rc::new(self.clone())),
            return_binding,
        }
    }

    /// Scope with the same parent and return binding but different bindings
    pub fn sibling(&self, subject: String, relationship: Option<String>) -> QueryContext<'a> {
        QueryContext {
            env: self.env,
            subject,
            relationship,
            parent: self.parent.clone(),
            return_binding: self.return_binding.clone(),
        }
    }

    /// Sibling scope with freshly minted node (and relationship) bindings
    pub fn fresh_sibling(&self) -> QueryContext<'a> {
        let subject = self.env.next_binding("this");
        let relationship = self
            .relationship
            .as_ref()
            .map(|_| self.env.next_binding("this"));
        self.sibling(subject, relationship)
    }

    pub fn parent_subject(&self) -> Result<&str, CompilationError> {
        self.parent
            .as_deref()
            .map(|parent| parent.subject.as_str())
            .ok_or_else(|| CompilationError::missing_binding("parent"))
    }

    pub fn relationship_binding(&self) -> Result<&str, CompilationError> {
        self.relationship
            .as_deref()
            .ok_or_else(|| CompilationError::missing_binding("relationship"))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
