//! Declared authorization policy.
//!
//! Rules live on entities (node-level) and on attributes (field-level). They are
//! plain data here; `query_planner::factory::auth_factory` turns the ones that
//! apply to an operation into filter and validation sub-trees.
//!
//! ```yaml
//! authorization:
//!   - kind: filter
//!     operations: [READ, AGGREGATE]
//!     where:
//!       node: { owner: "$jwt.sub" }
//!   - kind: validate
//!     operations: [UPDATE, DELETE]
//!     when: [BEFORE]
//!     where:
//!       jwt: { roles_INCLUDES: "admin" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationOperation {
    Read,
    Aggregate,
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
}

impl AuthorizationOperation {
    pub const ALL: [AuthorizationOperation; 7] = [
        AuthorizationOperation::Read,
        AuthorizationOperation::Aggregate,
        AuthorizationOperation::Create,
        AuthorizationOperation::Update,
        AuthorizationOperation::Delete,
        AuthorizationOperation::CreateRelationship,
        AuthorizationOperation::DeleteRelationship,
    ];
}

/// Which snapshot a validation predicate is evaluated against.
///
/// `Before` runs on the matched, pre-mutation state; `After` runs once the
/// mutation clauses have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationWhen {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationKind {
    /// Silently narrows the result set
    Filter,
    /// Aborts the program with a Forbidden failure
    Validate,
}

/// Predicate template of a rule.
///
/// `node` is a `where` object over the guarded entity; string values of the form
/// `"$jwt.<path>"` are replaced by the principal's claim at that path. `jwt` is a
/// `where` object whose keys are claim paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRule {
    pub kind: AuthorizationKind,
    #[serde(default = "all_operations")]
    pub operations: BTreeSet<AuthorizationOperation>,
    /// Only meaningful for validate rules
    #[serde(default = "both_snapshots")]
    pub when: BTreeSet<AuthorizationWhen>,
    #[serde(default = "default_true", rename = "requireAuthentication")]
    pub require_authentication: bool,
    #[serde(default, rename = "where")]
    pub predicate: AuthorizationPredicate,
}

impl AuthorizationRule {
    pub fn applies_to(&self, operation: AuthorizationOperation) -> bool {
        self.operations.contains(&operation)
    }

    /// Read rules ignore timing: there is no mutation to be before or after.
    pub fn applies_at(&self, operation: AuthorizationOperation, when: AuthorizationWhen) -> bool {
        self.kind == AuthorizationKind::Validate
            && self.applies_to(operation)
            && (matches!(
                operation,
                AuthorizationOperation::Read | AuthorizationOperation::Aggregate
            ) || self.when.contains(&when))
    }
}

fn all_operations() -> BTreeSet<AuthorizationOperation> {
    AuthorizationOperation::ALL.into_iter().collect()
}

fn both_snapshots() -> BTreeSet<AuthorizationWhen> {
    [AuthorizationWhen::Before, AuthorizationWhen::After]
        .into_iter()
        .collect()
}

fn default_true() -> bool {
    true
}
