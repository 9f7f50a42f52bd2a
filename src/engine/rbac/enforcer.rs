//! RBAC Enforcement Layer
//!
//! Request-level admission control: role membership and permission lookups

use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use super::policy::{PermissionTable, Role};
use crate::engine::observability::MetricsCollector;

/// Why a caller was turned away
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Authentication required")]
    AuthenticationMissing,

    #[error("Role {current} is not allowed here")]
    RoleDenied { required: Vec<Role>, current: Role },

    #[error("Role {role} lacks permission {required}")]
    PermissionDenied { required: String, role: Role },

    /// Looks like `PermissionDenied` to the caller; only logs and metrics tell them apart
    #[error("Role {role} lacks permission {required}")]
    UnknownPermission { required: String, role: Role },
}

impl AccessError {
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::AuthenticationMissing => 401,
            _ => 403,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AccessError::AuthenticationMissing => "AUTHENTICATION_REQUIRED",
            _ => "FORBIDDEN",
        }
    }

    /// Requirement echoed back to the caller
    pub fn detail(&self) -> Value {
        match self {
            AccessError::AuthenticationMissing => json!({}),
            AccessError::RoleDenied { required, current } => json!({
                "required": required,
                "current": current,
            }),
            AccessError::PermissionDenied { required, role }
            | AccessError::UnknownPermission { required, role } => json!({
                "required": required,
                "role": role,
            }),
        }
    }
}

/// An admission requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Roles(Vec<Role>),
    Permission(String),
}

/// Pass only callers whose role is one of `allowed`
pub fn require_role(allowed: &[Role]) -> Guard {
    Guard::Roles(allowed.to_vec())
}

/// Pass only callers whose role the table grants `permission`
pub fn require_permission(permission: &str) -> Guard {
    Guard::Permission(permission.to_string())
}

impl Guard {
    /// Evaluate the guard for one caller. Pure: no logging, no counters.
    pub fn check(&self, table: &PermissionTable, caller: Option<Role>) -> Result<(), AccessError> {
        let role = caller.ok_or(AccessError::AuthenticationMissing)?;

        match self {
            Guard::Roles(allowed) => {
                if allowed.contains(&role) {
                    Ok(())
                } else {
                    Err(AccessError::RoleDenied {
                        required: allowed.clone(),
                        current: role,
                    })
                }
            }
            Guard::Permission(permission) => match table.allowed_roles(permission) {
                Some(roles) if roles.contains(&role) => Ok(()),
                Some(_) => Err(AccessError::PermissionDenied {
                    required: permission.clone(),
                    role,
                }),
                None => Err(AccessError::UnknownPermission {
                    required: permission.clone(),
                    role,
                }),
            },
        }
    }
}

/// The enforcement engine: guard evaluation plus diagnostics
#[derive(Clone)]
pub struct Enforcer {
    table: Arc<PermissionTable>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Enforcer {
    pub fn new(table: Arc<PermissionTable>) -> Self {
        Self {
            table,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    pub fn has_permission(&self, role: Role, permission: &str) -> bool {
        self.table.has_permission(role, permission)
    }

    /// Check a guard for a caller, logging and counting the decision
    pub fn authorize(&self, guard: &Guard, caller: Option<Role>) -> Result<(), AccessError> {
        let outcome = guard.check(&self.table, caller);

        match &outcome {
            Ok(()) => {
                tracing::debug!(role = ?caller, guard = ?guard, "Access granted");
            }
            Err(AccessError::UnknownPermission { required, role }) => {
                tracing::warn!(
                    permission = %required,
                    role = %role,
                    "Permission key not in table - denying"
                );
            }
            Err(e) => {
                tracing::info!(role = ?caller, guard = ?guard, reason = %e, "Access denied");
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_gate(&outcome);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::policy::permissions;

    #[test]
    fn test_require_role_members_pass() {
        let table = PermissionTable::default();
        let guard = require_role(&[Role::Admin, Role::Instructor]);

        assert!(guard.check(&table, Some(Role::Admin)).is_ok());
        assert!(guard.check(&table, Some(Role::Instructor)).is_ok());
    }

    #[test]
    fn test_require_role_non_member_forbidden() {
        let table = PermissionTable::default();
        let guard = require_role(&[Role::Admin]);

        let err = guard.check(&table, Some(Role::Student)).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.detail()["current"], "student");
        assert_eq!(err.detail()["required"], json!(["admin"]));
    }

    #[test]
    fn test_missing_caller_is_unauthenticated() {
        let table = PermissionTable::default();
        let guards = [
            require_role(&[Role::Guest]),
            require_role(&[]),
            require_permission(permissions::COURSES_READ),
            require_permission("no:such"),
        ];

        for guard in &guards {
            let err = guard.check(&table, None).unwrap_err();
            assert_eq!(err, AccessError::AuthenticationMissing);
            assert_eq!(err.status_code(), 401);
        }
    }

    #[test]
    fn test_require_permission() {
        let table = PermissionTable::default();
        let guard = require_permission(permissions::COURSES_DELETE);

        assert!(guard.check(&table, Some(Role::Admin)).is_ok());

        let err = guard.check(&table, Some(Role::Instructor)).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.detail()["required"], "courses:delete");
        assert_eq!(err.detail()["role"], "instructor");
    }

    #[test]
    fn test_unknown_permission_fails_closed() {
        let table = PermissionTable::default();
        let guard = require_permission("courses:wirte");

        let err = guard.check(&table, Some(Role::Admin)).unwrap_err();
        assert!(matches!(err, AccessError::UnknownPermission { .. }));
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_enforcer_counts_decisions() {
        let metrics = Arc::new(MetricsCollector::new());
        let enforcer = Enforcer::new(Arc::new(PermissionTable::default()))
            .with_metrics(metrics.clone());

        let _ = enforcer.authorize(&require_permission(permissions::AUDIT_READ), Some(Role::Admin));
        let _ = enforcer.authorize(&require_permission(permissions::AUDIT_READ), Some(Role::Guest));
        let _ = enforcer.authorize(&require_permission("audit:raed"), Some(Role::Admin));
        let _ = enforcer.authorize(&require_role(&[Role::Admin]), None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.gate.allowed, 1);
        assert_eq!(snapshot.gate.forbidden, 2);
        assert_eq!(snapshot.gate.unknown_permission, 1);
        assert_eq!(snapshot.gate.unauthenticated, 1);
    }
}
