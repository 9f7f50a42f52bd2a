//! RBAC Module
//!
//! Role-Based Access Control with a versioned permission table

pub mod policy;
pub mod enforcer;

pub use policy::{permissions, PermissionTable, PolicyError, Role, UnknownRole, POLICY_VERSION};
pub use enforcer::{require_permission, require_role, AccessError, Enforcer, Guard};
