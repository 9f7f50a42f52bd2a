//! Audit Module
//!
//! Immutable audit records of action outcomes

pub mod audit;

pub use audit::{AuditLog, AuditRecord, AUDIT_VERSION};
