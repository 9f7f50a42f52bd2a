// Covenant Engine - Core module structure
pub mod config;
pub mod rbac;
pub mod constitution;
pub mod risk;
pub mod audit;
pub mod observability;
pub mod telemetry;
pub mod api;
pub mod cli;

pub use config::Config;
pub use constitution::ConstitutionalValidator;
pub use rbac::{Enforcer, PermissionTable, Role};
pub use risk::{KycService, RiskScorer};
