//! Observability Module
//!
//! Metrics tracking and health report

pub mod metrics;
pub mod dashboard;

pub use metrics::{Metrics, GateMetrics, RuleMetrics, RiskMetrics, MetricsCollector, METRICS_VERSION};
pub use dashboard::{HealthReport, HealthReporter, HealthStatus, HealthCheck, HealthThresholds};
