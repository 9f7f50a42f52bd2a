//! Health Report Module
//!
//! Turns metric counters into health checks: faulting rules, unknown permission lookups,
//! and unusual denial rates

use serde::{Deserialize, Serialize};

use super::metrics::Metrics;

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// A single health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Complete health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub warnings: Vec<String>,
}

/// Configurable health thresholds
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Any rule fault at or above this count is critical
    pub rule_fault_critical: u64,
    /// Denial percentage above this triggers warning
    pub denial_rate_warning: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            rule_fault_critical: 10,
            denial_rate_warning: 50.0,
        }
    }
}

/// Health report generator
#[derive(Debug, Clone, Default)]
pub struct HealthReporter {
    thresholds: HealthThresholds,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn generate(&self, metrics: &Metrics) -> HealthReport {
        let checks = vec![
            self.check_rule_faults(metrics),
            self.check_unknown_permissions(metrics),
            self.check_denial_rate(metrics),
        ];

        let warnings = checks
            .iter()
            .filter(|c| c.status != HealthStatus::Healthy)
            .map(|c| c.message.clone())
            .collect();

        let overall_status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            overall_status,
            checks,
            warnings,
        }
    }

    /// A faulting rule silently stops protecting anyone
    fn check_rule_faults(&self, metrics: &Metrics) -> HealthCheck {
        let faults = metrics.rules.faults;
        let status = if faults == 0 {
            HealthStatus::Healthy
        } else if faults >= self.thresholds.rule_fault_critical {
            HealthStatus::Critical
        } else {
            HealthStatus::Warning
        };

        HealthCheck {
            name: "rule_faults".to_string(),
            status,
            message: if faults == 0 {
                "All constitutional rules evaluated cleanly".to_string()
            } else {
                format!(
                    "{} constitutional rule fault(s) across {} rule(s)",
                    faults,
                    metrics.rules.faults_by_rule.len()
                )
            },
            details: (faults > 0).then(|| serde_json::json!(metrics.rules.faults_by_rule)),
        }
    }

    fn check_unknown_permissions(&self, metrics: &Metrics) -> HealthCheck {
        let unknown = metrics.gate.unknown_permission;

        HealthCheck {
            name: "unknown_permissions".to_string(),
            status: if unknown == 0 {
                HealthStatus::Healthy
            } else {
                HealthStatus::Warning
            },
            message: if unknown == 0 {
                "No lookups of unknown permission keys".to_string()
            } else {
                format!("{} lookup(s) of permission keys missing from the table", unknown)
            },
            details: (unknown > 0)
                .then(|| serde_json::json!(metrics.gate.unknown_permission_keys)),
        }
    }

    fn check_denial_rate(&self, metrics: &Metrics) -> HealthCheck {
        let rate = metrics.gate.denial_rate();

        HealthCheck {
            name: "denial_rate".to_string(),
            status: if rate > self.thresholds.denial_rate_warning {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            },
            message: format!("{:.1}% of gate decisions denied", rate),
            details: None,
        }
    }
}
