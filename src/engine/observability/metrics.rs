//! Observability Metrics Module
//!
//! Tracks gate decisions, constitutional rule outcomes and faults, and risk verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::engine::rbac::AccessError;
use crate::engine::risk::RiskStatus;

/// Current metrics format version
pub const METRICS_VERSION: u32 = 1;

/// Metrics data store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub version: u32,
    pub gate: GateMetrics,
    pub rules: RuleMetrics,
    pub risk: RiskMetrics,
}

/// Role gate decisions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateMetrics {
    pub allowed: u64,
    pub unauthenticated: u64,
    pub forbidden: u64,
    /// Denials caused by a permission key missing from the table
    pub unknown_permission: u64,
    pub unknown_permission_keys: BTreeMap<String, u64>,
    pub last_denial: Option<DateTime<Utc>>,
}

/// Constitutional rule evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMetrics {
    pub evaluations: u64,
    pub blocked: u64,
    pub violations: u64,
    pub warnings: u64,
    pub faults: u64,
    pub faults_by_rule: BTreeMap<String, u64>,
    pub last_fault: Option<DateTime<Utc>>,
}

/// Risk scoring verdicts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total: u64,
    pub approved: u64,
    pub review: u64,
    pub rejected: u64,
    pub average_score: Option<f64>,
}

impl Metrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self {
            version: METRICS_VERSION,
            gate: GateMetrics::default(),
            rules: RuleMetrics::default(),
            risk: RiskMetrics::default(),
        }
    }

    /// Load metrics from file
    pub fn load(project_dir: &Path) -> std::io::Result<Self> {
        let metrics_path = project_dir.join(".covenant").join("metrics.json");

        if !metrics_path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(&metrics_path)?;
        let metrics: Metrics = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if metrics.version > METRICS_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Metrics version too new",
            ));
        }

        Ok(metrics)
    }

    /// Save metrics to file
    pub fn save(&self, project_dir: &Path) -> std::io::Result<()> {
        let metrics_dir = project_dir.join(".covenant");
        fs::create_dir_all(&metrics_dir)?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(metrics_dir.join("metrics.json"), content)
    }
}

impl GateMetrics {
    /// Record one gate decision
    pub fn record(&mut self, outcome: &Result<(), AccessError>) {
        match outcome {
            Ok(()) => self.allowed += 1,
            Err(AccessError::AuthenticationMissing) => {
                self.unauthenticated += 1;
                self.last_denial = Some(Utc::now());
            }
            Err(AccessError::UnknownPermission { required, .. }) => {
                self.forbidden += 1;
                self.unknown_permission += 1;
                *self
                    .unknown_permission_keys
                    .entry(required.clone())
                    .or_insert(0) += 1;
                self.last_denial = Some(Utc::now());
            }
            Err(_) => {
                self.forbidden += 1;
                self.last_denial = Some(Utc::now());
            }
        }
    }

    /// Share of decisions that were denials, as a percentage
    pub fn denial_rate(&self) -> f64 {
        let denied = self.unauthenticated + self.forbidden;
        let total = self.allowed + denied;
        if total == 0 {
            return 0.0;
        }
        (denied as f64 / total as f64) * 100.0
    }
}

impl RuleMetrics {
    /// Record the outcome of one batch evaluation
    pub fn record_evaluation(&mut self, violations: usize, warnings: usize, faulted: &[String]) {
        self.evaluations += 1;
        if violations > 0 {
            self.blocked += 1;
        }
        self.violations += violations as u64;
        self.warnings += warnings as u64;

        if !faulted.is_empty() {
            self.faults += faulted.len() as u64;
            for rule_id in faulted {
                *self.faults_by_rule.entry(rule_id.clone()).or_insert(0) += 1;
            }
            self.last_fault = Some(Utc::now());
        }
    }
}

impl RiskMetrics {
    /// Record a risk verdict
    pub fn record(&mut self, score: u8, status: RiskStatus) {
        self.total += 1;
        match status {
            RiskStatus::Approved => self.approved += 1,
            RiskStatus::Review => self.review += 1,
            RiskStatus::Rejected => self.rejected += 1,
        }

        // Update rolling average
        let total = self.total as f64;
        self.average_score = Some(match self.average_score {
            Some(avg) => (avg * (total - 1.0) + score as f64) / total,
            None => score as f64,
        });
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics recorder for concurrent request handlers
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Metrics>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::new()),
        }
    }

    /// Resume counting from a persisted snapshot
    pub fn from_metrics(metrics: Metrics) -> Self {
        Self {
            inner: Mutex::new(metrics),
        }
    }

    // Counters stay usable even if a recording thread panicked
    fn lock(&self) -> MutexGuard<'_, Metrics> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_gate(&self, outcome: &Result<(), AccessError>) {
        self.lock().gate.record(outcome);
    }

    pub fn record_rules(&self, violations: usize, warnings: usize, faulted: &[String]) {
        self.lock()
            .rules
            .record_evaluation(violations, warnings, faulted);
    }

    pub fn record_risk(&self, score: u8, status: RiskStatus) {
        self.lock().risk.record(score, status);
    }

    /// Get a copy of the current metrics
    pub fn snapshot(&self) -> Metrics {
        self.lock().clone()
    }

    /// Persist the current metrics
    pub fn save(&self, project_dir: &Path) -> std::io::Result<()> {
        self.snapshot().save(project_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::Role;
    use tempfile::tempdir;

    #[test]
    fn test_default_carries_current_version() {
        assert_eq!(Metrics::default().version, METRICS_VERSION);
        assert_eq!(MetricsCollector::default().snapshot().version, METRICS_VERSION);
    }

    #[test]
    fn test_metrics_creation_save_load() {
        let dir = tempdir().unwrap();
        let metrics = Metrics::new();

        metrics.save(dir.path()).unwrap();

        let loaded = Metrics::load(dir.path()).unwrap();
        assert_eq!(loaded.version, METRICS_VERSION);
    }

    #[test]
    fn test_gate_metrics_recording() {
        let mut gate = GateMetrics::default();

        gate.record(&Ok(()));
        gate.record(&Err(AccessError::AuthenticationMissing));
        gate.record(&Err(AccessError::UnknownPermission {
            required: "courses:wirte".to_string(),
            role: Role::Admin,
        }));
        gate.record(&Err(AccessError::PermissionDenied {
            required: "courses:delete".to_string(),
            role: Role::Student,
        }));

        assert_eq!(gate.allowed, 1);
        assert_eq!(gate.unauthenticated, 1);
        assert_eq!(gate.forbidden, 2);
        assert_eq!(gate.unknown_permission, 1);
        assert_eq!(gate.unknown_permission_keys["courses:wirte"], 1);
        assert_eq!(gate.denial_rate(), 75.0);
    }

    #[test]
    fn test_rule_metrics_track_faults_per_rule() {
        let mut rules = RuleMetrics::default();

        rules.record_evaluation(1, 2, &["broken-rule".to_string()]);
        rules.record_evaluation(0, 0, &["broken-rule".to_string()]);

        assert_eq!(rules.evaluations, 2);
        assert_eq!(rules.blocked, 1);
        assert_eq!(rules.warnings, 2);
        assert_eq!(rules.faults, 2);
        assert_eq!(rules.faults_by_rule["broken-rule"], 2);
        assert!(rules.last_fault.is_some());
    }

    #[test]
    fn test_risk_metrics_average() {
        let mut risk = RiskMetrics::default();
        risk.record(40, RiskStatus::Approved);
        risk.record(80, RiskStatus::Rejected);

        assert_eq!(risk.total, 2);
        assert_eq!(risk.approved, 1);
        assert_eq!(risk.rejected, 1);
        assert_eq!(risk.average_score, Some(60.0));
    }

    #[test]
    fn test_collector_snapshot_and_persist() {
        let dir = tempdir().unwrap();
        let collector = MetricsCollector::new();

        collector.record_gate(&Ok(()));
        collector.record_risk(55, RiskStatus::Review);
        collector.save(dir.path()).unwrap();

        let loaded = Metrics::load(dir.path()).unwrap();
        assert_eq!(loaded.gate.allowed, 1);
        assert_eq!(loaded.risk.review, 1);
    }
}
