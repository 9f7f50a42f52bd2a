//! Constitutional Validator
//!
//! Runs every registered rule against an action's context (before) or result (after).
//! Failed safety rules block; every other failed rule is reported as a warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::rules::{default_rules, education_rules, ConstitutionalRule, Context};
use crate::engine::audit::AuditRecord;
use crate::engine::observability::MetricsCollector;

/// Outcome of a batch evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    /// Ids of rules whose condition errored or panicked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<String>,
}

/// Outcome of a post-action check, with the record to persist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostValidation {
    pub compliant: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<String>,
    pub audit_record: AuditRecord,
}

/// The rule registry and evaluator. Populate at startup, then share read-only.
#[derive(Debug, Clone, Default)]
pub struct ConstitutionalValidator {
    rules: Vec<ConstitutionalRule>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ConstitutionalValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline rules plus the education pack
    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();
        for rule in default_rules().into_iter().chain(education_rules()) {
            validator.register(rule);
        }
        validator
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append a rule. Rules run in registration order.
    pub fn register(&mut self, rule: ConstitutionalRule) {
        tracing::debug!(rule = %rule.id, principle = %rule.principle, "Registered constitutional rule");
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ConstitutionalRule] {
        &self.rules
    }

    /// Check an action before it runs
    pub fn validate_pre(&self, action: &str, context: &Context, user_id: Option<&str>) -> ValidationResult {
        let context = with_request_fields(context, action, user_id);
        let result = self.evaluate(action, &context);

        if !result.valid {
            tracing::info!(
                action = %action,
                user_id = ?user_id,
                violations = ?result.violations,
                "Pre-validation blocked action"
            );
        }

        result
    }

    /// Re-check constraints against an action's result and produce its audit record
    pub fn validate_post(&self, action: &str, result: &Context, user_id: Option<&str>) -> PostValidation {
        let context = with_request_fields(result, action, user_id);
        let outcome = self.evaluate(action, &context);

        let audit_record = AuditRecord::new(action, user_id, &Value::Object(result.clone()))
            .with_compliance(outcome.valid);

        if !outcome.valid {
            tracing::warn!(
                action = %action,
                user_id = ?user_id,
                violations = ?outcome.violations,
                "Post-validation found non-compliant result"
            );
        }

        PostValidation {
            compliant: outcome.valid,
            violations: outcome.violations,
            warnings: outcome.warnings,
            faults: outcome.faults,
            audit_record,
        }
    }

    fn evaluate(&self, action: &str, context: &Context) -> ValidationResult {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut faults = Vec::new();

        for rule in &self.rules {
            match rule.evaluate(context) {
                Ok(true) => {}
                Ok(false) if rule.principle.is_blocking() => violations.push(rule.failure_message()),
                Ok(false) => warnings.push(rule.failure_message()),
                Err(e) => {
                    tracing::error!(
                        rule = %rule.id,
                        principle = %rule.principle,
                        action = %action,
                        error = %e,
                        "Constitutional rule faulted - excluded from result"
                    );
                    faults.push(rule.id.clone());
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_rules(violations.len(), warnings.len(), &faults);
        }

        ValidationResult {
            valid: violations.is_empty(),
            violations,
            warnings,
            faults,
        }
    }
}

/// Expose `action` and `userId` to rules unless the caller already set them
fn with_request_fields(context: &Context, action: &str, user_id: Option<&str>) -> Context {
    let mut context = context.clone();
    context
        .entry("action")
        .or_insert_with(|| Value::String(action.to_string()));
    if let Some(user_id) = user_id {
        context
            .entry("userId")
            .or_insert_with(|| Value::String(user_id.to_string()));
    }
    context
}
