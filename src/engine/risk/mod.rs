//! Risk Module
//!
//! KYC/AML risk scoring and verification records

pub mod scoring;
pub mod store;

pub use scoring::{
    FixedVariance, KycSubject, RandomVariance, RiskAssessment, RiskScorer, RiskStatus,
    VarianceSource, REJECT_THRESHOLD, REVIEW_THRESHOLD,
};
pub use store::{MemoryStore, SqliteStore, StoreError, VerificationRecord, VerificationStore};

use std::sync::Arc;

use crate::engine::observability::MetricsCollector;

/// Scores a subject and persists the resulting verification
pub struct KycService {
    scorer: RiskScorer,
    store: Arc<dyn VerificationStore>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl KycService {
    pub fn new(scorer: RiskScorer, store: Arc<dyn VerificationStore>) -> Self {
        Self {
            scorer,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn verify(&self, subject: &KycSubject, user_id: Option<&str>) -> Result<VerificationRecord, StoreError> {
        let assessment = self.scorer.assess(subject);
        let record = VerificationRecord::new(subject, &assessment, user_id);
        self.store.put(&record)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_risk(assessment.score, assessment.status);
        }

        tracing::info!(
            verification_id = %record.id,
            country = %record.country,
            score = record.score,
            status = %record.status,
            "KYC verification recorded"
        );

        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<VerificationRecord>, StoreError> {
        self.store.get(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(id)
    }
}
