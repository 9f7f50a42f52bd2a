//! KYC/AML Risk Scoring
//!
//! Additive risk factors clamped to `[0, 100]` and thresholded into a verdict

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::engine::config::RiskConfig;

/// Scores below this are approved
pub const REVIEW_THRESHOLD: u8 = 50;
/// Scores at or above this are rejected
pub const REJECT_THRESHOLD: u8 = 75;

/// Minimum alphanumeric characters in a plausible ID number
const MIN_ID_LENGTH: usize = 6;

/// Identity submitted for verification
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycSubject {
    pub country: String,
    pub id_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Approved,
    Review,
    Rejected,
}

impl RiskStatus {
    pub fn from_score(score: u8) -> Self {
        if score < REVIEW_THRESHOLD {
            RiskStatus::Approved
        } else if score < REJECT_THRESHOLD {
            RiskStatus::Review
        } else {
            RiskStatus::Rejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Approved => "approved",
            RiskStatus::Review => "review",
            RiskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the random component added to every score
pub trait VarianceSource: Send + Sync {
    /// A value in `0..=max`
    fn sample(&self, max: u8) -> u8;
}

/// Uniform variance from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomVariance;

impl VarianceSource for RandomVariance {
    fn sample(&self, max: u8) -> u8 {
        rand::thread_rng().gen_range(0..=max)
    }
}

/// Constant variance, for reproducible scoring
#[derive(Debug, Clone, Copy)]
pub struct FixedVariance(pub u8);

impl VarianceSource for FixedVariance {
    fn sample(&self, max: u8) -> u8 {
        self.0.min(max)
    }
}

/// Score with each factor's contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub status: RiskStatus,
    pub country_penalty: u8,
    pub id_penalty: u8,
    pub variance: u8,
}

pub struct RiskScorer {
    config: RiskConfig,
    variance: Box<dyn VarianceSource>,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self::with_variance(config, Box::new(RandomVariance))
    }

    pub fn with_variance(config: RiskConfig, variance: Box<dyn VarianceSource>) -> Self {
        Self { config, variance }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn is_high_risk_country(&self, country: &str) -> bool {
        let country = country.trim();
        self.config
            .high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Score a subject, `0..=100`
    pub fn calculate_risk_score(&self, subject: &KycSubject) -> u8 {
        self.assess(subject).score
    }

    /// Score a subject and threshold the score
    pub fn assess(&self, subject: &KycSubject) -> RiskAssessment {
        let country_penalty = if self.is_high_risk_country(&subject.country) {
            self.config.high_risk_penalty
        } else {
            0
        };
        let id_penalty = if is_plausible_id(&subject.id_number) {
            0
        } else {
            self.config.invalid_id_penalty
        };
        let variance = self.variance.sample(self.config.max_variance);

        let raw = country_penalty as u32 + id_penalty as u32 + variance as u32;
        let score = raw.min(100) as u8;
        let status = RiskStatus::from_score(score);

        tracing::debug!(
            country = %subject.country,
            country_penalty,
            id_penalty,
            variance,
            score,
            status = %status,
            "Risk score calculated"
        );

        RiskAssessment {
            score,
            status,
            country_penalty,
            id_penalty,
            variance,
        }
    }
}

fn is_plausible_id(id_number: &str) -> bool {
    let id = id_number.trim();
    id.chars().filter(|c| c.is_ascii_alphanumeric()).count() >= MIN_ID_LENGTH
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(country: &str, id_number: &str) -> KycSubject {
        KycSubject {
            country: country.to_string(),
            id_number: id_number.to_string(),
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(RiskStatus::from_score(0), RiskStatus::Approved);
        assert_eq!(RiskStatus::from_score(49), RiskStatus::Approved);
        assert_eq!(RiskStatus::from_score(50), RiskStatus::Review);
        assert_eq!(RiskStatus::from_score(74), RiskStatus::Review);
        assert_eq!(RiskStatus::from_score(75), RiskStatus::Rejected);
        assert_eq!(RiskStatus::from_score(100), RiskStatus::Rejected);
    }

    #[test]
    fn test_high_risk_country_adds_penalty() {
        let scorer = RiskScorer::with_variance(RiskConfig::default(), Box::new(FixedVariance(0)));

        assert_eq!(scorer.calculate_risk_score(&subject("ZA", "8001015009087")), 0);
        assert_eq!(scorer.calculate_risk_score(&subject("kp", "8001015009087")), 30);
    }

    #[test]
    fn test_high_risk_country_contributes_at_least_penalty() {
        let scorer = RiskScorer::new(RiskConfig::default());
        for _ in 0..200 {
            let assessment = scorer.assess(&subject("IR", "A1234567"));
            assert!(assessment.score >= scorer.config().high_risk_penalty);
            assert!(assessment.variance <= scorer.config().max_variance);
        }
    }

    #[test]
    fn test_score_is_clamped() {
        let config = RiskConfig {
            high_risk_penalty: 90,
            invalid_id_penalty: 90,
            max_variance: 100,
            ..RiskConfig::default()
        };
        let scorer = RiskScorer::with_variance(config, Box::new(FixedVariance(100)));

        let assessment = scorer.assess(&subject("SY", ""));
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.status, RiskStatus::Rejected);
    }

    #[test]
    fn test_random_scores_are_bounded() {
        let scorer = RiskScorer::new(RiskConfig::default());
        for country in ["ZA", "YE", "NG"] {
            for id in ["", "12", "ZA-800101-5009"] {
                let score = scorer.calculate_risk_score(&subject(country, id));
                assert!(score <= 100);
            }
        }
    }

    #[test]
    fn test_invalid_id_penalty() {
        let scorer = RiskScorer::with_variance(RiskConfig::default(), Box::new(FixedVariance(0)));

        assert_eq!(scorer.assess(&subject("ZA", "12ab")).id_penalty, 25);
        assert_eq!(scorer.assess(&subject("ZA", "1234<script>")).id_penalty, 25);
        assert_eq!(scorer.assess(&subject("ZA", "AB 123 456")).id_penalty, 0);
    }

    #[test]
    fn test_fixed_variance_respects_max() {
        assert_eq!(FixedVariance(50).sample(20), 20);
        assert_eq!(FixedVariance(5).sample(20), 5);
    }
}
