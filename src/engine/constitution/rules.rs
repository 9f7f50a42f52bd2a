//! Constitutional Rules
//!
//! Named predicates tagged with a principle, evaluated against a JSON context

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Context a rule is evaluated against
pub type Context = Map<String, Value>;

type Condition = dyn Fn(&Context) -> anyhow::Result<bool> + Send + Sync;

/// Principle a rule protects. Only `Safety` failures block an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principle {
    Transparency,
    Accountability,
    Fairness,
    Safety,
    Respect,
    Growth,
}

impl Principle {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Principle::Safety)
    }
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Principle::Transparency => "transparency",
            Principle::Accountability => "accountability",
            Principle::Fairness => "fairness",
            Principle::Safety => "safety",
            Principle::Respect => "respect",
            Principle::Growth => "growth",
        };
        f.write_str(name)
    }
}

/// A named predicate over the evaluation context
#[derive(Clone)]
pub struct ConstitutionalRule {
    pub id: String,
    pub name: String,
    pub principle: Principle,
    pub error_message: String,
    condition: Arc<Condition>,
}

impl fmt::Debug for ConstitutionalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstitutionalRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("principle", &self.principle)
            .finish_non_exhaustive()
    }
}

impl ConstitutionalRule {
    pub fn new<F>(id: &str, name: &str, principle: Principle, error_message: &str, condition: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            principle,
            error_message: error_message.to_string(),
            condition: Arc::new(condition),
        }
    }

    /// Run the condition. Errors and panics both come back as `Err`.
    pub fn evaluate(&self, context: &Context) -> anyhow::Result<bool> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.condition)(context))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(anyhow!("rule panicked: {}", message))
            }
        }
    }

    /// Message reported when the rule fails
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.id, self.error_message)
    }
}

// Context accessors. Absent keys are `None`; present keys of the wrong type are errors.

fn get_bool(context: &Context, key: &str) -> anyhow::Result<Option<bool>> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("`{}` must be a boolean, got {}", key, other),
    }
}

fn get_f64(context: &Context, key: &str) -> anyhow::Result<Option<f64>> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| anyhow!("`{}` is not representable as f64", key)),
        Some(other) => bail!("`{}` must be a number, got {}", key, other),
    }
}

fn get_str<'a>(context: &'a Context, key: &str) -> anyhow::Result<Option<&'a str>> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => bail!("`{}` must be a string, got {}", key, other),
    }
}

fn get_str_list<'a>(context: &'a Context, key: &str) -> anyhow::Result<Vec<&'a str>> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(vec![]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| anyhow!("`{}` must contain only strings", key))
            })
            .collect(),
        Some(other) => bail!("`{}` must be an array, got {}", key, other),
    }
}

fn get_object<'a>(context: &'a Context, key: &str) -> anyhow::Result<Option<&'a Context>> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => bail!("`{}` must be an object, got {}", key, other),
    }
}

fn action_is(context: &Context, action: &str) -> anyhow::Result<bool> {
    Ok(get_str(context, "action")? == Some(action))
}

const FLAGGED_CONTENT: &[&str] = &["violence", "self_harm", "sexual_minors", "weapons", "hate"];

const PROTECTED_ATTRIBUTES: &[&str] = &[
    "race",
    "ethnicity",
    "gender",
    "religion",
    "disability",
    "age",
    "nationality",
];

const ATTEMPT_COOLDOWN_HOURS: f64 = 24.0;

const MIN_CREDENTIAL_SCORE: f64 = 70.0;

const DEMEANING_TERMS: &[&str] = &["idiot", "stupid", "worthless", "pathetic"];

/// Baseline rules, one or more per principle
pub fn default_rules() -> Vec<ConstitutionalRule> {
    vec![
        ConstitutionalRule::new(
            "no-flagged-content",
            "No flagged content",
            Principle::Safety,
            "content carries a blocked safety flag",
            |ctx| {
                let flags = get_str_list(ctx, "contentFlags")?;
                Ok(!flags.iter().any(|f| FLAGGED_CONTENT.contains(f)))
            },
        ),
        ConstitutionalRule::new(
            "personal-data-consent",
            "Consent for personal data",
            Principle::Safety,
            "personal data processed without recorded consent",
            |ctx| {
                if get_bool(ctx, "personalData")? == Some(true) {
                    return Ok(get_bool(ctx, "consent")? == Some(true));
                }
                Ok(true)
            },
        ),
        ConstitutionalRule::new(
            "actor-identified",
            "Action is attributable",
            Principle::Accountability,
            "action has no identified user",
            |ctx| Ok(get_str(ctx, "userId")?.map(|u| !u.trim().is_empty()).unwrap_or(false)),
        ),
        ConstitutionalRule::new(
            "decision-explained",
            "Automated decisions are explained",
            Principle::Transparency,
            "automated decision lacks an explanation",
            |ctx| {
                if get_bool(ctx, "automatedDecision")? == Some(true) {
                    return Ok(get_str(ctx, "explanation")?
                        .map(|e| !e.trim().is_empty())
                        .unwrap_or(false));
                }
                Ok(true)
            },
        ),
        ConstitutionalRule::new(
            "no-protected-attributes",
            "No protected attributes in decisions",
            Principle::Fairness,
            "decision factors include a protected attribute",
            |ctx| {
                let factors = get_str_list(ctx, "decisionFactors")?;
                Ok(!factors
                    .iter()
                    .any(|f| PROTECTED_ATTRIBUTES.contains(&f.to_ascii_lowercase().as_str())))
            },
        ),
        ConstitutionalRule::new(
            "respectful-language",
            "Respectful language",
            Principle::Respect,
            "content contains demeaning language",
            |ctx| {
                let content = get_str(ctx, "content")?.unwrap_or_default().to_ascii_lowercase();
                Ok(!content
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| DEMEANING_TERMS.contains(&word)))
            },
        ),
        ConstitutionalRule::new(
            "feedback-on-assessment",
            "Scored work gets feedback",
            Principle::Growth,
            "assessment score issued without feedback",
            |ctx| {
                if get_f64(ctx, "assessmentScore")?.is_some() {
                    return Ok(get_str(ctx, "feedback")?
                        .map(|f| !f.trim().is_empty())
                        .unwrap_or(false));
                }
                Ok(true)
            },
        ),
    ]
}

/// Education platform checks: enrollment, assessment, credential and tutoring actions
pub fn education_rules() -> Vec<ConstitutionalRule> {
    vec![
        ConstitutionalRule::new(
            "k12-consent",
            "Consent for K-12 enrollment",
            Principle::Safety,
            "k12 enrollment requires learner and parent consent",
            |ctx| {
                if !action_is(ctx, "enrollment:create")? || get_str(ctx, "pathway")? != Some("k12") {
                    return Ok(true);
                }
                Ok(get_bool(ctx, "consentGiven")? == Some(true)
                    && get_bool(ctx, "parentConsentGiven")? == Some(true))
            },
        ),
        ConstitutionalRule::new(
            "assessment-attempt-limit",
            "Assessment attempt limit",
            Principle::Fairness,
            "maximum of 3 attempts reached",
            |ctx| {
                if !action_is(ctx, "assessment:start")? {
                    return Ok(true);
                }
                Ok(get_f64(ctx, "previousAttempts")?.unwrap_or(0.0) < 3.0)
            },
        ),
        ConstitutionalRule::new(
            "assessment-cooldown",
            "Cooldown between attempts",
            Principle::Fairness,
            "24 hours must pass between assessment attempts",
            |ctx| {
                if !action_is(ctx, "assessment:start")? {
                    return Ok(true);
                }
                Ok(get_f64(ctx, "hoursSinceLastAttempt")?
                    .map(|hours| hours >= ATTEMPT_COOLDOWN_HOURS)
                    .unwrap_or(true))
            },
        ),
        ConstitutionalRule::new(
            "assessment-integrity",
            "Assessment integrity signals",
            Principle::Fairness,
            "integrity signals suggest outside assistance",
            |ctx| {
                if !action_is(ctx, "assessment:submit")? {
                    return Ok(true);
                }
                let tab_switches = get_f64(ctx, "browserTabSwitches")?.unwrap_or(0.0);
                let response_time = get_f64(ctx, "averageResponseTime")?;
                Ok(tab_switches <= 3.0 && response_time.map(|t| t >= 5.0).unwrap_or(true))
            },
        ),
        ConstitutionalRule::new(
            "credential-evidence",
            "Credentials backed by evidence",
            Principle::Accountability,
            "credential issued without evidence",
            |ctx| {
                if !action_is(ctx, "credential:issue")? {
                    return Ok(true);
                }
                Ok(get_object(ctx, "evidence")?.map(|e| !e.is_empty()).unwrap_or(false))
            },
        ),
        ConstitutionalRule::new(
            "credential-minimum-score",
            "Credential score threshold",
            Principle::Accountability,
            "credential requires an assessment score of at least 70",
            |ctx| {
                if !action_is(ctx, "credential:issue")? {
                    return Ok(true);
                }
                let Some(evidence) = get_object(ctx, "evidence")? else {
                    return Ok(true);
                };
                Ok(get_f64(evidence, "assessmentScore")?
                    .map(|score| score >= MIN_CREDENTIAL_SCORE)
                    .unwrap_or(true))
            },
        ),
        ConstitutionalRule::new(
            "tutoring-grounded",
            "Tutor responses cite course material",
            Principle::Transparency,
            "tutor response is not grounded in any source",
            |ctx| {
                if !action_is(ctx, "tutoring:message")? {
                    return Ok(true);
                }
                match ctx.get("sourceReferences") {
                    None | Some(Value::Null) => Ok(false),
                    Some(Value::Array(refs)) => Ok(!refs.is_empty()),
                    Some(other) => bail!("`sourceReferences` must be an array, got {}", other),
                }
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    fn rule(id: &str) -> ConstitutionalRule {
        default_rules()
            .into_iter()
            .chain(education_rules())
            .find(|r| r.id == id)
            .unwrap()
    }

    #[test]
    fn test_every_principle_has_a_default_rule() {
        let rules = default_rules();
        for principle in [
            Principle::Transparency,
            Principle::Accountability,
            Principle::Fairness,
            Principle::Safety,
            Principle::Respect,
            Principle::Growth,
        ] {
            assert!(rules.iter().any(|r| r.principle == principle), "{}", principle);
        }
    }

    #[test]
    fn test_flagged_content() {
        let r = rule("no-flagged-content");
        assert!(r.evaluate(&ctx(json!({}))).unwrap());
        assert!(r.evaluate(&ctx(json!({"contentFlags": ["spoilers"]}))).unwrap());
        assert!(!r.evaluate(&ctx(json!({"contentFlags": ["weapons"]}))).unwrap());
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let r = rule("no-flagged-content");
        assert!(r.evaluate(&ctx(json!({"contentFlags": "weapons"}))).is_err());
    }

    #[test]
    fn test_panic_is_captured() {
        let r = ConstitutionalRule::new("boom", "Boom", Principle::Safety, "never", |_| {
            panic!("condition exploded")
        });
        let err = r.evaluate(&Context::new()).unwrap_err();
        assert!(err.to_string().contains("condition exploded"));
    }

    #[test]
    fn test_respectful_language_matches_whole_words() {
        let r = rule("respectful-language");
        assert!(r.evaluate(&ctx(json!({"content": "a stupendous answer"}))).unwrap());
        assert!(!r.evaluate(&ctx(json!({"content": "what a Stupid question"}))).unwrap());
    }

    #[test]
    fn test_assessment_integrity_thresholds() {
        let r = rule("assessment-integrity");
        let base = json!({"action": "assessment:submit", "browserTabSwitches": 3, "averageResponseTime": 5});
        assert!(r.evaluate(&ctx(base)).unwrap());
        assert!(!r
            .evaluate(&ctx(json!({"action": "assessment:submit", "browserTabSwitches": 4})))
            .unwrap());
        assert!(!r
            .evaluate(&ctx(json!({"action": "assessment:submit", "averageResponseTime": 4.9})))
            .unwrap());
        assert!(r
            .evaluate(&ctx(json!({"action": "courses:read", "browserTabSwitches": 40})))
            .unwrap());
    }

    #[test]
    fn test_k12_consent() {
        let r = rule("k12-consent");
        assert!(!r
            .evaluate(&ctx(json!({"action": "enrollment:create", "pathway": "k12", "consentGiven": true})))
            .unwrap());
        assert!(r
            .evaluate(&ctx(json!({
                "action": "enrollment:create",
                "pathway": "k12",
                "consentGiven": true,
                "parentConsentGiven": true
            })))
            .unwrap());
        assert!(r
            .evaluate(&ctx(json!({"action": "enrollment:create", "pathway": "university"})))
            .unwrap());
    }

    #[test]
    fn test_credential_evidence_and_score_are_separate() {
        let evidence = rule("credential-evidence");
        let score = rule("credential-minimum-score");

        let missing = ctx(json!({"action": "credential:issue"}));
        assert!(!evidence.evaluate(&missing).unwrap());
        assert!(score.evaluate(&missing).unwrap());

        let no_score = ctx(json!({"action": "credential:issue", "evidence": {"portfolio": "p-1"}}));
        assert!(evidence.evaluate(&no_score).unwrap());
        assert!(score.evaluate(&no_score).unwrap());

        let low = ctx(json!({"action": "credential:issue", "evidence": {"assessmentScore": 69}}));
        assert!(evidence.evaluate(&low).unwrap());
        assert!(!score.evaluate(&low).unwrap());

        let passing = ctx(json!({"action": "credential:issue", "evidence": {"assessmentScore": 70}}));
        assert!(score.evaluate(&passing).unwrap());
    }

    #[test]
    fn test_assessment_cooldown() {
        let r = rule("assessment-cooldown");
        assert!(r.evaluate(&ctx(json!({"action": "assessment:start"}))).unwrap());
        assert!(!r
            .evaluate(&ctx(json!({"action": "assessment:start", "hoursSinceLastAttempt": 23.5})))
            .unwrap());
        assert!(r
            .evaluate(&ctx(json!({"action": "assessment:start", "hoursSinceLastAttempt": 24})))
            .unwrap());
        assert!(r
            .evaluate(&ctx(json!({"action": "courses:read", "hoursSinceLastAttempt": 1})))
            .unwrap());
    }
}
