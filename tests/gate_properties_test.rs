//! Cross-module properties of the gate, the rule evaluator and the risk scorer

use anyhow::bail;
use covenant_lib::engine::config::RiskConfig;
use covenant_lib::engine::constitution::{ConstitutionalRule, ConstitutionalValidator, Context, Principle};
use covenant_lib::engine::rbac::{
    permissions, require_permission, require_role, AccessError, Guard, PermissionTable, Role,
};
use covenant_lib::engine::risk::{FixedVariance, KycSubject, RiskScorer, RiskStatus};
use serde_json::json;

#[test]
fn has_permission_matches_table_membership() {
    let table = PermissionTable::default();

    for (permission, roles) in &table.permissions {
        for role in Role::ALL {
            assert_eq!(
                table.has_permission(role, permission),
                roles.contains(&role),
                "{} / {}",
                role,
                permission
            );
        }
    }

    for role in Role::ALL {
        assert!(!table.has_permission(role, "courses:archive"));
        assert!(!table.has_permission(role, ""));
    }
}

#[test]
fn concrete_role_scenarios() {
    let table = PermissionTable::default();

    assert!(table.has_permission(Role::Admin, permissions::SYSTEM_CONFIGURE));
    assert!(!table.has_permission(Role::Student, permissions::SYSTEM_CONFIGURE));
    assert!(table.has_permission(Role::Instructor, permissions::COURSES_WRITE));
    assert!(!table.has_permission(Role::Instructor, permissions::COURSES_DELETE));
}

#[test]
fn no_role_is_always_unauthenticated() {
    let table = PermissionTable::default();
    let guards: Vec<Guard> = vec![
        require_role(&[]),
        require_role(&Role::ALL),
        require_permission(permissions::COURSES_READ),
        require_permission("not:in-table"),
    ];

    for guard in &guards {
        let err = guard.check(&table, None).unwrap_err();
        assert!(matches!(err, AccessError::AuthenticationMissing));
        assert_eq!(err.status_code(), 401);
    }
}

#[test]
fn role_guard_passes_members_and_forbids_others() {
    let table = PermissionTable::default();
    let before = table.clone();
    let guard = require_role(&[Role::Admin, Role::Instructor]);

    for role in Role::ALL {
        let outcome = guard.check(&table, Some(role));
        match role {
            Role::Admin | Role::Instructor => assert!(outcome.is_ok()),
            _ => assert_eq!(outcome.unwrap_err().status_code(), 403),
        }
    }

    assert_eq!(table.permissions, before.permissions);
}

#[test]
fn unknown_permission_fails_closed_distinctly() {
    let table = PermissionTable::default();
    let err = require_permission("courses:wirte")
        .check(&table, Some(Role::Admin))
        .unwrap_err();

    assert!(matches!(err, AccessError::UnknownPermission { .. }));
    assert_eq!(err.status_code(), 403);
}

fn faulting_validator() -> ConstitutionalValidator {
    let mut validator = ConstitutionalValidator::with_default_rules();
    validator.register(ConstitutionalRule::new(
        "always-errors",
        "Always errors",
        Principle::Safety,
        "unreachable",
        |_ctx| bail!("lookup failed"),
    ));
    validator.register(ConstitutionalRule::new(
        "always-panics",
        "Always panics",
        Principle::Growth,
        "unreachable",
        |_ctx| panic!("bad rule"),
    ));
    validator
}

fn flagged_context() -> Context {
    match json!({
        "contentFlags": ["hate"],
        "decisionFactors": ["score", "Gender"],
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn faulting_rules_do_not_hide_other_findings() {
    let validator = faulting_validator();
    let result = validator.validate_pre("grade:publish", &flagged_context(), Some("u-9"));

    assert!(!result.valid);
    assert!(result.violations.iter().any(|v| v.starts_with("no-flagged-content")));
    assert!(result.warnings.iter().any(|w| w.starts_with("no-protected-attributes")));
    assert_eq!(result.faults, vec!["always-errors".to_string(), "always-panics".to_string()]);
}

#[test]
fn pre_validation_is_idempotent() {
    let validator = faulting_validator();
    let context = flagged_context();

    let first = validator.validate_pre("grade:publish", &context, Some("u-9"));
    let second = validator.validate_pre("grade:publish", &context, Some("u-9"));

    assert_eq!(first, second);
}

#[test]
fn risk_score_is_bounded_and_thresholded() {
    let scorer = RiskScorer::new(RiskConfig::default());
    let subjects = [("AF", ""), ("ZA", "8001015009087"), ("ye", "!!"), ("", "AB123456")];

    for _ in 0..50 {
        for (country, id_number) in subjects {
            let assessment = scorer.assess(&KycSubject {
                country: country.to_string(),
                id_number: id_number.to_string(),
            });
            assert!(assessment.score <= 100);
            assert_eq!(assessment.status, RiskStatus::from_score(assessment.score));
        }
    }

    for (score, status) in [
        (49, RiskStatus::Approved),
        (50, RiskStatus::Review),
        (74, RiskStatus::Review),
        (75, RiskStatus::Rejected),
    ] {
        assert_eq!(RiskStatus::from_score(score), status);
    }
}

#[test]
fn high_risk_country_contributes_fixed_penalty() {
    let config = RiskConfig::default();
    let penalty = config.high_risk_penalty;
    let scorer = RiskScorer::with_variance(config, Box::new(FixedVariance(0)));

    let low = scorer.calculate_risk_score(&KycSubject {
        country: "ZA".to_string(),
        id_number: "AB123456".to_string(),
    });
    let high = scorer.calculate_risk_score(&KycSubject {
        country: "SY".to_string(),
        id_number: "AB123456".to_string(),
    });

    assert_eq!(high - low, penalty);
}
