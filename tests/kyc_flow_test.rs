//! KYC submission through pre-validation, scoring, persistence and audit

mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, request, test_app};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn submission_without_consent_is_blocked() {
    let (app, state, _dir) = test_app();

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/kyc/verifications",
            Some("student"),
            Some(json!({"country": "ZA", "idNumber": "8001015009087", "consent": false})),
        ))
        .await
        .expect("submit");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "CONSTITUTIONAL_VIOLATION");
    let violations = body["error"]["violations"].as_array().expect("violations");
    assert!(violations
        .iter()
        .any(|v| v.as_str().unwrap().starts_with("personal-data-consent")));

    assert_eq!(state.audit.count().unwrap(), 0);
    assert_eq!(state.metrics.snapshot().risk.total, 0);
}

#[tokio::test]
async fn submission_is_scored_persisted_and_audited() {
    let (app, state, _dir) = test_app();

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/kyc/verifications",
            Some("student"),
            Some(json!({"country": "kp", "idNumber": "AB-123456", "consent": true})),
        ))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    let verification = &body["verification"];
    let score = verification["score"].as_u64().unwrap();
    assert!((30..=50).contains(&score), "score {}", score);
    assert_eq!(verification["country"], "KP");
    assert!(verification.get("id_number").is_none());

    let expected_status = if score < 50 { "approved" } else { "review" };
    assert_eq!(verification["status"], expected_status);

    let records = state.audit.query_by_action("kyc:submit").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id.as_deref(), Some("user-1"));
    assert_eq!(records[0].result_hash.len(), 64);

    // reviewer can read it back, the submitter cannot
    let id = verification["id"].as_str().unwrap();
    let uri = format!("/api/kyc/verifications/{}", id);

    let response = app
        .clone()
        .oneshot(request(Method::GET, &uri, Some("student"), None))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request(Method::GET, &uri, Some("admin"), None))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["id"], id);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, &uri, Some("admin"), None))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, &uri, Some("admin"), None))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(state.audit.query_by_action("kyc:delete").unwrap().len(), 1);
}

#[tokio::test]
async fn missing_country_is_bad_request() {
    let (app, _state, _dir) = test_app();

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/kyc/verifications",
            Some("admin"),
            Some(json!({"country": "  ", "idNumber": "AB123456", "consent": true})),
        ))
        .await
        .expect("submit");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn constitution_endpoints_report_and_audit() {
    let (app, state, _dir) = test_app();

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/constitution/pre",
            Some("instructor"),
            Some(json!({"action": "assessment:start", "context": {"previousAttempts": 3}})),
        ))
        .await
        .expect("pre");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["valid"], true);
    assert!(body["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|w| w.as_str().unwrap().starts_with("assessment-attempt-limit")));

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/constitution/post",
            Some("instructor"),
            Some(json!({"action": "grade:publish", "result": {"contentFlags": ["violence"]}})),
        ))
        .await
        .expect("post");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["compliant"], false);
    assert_eq!(body["audit_record"]["action"], "grade:publish");

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/audit?action=grade:publish",
            Some("admin"),
            None,
        ))
        .await
        .expect("audit");
    assert_eq!(read_json(response).await["count"], 1);
    assert_eq!(state.audit.count().unwrap(), 1);
}
