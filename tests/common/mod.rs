use axum::body::Body;
use axum::http::{Method, Request};
use covenant_lib::engine::api::{create_router, ApiState, X_USER_ID, X_USER_ROLE};
use covenant_lib::engine::config::{Config, StorageConfig};
use serde_json::Value;
use tempfile::TempDir;

/// A router over a throwaway project directory with in-memory storage
pub fn test_app() -> (axum::Router, ApiState, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default_for_service("covenant-test");
    config.storage = StorageConfig::Memory;

    let state = ApiState::from_config(dir.path(), &config).expect("state");
    (create_router(state.clone()), state, dir)
}

pub fn request(method: Method, uri: &str, role: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(X_USER_ID, "user-1");
    if let Some(role) = role {
        builder = builder.header(X_USER_ROLE, role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
