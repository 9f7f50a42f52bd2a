//! Covenant API Module
//! Gated REST API with OpenAPI documentation

use axum::{
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::engine::audit::{AuditLog, AuditRecord};
use crate::engine::config::{Config, StorageConfig};
use crate::engine::constitution::{ConstitutionalValidator, Context, ValidationResult};
use crate::engine::observability::{HealthReporter, Metrics, MetricsCollector};
use crate::engine::rbac::{
    permissions, require_permission, AccessError, Enforcer, Guard, PermissionTable, Role,
};
use crate::engine::risk::{
    KycService, KycSubject, MemoryStore, RiskScorer, SqliteStore, StoreError, VerificationStore,
};

/// Header carrying the authenticated user id
pub const X_USER_ID: &str = "x-user-id";

/// Header carrying the authenticated user's role
pub const X_USER_ROLE: &str = "x-user-role";

/// Action name used for KYC submissions
pub const KYC_ACTION: &str = "kyc:submit";

#[derive(Clone)]
pub struct ApiState {
    pub enforcer: Enforcer,
    pub validator: Arc<ConstitutionalValidator>,
    pub kyc: Arc<KycService>,
    pub audit: Arc<AuditLog>,
    pub metrics: Arc<MetricsCollector>,
}

impl ApiState {
    /// Wire every service from the project's config. Relative paths resolve
    /// against `project_dir`.
    pub fn from_config(project_dir: &std::path::Path, config: &Config) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsCollector::from_metrics(Metrics::load(project_dir)?));

        let table = PermissionTable::load(project_dir)?;
        let enforcer = Enforcer::new(Arc::new(table)).with_metrics(metrics.clone());

        let validator = ConstitutionalValidator::with_default_rules().with_metrics(metrics.clone());

        let store: Arc<dyn VerificationStore> = match &config.storage {
            StorageConfig::Memory => Arc::new(MemoryStore::new()),
            StorageConfig::Sqlite { path } => Arc::new(SqliteStore::new(&project_dir.join(path))?),
        };
        let kyc = KycService::new(RiskScorer::new(config.risk.clone()), store)
            .with_metrics(metrics.clone());

        let audit = AuditLog::new(&project_dir.join(&config.audit.dir))?;

        Ok(Self {
            enforcer,
            validator: Arc::new(validator),
            kyc: Arc::new(kyc),
            audit: Arc::new(audit),
            metrics,
        })
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Constitutional check failed: {}", .0.violations.join(", "))]
    ConstitutionalViolation(ValidationResult),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({"error": {"code": "BAD_REQUEST", "message": message}}),
            ),
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({"error": {"code": "NOT_FOUND", "message": message}}),
            ),
            ApiError::ConstitutionalViolation(result) => (
                StatusCode::FORBIDDEN,
                json!({"error": {
                    "code": "CONSTITUTIONAL_VIOLATION",
                    "message": message,
                    "violations": result.violations,
                    "warnings": result.warnings,
                }}),
            ),
            ApiError::Store(_) | ApiError::Audit(_) => {
                tracing::error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": {"code": "INTERNAL", "message": "internal error"}}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Identity asserted by the upstream authentication layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
    pub role: Option<Role>,
}

impl Caller {
    /// An unrecognized role header counts as no role
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_id = headers
            .get(X_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let role = headers
            .get(X_USER_ROLE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| match v.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unrecognized role header");
                    None
                }
            });

        Self { user_id, role }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller::from_headers(&parts.headers))
    }
}

/// Structured deny response for a gate failure
pub fn deny_response(error: &AccessError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::FORBIDDEN);

    let mut body = json!({
        "code": error.code(),
        "message": error.to_string(),
    });
    if let (Value::Object(body), Value::Object(detail)) = (&mut body, error.detail()) {
        body.extend(detail);
    }

    (status, Json(json!({ "error": body }))).into_response()
}

#[derive(Clone)]
struct GateState {
    enforcer: Enforcer,
    guard: Arc<Guard>,
}

async fn enforce_guard(State(gate): State<GateState>, request: Request, next: Next) -> Response {
    let caller = Caller::from_headers(request.headers());
    match gate.enforcer.authorize(&gate.guard, caller.role) {
        Ok(()) => next.run(request).await,
        Err(e) => deny_response(&e),
    }
}

/// Put every route of `router` behind `guard`
pub fn guarded<S>(router: Router<S>, enforcer: &Enforcer, guard: Guard) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let gate = GateState {
        enforcer: enforcer.clone(),
        guard: Arc::new(guard),
    };
    router.route_layer(middleware::from_fn_with_state(gate, enforce_guard))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        check_permission,
        list_permissions,
        validate_pre,
        validate_post,
        submit_verification,
        get_verification,
        delete_verification,
        list_audit,
        get_metrics,
    ),
    tags(
        (name = "permissions", description = "Role and permission lookups"),
        (name = "constitution", description = "Constitutional pre/post validation"),
        (name = "kyc", description = "KYC risk verification"),
        (name = "system", description = "Audit trail and metrics"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let enforcer = state.enforcer.clone();

    let open: Router<ApiState> = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi_doc))
        .route("/api/permissions/check", post(check_permission));

    let permissions_admin: Router<ApiState> = guarded(
        Router::new().route("/api/permissions", get(list_permissions)),
        &enforcer,
        require_permission(permissions::SYSTEM_CONFIGURE),
    );

    let constitution: Router<ApiState> = guarded(
        Router::new()
            .route("/api/constitution/pre", post(validate_pre))
            .route("/api/constitution/post", post(validate_post)),
        &enforcer,
        require_permission(permissions::CONSTITUTION_VALIDATE),
    );

    let kyc_submit: Router<ApiState> = guarded(
        Router::new().route("/api/kyc/verifications", post(submit_verification)),
        &enforcer,
        require_permission(permissions::KYC_SUBMIT),
    );

    let kyc_review: Router<ApiState> = guarded(
        Router::new().route(
            "/api/kyc/verifications/{id}",
            get(get_verification).delete(delete_verification),
        ),
        &enforcer,
        require_permission(permissions::KYC_REVIEW),
    );

    let audit: Router<ApiState> = guarded(
        Router::new().route("/api/audit", get(list_audit)),
        &enforcer,
        require_permission(permissions::AUDIT_READ),
    );

    let monitor: Router<ApiState> = guarded(
        Router::new().route("/api/metrics", get(get_metrics)),
        &enforcer,
        require_permission(permissions::SYSTEM_MONITOR),
    );

    Router::new()
        .merge(open)
        .merge(permissions_admin)
        .merge(constitution)
        .merge(kyc_submit)
        .merge(kyc_review)
        .merge(audit)
        .merge(monitor)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let report = HealthReporter::new().generate(&state.metrics.snapshot());
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "health": report.overall_status,
    }))
}

async fn openapi_doc() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(Deserialize, ToSchema)]
pub struct PermissionCheckRequest {
    role: String,
    permission: String,
}

#[utoipa::path(
    post,
    path = "/api/permissions/check",
    request_body = PermissionCheckRequest,
    responses(
        (status = 200, description = "Whether the role holds the permission", body = Value),
        (status = 400, description = "Unknown role", body = Value)
    ),
    tag = "permissions"
)]
async fn check_permission(
    State(state): State<ApiState>,
    Json(body): Json<PermissionCheckRequest>,
) -> Result<Json<Value>, ApiError> {
    let role: Role = body
        .role
        .parse()
        .map_err(|e: crate::engine::rbac::UnknownRole| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(json!({
        "role": role,
        "permission": body.permission,
        "allowed": state.enforcer.has_permission(role, &body.permission),
        "known": state.enforcer.table().contains(&body.permission),
    })))
}

#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "The permission table", body = Value)
    ),
    tag = "permissions"
)]
async fn list_permissions(State(state): State<ApiState>) -> Json<Value> {
    Json(json!(state.enforcer.table()))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreValidationRequest {
    action: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    context: Context,
}

#[utoipa::path(
    post,
    path = "/api/constitution/pre",
    request_body = PreValidationRequest,
    responses(
        (status = 200, description = "Validation result", body = Value)
    ),
    tag = "constitution"
)]
async fn validate_pre(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<PreValidationRequest>,
) -> Json<ValidationResult> {
    Json(
        state
            .validator
            .validate_pre(&body.action, &body.context, caller.user_id.as_deref()),
    )
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostValidationRequest {
    action: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    result: Context,
}

#[utoipa::path(
    post,
    path = "/api/constitution/post",
    request_body = PostValidationRequest,
    responses(
        (status = 200, description = "Post-validation result with its audit record", body = Value)
    ),
    tag = "constitution"
)]
async fn validate_post(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<PostValidationRequest>,
) -> Result<Json<Value>, ApiError> {
    let post = state
        .validator
        .validate_post(&body.action, &body.result, caller.user_id.as_deref());
    state.audit.append(&post.audit_record)?;
    Ok(Json(json!(post)))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    #[serde(flatten)]
    subject: KycSubject,
    #[serde(default)]
    consent: bool,
}

#[utoipa::path(
    post,
    path = "/api/kyc/verifications",
    request_body = VerificationRequest,
    responses(
        (status = 201, description = "Verification recorded", body = Value),
        (status = 403, description = "Constitutional violation", body = Value)
    ),
    tag = "kyc"
)]
async fn submit_verification(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<VerificationRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.subject.country.trim().is_empty() {
        return Err(ApiError::BadRequest("country is required".to_string()));
    }

    let user_id = caller.user_id.as_deref();

    let mut context = Context::new();
    context.insert("country".to_string(), json!(body.subject.country));
    context.insert("personalData".to_string(), json!(true));
    context.insert("consent".to_string(), json!(body.consent));

    let pre = state.validator.validate_pre(KYC_ACTION, &context, user_id);
    if !pre.valid {
        return Err(ApiError::ConstitutionalViolation(pre));
    }

    let record = state.kyc.verify(&body.subject, user_id)?;

    let result = match json!(record) {
        Value::Object(map) => map,
        _ => Context::new(),
    };
    let post = state.validator.validate_post(KYC_ACTION, &result, user_id);
    state.audit.append(
        &post
            .audit_record
            .clone()
            .with_metadata(json!({ "verificationId": record.id, "status": record.status })),
    )?;

    let warnings: Vec<String> = pre.warnings.into_iter().chain(post.warnings).collect();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "verification": record,
            "compliant": post.compliant,
            "warnings": warnings,
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/kyc/verifications/{id}",
    params(
        ("id" = String, Path, description = "Verification ID"),
    ),
    responses(
        (status = 200, description = "Verification record", body = Value),
        (status = 404, description = "No such verification", body = Value)
    ),
    tag = "kyc"
)]
async fn get_verification(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .kyc
        .get(&id)?
        .map(|record| Json(json!(record)))
        .ok_or(ApiError::NotFound(id))
}

#[utoipa::path(
    delete,
    path = "/api/kyc/verifications/{id}",
    params(
        ("id" = String, Path, description = "Verification ID"),
    ),
    responses(
        (status = 200, description = "Verification deleted", body = Value),
        (status = 404, description = "No such verification", body = Value)
    ),
    tag = "kyc"
)]
async fn delete_verification(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.kyc.delete(&id)? {
        return Err(ApiError::NotFound(id));
    }

    state.audit.append(
        &AuditRecord::new("kyc:delete", caller.user_id.as_deref(), &json!({ "id": id }))
            .with_compliance(true),
    )?;

    Ok(Json(json!({ "deleted": id })))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    user_id: Option<String>,
    action: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit records", body = Value)
    ),
    tag = "system"
)]
async fn list_audit(
    State(state): State<ApiState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, ApiError> {
    let records: Vec<AuditRecord> = state
        .audit
        .query_all()?
        .into_iter()
        .filter(|r| query.user_id.is_none() || r.user_id == query.user_id)
        .filter(|r| query.action.as_deref().map_or(true, |a| r.action == a))
        .collect();

    Ok(Json(json!({
        "count": records.len(),
        "records": records,
    })))
}

#[utoipa::path(
    get,
    path = "/api/metrics",
    responses(
        (status = 200, description = "Metrics snapshot and health report", body = Value)
    ),
    tag = "system"
)]
async fn get_metrics(State(state): State<ApiState>) -> Json<Value> {
    let metrics = state.metrics.snapshot();
    let health = HealthReporter::new().generate(&metrics);
    Json(json!({
        "metrics": metrics,
        "health": health,
    }))
}
