//! HTTP API.
//!
//! Exposes ingestion, querying, purge, and audit reads over JSON. Every
//! route except `/health` requires `Authorization: Bearer <identity token>`
//! signed with the configured identity secret; the token's claims decide
//! the caller's user, tenant, and role.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check with provider modes |
//! | `POST` | `/v1/ingest` | Ingest a document (uploader roles, own tenant only) |
//! | `POST` | `/v1/documents/purge` | Delete a document's chunks (uploader roles) |
//! | `POST` | `/v1/query` | Hybrid query as the token's principal |
//! | `GET`  | `/v1/audit` | Audit records of the token's tenant (reader roles) |
//!
//! # Error contract
//!
//! All errors use `{ "error": { "code": "...", "message": "..." } }` with
//! codes `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `unknown_tenant` (404), and `internal` (500). Internal errors carry a
//! generic message; the detail is only logged.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use tenant_rag_core::models::{parse_roles, AuditAction, AuditFilter, AuditRecord, Role};

use crate::config::Config;
use crate::engine::{Engine, Principal};
use crate::error::EngineError;
use crate::hybrid::{HybridOrchestrator, HybridResponse, RemoteClient};
use crate::identity::IdentityKey;
use crate::ingest::{IngestOutcome, IngestRequest};

const MAX_AUDIT_LIMIT: usize = 1000;

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<HybridOrchestrator>,
    identity: Arc<IdentityKey>,
    uploader_roles: Arc<BTreeSet<Role>>,
    reader_roles: Arc<BTreeSet<Role>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<HybridOrchestrator>,
        identity: IdentityKey,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            orchestrator,
            identity: Arc::new(identity),
            uploader_roles: Arc::new(
                parse_roles(&config.ingest.uploader_roles).context("ingest.uploader_roles")?,
            ),
            reader_roles: Arc::new(
                parse_roles(&config.audit.reader_roles).context("audit.reader_roles")?,
            ),
        })
    }

    fn engine(&self) -> &Engine {
        self.orchestrator.engine()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/ingest", post(handle_ingest))
        .route("/v1/documents/purge", post(handle_purge))
        .route("/v1/query", post(handle_query))
        .route("/v1/audit", get(handle_audit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> Result<()> {
    let identity = IdentityKey::from_config(&config.identity)
        .context("the HTTP server needs an identity secret to verify bearer tokens")?;
    let engine = Arc::new(Engine::open(config).await?);
    let remote = RemoteClient::from_config(&config.remote, Some(identity.clone()));
    let orchestrator = Arc::new(HybridOrchestrator::new(engine, remote));
    let state = AppState::new(orchestrator, identity, config)?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(bind = %bind_addr, "tenant-rag server listening");
    println!("tenant-rag server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(message) => bad_request(message),
            EngineError::UnknownTenant(tenant) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "unknown_tenant",
                message: format!("unknown tenant: {}", tenant),
            },
            EngineError::Store(e) => {
                tracing::error!(error = %format!("{:#}", e), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Verify the bearer token and turn its claims into a [`Principal`].
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing bearer token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("missing bearer token"))?;
    let claims = state
        .identity
        .verify(token.trim())
        .map_err(|e| unauthorized(e.to_string()))?;
    Principal::from_claims(&claims).map_err(|e| unauthorized(e.to_string()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    embedding: String,
    llm: String,
    remote: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding: state.engine().embedder().mode().to_string(),
        llm: state.engine().answerer().mode().to_string(),
        remote: state.orchestrator.remote_enabled(),
    })
}

// ============ POST /v1/ingest ============

async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestOutcome>, AppError> {
    let principal = authenticate(&state, &headers)?;
    let Json(req) = body?;

    if !state.uploader_roles.contains(&principal.role) {
        return Err(forbidden(format!(
            "role '{}' may not upload documents",
            principal.role
        )));
    }
    if req.tenant_id.trim() != principal.tenant_id {
        return Err(forbidden("token tenant does not match request tenant"));
    }

    Ok(Json(state.engine().ingest(&principal, &req).await?))
}

// ============ POST /v1/documents/purge ============

#[derive(Deserialize)]
struct PurgeRequest {
    doc_id: String,
}

#[derive(Serialize)]
struct PurgeResponse {
    doc_id: String,
    chunks_removed: usize,
}

async fn handle_purge(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PurgeRequest>, JsonRejection>,
) -> Result<Json<PurgeResponse>, AppError> {
    let principal = authenticate(&state, &headers)?;
    let Json(req) = body?;

    if !state.uploader_roles.contains(&principal.role) {
        return Err(forbidden(format!(
            "role '{}' may not purge documents",
            principal.role
        )));
    }

    let removed = state
        .engine()
        .purge(&principal.tenant_id, &req.doc_id)
        .await?;
    Ok(Json(PurgeResponse {
        doc_id: req.doc_id,
        chunks_removed: removed,
    }))
}

// ============ POST /v1/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<HybridResponse>, AppError> {
    let principal = authenticate(&state, &headers)?;
    let Json(req) = body?;

    let outcome = state
        .orchestrator
        .query(&principal, &req.query, req.top_k)
        .await?;
    Ok(Json(outcome.into_response()))
}

// ============ GET /v1/audit ============

#[derive(Deserialize)]
struct AuditQuery {
    user_id: Option<String>,
    action: Option<String>,
    since: Option<i64>,
    until: Option<i64>,
    limit: Option<usize>,
}

async fn handle_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    let principal = authenticate(&state, &headers)?;
    let Query(params) = params?;

    if !state.reader_roles.contains(&principal.role) {
        return Err(forbidden(format!(
            "role '{}' may not read the audit log",
            principal.role
        )));
    }

    let action = params
        .action
        .as_deref()
        .map(str::parse::<AuditAction>)
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;
    let mut filter = AuditFilter::for_tenant(principal.tenant_id.clone());
    filter.user_id = params.user_id;
    filter.action = action;
    filter.since = params.since;
    filter.until = params.until;
    if let Some(limit) = params.limit {
        filter.limit = limit.clamp(1, MAX_AUDIT_LIMIT);
    }

    Ok(Json(state.engine().audit_log(&filter).await?))
}
