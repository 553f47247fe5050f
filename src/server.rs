//! JSON HTTP query surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Readiness flags, state, and version |
//! | `GET`  | `/status` | Full [`SystemStatus`](crate::models::SystemStatus) |
//! | `POST` | `/query` | `{"question": "..."}` → `QueryResult` |
//! | `POST` | `/batch_query` | `{"questions": [...]}` → `{"results": [QueryResult]}` |
//! | `POST` | `/build` | Full rebuild → `BuildReport` |
//! | `POST` | `/update` | Incremental update → `BuildReport` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "QA chain not ready (state: vectordb_ready)" } }
//! ```
//!
//! Malformed or missing JSON bodies are reported as `bad_request` too.
//!
//! Error codes: `bad_request` (400), `build_in_progress` (409),
//! `not_ready` (503), `store_not_ready` (503), `internal` (500).
//!
//! A query that reaches the QA chain always answers `200`; degraded
//! answers carry `"success": false` in the body.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::RagError;
use crate::models::{BuildReport, QueryResult, RagState, SystemStatus};
use crate::rag::RagSystem;

/// Build the router over a shared orchestrator.
pub fn router(rag: Arc<RagSystem>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/query", post(handle_query))
        .route("/batch_query", post(handle_batch_query))
        .route("/build", post(handle_build))
        .route("/update", post(handle_update))
        .layer(cors)
        .with_state(rag)
}

/// Serve on `bind` until the process is terminated.
pub async fn run_server(rag: Arc<RagSystem>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "query server listening");
    println!("Query server listening on http://{}", bind);
    axum::serve(listener, router(rag)).await?;
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::NotReady(_) | RagError::StoreNotReady(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.code())
            }
            RagError::BuildInProgress => (StatusCode::CONFLICT, err.code()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: format!("{:#}", err),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    vectordb_ready: bool,
    qa_chain_ready: bool,
    state: RagState,
}

async fn handle_health(State(rag): State<Arc<RagSystem>>) -> Json<HealthResponse> {
    let health = rag.health().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vectordb_ready: health.vectordb_ready,
        qa_chain_ready: health.qa_chain_ready,
        state: health.state,
    })
}

// ============ GET /status ============

async fn handle_status(
    State(rag): State<Arc<RagSystem>>,
) -> Result<Json<SystemStatus>, AppError> {
    Ok(Json(rag.status().await?))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_query(
    State(rag): State<Arc<RagSystem>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, AppError> {
    let Json(req) = body?;
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    Ok(Json(rag.query(&req.question).await?))
}

// ============ POST /batch_query ============

#[derive(Deserialize)]
struct BatchQueryRequest {
    questions: Vec<String>,
}

#[derive(Serialize)]
struct BatchQueryResponse {
    results: Vec<QueryResult>,
}

async fn handle_batch_query(
    State(rag): State<Arc<RagSystem>>,
    body: Result<Json<BatchQueryRequest>, JsonRejection>,
) -> Result<Json<BatchQueryResponse>, AppError> {
    let Json(req) = body?;
    if req.questions.is_empty() {
        return Err(bad_request("questions must not be empty"));
    }
    let results = rag.batch_query(&req.questions).await?;
    Ok(Json(BatchQueryResponse { results }))
}

// ============ POST /build, POST /update ============

async fn handle_build(State(rag): State<Arc<RagSystem>>) -> Result<Json<BuildReport>, AppError> {
    Ok(Json(rag.build_vector_database().await?))
}

async fn handle_update(State(rag): State<Arc<RagSystem>>) -> Result<Json<BuildReport>, AppError> {
    Ok(Json(rag.update_database().await?))
}
