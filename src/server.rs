//! HTTP API over the metadata store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/files` | Create metadata for an existing path |
//! | `GET` | `/files` | List files (`?owner_id=`) |
//! | `GET` | `/files/search` | Keyword search (`?keywords=a,b&owner_id=`) |
//! | `GET` | `/files/{id}` | Fetch one file |
//! | `PUT` | `/files/{id}` | Update path and/or tags |
//! | `DELETE` | `/files/{id}` | Delete a file and its tags |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! Creates read the caller identity from the `x-owner-id` and
//! `x-created-by` headers. Request bodies that are not valid JSON for the
//! endpoint get a `bad_request` envelope like any other invalid input.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "Metadata for file '/tmp/a' already exists (ID: 3). Use update to modify." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{ErrorKind, StoreError};
use crate::models::{File, FileUpdate, Identity, NewFile};
use crate::search::split_keywords;
use crate::store::MetadataStore;

const OWNER_HEADER: &str = "x-owner-id";
const CREATED_BY_HEADER: &str = "x-created-by";

/// Shared state passed to every handler.
#[derive(Clone)]
struct AppState {
    store: Arc<MetadataStore>,
}

/// Open the configured store and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(MetadataStore::open(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "metadata server listening");
    serve(listener, store).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: TcpListener, store: Arc<MetadataStore>) -> anyhow::Result<()> {
    axum::serve(listener, router(store)).await?;
    Ok(())
}

pub fn router(store: Arc<MetadataStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/files", get(handle_list).post(handle_create))
        .route("/files/search", get(handle_search))
        .route(
            "/files/{id}",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { store })
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

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::StorageFailure => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "store operation failed");
        }
        AppError {
            status,
            code,
            message: err.message().to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, AppError> {
    let owner_id = match headers.get(OWNER_HEADER) {
        Some(raw) => {
            let text = raw
                .to_str()
                .map_err(|_| bad_request(format!("{} must be ASCII", OWNER_HEADER)))?;
            Some(text.trim().parse::<i64>().map_err(|_| {
                bad_request(format!("{} must be an integer, got '{}'", OWNER_HEADER, text))
            })?)
        }
        None => None,
    };

    let created_by = headers
        .get(CREATED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(Identity {
        owner_id,
        created_by,
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /files ============

#[derive(Debug, Deserialize)]
struct OwnerParams {
    owner_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    keywords: String,
    owner_id: Option<i64>,
}

async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewFile>, JsonRejection>,
) -> Result<(StatusCode, Json<File>), AppError> {
    let Json(body) = body?;
    let identity = identity_from_headers(&headers)?;
    let file = state.store.create(&body, &identity).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<Vec<File>>, AppError> {
    Ok(Json(state.store.list(params.owner_id).await?))
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<File>>, AppError> {
    let keywords = split_keywords(&params.keywords);
    Ok(Json(state.store.search(&keywords, params.owner_id).await?))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<File>, AppError> {
    Ok(Json(state.store.get(id).await?))
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<FileUpdate>, JsonRejection>,
) -> Result<Json<File>, AppError> {
    let Json(body) = body?;
    Ok(Json(state.store.update(id, &body).await?))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
