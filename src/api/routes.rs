use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::domain::Identity;
use crate::observability::MetricsRegistry;
use crate::service::{ServiceError, ValidationService};
use crate::storage::{RuleSetRef, RuleSetStore, StoreError};
use crate::wire::{buffer_address, rule_set_address};

use super::request::{AuthorityRequest, CreateRequest, ValidateRequest, WriteChunkRequest};
use super::response::{
    CreateResponse, ErrorResponse, FinalizeResponse, HealthResponse, ReadyResponse,
    RevisionResponse, ValidateResponse, WriteChunkResponse,
};

/// Shared application state.
pub struct AppState {
    /// Rule-set store backing ingestion and lookup
    pub store: Arc<dyn RuleSetStore>,

    /// Validation entry point
    pub service: ValidationService,

    /// Metrics registry
    pub metrics: Arc<MetricsRegistry>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/validate", post(handle_validate))
        .route(
            "/v1/rule-sets/:creator/:name",
            post(handle_create).get(handle_get),
        )
        .route(
            "/v1/rule-sets/:creator/:name/buffer",
            put(handle_write_chunk).delete(handle_abandon),
        )
        .route("/v1/rule-sets/:creator/:name/finalize", post(handle_finalize))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Map service errors onto HTTP statuses. A policy denial is NOT an
/// error: denied validations return 200 with `allowed: false`.
fn error_response(err: ServiceError) -> Response {
    let (status, code) = match &err {
        ServiceError::Store(e) => match e {
            StoreError::NotFound(_) | StoreError::VersionNotFound { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            StoreError::NoBuffer(_) => (StatusCode::NOT_FOUND, "NO_BUFFER"),
            StoreError::NotAuthorized { .. } => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED"),
            StoreError::AlreadyExists(_) | StoreError::BufferActive(_) => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            StoreError::BufferTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "BUFFER_TOO_LARGE")
            }
            StoreError::TargetMismatch { .. } | StoreError::Invalid(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_RULE_SET")
            }
        },
        ServiceError::Wire(_) => (StatusCode::BAD_REQUEST, "MALFORMED_INSTRUCTION"),
    };

    (status, Json(ErrorResponse::new(err.to_string(), code))).into_response()
}

fn parse_creator(creator: &str) -> Result<Identity, Response> {
    Identity::from_hex(creator).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request(format!(
                "invalid creator identity: {}",
                e
            ))),
        )
            .into_response()
    })
}

/// Handle validation requests.
async fn handle_validate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Response {
    match state
        .service
        .validate(req.creator, &req.name, req.version, req.operation, &req.payload)
        .await
    {
        Ok(validation) => (StatusCode::OK, Json(ValidateResponse::from(validation))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Register a rule-set slot.
async fn handle_create(
    State(state): State<Arc<AppState>>,
    Path((creator, name)): Path<(String, String)>,
    Json(req): Json<CreateRequest>,
) -> Response {
    let creator = match parse_creator(&creator) {
        Ok(creator) => creator,
        Err(response) => return response,
    };
    let reference = RuleSetRef::new(creator, name);

    match state
        .store
        .create(&req.authority, &reference, req.delegate)
        .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(CreateResponse {
                creator: creator.to_hex(),
                rule_set_address: rule_set_address(&creator, &reference.name).to_hex(),
                buffer_address: buffer_address(&creator).to_hex(),
                name: reference.name,
            }),
        )
            .into_response(),
        Err(err) => error_response(err.into()),
    }
}

/// Write a chunk into the staging buffer.
async fn handle_write_chunk(
    State(state): State<Arc<AppState>>,
    Path((creator, name)): Path<(String, String)>,
    Json(req): Json<WriteChunkRequest>,
) -> Response {
    let creator = match parse_creator(&creator) {
        Ok(creator) => creator,
        Err(response) => return response,
    };
    let reference = RuleSetRef::new(creator, name);

    let data = match req.data_bytes() {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(format!("invalid chunk hex: {}", e))),
            )
                .into_response();
        }
    };

    match state
        .store
        .write_chunk(&req.authority, &reference, req.offset, &data)
        .await
    {
        Ok(status) => {
            state.metrics.record_buffer_write(data.len());
            (StatusCode::OK, Json(WriteChunkResponse::from(status))).into_response()
        }
        Err(err) => error_response(err.into()),
    }
}

/// Commit the staged buffer as a new version.
async fn handle_finalize(
    State(state): State<Arc<AppState>>,
    Path((creator, name)): Path<(String, String)>,
    Json(req): Json<AuthorityRequest>,
) -> Response {
    let creator = match parse_creator(&creator) {
        Ok(creator) => creator,
        Err(response) => return response,
    };
    let reference = RuleSetRef::new(creator, name);

    let result = state.store.finalize(&req.authority, &reference).await;
    state.metrics.record_commit(result.is_ok());

    match result {
        Ok(version) => (StatusCode::OK, Json(FinalizeResponse { version })).into_response(),
        Err(err) => error_response(err.into()),
    }
}

/// Discard the staged buffer.
async fn handle_abandon(
    State(state): State<Arc<AppState>>,
    Path((creator, name)): Path<(String, String)>,
    Json(req): Json<AuthorityRequest>,
) -> Response {
    let creator = match parse_creator(&creator) {
        Ok(creator) => creator,
        Err(response) => return response,
    };
    let reference = RuleSetRef::new(creator, name);

    match state.store.abandon(&req.authority, &reference).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct RevisionQuery {
    version: Option<u32>,
}

/// Fetch a committed revision (latest unless `?version=` is given).
async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path((creator, name)): Path<(String, String)>,
    Query(query): Query<RevisionQuery>,
) -> Response {
    let creator = match parse_creator(&creator) {
        Ok(creator) => creator,
        Err(response) => return response,
    };
    let reference = RuleSetRef::new(creator, name);

    match state.store.get(&reference, query.version).await {
        Ok(revision) => (
            StatusCode::OK,
            Json(RevisionResponse {
                version: revision.version,
                rule_set: (*revision.rule_set).clone(),
            }),
        )
            .into_response(),
        Err(err) => error_response(err.into()),
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
    .into_response()
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    let rule_sets = state.store.rule_set_count().await;

    Json(ReadyResponse {
        ready: true,
        rule_sets,
    })
    .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.to_prometheus(),
    )
        .into_response()
}
