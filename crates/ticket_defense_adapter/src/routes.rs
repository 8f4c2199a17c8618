#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use ticket_defense_contracts::analysis::{TicketAnalysis, TicketAnalysisRequest};

use crate::error::ApiError;
use crate::{
    AdapterHealthResponse, AdapterRuntime, CreateCaseRequest, CreateCaseResponse,
    TrackCaseRequest, TrackCaseResponse,
};

pub const CREATE_CASE_PATH: &str = "/api/create-case";
pub const TRACK_CASE_PATH: &str = "/api/track-case";
pub const TICKET_ANALYSIS_PATH: &str = "/api/ticket-analysis";

/// JSON framing allowance on top of the base64-inflated image.
const ANALYSIS_BODY_OVERHEAD: usize = 64 * 1024;

type SharedRuntime = Arc<AdapterRuntime>;

pub fn build_router(runtime: SharedRuntime) -> Router {
    let analysis_body_limit = runtime.max_image_bytes() / 3 * 4 + ANALYSIS_BODY_OVERHEAD;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let analysis = Router::new()
        .route(
            TICKET_ANALYSIS_PATH,
            post(ticket_analysis)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(analysis_body_limit)),
        )
        .layer(cors);

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            CREATE_CASE_PATH,
            post(create_case).fallback(method_not_allowed),
        )
        .route(TRACK_CASE_PATH, post(track_case).fallback(method_not_allowed))
        .merge(analysis)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

async fn healthz(State(runtime): State<SharedRuntime>) -> Json<AdapterHealthResponse> {
    Json(runtime.health_report())
}

async fn create_case(
    State(runtime): State<SharedRuntime>,
    payload: Result<Json<CreateCaseRequest>, JsonRejection>,
) -> Result<Json<CreateCaseResponse>, ApiError> {
    let Json(request) = payload?;
    run_blocking(move || runtime.create_case(request)).await.map(Json)
}

async fn track_case(
    State(runtime): State<SharedRuntime>,
    payload: Result<Json<TrackCaseRequest>, JsonRejection>,
) -> Result<Json<TrackCaseResponse>, ApiError> {
    let Json(request) = payload?;
    run_blocking(move || runtime.track_case(request)).await.map(Json)
}

async fn ticket_analysis(
    State(runtime): State<SharedRuntime>,
    payload: Result<Json<TicketAnalysisRequest>, JsonRejection>,
) -> Result<Json<TicketAnalysis>, ApiError> {
    let Json(request) = payload?;
    run_blocking(move || runtime.analyze_ticket(&request)).await.map(Json)
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}

/// Store and provider clients block on network I/O.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        tracing::error!(error = %err, "blocking request task failed");
        ApiError::internal("request worker failed")
    })?
}
