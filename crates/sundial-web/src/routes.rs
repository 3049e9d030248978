//! Scheduling API routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use sundial_scheduler::{ScheduleReceipt, ScheduleService};

use crate::error::ApiError;

/// Shared state for the API server.
struct AppState {
    service: ScheduleService,
}

/// Create the API router.
pub fn create_router(service: ScheduleService) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/schedule", post(create_schedule))
        .route(
            "/schedule/{post_id}",
            get(get_schedule)
                .put(reschedule_post)
                .delete(cancel_schedule),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    post_id: String,
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RescheduleRequest {
    scheduled_at: DateTime<Utc>,
}

/// Schedule a post for publishing at a specific time.
async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleReceipt>), ApiError> {
    let receipt = state
        .service
        .create(&request.post_id, request.scheduled_at)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Cancel a scheduled post.
async fn cancel_schedule(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.cancel(&post_id).await?;
    Ok(Json(json!({ "status": "cancelled", "post_id": post_id })))
}

/// Reschedule an existing post to a new time (created if absent).
async fn reschedule_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<ScheduleReceipt>, ApiError> {
    let receipt = state
        .service
        .reschedule(&post_id, request.scheduled_at)
        .await?;
    Ok(Json(receipt))
}

/// Get schedule status for a post.
async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<Json<ScheduleReceipt>, ApiError> {
    let receipt = state.service.query(&post_id).await?;
    Ok(Json(receipt))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let health = state.service.health().await;
    Json(json!({
        "status": "healthy",
        "scheduler_running": health.scheduler_running,
        "pending_jobs": health.pending_jobs,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
