//! HTTP API: router assembly, error envelope, request validation.

pub mod auth;
pub mod error;
pub mod images;
pub mod sessions;
pub mod settings;
pub mod validation;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

use error::ApiError;
use validation::MAX_IMAGE_BYTES;

/// Generic success payload for deletes and logout
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health_live() -> StatusCode {
    StatusCode::OK
}

/// Readiness: the database must answer
async fn health_ready(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    sqlx::query("SELECT 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout));

    let api_routes = Router::new()
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/sessions/latest", get(sessions::latest_session))
        .route(
            "/sessions/:session_id",
            get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/:session_id/laps", post(sessions::create_lap))
        .route(
            "/sessions/:session_id/laps/:lap_id",
            put(sessions::update_lap).delete(sessions::delete_lap),
        )
        .route(
            "/images/sessions/:session_id/laps/:lap_id/upload",
            post(images::upload_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route(
            "/images/sessions/:session_id/laps/:lap_id",
            get(images::list_lap_images),
        )
        .route(
            "/images/sessions/:session_id",
            get(images::list_session_images),
        )
        .route(
            "/images/:image_id",
            get(images::get_image).delete(images::delete_image),
        )
        .route(
            "/settings",
            get(settings::get_settings)
                .put(settings::update_settings)
                .delete(settings::reset_settings),
        );

    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
