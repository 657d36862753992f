//! Work session and lap endpoints.
//!
//! Every query is scoped by the authenticated user's id. A session or lap
//! belonging to someone else is indistinguishable from one that does not
//! exist.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateLapRequest, CreateSessionRequest, Lap, LapResponse, ListSessionsQuery,
    ListSessionsResponse, SessionResponse, UpdateLapRequest, UpdateSessionRequest, WorkSession,
};
use crate::{storage, AppState};

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::images::image_responses;
use super::validation::validate_timestamp;
use super::MessageResponse;

pub(super) async fn fetch_session(
    state: &AppState,
    user_id: &str,
    session_id: &str,
) -> Result<WorkSession, ApiError> {
    sqlx::query_as("SELECT * FROM sessions WHERE id = ? AND user_id = ?")
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

pub(super) async fn fetch_lap(
    state: &AppState,
    user_id: &str,
    session_id: &str,
    lap_id: &str,
) -> Result<Lap, ApiError> {
    sqlx::query_as("SELECT * FROM laps WHERE id = ? AND session_id = ? AND user_id = ?")
        .bind(lap_id)
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Lap not found"))
}

/// Assemble lap responses (with image URLs) for one session
async fn session_laps(
    state: &AppState,
    session_id: &str,
) -> Result<Vec<LapResponse>, ApiError> {
    let laps: Vec<Lap> =
        sqlx::query_as("SELECT * FROM laps WHERE session_id = ? ORDER BY lap_number ASC")
            .bind(session_id)
            .fetch_all(&state.db)
            .await?;

    let mut responses = Vec::with_capacity(laps.len());
    for lap in laps {
        let images = sqlx::query_as("SELECT * FROM images WHERE lap_id = ? ORDER BY created_at ASC")
            .bind(&lap.id)
            .fetch_all(&state.db)
            .await?;
        let images = image_responses(state, images).await?;
        responses.push(LapResponse::from_record(lap, images));
    }
    Ok(responses)
}

/// List the caller's sessions, newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);

    let (sessions, total): (Vec<WorkSession>, i64) = match query.is_completed {
        Some(completed) => {
            let rows = sqlx::query_as(
                "SELECT * FROM sessions WHERE user_id = ? AND is_completed = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(completed)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db)
            .await?;
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ? AND is_completed = ?",
            )
            .bind(&user.id)
            .bind(completed)
            .fetch_one(&state.db)
            .await?;
            (rows, count)
        }
        None => {
            let rows = sqlx::query_as(
                "SELECT * FROM sessions WHERE user_id = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db)
            .await?;
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = ?")
                    .bind(&user.id)
                    .fetch_one(&state.db)
                    .await?;
            (rows, count)
        }
    };

    let sessions = sessions
        .into_iter()
        .map(|s| SessionResponse::from_record(s, None))
        .collect();

    Ok(Json(ListSessionsResponse {
        sessions,
        total,
        limit,
        offset,
    }))
}

/// Start a new work session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(started_at) = &request.started_at {
        if let Err(e) = validate_timestamp(started_at, "startedAt") {
            errors.add("startedAt", e);
        }
    }
    errors.finish()?;

    let now = chrono::Utc::now().to_rfc3339();
    let id = Uuid::new_v4().to_string();
    let started_at = request.started_at.unwrap_or_else(|| now.clone());

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, name, description, started_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&request.name)
    .bind(&request.description)
    .bind(&started_at)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(session_id = %id, user_id = %user.id, "Created session");

    let session = fetch_session(&state, &user.id, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::from_record(session, Some(Vec::new()))),
    ))
}

/// Fetch the caller's most recent session, laps included
pub async fn latest_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<SessionResponse>, ApiError> {
    let session: WorkSession = sqlx::query_as(
        "SELECT * FROM sessions WHERE user_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("No sessions yet"))?;

    let laps = session_laps(&state, &session.id).await?;
    Ok(Json(SessionResponse::from_record(session, Some(laps))))
}

/// Fetch one session with its laps and images
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = fetch_session(&state, &user.id, &session_id).await?;
    let laps = session_laps(&state, &session.id).await?;
    Ok(Json(SessionResponse::from_record(session, Some(laps))))
}

/// Update session fields. Setting `endedAt` also closes the session.
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ended_at) = &request.ended_at {
        if let Err(e) = validate_timestamp(ended_at, "endedAt") {
            errors.add("endedAt", e);
        }
    }
    if let Some(total) = request.total_seconds {
        if total < 0 {
            errors.add("totalSeconds", "totalSeconds must not be negative");
        }
    }
    errors.finish()?;

    // Ownership check before the write
    fetch_session(&state, &user.id, &session_id).await?;

    sqlx::query(
        r#"
        UPDATE sessions SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            ended_at = COALESCE(?, ended_at),
            is_active = CASE WHEN ? IS NOT NULL THEN 0 ELSE is_active END,
            total_seconds = COALESCE(?, total_seconds),
            is_completed = COALESCE(?, is_completed),
            updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&request.name)
    .bind(&request.description)
    .bind(&request.ended_at)
    .bind(&request.ended_at)
    .bind(request.total_seconds)
    .bind(request.is_completed)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&session_id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let session = fetch_session(&state, &user.id, &session_id).await?;
    let laps = session_laps(&state, &session.id).await?;
    Ok(Json(SessionResponse::from_record(session, Some(laps))))
}

/// Delete a session, its laps, and every stored image under it
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = fetch_session(&state, &user.id, &session_id).await?;

    // Storage first: if the store is unreachable the rows stay and the
    // client can retry
    state
        .storage
        .delete_prefix(&storage::session_prefix(&user.id, &session.id))
        .await?;

    sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
        .bind(&session.id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(session_id = %session.id, user_id = %user.id, "Deleted session");

    Ok(Json(MessageResponse {
        success: true,
        message: "Session deleted".to_string(),
    }))
}

/// Add a lap to a session. Any previously active lap is deactivated.
pub async fn create_lap(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(request): Json<CreateLapRequest>,
) -> Result<(StatusCode, Json<LapResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(started_at) = &request.started_at {
        if let Err(e) = validate_timestamp(started_at, "startedAt") {
            errors.add("startedAt", e);
        }
    }
    errors.finish()?;

    let session = fetch_session(&state, &user.id, &session_id).await?;

    let now = chrono::Utc::now().to_rfc3339();
    let id = Uuid::new_v4().to_string();
    let started_at = request.started_at.unwrap_or_else(|| now.clone());

    // Only one lap runs at a time; the client reports final durations
    sqlx::query("UPDATE laps SET is_active = 0, updated_at = ? WHERE session_id = ? AND is_active = 1")
        .bind(&now)
        .bind(&session.id)
        .execute(&state.db)
        .await?;

    // Lap numbers are per-session and 1-based; computing the number inside
    // the INSERT keeps concurrent creations from colliding
    sqlx::query(
        r#"
        INSERT INTO laps (id, user_id, session_id, lap_number, name, started_at, is_break, created_at, updated_at)
        VALUES (?, ?, ?, (SELECT COALESCE(MAX(lap_number), 0) + 1 FROM laps WHERE session_id = ?), ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&session.id)
    .bind(&session.id)
    .bind(&request.name)
    .bind(&started_at)
    .bind(request.is_break.unwrap_or(false))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let lap = fetch_lap(&state, &user.id, &session.id, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LapResponse::from_record(lap, Vec::new())),
    ))
}

/// Update a lap. Setting `endedAt` also deactivates it.
pub async fn update_lap(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((session_id, lap_id)): Path<(String, String)>,
    Json(request): Json<UpdateLapRequest>,
) -> Result<Json<LapResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ended_at) = &request.ended_at {
        if let Err(e) = validate_timestamp(ended_at, "endedAt") {
            errors.add("endedAt", e);
        }
    }
    if let Some(duration) = request.duration_seconds {
        if duration < 0 {
            errors.add("durationSeconds", "durationSeconds must not be negative");
        }
    }
    errors.finish()?;

    fetch_lap(&state, &user.id, &session_id, &lap_id).await?;

    sqlx::query(
        r#"
        UPDATE laps SET
            name = COALESCE(?, name),
            ended_at = COALESCE(?, ended_at),
            is_active = CASE WHEN ? IS NOT NULL THEN 0 ELSE is_active END,
            duration_seconds = COALESCE(?, duration_seconds),
            updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&request.name)
    .bind(&request.ended_at)
    .bind(&request.ended_at)
    .bind(request.duration_seconds)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&lap_id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let lap = fetch_lap(&state, &user.id, &session_id, &lap_id).await?;
    let images = sqlx::query_as("SELECT * FROM images WHERE lap_id = ? ORDER BY created_at ASC")
        .bind(&lap.id)
        .fetch_all(&state.db)
        .await?;
    let images = image_responses(&state, images).await?;
    Ok(Json(LapResponse::from_record(lap, images)))
}

/// Delete a lap and every stored image attached to it
pub async fn delete_lap(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((session_id, lap_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let lap = fetch_lap(&state, &user.id, &session_id, &lap_id).await?;

    state
        .storage
        .delete_prefix(&storage::lap_prefix(&user.id, &lap.session_id, &lap.id))
        .await?;

    sqlx::query("DELETE FROM laps WHERE id = ? AND user_id = ?")
        .bind(&lap.id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(lap_id = %lap.id, user_id = %user.id, "Deleted lap");

    Ok(Json(MessageResponse {
        success: true,
        message: "Lap deleted".to_string(),
    }))
}
