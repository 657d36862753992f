//! Per-user settings endpoints.
//!
//! A settings row is created lazily on first read, so accounts that predate
//! a field (or the table itself) still get defaults.

use axum::{extract::State, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{SettingsResponse, UpdateSettingsRequest, UserSettings};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::MessageResponse;

async fn fetch_or_create(state: &AppState, user_id: &str) -> Result<UserSettings, ApiError> {
    let existing: Option<UserSettings> =
        sqlx::query_as("SELECT * FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;

    if let Some(settings) = existing {
        return Ok(settings);
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT OR IGNORE INTO user_settings (id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    sqlx::query_as("SELECT * FROM user_settings WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::from)
}

/// Fetch the caller's settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = fetch_or_create(&state, &user.id).await?;
    Ok(Json(settings.into()))
}

/// Partially update settings; omitted fields keep their values
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(interval) = request.notification_interval_hours {
        if !interval.is_finite() || interval <= 0.0 {
            errors.add(
                "notificationIntervalHours",
                "notificationIntervalHours must be a positive number",
            );
        }
    }
    if let Some(amount) = request.hourly_amount {
        if !amount.is_finite() || amount < 0.0 {
            errors.add("hourlyAmount", "hourlyAmount must not be negative");
        }
    }
    errors.finish()?;

    fetch_or_create(&state, &user.id).await?;

    sqlx::query(
        r#"
        UPDATE user_settings SET
            show_amount = COALESCE(?, show_amount),
            show_stats_before_laps = COALESCE(?, show_stats_before_laps),
            breaks_impact_amount = COALESCE(?, breaks_impact_amount),
            breaks_impact_time = COALESCE(?, breaks_impact_time),
            minimalist_mode = COALESCE(?, minimalist_mode),
            notification_enabled = COALESCE(?, notification_enabled),
            notification_interval_hours = COALESCE(?, notification_interval_hours),
            hourly_amount = COALESCE(?, hourly_amount),
            updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(request.show_amount)
    .bind(request.show_stats_before_laps)
    .bind(request.breaks_impact_amount)
    .bind(request.breaks_impact_time)
    .bind(request.minimalist_mode)
    .bind(request.notification_enabled)
    .bind(request.notification_interval_hours)
    .bind(request.hourly_amount)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let settings: UserSettings = sqlx::query_as("SELECT * FROM user_settings WHERE user_id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(settings.into()))
}

/// Reset settings to defaults
pub async fn reset_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    sqlx::query("DELETE FROM user_settings WHERE user_id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    // Recreate with defaults so the next read doesn't race another insert
    fetch_or_create(&state, &user.id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Settings reset to defaults".to_string(),
    }))
}
