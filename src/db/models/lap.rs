//! Lap model and request/response payloads.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::image::ImageResponse;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lap {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    /// 1-based insertion order within the session
    pub lap_number: i64,
    pub name: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub is_active: bool,
    pub is_break: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLapRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub is_break: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLapRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Setting an end time also marks the lap inactive
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LapResponse {
    pub id: String,
    pub lap_number: i64,
    pub name: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub is_active: bool,
    pub is_break: bool,
    pub images: Vec<ImageResponse>,
}

impl LapResponse {
    pub fn from_record(lap: Lap, images: Vec<ImageResponse>) -> Self {
        Self {
            id: lap.id,
            lap_number: lap.lap_number,
            name: lap.name,
            started_at: lap.started_at,
            ended_at: lap.ended_at,
            duration_seconds: lap.duration_seconds,
            is_active: lap.is_active,
            is_break: lap.is_break,
            images,
        }
    }
}
