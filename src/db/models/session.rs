//! Work session model and request/response payloads.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::lap::LapResponse;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkSession {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub total_seconds: i64,
    pub is_active: bool,
    pub is_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// RFC 3339; defaults to now when omitted
    #[serde(default)]
    pub started_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Setting an end time also marks the session inactive
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub total_seconds: Option<i64>,
    #[serde(default)]
    pub is_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub is_completed: Option<bool>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub total_seconds: i64,
    pub is_active: bool,
    pub is_completed: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laps: Option<Vec<LapResponse>>,
}

impl SessionResponse {
    pub fn from_record(session: WorkSession, laps: Option<Vec<LapResponse>>) -> Self {
        Self {
            id: session.id,
            name: session.name,
            description: session.description,
            started_at: session.started_at,
            ended_at: session.ended_at,
            total_seconds: session.total_seconds,
            is_active: session.is_active,
            is_completed: session.is_completed,
            created_at: session.created_at,
            updated_at: session.updated_at,
            laps,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
