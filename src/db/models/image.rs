//! Image attachment model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub lap_id: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<i64>,
    pub file_format: Option<String>,
    /// Derived storage key, never user-supplied
    pub object_key: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: String,
    pub lap_id: String,
    pub file_name: Option<String>,
    /// Time-limited presigned download URL
    pub url: String,
    pub content_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: String,
}
