//! Image attachment endpoints.
//!
//! Uploads land in object storage under a key derived from the ownership
//! chain; the database row carries the derived key and the file metadata.
//! Download URLs are presigned per request and expire.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{Image, ImageResponse};
use crate::storage::{self, StorageError};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;
use super::sessions::{fetch_lap, fetch_session};
use super::validation::{validate_image_filename, MAX_IMAGE_BYTES};
use super::MessageResponse;

/// Presign download URLs for a batch of image rows.
///
/// An image whose object has gone missing from the store is skipped rather
/// than failing the whole listing.
pub(super) async fn image_responses(
    state: &AppState,
    images: Vec<Image>,
) -> Result<Vec<ImageResponse>, ApiError> {
    let ttl = state.storage.presign_ttl();
    let mut responses = Vec::with_capacity(images.len());
    for image in images {
        match state.storage.presign(&image.object_key, ttl).await {
            Ok(url) => responses.push(ImageResponse {
                id: image.id,
                lap_id: image.lap_id,
                file_name: image.file_name,
                url,
                content_type: image.content_type,
                file_size: image.file_size,
                created_at: image.created_at,
            }),
            Err(StorageError::NotFound(key)) => {
                tracing::warn!(image_id = %image.id, key, "Stored object missing, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(responses)
}

async fn fetch_image(state: &AppState, user_id: &str, image_id: &str) -> Result<Image, ApiError> {
    sqlx::query_as("SELECT * FROM images WHERE id = ? AND user_id = ?")
        .bind(image_id)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Image not found"))
}

/// Upload an image to a lap (multipart field `file`)
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((session_id, lap_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageResponse>), ApiError> {
    let lap = fetch_lap(&state, &user.id, &session_id, &lap_id).await?;

    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?,
            );
        }
    }

    let data = data.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    let file_name = file_name.ok_or_else(|| ApiError::bad_request("Upload has no filename"))?;

    if data.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::validation_field(
            "file",
            format!("File exceeds the {} byte limit", MAX_IMAGE_BYTES),
        ));
    }

    let format = validate_image_filename(&file_name)
        .map_err(|e| ApiError::validation_field("file", e))?;
    let content_type = content_type.unwrap_or_else(|| {
        mime_guess::from_ext(&format)
            .first_or_octet_stream()
            .to_string()
    });

    let image_id = Uuid::new_v4().to_string();
    let key = storage::object_key(&user.id, &lap.session_id, &lap.id, &image_id, &format);
    let size = data.len() as i64;

    // Object first, row second; a failed upload leaves no dangling row
    state.storage.put(&key, data, &content_type).await?;

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO images (id, user_id, session_id, lap_id, file_name, content_type, file_size, file_format, object_key, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&image_id)
    .bind(&user.id)
    .bind(&lap.session_id)
    .bind(&lap.id)
    .bind(&file_name)
    .bind(&content_type)
    .bind(size)
    .bind(&format)
    .bind(&key)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(image_id = %image_id, lap_id = %lap.id, size, "Uploaded image");

    let url = state.storage.presign(&key, state.storage.presign_ttl()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ImageResponse {
            id: image_id,
            lap_id: lap.id,
            file_name: Some(file_name),
            url,
            content_type: Some(content_type),
            file_size: Some(size),
            created_at: now,
        }),
    ))
}

/// List a lap's images with fresh download URLs
pub async fn list_lap_images(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((session_id, lap_id)): Path<(String, String)>,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    let lap = fetch_lap(&state, &user.id, &session_id, &lap_id).await?;

    let images = sqlx::query_as("SELECT * FROM images WHERE lap_id = ? ORDER BY created_at ASC")
        .bind(&lap.id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(image_responses(&state, images).await?))
}

/// List every image in a session with fresh download URLs
pub async fn list_session_images(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    let session = fetch_session(&state, &user.id, &session_id).await?;

    let images =
        sqlx::query_as("SELECT * FROM images WHERE session_id = ? ORDER BY created_at ASC")
            .bind(&session.id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(image_responses(&state, images).await?))
}

/// Fetch a single image's presigned download URL
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(image_id): Path<String>,
) -> Result<Json<ImageResponse>, ApiError> {
    let image = fetch_image(&state, &user.id, &image_id).await?;

    let url = state
        .storage
        .presign(&image.object_key, state.storage.presign_ttl())
        .await?;

    Ok(Json(ImageResponse {
        id: image.id,
        lap_id: image.lap_id,
        file_name: image.file_name,
        url,
        content_type: image.content_type,
        file_size: image.file_size,
        created_at: image.created_at,
    }))
}

/// Delete an image from storage and the database
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(image_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let image = fetch_image(&state, &user.id, &image_id).await?;

    // Storage delete is idempotent; a missing object doesn't block cleanup
    state.storage.delete(&image.object_key).await?;

    sqlx::query("DELETE FROM images WHERE id = ? AND user_id = ?")
        .bind(&image.id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(image_id = %image.id, user_id = %user.id, "Deleted image");

    Ok(Json(MessageResponse {
        success: true,
        message: "Image deleted".to_string(),
    }))
}
