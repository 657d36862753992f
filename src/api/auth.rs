//! Authentication endpoints: signup, login, refresh, logout.
//!
//! Access tokens are carried in the `Authorization: Bearer` header and
//! validated offline by the [`AuthUser`] extractor. The refresh token is
//! returned in the response body and also set as an HTTP-only cookie so
//! browser clients never expose it to script.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{AuthResponse, LoginRequest, RefreshRequest, SignupRequest, User, UserResponse};
use crate::token::TokenPair;
use crate::{crypto, AppState};

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_password, validate_username};
use super::MessageResponse;

/// Cookie carrying the refresh token for browser clients
const REFRESH_COOKIE: &str = "refresh_token";

fn refresh_cookie(token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn auth_response(user: UserResponse, pair: TokenPair) -> AuthResponse {
    AuthResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        user,
    }
}

/// Create a new user account and log it in
pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_username(&request.username) {
        errors.add("username", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let password_hash =
        crypto::hash_password(&request.password, state.tokens.pbkdf2_iterations());
    let now = chrono::Utc::now().to_rfc3339();

    // The UNIQUE constraint is the authority on duplicates; a concurrent
    // signup with the same name maps to Conflict via the sqlx conversion
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&request.username)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint failed") => {
            ApiError::conflict("Username already exists")
        }
        _ => ApiError::from(e),
    })?;

    // Default settings row for the new user
    sqlx::query(
        "INSERT INTO user_settings (id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %id, "Created user account");

    let pair = state.tokens.issue_pair(&state.db, &id).await?;
    let jar = jar.add(refresh_cookie(pair.refresh.clone()));
    let user = UserResponse {
        id,
        username: request.username,
    };

    Ok((StatusCode::CREATED, jar, Json(auth_response(user, pair))))
}

/// Login with username and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let (user, pair) = state
        .tokens
        .login(&state.db, &request.username, &request.password)
        .await?;

    let jar = jar.add(refresh_cookie(pair.refresh.clone()));
    Ok((jar, Json(auth_response(user.into(), pair))))
}

/// Extract the refresh token from the request body, falling back to the cookie
fn refresh_token_from(
    request: Option<&RefreshRequest>,
    jar: &CookieJar,
) -> Result<String, ApiError> {
    request
        .and_then(|r| r.refresh_token.clone())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))
}

/// Rotate a refresh token and mint a new access/refresh pair.
///
/// The body is optional; browser clients rely on the cookie alone.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let token = refresh_token_from(request.as_ref().map(|Json(r)| r), &jar)?;

    let pair = state.tokens.refresh(&state.db, &token).await?;
    let user_id = state.tokens.validate_access(&pair.access)?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

    let jar = jar.add(refresh_cookie(pair.refresh.clone()));
    Ok((jar, Json(auth_response(user.into(), pair))))
}

/// Logout and revoke the refresh token. Idempotent.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    // A missing token still clears the cookie and succeeds
    if let Ok(token) = refresh_token_from(request.as_ref().map(|Json(r)| r), &jar) {
        state.tokens.logout(&state.db, &token).await?;
    }

    // Removal must match the path the cookie was set with
    let jar = jar.remove(Cookie::build((REFRESH_COOKIE, "")).path("/").build());
    Ok((
        jar,
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully".to_string(),
        }),
    ))
}

/// Extract the bearer token from request headers
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// The authenticated caller, derived from a valid access token.
///
/// Validation is signature + expiry only; no database lookup on the request
/// path.
pub struct AuthUser {
    pub id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        let id = state.tokens.validate_access(&token)?;
        Ok(AuthUser { id })
    }
}
