//! Access and refresh token lifecycle.
//!
//! Access tokens are short-lived HS256 JWTs validated offline (no database
//! hit on the request path). Refresh tokens are long-lived JWTs tracked in
//! the `refresh_tokens` table by SHA-256 hash so they can be revoked before
//! natural expiry. Each refresh rotates the token: the presented record is
//! marked rotated and a successor is issued in the same chain. Presenting an
//! already-rotated token is treated as evidence of compromise and revokes
//! the entire chain.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::crypto;
use crate::db::{DbPool, RefreshTokenRecord, User};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials. Deliberately indistinguishable from "user not found".
    #[error("Invalid username or password")]
    AuthenticationFailed,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token is invalid")]
    TokenInvalid,
    /// A rotated refresh token was replayed
    #[error("Refresh token has already been used")]
    TokenReuse,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id
    sub: String,
    iat: i64,
    exp: i64,
    /// "access" or "refresh"
    typ: String,
    jti: String,
}

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Hash a token for storage. Raw refresh tokens never touch the database.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issues, validates, rotates and revokes tokens.
///
/// Constructed once at startup from [`AuthConfig`] and carried in `AppState`;
/// the signing key lives for the process lifetime.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    pbkdf2_iterations: u32,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
            pbkdf2_iterations: config.pbkdf2_iterations,
        }
    }

    pub fn pbkdf2_iterations(&self) -> u32 {
        self.pbkdf2_iterations
    }

    fn encode_token(
        &self,
        user_id: &str,
        typ: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        jti: &str,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            typ: typ.to_string(),
            jti: jti.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    /// Verify credentials and issue a fresh token pair in a new chain.
    pub async fn login(
        &self,
        db: &DbPool,
        username: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(db)
            .await?;

        let user = user.ok_or(AuthError::AuthenticationFailed)?;

        if !crypto::verify_password(password, &user.password_hash) {
            return Err(AuthError::AuthenticationFailed);
        }

        // Garbage-collect this user's expired rows so the table doesn't grow
        // without bound
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ? AND expires_at <= ?")
            .bind(&user.id)
            .bind(Utc::now().to_rfc3339())
            .execute(db)
            .await?;

        let pair = self.issue_pair(db, &user.id).await?;
        Ok((user, pair))
    }

    /// Issue an access/refresh pair in a new chain (login, signup).
    pub async fn issue_pair(&self, db: &DbPool, user_id: &str) -> Result<TokenPair, AuthError> {
        self.issue_pair_in_chain(db, user_id, &Uuid::new_v4().to_string())
            .await
    }

    async fn issue_pair_in_chain(
        &self,
        db: &DbPool,
        user_id: &str,
        chain_id: &str,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();

        let access = self.encode_token(
            user_id,
            TOKEN_TYPE_ACCESS,
            now,
            now + self.access_ttl,
            &Uuid::new_v4().to_string(),
        )?;

        let jti = Uuid::new_v4().to_string();
        let expires_at = now + self.refresh_ttl;
        let refresh = self.encode_token(user_id, TOKEN_TYPE_REFRESH, now, expires_at, &jti)?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, chain_id, issued_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&jti)
        .bind(user_id)
        .bind(hash_token(&refresh))
        .bind(chain_id)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(db)
        .await?;

        Ok(TokenPair { access, refresh })
    }

    /// Rotate a refresh token: revoke the presented one, issue a new pair.
    ///
    /// Replaying a rotated token fails with [`AuthError::TokenReuse`] and
    /// revokes every token in its chain. Two concurrent calls with the same
    /// token are serialized by a conditional update; the loser also observes
    /// `TokenReuse`.
    pub async fn refresh(&self, db: &DbPool, token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode_token(token)?;
        if claims.typ != TOKEN_TYPE_REFRESH {
            return Err(AuthError::TokenInvalid);
        }

        let record: Option<RefreshTokenRecord> =
            sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = ?")
                .bind(hash_token(token))
                .fetch_optional(db)
                .await?;

        let record = record.ok_or(AuthError::TokenInvalid)?;

        if record.revoked {
            return Err(AuthError::TokenInvalid);
        }

        if record.rotated {
            self.revoke_chain(db, &record.chain_id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                chain_id = %record.chain_id,
                "Rotated refresh token replayed; chain revoked"
            );
            return Err(AuthError::TokenReuse);
        }

        // Only one caller can flip rotated 0 -> 1; a concurrent refresh of
        // the same token loses here.
        let result = sqlx::query(
            "UPDATE refresh_tokens SET rotated = 1, rotated_at = ? WHERE id = ? AND rotated = 0 AND revoked = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&record.id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            self.revoke_chain(db, &record.chain_id).await?;
            return Err(AuthError::TokenReuse);
        }

        self.issue_pair_in_chain(db, &record.user_id, &record.chain_id)
            .await
    }

    /// Revoke a refresh token. Idempotent: revoking an unknown or
    /// already-revoked token is not an error.
    pub async fn logout(&self, db: &DbPool, token: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(db)
            .await?;
        Ok(())
    }

    /// Validate an access token and return the user id it was issued for.
    ///
    /// Signature and expiry only; no persistence lookup.
    pub fn validate_access(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.decode_token(token)?;
        if claims.typ != TOKEN_TYPE_ACCESS {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims.sub)
    }

    async fn revoke_chain(&self, db: &DbPool, chain_id: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE chain_id = ?")
            .bind(chain_id)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 30,
            pbkdf2_iterations: 1_000,
        }
    }

    fn service(secret: &str) -> TokenService {
        TokenService::new(&test_config(secret))
    }

    #[test]
    fn test_validate_access_roundtrip() {
        let svc = service("test-secret");
        let now = Utc::now();
        let token = svc
            .encode_token("user-1", TOKEN_TYPE_ACCESS, now, now + Duration::minutes(5), "jti-1")
            .unwrap();
        assert_eq!(svc.validate_access(&token).unwrap(), "user-1");
    }

    #[test]
    fn test_expired_access_token() {
        let svc = service("test-secret");
        let now = Utc::now();
        let token = svc
            .encode_token("user-1", TOKEN_TYPE_ACCESS, now - Duration::minutes(10), now - Duration::minutes(5), "jti-1")
            .unwrap();
        assert!(matches!(
            svc.validate_access(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let svc = service("test-secret");
        assert!(matches!(
            svc.validate_access("not.a.jwt"),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(svc.validate_access(""), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let issuer = service("secret-a");
        let verifier = service("secret-b");
        let now = Utc::now();
        let token = issuer
            .encode_token("user-1", TOKEN_TYPE_ACCESS, now, now + Duration::minutes(5), "jti-1")
            .unwrap();
        assert!(matches!(
            verifier.validate_access(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn test_refresh_token_rejected_on_access_path() {
        // A refresh token must not pass access validation even though the
        // signature is fine
        let svc = service("test-secret");
        let now = Utc::now();
        let token = svc
            .encode_token("user-1", TOKEN_TYPE_REFRESH, now, now + Duration::days(1), "jti-1")
            .unwrap();
        assert!(matches!(
            svc.validate_access(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn test_token_hash_is_stable_and_hex() {
        let h1 = hash_token("some-token");
        let h2 = hash_token("some-token");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("other-token"));
    }
}
