//! Persisted refresh token records.
//!
//! Tokens are stored by SHA-256 hash, never in the clear. Rotation marks the
//! presented record `rotated` and inserts its successor with the same
//! `chain_id`, so replay of a rotated token can be detected and the whole
//! login chain revoked.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    /// Record id, equal to the token's `jti` claim
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    /// Login-session lineage; stable across rotations
    pub chain_id: String,
    pub issued_at: String,
    pub expires_at: String,
    pub revoked: bool,
    pub rotated: bool,
    pub rotated_at: Option<String>,
}
