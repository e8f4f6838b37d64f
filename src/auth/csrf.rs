//! One-time anti-forgery tokens.

use rand::Rng;

use super::clock::format_timestamp;
use super::error::store_error;
use super::{AuthError, SharedClock};
use crate::db::CsrfToken;
use crate::DbPool;

/// Generate a random token: 32 bytes from the OS-seeded CSPRNG, hex encoded
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct CsrfService {
    db: DbPool,
    clock: SharedClock,
    ttl_seconds: i64,
}

impl CsrfService {
    pub fn new(db: DbPool, clock: SharedClock, ttl_seconds: i64) -> Self {
        Self {
            db,
            clock,
            ttl_seconds,
        }
    }

    /// Issue a token, optionally bound to a user.
    ///
    /// A binding to a user that no longer exists is dropped rather than
    /// failing the foreign key.
    pub async fn issue(&self, user_id: Option<&str>) -> Result<CsrfToken, AuthError> {
        let now = self.clock.now();
        let id = uuid::Uuid::new_v4().to_string();
        let token = generate_token();
        let created_at = format_timestamp(now);
        let expires_at = format_timestamp(now + self.ttl_seconds);

        sqlx::query(
            "INSERT INTO csrf_tokens (id, token, user_id, created_at, expires_at) VALUES (?, ?, (SELECT id FROM users WHERE id = ?), ?, ?)",
        )
        .bind(&id)
        .bind(&token)
        .bind(user_id)
        .bind(&created_at)
        .bind(&expires_at)
        .execute(&self.db)
        .await
        .map_err(|e| store_error("issue_csrf_token", e))?;

        let row: CsrfToken = sqlx::query_as("SELECT * FROM csrf_tokens WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.db)
            .await
            .map_err(|e| store_error("issue_csrf_token", e))?;

        Ok(row)
    }

    /// Consume a token. Succeeds at most once per token, and only before expiry.
    pub async fn consume(&self, token: &str) -> Result<bool, AuthError> {
        if token.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query("DELETE FROM csrf_tokens WHERE token = ? AND expires_at > ?")
            .bind(token)
            .bind(format_timestamp(self.clock.now()))
            .execute(&self.db)
            .await
            .map_err(|e| store_error("consume_csrf_token", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Like [`consume`](Self::consume), but a token bound to a user is only
    /// accepted from that user. Anonymous tokens are accepted from anyone.
    pub async fn consume_for_user(&self, token: &str, user_id: &str) -> Result<bool, AuthError> {
        if token.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(
            "DELETE FROM csrf_tokens WHERE token = ? AND expires_at > ? AND (user_id IS NULL OR user_id = ?)",
        )
        .bind(token)
        .bind(format_timestamp(self.clock.now()))
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| store_error("consume_csrf_token", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete tokens whose expiry has passed
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM csrf_tokens WHERE expires_at <= ?")
            .bind(format_timestamp(self.clock.now()))
            .execute(&self.db)
            .await
            .map_err(|e| store_error("purge_csrf_tokens", e))?;

        Ok(result.rows_affected())
    }
}
