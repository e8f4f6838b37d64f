//! Session registry: tracks issued tokens by hash for revocation and audit.
//!
//! The registry is advisory. Token verification never consults it, so a
//! revoked token stays valid until its own expiry.

use sha2::{Digest, Sha256};

use super::clock::format_timestamp;
use super::error::store_error;
use super::{AuthError, SharedClock};
use crate::db::Session;
use crate::DbPool;

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    db: DbPool,
    clock: SharedClock,
    ttl_seconds: i64,
}

impl SessionRegistry {
    pub fn new(db: DbPool, clock: SharedClock, ttl_seconds: i64) -> Self {
        Self {
            db,
            clock,
            ttl_seconds,
        }
    }

    /// Track a freshly issued token.
    ///
    /// `Conflict` means a live row already carries this hash; issue a new
    /// token and try again.
    pub async fn record(
        &self,
        user_id: &str,
        token: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session, AuthError> {
        let session = self.new_session(user_id, token, ip_address, user_agent);

        insert_session(&self.db, &session)
            .await
            .map_err(|e| store_error("record_session", e))?;

        tracing::debug!(user_id = %user_id, session_id = %session.id, "Session recorded");
        Ok(session)
    }

    /// Forget a token. Returns whether a row was removed; a missing row is not an error.
    pub async fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.db)
            .await
            .map_err(|e| store_error("revoke_session", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace `old_token`'s row with one for `new_token` in a single transaction.
    ///
    /// A missing old row is ignored.
    pub async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        user_id: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session, AuthError> {
        let session = self.new_session(user_id, new_token, ip_address, user_agent);

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| store_error("rotate_session", e))?;

        let removed = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(old_token))
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("rotate_session", e))?
            .rows_affected();

        insert_session(&mut *tx, &session)
            .await
            .map_err(|e| store_error("rotate_session", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("rotate_session", e))?;

        tracing::debug!(
            user_id = %user_id,
            session_id = %session.id,
            replaced = removed > 0,
            "Session rotated"
        );
        Ok(session)
    }

    /// Delete every session of `user_id` except the one for `keep_token`
    pub async fn revoke_all_except(&self, user_id: &str, keep_token: &str) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token_hash != ?")
            .bind(user_id)
            .bind(hash_token(keep_token))
            .execute(&self.db)
            .await
            .map_err(|e| store_error("revoke_other_sessions", e))?;

        Ok(result.rows_affected())
    }

    /// Unexpired sessions of a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, AuthError> {
        sqlx::query_as(
            "SELECT * FROM sessions WHERE user_id = ? AND expires_at > ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .bind(format_timestamp(self.clock.now()))
        .fetch_all(&self.db)
        .await
        .map_err(|e| store_error("list_sessions", e))
    }

    /// Delete rows whose expiry has passed
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(format_timestamp(self.clock.now()))
            .execute(&self.db)
            .await
            .map_err(|e| store_error("purge_sessions", e))?;

        Ok(result.rows_affected())
    }

    fn new_session(
        &self,
        user_id: &str,
        token: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Session {
        let now = self.clock.now();
        Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: hash_token(token),
            expires_at: format_timestamp(now + self.ttl_seconds),
            created_at: format_timestamp(now),
            ip_address: ip_address.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        }
    }
}

async fn insert_session<'e, E>(executor: E, session: &Session) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at, ip_address, user_agent) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.token_hash)
    .bind(&session.expires_at)
    .bind(&session.created_at)
    .bind(&session.ip_address)
    .bind(&session.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use std::sync::Arc;

    const NOW: i64 = 1_704_067_200;

    async fn setup() -> (DbPool, ManualClock, SessionRegistry) {
        let db = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        for (id, name) in [("u1", "alice"), ("u2", "bob")] {
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, 'x', '', '')",
            )
            .bind(id)
            .bind(name)
            .bind(format!("{}@example.com", name))
            .execute(&db)
            .await
            .unwrap();
        }
        let clock = ManualClock::new(NOW);
        let registry = SessionRegistry::new(db.clone(), Arc::new(clock.clone()), 3600);
        (db, clock, registry)
    }

    async fn count(db: &DbPool) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db)
            .await
            .unwrap();
        n
    }

    #[test]
    fn test_hash_token() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("token").len(), 64);
    }

    #[tokio::test]
    async fn test_record_stores_hash_not_token() {
        let (db, _clock, registry) = setup().await;

        let session = registry
            .record("u1", "raw-token", Some("10.0.0.1"), Some("curl/8"))
            .await
            .unwrap();

        assert_eq!(session.token_hash, hash_token("raw-token"));
        assert_eq!(session.expires_at, format_timestamp(NOW + 3600));

        let (stored,): (String,) = sqlx::query_as("SELECT token_hash FROM sessions")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_ne!(stored, "raw-token");
        assert_eq!(stored, hash_token("raw-token"));
    }

    #[tokio::test]
    async fn test_record_duplicate_is_conflict() {
        let (_db, _clock, registry) = setup().await;
        registry.record("u1", "same", None, None).await.unwrap();
        let err = registry.record("u1", "same", None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (db, _clock, registry) = setup().await;
        registry.record("u1", "t1", None, None).await.unwrap();

        assert!(registry.revoke("t1").await.unwrap());
        assert!(!registry.revoke("t1").await.unwrap());
        assert!(!registry.revoke("never-issued").await.unwrap());
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_rotate_replaces_row() {
        let (_db, _clock, registry) = setup().await;
        registry.record("u1", "old", None, None).await.unwrap();

        registry
            .rotate("old", "new", "u1", Some("10.0.0.2"), None)
            .await
            .unwrap();

        let sessions = registry.list_for_user("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token_hash, hash_token("new"));
        assert_eq!(sessions[0].ip_address.as_deref(), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_rotate_without_old_row_still_inserts() {
        let (db, _clock, registry) = setup().await;
        registry
            .rotate("unknown", "fresh", "u1", None, None)
            .await
            .unwrap();
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_revoke_all_except() {
        let (_db, _clock, registry) = setup().await;
        registry.record("u1", "keep", None, None).await.unwrap();
        registry.record("u1", "drop-1", None, None).await.unwrap();
        registry.record("u1", "drop-2", None, None).await.unwrap();
        registry.record("u2", "other-user", None, None).await.unwrap();

        assert_eq!(registry.revoke_all_except("u1", "keep").await.unwrap(), 2);

        let remaining = registry.list_for_user("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token_hash, hash_token("keep"));
        assert_eq!(registry.list_for_user("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_sessions_hidden_and_purged() {
        let (db, clock, registry) = setup().await;
        registry.record("u1", "early", None, None).await.unwrap();
        clock.advance(1800);
        registry.record("u1", "late", None, None).await.unwrap();

        clock.set(NOW + 3600);
        let live = registry.list_for_user("u1").await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token_hash, hash_token("late"));

        assert_eq!(registry.purge_expired().await.unwrap(), 1);
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_sessions_cascade_with_user() {
        let (db, _clock, registry) = setup().await;
        registry.record("u1", "t1", None, None).await.unwrap();
        registry.record("u2", "t2", None, None).await.unwrap();

        sqlx::query("DELETE FROM users WHERE id = 'u1'")
            .execute(&db)
            .await
            .unwrap();

        assert_eq!(count(&db).await, 1);
    }
}
