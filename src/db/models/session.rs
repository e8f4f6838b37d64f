//! Session registry rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked session. Only the SHA-256 of the bearer token is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Session view returned to the owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: String,
    pub expires_at: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Whether this is the session the request was made with
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_hash: &str) -> Self {
        Self {
            current: session.token_hash == current_hash,
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        }
    }
}
