//! Anti-forgery nonce rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CsrfToken {
    pub id: String,
    pub token: String,
    pub user_id: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}
