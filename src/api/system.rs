//! Service-level endpoints: index, health and caller info.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::clock::format_timestamp;
use crate::AppState;

use super::error::ApiError;

pub const SERVICE_NAME: &str = "xiaokangOS";

#[derive(Debug, Clone, Serialize)]
pub struct ServiceIndex {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub database: &'static str,
}

/// Caller identity as asserted by the presented token
#[derive(Debug, Clone, Serialize)]
pub struct CallerInfo {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub server_time: String,
    pub token_ttl_seconds: i64,
    pub csrf_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerInfo>,
}

/// GET /api
pub async fn index() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /api/health",
            "GET /api/info",
            "POST /api/auth/register",
            "POST /api/auth/login",
            "POST /api/auth/logout",
            "POST /api/auth/refresh",
            "GET /api/auth/csrf",
            "GET /api/user/profile",
            "PUT /api/user/profile",
            "POST /api/user/password",
            "DELETE /api/user/delete",
            "GET /api/user/sessions",
            "GET /api/user/list",
            "GET /api/user/:id",
            "PUT /api/user/:id",
        ],
    })
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Health check query failed");
            ApiError::service_unavailable("Database unavailable")
        })?;

    Ok(Json(HealthResponse {
        status: "healthy",
        timestamp: format_timestamp(state.clock.now()),
        database: "connected",
    }))
}

/// GET /api/info
pub async fn info(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<InfoResponse> {
    let caller = state.guard.current_user(&headers).map(|claims| CallerInfo {
        expires_at: format_timestamp(claims.exp),
        user_id: claims.sub,
        username: claims.username,
        role: claims.role,
    });

    Json(InfoResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        server_time: format_timestamp(state.clock.now()),
        token_ttl_seconds: state.tokens.ttl_seconds(),
        csrf_required: state.config.auth.require_csrf,
        caller,
    })
}
