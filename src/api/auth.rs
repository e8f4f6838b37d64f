//! Authentication endpoints and request extractors.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::guard::bearer_token;
use crate::auth::{AuthError, SessionClaims};
use crate::db::{NewUser, UserResponse};
use crate::AppState;

/// Verified caller identity plus the raw bearer it was proven with
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: SessionClaims,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = state.guard.require_auth(&parts.headers)?;
        let token = bearer_token(&parts.headers).ok_or(AuthError::Unauthorized)?;
        Ok(Self {
            claims,
            token: token.to_string(),
        })
    }
}

/// Where a request came from, for the session registry
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn ip(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self {
            ip_address: client_ip(&parts.headers, peer).map(|ip| ip.to_string()),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.chars().take(512).collect()),
        })
    }
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip_str) = value.split(',').next() {
                if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    peer
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    #[serde(default, alias = "email", alias = "login")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response for register, login and refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
    pub expires_at: String,
}

/// Register a new account and sign it in
pub async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(request) = payload?;

    let user = state.credentials.create_user(request).await?;
    let token = state.tokens.issue(&user.id, &user.username, &user.role);
    state
        .sessions
        .record(&user.id, &token, client.ip(), client.user_agent())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Registration successful".to_string(),
            user: UserResponse::from(user),
            token,
            expires_in: state.tokens.ttl_seconds(),
        }),
    ))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = payload?;

    let user = state
        .credentials
        .verify_credentials(&request.username, &request.password)
        .await?;

    let token = state.tokens.issue(&user.id, &user.username, &user.role);
    state
        .sessions
        .record(&user.id, &token, client.ip(), client.user_agent())
        .await?;
    state.credentials.record_login(&user.id).await?;

    tracing::info!(user_id = %user.id, ip = ?client.ip(), "User logged in");

    let user = state.credentials.get_user(&user.id).await?;
    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
        expires_in: state.tokens.ttl_seconds(),
    }))
}

/// Drop the presented token's session row. Works without a valid token.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        if state.sessions.revoke(token).await? {
            tracing::debug!("Session revoked on logout");
        }
    }

    Ok(Json(MessageResponse::new("Logged out")))
}

/// Swap the caller's token for a fresh one carrying current username and role
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    auth: AuthUser,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.credentials.get_user(&auth.claims.sub).await?;
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let token = state.tokens.issue(&user.id, &user.username, &user.role);
    state
        .sessions
        .rotate(
            &auth.token,
            &token,
            &user.id,
            client.ip(),
            client.user_agent(),
        )
        .await?;

    tracing::info!(user_id = %user.id, "Token refreshed");

    Ok(Json(AuthResponse {
        message: "Token refreshed".to_string(),
        user: UserResponse::from(user),
        token,
        expires_in: state.tokens.ttl_seconds(),
    }))
}

/// Issue a CSRF token, bound to the caller when a valid bearer is presented
pub async fn csrf_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CsrfResponse>, ApiError> {
    let caller = state.guard.current_user(&headers);
    let issued = state
        .csrf
        .issue(caller.as_ref().map(|c| c.sub.as_str()))
        .await?;

    Ok(Json(CsrfResponse {
        csrf_token: issued.token,
        expires_at: issued.expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let peer: Option<IpAddr> = Some("192.168.1.9".parse().unwrap());
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&map, peer), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_falls_back() {
        let peer: Option<IpAddr> = Some("192.168.1.9".parse().unwrap());

        let map = headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&map, peer), Some("198.51.100.2".parse().unwrap()));

        assert_eq!(client_ip(&HeaderMap::new(), peer), peer);
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_login_request_accepts_email_alias() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"alice@example.com","password":"pw"}"#).unwrap();
        assert_eq!(request.username, "alice@example.com");

        let request: LoginRequest = serde_json::from_str(r#"{"password":"pw"}"#).unwrap();
        assert!(request.username.is_empty());
    }
}
