//! Account endpoints under `/api/user`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{AuthUser, MessageResponse};
use super::error::ApiError;
use crate::auth::guard::check_role;
use crate::auth::{hash_token, Role};
use crate::db::{
    AdminUserUpdate, ProfileUpdate, PublicUserResponse, SessionResponse, UserPage, UserResponse,
};
use crate::AppState;

/// Header carrying a CSRF token on mutating requests
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(flatten)]
    pub update: ProfileUpdate,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateRequest {
    #[serde(flatten)]
    pub update: AdminUserUpdate,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEnvelope<T> {
    pub message: String,
    pub user: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordChangedResponse {
    pub message: String,
    pub revoked_sessions: u64,
}

/// Consume a CSRF token when the deployment requires one.
///
/// The header wins over the body field. Tokens bound to another user are refused.
async fn enforce_csrf(
    state: &AppState,
    headers: &HeaderMap,
    auth: &AuthUser,
    body_token: Option<&str>,
) -> Result<(), ApiError> {
    if !state.config.auth.require_csrf {
        return Ok(());
    }

    let token = headers
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .or(body_token)
        .unwrap_or_default();

    if state.csrf.consume_for_user(token, &auth.claims.sub).await? {
        Ok(())
    } else {
        tracing::warn!(user_id = %auth.claims.sub, "CSRF check failed");
        Err(ApiError::csrf_failed())
    }
}

/// Profile of the caller
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.credentials.get_user(&auth.claims.sub).await?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope<UserResponse>>, ApiError> {
    let Json(request) = payload?;
    enforce_csrf(&state, &headers, &auth, request.csrf_token.as_deref()).await?;

    let password_changed = request
        .update
        .new_password
        .as_deref()
        .is_some_and(|p| !p.is_empty());

    let user = state
        .credentials
        .update_profile(&auth.claims.sub, request.update)
        .await?;

    // A password set here signs out other sessions just like /password does
    if password_changed {
        let revoked = state
            .sessions
            .revoke_all_except(&auth.claims.sub, &auth.token)
            .await?;
        tracing::info!(user_id = %auth.claims.sub, revoked, "Other sessions revoked after password change");
    }

    Ok(Json(UserEnvelope {
        message: "Profile updated".to_string(),
        user: UserResponse::from(user),
    }))
}

/// Change the caller's password and sign out every other session
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<PasswordChangedResponse>, ApiError> {
    let Json(request) = payload?;
    enforce_csrf(&state, &headers, &auth, request.csrf_token.as_deref()).await?;

    state
        .credentials
        .change_password(
            &auth.claims.sub,
            &request.current_password,
            &request.new_password,
        )
        .await?;

    let revoked = state
        .sessions
        .revoke_all_except(&auth.claims.sub, &auth.token)
        .await?;

    tracing::info!(user_id = %auth.claims.sub, revoked, "Other sessions revoked after password change");

    Ok(Json(PasswordChangedResponse {
        message: "Password changed".to_string(),
        revoked_sessions: revoked,
    }))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: AuthUser,
    payload: Result<Json<DeleteAccountRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    enforce_csrf(&state, &headers, &auth, request.csrf_token.as_deref()).await?;

    state
        .credentials
        .delete_user(&auth.claims.sub, &request.password)
        .await?;

    Ok(Json(MessageResponse::new("Account deleted")))
}

/// Live sessions of the caller; the one used for this request is flagged
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let current = hash_token(&auth.token);
    let sessions = state.sessions.list_for_user(&auth.claims.sub).await?;

    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionResponse::from_session(s, &current))
            .collect(),
    ))
}

/// Paginated user listing (moderator+)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<UserPage>, ApiError> {
    check_role(&auth.claims, Role::Moderator)?;

    let page = state.credentials.list_users(query.page, query.limit).await?;
    Ok(Json(page))
}

/// Public profile of an active account
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PublicUserResponse>, ApiError> {
    let user = state.credentials.get_public_user(&id).await?;
    Ok(Json(user))
}

/// Administrative update of role, active flag or display name (admin)
pub async fn admin_update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<AdminUpdateRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope<UserResponse>>, ApiError> {
    check_role(&auth.claims, Role::Admin)?;
    let Json(request) = payload?;
    enforce_csrf(&state, &headers, &auth, request.csrf_token.as_deref()).await?;

    let user = state.credentials.admin_update_user(&id, request.update).await?;

    tracing::info!(admin_id = %auth.claims.sub, user_id = %id, "Administrative user update");

    Ok(Json(UserEnvelope {
        message: "User updated".to_string(),
        user: UserResponse::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_request_flattens() {
        let request: UpdateProfileRequest = serde_json::from_str(
            r#"{"display_name":"Alice","csrf_token":"abc","new_password":"newpassword456"}"#,
        )
        .unwrap();
        assert_eq!(request.update.display_name.as_deref(), Some("Alice"));
        assert_eq!(request.update.new_password.as_deref(), Some("newpassword456"));
        assert_eq!(request.csrf_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_admin_request_flattens() {
        let request: AdminUpdateRequest =
            serde_json::from_str(r#"{"role":"admin","is_active":false}"#).unwrap();
        assert_eq!(request.update.role.as_deref(), Some("admin"));
        assert_eq!(request.update.is_active, Some(false));
        assert!(request.csrf_token.is_none());

        let empty: AdminUpdateRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.update.is_empty());
    }
}
