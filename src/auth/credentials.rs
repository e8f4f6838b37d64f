//! Credential store: user records and password verification.

use super::clock::format_timestamp;
use super::error::store_error;
use super::password::{hash_password_blocking, verify_password_blocking};
use super::validation::{
    non_empty, validate_avatar_url, validate_display_name, validate_email, validate_password,
    validate_role, validate_username, ValidationErrorBuilder,
};
use super::{AuthError, Role, SharedClock};
use crate::config::AuthConfig;
use crate::db::{
    AdminUserUpdate, NewUser, Pagination, ProfileUpdate, PublicUserResponse, User, UserPage,
    UserResponse,
};
use crate::DbPool;

/// Largest page size served by [`CredentialStore::list_users`]
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Length rules for usernames and passwords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    pub password_min_length: usize,
    pub username_min_length: usize,
    pub username_max_length: usize,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            password_min_length: 8,
            username_min_length: 3,
            username_max_length: 50,
        }
    }
}

impl From<&AuthConfig> for CredentialPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            password_min_length: config.password_min_length,
            username_min_length: config.username_min_length,
            username_max_length: config.username_max_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    db: DbPool,
    clock: SharedClock,
    policy: CredentialPolicy,
}

impl CredentialStore {
    pub fn new(db: DbPool, clock: SharedClock, policy: CredentialPolicy) -> Self {
        Self { db, clock, policy }
    }

    /// Register a new account with role `user`.
    ///
    /// Username and email are trimmed; an empty display name falls back to the username.
    pub async fn create_user(&self, input: NewUser) -> Result<User, AuthError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        let display_name =
            non_empty(input.display_name.as_deref()).unwrap_or_else(|| username.clone());

        let mut errors = ValidationErrorBuilder::new();
        errors.check(
            "username",
            validate_username(
                &username,
                self.policy.username_min_length,
                self.policy.username_max_length,
            ),
        );
        errors.check("email", validate_email(&email));
        errors.check("display_name", validate_display_name(&display_name));
        if input.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors.finish()?;
        validate_password(&input.password, self.policy.password_min_length)?;

        let taken: Option<(String, String)> =
            sqlx::query_as("SELECT username, email FROM users WHERE username = ? OR email = ?")
                .bind(&username)
                .bind(&email)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| store_error("create_user", e))?;
        if let Some((existing_username, _)) = taken {
            let message = if existing_username == username {
                "Username already exists"
            } else {
                "Email is already registered"
            };
            return Err(AuthError::Conflict(message.to_string()));
        }

        let password_hash = hash_password_blocking(&input.password).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(self.clock.now());

        // The unique constraints decide races between concurrent registrations
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, display_name, role, created_at, updated_at, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&username)
        .bind(&email)
        .bind(&password_hash)
        .bind(&display_name)
        .bind(Role::User.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await
        .map_err(|e| store_error("create_user", e))?;

        tracing::info!(user_id = %id, username = %username, "User registered");

        self.get_user(&id).await
    }

    /// Look up by username or email and check the password.
    ///
    /// Unknown accounts and wrong passwords both yield `InvalidCredentials`.
    /// A disabled account is refused before its password is looked at.
    pub async fn verify_credentials(&self, login: &str, password: &str) -> Result<User, AuthError> {
        let login = login.trim();
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user: Option<User> =
            sqlx::query_as("SELECT * FROM users WHERE username = ? OR email = ? LIMIT 1")
                .bind(login)
                .bind(login)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| store_error("verify_credentials", e))?;

        let Some(user) = user else {
            tracing::debug!("Login attempt for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login refused: account disabled");
            return Err(AuthError::AccountDisabled);
        }

        if !verify_password_blocking(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Stamp `last_login` after a successful login
    pub async fn record_login(&self, user_id: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(format_timestamp(self.clock.now()))
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| store_error("record_login", e))?;
        Ok(())
    }

    /// Change a password after re-checking the current one
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() {
            return Err(AuthError::invalid_field(
                "current_password",
                "Current password is required",
            ));
        }
        validate_password(new_password, self.policy.password_min_length)?;

        let user = self.get_user(user_id).await?;
        self.check_password(&user, current_password, "change_password")
            .await?;

        let new_hash = hash_password_blocking(new_password).await?;
        self.write_password(user_id, &new_hash).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Partial profile update. A password change also needs the current password.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User, AuthError> {
        let display_name = non_empty(update.display_name.as_deref());
        let avatar_url = non_empty(update.avatar_url.as_deref());
        let new_password = update.new_password.filter(|p| !p.is_empty());

        let mut errors = ValidationErrorBuilder::new();
        if let Some(name) = &display_name {
            errors.check("display_name", validate_display_name(name));
        }
        if let Some(url) = &avatar_url {
            errors.check("avatar_url", validate_avatar_url(url));
        }
        let current_password = update.current_password.unwrap_or_default();
        if new_password.is_some() && current_password.is_empty() {
            errors.add("current_password", "Current password is required to set a new password");
        }
        errors.finish()?;
        if let Some(password) = &new_password {
            validate_password(password, self.policy.password_min_length)?;
        }

        let user = self.get_user(user_id).await?;

        let password_hash = match &new_password {
            Some(password) => {
                self.check_password(&user, &current_password, "update_profile")
                    .await?;
                Some(hash_password_blocking(password).await?)
            }
            None => None,
        };

        if display_name.is_none() && avatar_url.is_none() && password_hash.is_none() {
            return Ok(user);
        }

        sqlx::query(
            "UPDATE users SET display_name = COALESCE(?, display_name), avatar_url = COALESCE(?, avatar_url), password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?",
        )
        .bind(&display_name)
        .bind(&avatar_url)
        .bind(&password_hash)
        .bind(format_timestamp(self.clock.now()))
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| store_error("update_profile", e))?;

        tracing::info!(
            user_id = %user_id,
            password_changed = password_hash.is_some(),
            "Profile updated"
        );

        self.get_user(user_id).await
    }

    /// Delete an account after confirming its password. Sessions and CSRF
    /// tokens go with it through the foreign keys.
    pub async fn delete_user(&self, user_id: &str, password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::invalid_field("password", "Password is required"));
        }

        let user = self.get_user(user_id).await?;
        self.check_password(&user, password, "delete_user").await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| store_error("delete_user", e))?;

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Privileged update of display name, role and active flag; no password check
    pub async fn admin_update_user(
        &self,
        user_id: &str,
        update: AdminUserUpdate,
    ) -> Result<User, AuthError> {
        if update.is_empty() {
            return Err(AuthError::invalid_field("fields", "No fields to update"));
        }

        let mut errors = ValidationErrorBuilder::new();
        let role = match update.role.as_deref() {
            Some(role) => match validate_role(role) {
                Ok(role) => Some(role),
                Err(message) => {
                    errors.add("role", message);
                    None
                }
            },
            None => None,
        };
        let display_name = update.display_name.as_deref().map(str::trim);
        if let Some(name) = display_name {
            errors.check("display_name", validate_display_name(name));
        }
        errors.finish()?;

        let result = sqlx::query(
            "UPDATE users SET display_name = COALESCE(?, display_name), role = COALESCE(?, role), is_active = COALESCE(?, is_active), updated_at = ? WHERE id = ?",
        )
        .bind(display_name)
        .bind(role.map(Role::as_str))
        .bind(update.is_active)
        .bind(format_timestamp(self.clock.now()))
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| store_error("admin_update_user", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User"));
        }

        tracing::info!(
            user_id = %user_id,
            role = ?role,
            is_active = ?update.is_active,
            "User updated by administrator"
        );

        self.get_user(user_id).await
    }

    /// Full record for any account
    pub async fn get_user(&self, user_id: &str) -> Result<User, AuthError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| store_error("get_user", e))?;

        user.ok_or(AuthError::NotFound("User"))
    }

    /// Public view of an active account; disabled accounts look absent
    pub async fn get_public_user(&self, user_id: &str) -> Result<PublicUserResponse, AuthError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ? AND is_active = 1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| store_error("get_public_user", e))?;

        user.map(PublicUserResponse::from)
            .ok_or(AuthError::NotFound("User"))
    }

    /// Newest accounts first. `page` starts at 1; `limit` is clamped to 1..=100.
    pub async fn list_users(&self, page: Option<i64>, limit: Option<i64>) -> Result<UserPage, AuthError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(limit);

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .map_err(|e| store_error("list_users", e))?;

        let users: Vec<User> = sqlx::query_as(
            "SELECT * FROM users ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| store_error("list_users", e))?;

        Ok(UserPage {
            users: users.into_iter().map(UserResponse::from).collect(),
            pagination: Pagination::new(page, limit, total),
        })
    }

    async fn check_password(
        &self,
        user: &User,
        password: &str,
        operation: &'static str,
    ) -> Result<(), AuthError> {
        if verify_password_blocking(password, &user.password_hash).await? {
            Ok(())
        } else {
            tracing::warn!(user_id = %user.id, operation, "Password check failed");
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn write_password(&self, user_id: &str, password_hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(format_timestamp(self.clock.now()))
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| store_error("change_password", e))?;
        Ok(())
    }
}
