//! Authorization guard: bearer extraction, authentication and role checks.

use axum::http::{header, HeaderMap};

use super::{AuthError, Role, SessionClaims, TokenService};

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively and may be followed by any run
/// of whitespace; anything else yields `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(|c: char| c.is_ascii_whitespace())?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[derive(Debug, Clone)]
pub struct AuthGuard {
    tokens: TokenService,
}

impl AuthGuard {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// Claims of the caller, or `None` when no valid token is presented
    pub fn current_user(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = bearer_token(headers)?;
        match self.tokens.verify(token) {
            Ok(claims) => Some(claims),
            Err(reason) => {
                tracing::debug!(%reason, "Rejected bearer token");
                None
            }
        }
    }

    pub fn require_auth(&self, headers: &HeaderMap) -> Result<SessionClaims, AuthError> {
        self.current_user(headers).ok_or(AuthError::Unauthorized)
    }

    /// Authenticate, then check the caller's role level against `required`
    pub fn require_role(
        &self,
        headers: &HeaderMap,
        required: Role,
    ) -> Result<SessionClaims, AuthError> {
        let claims = self.require_auth(headers)?;
        check_role(&claims, required)?;
        Ok(claims)
    }
}

/// Role check on already verified claims. Unknown role names rank below `user`.
pub fn check_role(claims: &SessionClaims, required: Role) -> Result<(), AuthError> {
    if Role::satisfies(&claims.role, required) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %claims.sub,
            role = %claims.role,
            required = %required,
            "Insufficient role"
        );
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use axum::http::HeaderValue;
    use std::sync::Arc;

    const NOW: i64 = 1_704_067_200;

    fn guard(clock: &ManualClock) -> (AuthGuard, TokenService) {
        let tokens = TokenService::new("guard-test-secret", 3600, Arc::new(clock.clone())).unwrap();
        (AuthGuard::new(tokens.clone()), tokens)
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers_with("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("BEARER abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Bearer\tabc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Bearer   abc  ")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Bearer \t abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_require_auth() {
        let clock = ManualClock::new(NOW);
        let (guard, tokens) = guard(&clock);

        assert!(matches!(
            guard.require_auth(&HeaderMap::new()),
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            guard.require_auth(&headers_with("Bearer garbage")),
            Err(AuthError::Unauthorized)
        ));

        let token = tokens.issue("u1", "alice", "user");
        let claims = guard
            .require_auth(&headers_with(&format!("Bearer {}", token)))
            .unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_expired_token_is_anonymous() {
        let clock = ManualClock::new(NOW);
        let (guard, tokens) = guard(&clock);
        let headers = headers_with(&format!("Bearer {}", tokens.issue("u1", "alice", "user")));

        clock.advance(3600);
        assert!(guard.current_user(&headers).is_none());
    }

    #[test]
    fn test_require_role_hierarchy() {
        let clock = ManualClock::new(NOW);
        let (guard, tokens) = guard(&clock);
        let as_role =
            |role: &str| headers_with(&format!("Bearer {}", tokens.issue("u1", "alice", role)));

        assert!(guard.require_role(&as_role("user"), Role::User).is_ok());
        assert!(matches!(
            guard.require_role(&as_role("user"), Role::Moderator),
            Err(AuthError::Forbidden)
        ));
        assert!(guard.require_role(&as_role("moderator"), Role::Moderator).is_ok());
        assert!(matches!(
            guard.require_role(&as_role("moderator"), Role::Admin),
            Err(AuthError::Forbidden)
        ));
        assert!(guard.require_role(&as_role("admin"), Role::Moderator).is_ok());
        assert!(guard.require_role(&as_role("admin"), Role::Admin).is_ok());
        assert!(matches!(
            guard.require_role(&as_role("superuser"), Role::User),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn test_require_role_without_token_is_unauthorized() {
        let clock = ManualClock::new(NOW);
        let (guard, _tokens) = guard(&clock);
        assert!(matches!(
            guard.require_role(&HeaderMap::new(), Role::Admin),
            Err(AuthError::Unauthorized)
        ));
    }
}
