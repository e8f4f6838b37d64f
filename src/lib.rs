pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;

pub use db::DbPool;

use anyhow::Context;
use config::Config;

use crate::auth::{
    AuthGuard, CredentialPolicy, CredentialStore, CsrfService, SessionRegistry, SharedClock,
    TokenService,
};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub clock: SharedClock,
    pub tokens: TokenService,
    pub guard: AuthGuard,
    pub credentials: CredentialStore,
    pub sessions: SessionRegistry,
    pub csrf: CsrfService,
}

impl AppState {
    /// Build the services over one pool and clock.
    ///
    /// `config.auth.jwt_secret` must be set by the caller.
    pub fn new(config: Config, db: DbPool, clock: SharedClock) -> anyhow::Result<Self> {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .context("auth.jwt_secret is not configured")?;
        let tokens = TokenService::new(secret, config.auth.token_ttl_seconds, clock.clone())?;
        let guard = AuthGuard::new(tokens.clone());
        let credentials = CredentialStore::new(
            db.clone(),
            clock.clone(),
            CredentialPolicy::from(&config.auth),
        );
        let sessions =
            SessionRegistry::new(db.clone(), clock.clone(), config.auth.token_ttl_seconds);
        let csrf = CsrfService::new(db.clone(), clock.clone(), config.auth.csrf_ttl_seconds);

        Ok(Self {
            config,
            db,
            clock,
            tokens,
            guard,
            credentials,
            sessions,
            csrf,
        })
    }
}
