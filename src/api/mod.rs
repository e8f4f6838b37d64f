pub mod auth;
pub mod error;
mod system;
mod users;

pub use error::{ApiError, ErrorCode};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public; refresh checks its own bearer)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/refresh", post(auth::refresh))
        .route("/csrf", get(auth::csrf_token));

    // Account routes; every handler takes the `AuthUser` extractor
    let user_routes = Router::new()
        .route("/profile", get(users::get_profile))
        .route("/profile", put(users::update_profile))
        .route("/password", post(users::change_password))
        .route("/delete", delete(users::delete_account))
        .route("/sessions", get(users::list_sessions))
        .route("/list", get(users::list_users))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::admin_update_user));

    Router::new()
        .route("/api", get(system::index))
        .route("/api/health", get(system::health))
        .route("/api/info", get(system::info))
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
