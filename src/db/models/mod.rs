//! Database models split into domain-specific modules.

pub mod csrf;
pub mod session;
pub mod user;

pub use csrf::*;
pub use session::*;
pub use user::*;
