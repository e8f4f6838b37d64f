//! Authentication and session core.
//!
//! Token construction and verification, the session registry, CSRF nonces,
//! password credentials and the role guard. Nothing in here knows about HTTP
//! status codes; the `api` layer maps [`AuthError`] onto responses.

pub mod clock;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod guard;
pub mod password;
pub mod role;
pub mod sessions;
pub mod token;
pub mod validation;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use credentials::{CredentialPolicy, CredentialStore};
pub use csrf::CsrfService;
pub use error::{AuthError, TokenError};
pub use guard::AuthGuard;
pub use role::Role;
pub use sessions::{hash_token, SessionRegistry};
pub use token::{SessionClaims, TokenService};
