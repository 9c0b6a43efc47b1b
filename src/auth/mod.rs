// Authentication module
// Password hashing, JWT issuance, refresh-token sessions and request guards

pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used types
pub use error::AuthError;
pub use middleware::{authenticate, authorize, require_auth, AuthenticatedUser, RequireRole};
pub use models::{ClientInfo, Role};
pub use password::PasswordService;
pub use repository::{PgSessionRepository, PgUserRepository, SessionStore, UserStore};
pub use service::AuthService;
pub use token::TokenService;
