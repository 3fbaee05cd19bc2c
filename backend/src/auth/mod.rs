//! Authentication module
//!
//! Password hashing, encrypted session tokens and request admission.

mod jwt;
mod middleware;
mod password;

pub use jwt::{Claims, TokenError, TokenKind, TokenService};
pub use middleware::{authorize, AuthSession, Authorizer, ACCESS_COOKIE, REFRESH_COOKIE};
pub use password::PasswordService;
