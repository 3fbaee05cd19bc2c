//! Business logic services
//!
//! Services encapsulate business logic and coordinate between
//! stores, the password hasher, the token service and the notifier.

pub mod access;
pub mod auth;
pub mod member;

pub use auth::AuthService;
pub use member::MemberService;

use rand::{distributions::Alphanumeric, Rng};
use rolegate_shared::TOKEN_LEN;

/// Random URL-safe token for verification and reset links
pub(crate) fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
