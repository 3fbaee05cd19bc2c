//! Rolegate Shared Library
//!
//! Data model, request/response types and the attribute validation engine
//! used by the backend and its tests.

pub mod errors;
pub mod models;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use models::*;
pub use types::*;
