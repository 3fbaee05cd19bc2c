//! Rolegate Backend Library
//!
//! Identity, session token and route authorization service. The modules are
//! exposed for the binary and the integration tests.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod notifier;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
