//! Error handling
//!
//! Defines error types and handling for startup and sessions.

pub mod handlers;
pub mod types;

pub use types::*;
