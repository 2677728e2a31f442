//! Core types for the Gravitation protocol.
//!
//! This crate defines the shared data model (profiles, orbit bodies) and the
//! node configuration used by the wire engine and the CLI. It contains no
//! business logic.

pub mod body;
pub mod config;
pub mod error;

pub use body::{Body, Profile};
pub use config::GravitationConfig;
pub use error::{ConfigError, ConfigResult};
