//! Startup configuration.
//!
//! Only the settings that must be known before the store opens live here
//! (listen address, media root, database path, logging). Everything else is
//! runtime-mutable and lives in the settings table (see `store::settings`).

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_str};
pub use types::{
    AuthConfig, Config, DatabaseConfig, LogConfig, MediaConfig, SanitizedConfig, ServerConfig,
};
pub use validate::validate_config;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
