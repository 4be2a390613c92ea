//! mongotest configuration
//!
//! Provides layered configuration for the runner:
//! - Project configuration (mongotest.toml)
//! - Global user configuration (~/.mongotest/config.toml)
//! - Environment variable overrides (MONGOTEST_*)
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Global config (~/.mongotest/config.toml)
//! 2. Project config (./mongotest.toml, searched upwards)
//! 3. Environment variables (MONGOTEST_*)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use mongotest_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("topology: {}", config.topology());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Topology tags accepted anywhere a topology is configured
pub const TOPOLOGY_TAGS: [&str; 4] = ["single", "replicaset", "sharded", "auth"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown topology '{0}', expected one of: single, replicaset, sharded, auth")]
    UnknownTopology(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader, HostVersionSetting};
pub use project::ProjectConfig;

/// Check that `tag` names a known topology
pub fn validate_topology(tag: &str) -> ConfigResult<()> {
    if TOPOLOGY_TAGS.contains(&tag) {
        Ok(())
    } else {
        Err(ConfigError::UnknownTopology(tag.to_string()))
    }
}
