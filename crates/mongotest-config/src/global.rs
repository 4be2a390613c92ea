//! Global Configuration (~/.mongotest/config.toml)
//!
//! Machine-wide defaults: where the binaries live, the root user, and which
//! variables mark a CI run.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.mongotest/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binaries: Option<BinariesConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiConfig>,
}

/// Server and shell executables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BinariesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongod: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongos: Option<PathBuf>,

    /// MongoDB shell used for admin commands (default: mongosh)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<PathBuf>,
}

/// Root user created for the auth topology
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// CI detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CiConfig {
    /// Environment variables whose presence marks a CI run
    pub markers: Vec<String>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(auth) = &self.auth {
            if auth.username.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "auth.username".to_string(),
                    reason: "username cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.mongotest/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".mongotest").join("config.toml"))
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.binaries.is_some() {
            self.binaries = other.binaries.clone();
        }
        if other.auth.is_some() {
            self.auth = other.auth.clone();
        }
        if other.ci.is_some() {
            self.ci = other.ci.clone();
        }
    }
}
