//! Project Configuration (mongotest.toml)
//!
//! Handles per-repository settings stored in `mongotest.toml`.

use crate::global::{AuthConfig, BinariesConfig, CiConfig};
use crate::{validate_topology, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from mongotest.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Run defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerConfig>,

    /// Server and shell executables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binaries: Option<BinariesConfig>,

    /// Test database and data directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    /// Root user for the auth topology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    /// Host runtime version used by `requires.host`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostConfig>,

    /// CI detection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiConfig>,

    /// Teardown timing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleConfig>,
}

/// Run defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Topology tag (single, replicaset, sharded, auth)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<String>,

    /// Per-test timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Default test path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<PathBuf>,

    /// Use an already running topology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_startup: Option<bool>,

    /// Let every `requires.mongodb` test through without probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_version_check: Option<bool>,
}

/// Test database settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database dropped before the run (default: integration_tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Root of per-port data directories (default: db)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Bind and connect host (default: localhost)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Host runtime version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Command printing the version, e.g. `["node", "--version"]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_command: Option<Vec<String>>,
}

/// Teardown timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Graceful stop window before processes are killed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace_ms: Option<u64>,

    /// Upper bound on the whole teardown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout_ms: Option<u64>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(runner) = &self.runner {
            if let Some(topology) = &runner.topology {
                validate_topology(topology)?;
            }
            validate_positive("runner.timeout_ms", runner.timeout_ms)?;
        }

        if let Some(host) = &self.host {
            if host.version.is_some() && host.version_command.is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "host".to_string(),
                    reason: "set either 'version' or 'version_command', not both".to_string(),
                });
            }
            if let Some(version) = &host.version {
                semver::Version::parse(version).map_err(|e| ConfigError::InvalidValue {
                    field: "host.version".to_string(),
                    reason: format!("'{}' is not a version: {}", version, e),
                })?;
            }
            if host.version_command.as_ref().is_some_and(|c| c.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "host.version_command".to_string(),
                    reason: "command cannot be empty".to_string(),
                });
            }
        }

        if let Some(database) = &self.database {
            if database.name.as_deref() == Some("") {
                return Err(ConfigError::InvalidValue {
                    field: "database.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        if let Some(lifecycle) = &self.lifecycle {
            validate_positive("lifecycle.stop_grace_ms", lifecycle.stop_grace_ms)?;
            validate_positive("lifecycle.stop_timeout_ms", lifecycle.stop_timeout_ms)?;
        }

        Ok(())
    }

    pub fn topology(&self) -> Option<&str> {
        self.runner.as_ref().and_then(|r| r.topology.as_deref())
    }

    /// Runner section, created on first write
    pub fn runner_mut(&mut self) -> &mut RunnerConfig {
        self.runner.get_or_insert_with(RunnerConfig::default)
    }

    pub fn binaries_mut(&mut self) -> &mut BinariesConfig {
        self.binaries.get_or_insert_with(BinariesConfig::default)
    }

    pub fn database_mut(&mut self) -> &mut DatabaseConfig {
        self.database.get_or_insert_with(DatabaseConfig::default)
    }
}

fn validate_positive(field: &str, value: Option<u64>) -> ConfigResult<()> {
    if value == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
