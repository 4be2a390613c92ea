//! Configuration Loader
//!
//! Loads configuration from multiple sources and resolves effective values.

use crate::global::GlobalConfig;
use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult};
use semver::Version;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project configuration file name
pub const CONFIG_FILE: &str = "mongotest.toml";

const DEFAULT_TOPOLOGY: &str = "single";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_STOP_GRACE_MS: u64 = 10_000;
const DEFAULT_STOP_TIMEOUT_MS: u64 = 30_000;

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Global config (~/.mongotest/config.toml)
/// 2. Project config (mongotest.toml)
/// 3. Environment variables (MONGOTEST_*)
/// 4. CLI flags (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    /// Directory holding mongotest.toml, if one was found
    pub project_root: Option<PathBuf>,
}

/// Where the host runtime version comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostVersionSetting {
    /// Not configured; host requirements cannot be checked
    Unconfigured,
    Fixed(Version),
    Command(Vec<String>),
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.mongotest/config.toml
    pub fn with_global_config(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Walk up from `start_dir` to find mongotest.toml, then layer global
    /// config and environment overrides around it
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root: config_path.parent().map(Path::to_path_buf),
        })
    }

    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Global config is optional; a missing home directory or file yields
    /// defaults, but a file that exists must parse
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        if self.global_config_path.is_none() {
            match GlobalConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => GlobalConfig::load_from_file(path),
            _ => Ok(GlobalConfig::default()),
        }
    }

    /// Apply MONGOTEST_* environment variables to the project config
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(topology) = env::var("MONGOTEST_TOPOLOGY") {
            config.runner_mut().topology = Some(topology);
        }

        if let Ok(timeout) = env::var("MONGOTEST_TIMEOUT_MS") {
            let timeout = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "MONGOTEST_TIMEOUT_MS".to_string(),
                    reason: format!("'{}' is not a number of milliseconds", timeout),
                })?;
            config.runner_mut().timeout_ms = Some(timeout);
        }

        if let Ok(skip) = env::var("MONGOTEST_SKIP_STARTUP") {
            config.runner_mut().skip_startup = Some(is_truthy(&skip));
        }

        if let Some(mongod) = env::var_os("MONGOTEST_MONGOD") {
            config.binaries_mut().mongod = Some(PathBuf::from(mongod));
        }
        if let Some(mongos) = env::var_os("MONGOTEST_MONGOS") {
            config.binaries_mut().mongos = Some(PathBuf::from(mongos));
        }
        if let Some(shell) = env::var_os("MONGOTEST_SHELL") {
            config.binaries_mut().shell = Some(PathBuf::from(shell));
        }

        if let Some(data_dir) = env::var_os("MONGOTEST_DATA_DIR") {
            config.database_mut().data_dir = Some(PathBuf::from(data_dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration directory (~/.mongotest)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".mongotest"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a mongotest.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    pub fn topology(&self) -> &str {
        self.project.topology().unwrap_or(DEFAULT_TOPOLOGY)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(
            self.project
                .runner
                .as_ref()
                .and_then(|r| r.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        )
    }

    /// Default test path, relative to the project root
    pub fn tests_path(&self) -> Option<PathBuf> {
        let tests = self.project.runner.as_ref()?.tests.as_ref()?;
        Some(match &self.project_root {
            Some(root) if tests.is_relative() => root.join(tests),
            _ => tests.clone(),
        })
    }

    pub fn skip_startup(&self) -> bool {
        self.project
            .runner
            .as_ref()
            .and_then(|r| r.skip_startup)
            .unwrap_or(false)
    }

    pub fn skip_version_check(&self) -> bool {
        self.project
            .runner
            .as_ref()
            .and_then(|r| r.skip_version_check)
            .unwrap_or(false)
    }

    pub fn mongod(&self) -> PathBuf {
        self.binary(|b| b.mongod.as_ref(), "mongod")
    }

    pub fn mongos(&self) -> PathBuf {
        self.binary(|b| b.mongos.as_ref(), "mongos")
    }

    pub fn shell(&self) -> PathBuf {
        self.binary(|b| b.shell.as_ref(), "mongosh")
    }

    /// Project value, else global value, else the bare program name
    fn binary(
        &self,
        field: impl Fn(&crate::global::BinariesConfig) -> Option<&PathBuf>,
        default: &str,
    ) -> PathBuf {
        self.project
            .binaries
            .as_ref()
            .and_then(&field)
            .or_else(|| self.global.binaries.as_ref().and_then(&field))
            .cloned()
            .unwrap_or_else(|| PathBuf::from(default))
    }

    pub fn database_name(&self) -> &str {
        self.project
            .database
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .unwrap_or("integration_tests")
    }

    pub fn host(&self) -> &str {
        self.project
            .database
            .as_ref()
            .and_then(|d| d.host.as_deref())
            .unwrap_or("localhost")
    }

    /// Data directory root, relative to the project root
    pub fn data_dir(&self) -> PathBuf {
        let dir = self
            .project
            .database
            .as_ref()
            .and_then(|d| d.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from("db"));
        match &self.project_root {
            Some(root) if dir.is_relative() => root.join(dir),
            _ => dir,
        }
    }

    /// Root user for the auth topology as (username, password)
    pub fn credentials(&self) -> (&str, &str) {
        self.project
            .auth
            .as_ref()
            .or(self.global.auth.as_ref())
            .map(|a| (a.username.as_str(), a.password.as_str()))
            .unwrap_or(("root", "root"))
    }

    /// CI marker variables, if configured anywhere
    pub fn ci_markers(&self) -> Option<&[String]> {
        self.project
            .ci
            .as_ref()
            .or(self.global.ci.as_ref())
            .map(|c| c.markers.as_slice())
    }

    pub fn host_version(&self) -> HostVersionSetting {
        let Some(host) = &self.project.host else {
            return HostVersionSetting::Unconfigured;
        };
        if let Some(version) = host.version.as_deref().and_then(|v| Version::parse(v).ok()) {
            return HostVersionSetting::Fixed(version);
        }
        match &host.version_command {
            Some(command) if !command.is_empty() => HostVersionSetting::Command(command.clone()),
            _ => HostVersionSetting::Unconfigured,
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(
            self.project
                .lifecycle
                .as_ref()
                .and_then(|l| l.stop_grace_ms)
                .unwrap_or(DEFAULT_STOP_GRACE_MS),
        )
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(
            self.project
                .lifecycle
                .as_ref()
                .and_then(|l| l.stop_timeout_ms)
                .unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
        )
    }
}
