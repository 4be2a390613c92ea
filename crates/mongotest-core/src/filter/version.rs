use super::Filter;
use crate::environment::Environment;
use crate::error::FilterError;
use crate::metadata::TestMetadata;
use crate::version::parse_version;
use async_trait::async_trait;
use semver::Version;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info};

/// Where the host runtime version comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostVersionSource {
    /// Nothing configured. Preparing fails if a host requirement needs a version.
    Unconfigured,
    /// Configured explicitly
    Fixed(Version),
    /// First line of a command's output, e.g. `node --version`
    Command(Vec<String>),
}

/// Matches `requires.host` against the host runtime version
pub struct HostVersionFilter {
    source: HostVersionSource,
    required: bool,
    version: OnceLock<Version>,
}

impl HostVersionFilter {
    pub fn new(source: HostVersionSource) -> Self {
        Self {
            source,
            required: true,
            version: OnceLock::new(),
        }
    }

    /// Whether the version must be resolved at all. When no test declares a
    /// host requirement, preparation resolves nothing.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    async fn resolve(&self) -> Result<Version, FilterError> {
        let failed = |reason: String| FilterError::HostVersion {
            filter: "host-version",
            reason,
        };

        match &self.source {
            HostVersionSource::Fixed(version) => Ok(version.clone()),
            HostVersionSource::Unconfigured => Err(failed(
                "no host runtime version configured; set [host] version or version_command"
                    .to_string(),
            )),
            HostVersionSource::Command(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| failed("version command is empty".to_string()))?;
                let output = Command::new(program)
                    .args(args)
                    .output()
                    .await
                    .map_err(|e| failed(format!("cannot run '{}': {}", program, e)))?;
                if !output.status.success() {
                    return Err(failed(format!("'{}' exited with {}", program, output.status)));
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_version(stdout.trim())
                    .ok_or_else(|| failed(format!("unrecognized version '{}'", stdout.trim())))
            }
        }
    }
}

#[async_trait]
impl Filter for HostVersionFilter {
    fn name(&self) -> &'static str {
        "host-version"
    }

    async fn prepare(&self, _env: &Environment) -> Result<(), FilterError> {
        if !self.required || self.version.get().is_some() {
            return Ok(());
        }
        let version = self.resolve().await?;
        debug!(version = %version, "host version resolved");
        let _ = self.version.set(version);
        Ok(())
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        let Some(range) = metadata.host() else {
            return true;
        };
        self.version.get().is_some_and(|v| range.matches(v))
    }
}

/// Matches `requires.mongodb` against the live server version
pub struct DatabaseVersionFilter {
    enabled: bool,
    version: OnceLock<Version>,
}

impl DatabaseVersionFilter {
    /// A disabled filter never probes and lets every test through
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            version: OnceLock::new(),
        }
    }

    /// A filter that already knows the server version
    pub fn with_version(version: Version) -> Self {
        let filter = Self::new(true);
        let _ = filter.version.set(version);
        filter
    }
}

#[async_trait]
impl Filter for DatabaseVersionFilter {
    fn name(&self) -> &'static str {
        "mongodb-version"
    }

    async fn prepare(&self, env: &Environment) -> Result<(), FilterError> {
        if !self.enabled || self.version.get().is_some() {
            return Ok(());
        }
        let version = env
            .probe_version()
            .await
            .map_err(|source| FilterError::Probe {
                filter: "mongodb-version",
                source,
            })?;
        info!(version = %version, "filtering against server version");
        let _ = self.version.set(version);
        Ok(())
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        let Some(range) = metadata.mongodb() else {
            return true;
        };
        if !self.enabled {
            return true;
        }
        self.version.get().is_some_and(|v| range.matches(v))
    }
}
