//! Environment lifecycle
//!
//! One [`Environment`] owns one live deployment. The state machine is the same
//! for every topology:
//!
//! ```text
//! Unstarted -> Starting -> Ready -> Stopping -> Stopped
//!                  \                    \
//!                   -> Failed            -> Failed
//! ```
//!
//! Topology variants differ only in a few steps of `start`/`restart`: the
//! replica set drops its majority read concern option on servers that no
//! longer need it, and the authenticated variant creates its root user before
//! connecting with credentials.

pub mod descriptor;
pub mod layout;
pub mod manager;

pub use descriptor::{ConnectionDescriptor, Credentials};
pub use layout::TopologyLayout;
pub use manager::{Connection, Connector, RestartOptions, StopSignal, TopologyManager};

use crate::error::{EnvError, RunError};
use crate::process::{Binaries, ProcessManager, ShellConnector};
use crate::version::{parse_version, VersionRange};
use semver::Version;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Servers in this range already enable majority read concern, so the
/// explicit launch option is dropped for them.
const MAJORITY_READ_CONCERN_DEFAULT_RANGE: &str = ">=3.4.0";

/// Deployment shape under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKind {
    Standalone,
    ReplicaSet,
    Sharded,
    Authenticated,
}

impl TopologyKind {
    pub const ALL: [TopologyKind; 4] = [
        TopologyKind::Standalone,
        TopologyKind::ReplicaSet,
        TopologyKind::Sharded,
        TopologyKind::Authenticated,
    ];

    /// Tag used in metadata and on the command line
    pub fn tag(&self) -> &'static str {
        match self {
            TopologyKind::Standalone => "single",
            TopologyKind::ReplicaSet => "replicaset",
            TopologyKind::Sharded => "sharded",
            TopologyKind::Authenticated => "auth",
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for TopologyKind {
    type Err = RunError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        TopologyKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| {
                RunError::Configuration(format!(
                    "unknown topology '{}', expected one of: single, replicaset, sharded, auth",
                    tag
                ))
            })
    }
}

/// Where an environment is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Switches controlling how much of the lifecycle actually runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// The topology is already running elsewhere; `start` launches nothing
    pub skip_startup: bool,
    /// Leave processes running; `stop` and `restart` do nothing
    pub skip_shutdown: bool,
    /// How long a graceful stop may take before processes are killed
    pub stop_grace: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            skip_startup: false,
            skip_shutdown: false,
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl LifecycleOptions {
    /// Skip startup and everything that would tear the external topology down
    pub fn external() -> Self {
        Self {
            skip_startup: true,
            skip_shutdown: true,
            ..Self::default()
        }
    }
}

/// Settings for a process-backed environment
#[derive(Debug, Clone)]
pub struct EnvironmentSettings {
    pub binaries: Binaries,
    pub host: String,
    pub database: String,
    pub data_dir: PathBuf,
    /// Root user created for the authenticated topology
    pub credentials: Credentials,
    pub options: LifecycleOptions,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            binaries: Binaries::default(),
            host: "localhost".to_string(),
            database: "integration_tests".to_string(),
            data_dir: PathBuf::from("db"),
            credentials: Credentials::new("root", "root"),
            options: LifecycleOptions::default(),
        }
    }
}

/// A live deployment of one topology
pub struct Environment {
    kind: TopologyKind,
    manager: Box<dyn TopologyManager>,
    connector: Arc<dyn Connector>,
    descriptor: ConnectionDescriptor,
    options: LifecycleOptions,
    state: LifecycleState,
    version: OnceCell<Version>,
    read_concern_adjusted: bool,
}

impl Environment {
    pub fn new(
        kind: TopologyKind,
        manager: Box<dyn TopologyManager>,
        connector: Arc<dyn Connector>,
        descriptor: ConnectionDescriptor,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            kind,
            manager,
            connector,
            descriptor,
            options,
            state: LifecycleState::Unstarted,
            version: OnceCell::new(),
            read_concern_adjusted: false,
        }
    }

    /// Build a process-backed environment using the standard layout for `kind`
    pub fn from_settings(kind: TopologyKind, settings: EnvironmentSettings) -> Self {
        let layout = TopologyLayout::for_kind(kind, &settings.host, &settings.data_dir);
        let port = layout.entry_port().unwrap_or(27017);

        let mut descriptor = ConnectionDescriptor::new(&settings.host, port, &settings.database);
        if kind == TopologyKind::ReplicaSet {
            if let Some(name) = layout.groups.first().and_then(|g| g.set_name()) {
                descriptor = descriptor.with_replica_set(name);
            }
        }
        if kind == TopologyKind::Authenticated {
            descriptor = descriptor.with_credentials(settings.credentials.clone());
        }

        let connector: Arc<dyn Connector> =
            Arc::new(ShellConnector::new(settings.binaries.shell.clone()));
        let manager = ProcessManager::new(
            layout,
            settings.binaries,
            settings.host,
            Arc::clone(&connector),
        );

        Self::new(kind, Box::new(manager), connector, descriptor, settings.options)
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Bring the topology up on a clean slate
    pub async fn start(&mut self) -> Result<(), EnvError> {
        match self.state {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Unstarted => {}
            state => {
                return Err(EnvError::InvalidTransition {
                    operation: "start",
                    state,
                })
            }
        }

        if self.options.skip_startup {
            info!(topology = %self.kind, "skipping topology startup");
            self.state = LifecycleState::Ready;
            return Ok(());
        }

        self.state = LifecycleState::Starting;
        match self.launch().await {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                info!(topology = %self.kind, endpoint = %self.descriptor.endpoint(), "topology ready");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<(), EnvError> {
        let binary_version = self.manager.discover().await?;
        info!(version = %binary_version, "running against MongoDB");
        self.adjust_members(&binary_version);

        self.manager.purge().await?;
        info!(topology = %self.kind, "purged data directories");

        self.manager.start().await?;
        info!(topology = %self.kind, "started the topology");

        self.bootstrap().await?;

        let connection = self.connector.connect(&self.descriptor).await?;
        debug!(endpoint = %self.descriptor.endpoint(), "connected to topology");
        let dropped = connection
            .run_command(&self.descriptor.database, json!({ "dropDatabase": 1 }))
            .await;
        close_quietly(connection.as_ref()).await;
        dropped?;
        info!(database = %self.descriptor.database, "dropped database");
        Ok(())
    }

    /// Version-gated launch option changes, applied once before purge/start
    fn adjust_members(&mut self, version: &Version) {
        if self.kind != TopologyKind::ReplicaSet || self.read_concern_adjusted {
            return;
        }
        let applies = VersionRange::parse(MAJORITY_READ_CONCERN_DEFAULT_RANGE)
            .map(|range| range.matches(version))
            .unwrap_or(false);
        if applies {
            self.manager.disable_majority_read_concern();
            debug!(version = %version, "dropped enableMajorityReadConcern from replica set members");
        }
        self.read_concern_adjusted = true;
    }

    /// Variant-specific setup after processes are up and before the first
    /// authenticated connection
    async fn bootstrap(&self) -> Result<(), EnvError> {
        if self.kind != TopologyKind::Authenticated {
            return Ok(());
        }
        let Some(creds) = &self.descriptor.credentials else {
            return Ok(());
        };

        let connection = self.connector.connect(&self.descriptor.anonymous()).await?;
        let created = connection
            .run_command(
                &creds.auth_source,
                json!({
                    "createUser": creds.username,
                    "pwd": creds.password,
                    "roles": [{ "role": "root", "db": "admin" }],
                }),
            )
            .await;
        close_quietly(connection.as_ref()).await;
        created?;
        info!(user = %creds.username, "created root user");
        Ok(())
    }

    /// Terminate every process of the topology
    pub async fn stop(&mut self) -> Result<(), EnvError> {
        match self.state {
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Unstarted => {
                self.state = LifecycleState::Stopped;
                return Ok(());
            }
            _ => {}
        }

        if self.options.skip_shutdown {
            info!(topology = %self.kind, "skipping topology teardown");
            self.state = LifecycleState::Stopped;
            return Ok(());
        }

        self.state = LifecycleState::Stopping;
        match self.terminate().await {
            Ok(()) => {
                self.state = LifecycleState::Stopped;
                info!(topology = %self.kind, "stopped the topology");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn terminate(&mut self) -> Result<(), EnvError> {
        let grace = self.options.stop_grace;
        match tokio::time::timeout(grace, self.manager.stop(StopSignal::Terminate)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "graceful stop failed, killing processes");
                self.manager.stop(StopSignal::Kill).await
            }
            Err(_) => {
                warn!(grace = ?grace, "topology did not stop within grace period, killing processes");
                self.manager.stop(StopSignal::Kill).await
            }
        }
    }

    /// Stop and start the topology in place, keeping the same descriptor
    pub async fn restart(&mut self, options: RestartOptions) -> Result<(), EnvError> {
        if self.state != LifecycleState::Ready {
            return Err(EnvError::InvalidTransition {
                operation: "restart",
                state: self.state,
            });
        }
        if self.options.skip_shutdown {
            debug!(topology = %self.kind, "skipping restart of external topology");
            return Ok(());
        }

        self.state = LifecycleState::Starting;
        let result = match self.manager.restart(options).await {
            // A purge wipes the root user along with everything else
            Ok(()) if options.purge => self.bootstrap().await,
            other => other,
        };
        match result {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                info!(topology = %self.kind, purge = options.purge, "restarted the topology");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    /// Open a new connection using the stored descriptor
    pub async fn open_connection(&self) -> Result<Box<dyn Connection>, EnvError> {
        if self.state != LifecycleState::Ready {
            return Err(EnvError::InvalidTransition {
                operation: "open_connection",
                state: self.state,
            });
        }
        self.connector.connect(&self.descriptor).await
    }

    /// Live server version, probed with `buildInfo` once and cached
    pub async fn probe_version(&self) -> Result<Version, EnvError> {
        self.version
            .get_or_try_init(|| async {
                let connection = self.open_connection().await?;
                let reply = connection
                    .run_command(&self.descriptor.database, json!({ "buildInfo": 1 }))
                    .await;
                close_quietly(connection.as_ref()).await;
                let reply = reply?;

                let raw = reply
                    .get("version")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EnvError::Command {
                        command: "buildInfo".to_string(),
                        message: "reply has no version field".to_string(),
                    })?;
                let version =
                    parse_version(raw).ok_or_else(|| EnvError::Version(raw.to_string()))?;
                info!(version = %version, "probed server version");
                Ok::<_, EnvError>(version)
            })
            .await
            .cloned()
    }

    /// Cached version, if a probe has already succeeded
    pub fn discovered_version(&self) -> Option<&Version> {
        self.version.get()
    }
}

async fn close_quietly(connection: &dyn Connection) {
    if let Err(e) = connection.close().await {
        debug!(error = %e, "error while closing connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("single", TopologyKind::Standalone)]
    #[case("replicaset", TopologyKind::ReplicaSet)]
    #[case("sharded", TopologyKind::Sharded)]
    #[case("auth", TopologyKind::Authenticated)]
    fn test_topology_tags_round_trip(#[case] tag: &str, #[case] kind: TopologyKind) {
        assert_eq!(tag.parse::<TopologyKind>().unwrap(), kind);
        assert_eq!(kind.tag(), tag);
    }

    #[test]
    fn test_unknown_topology_is_configuration_error() {
        let err = "mesh".parse::<TopologyKind>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains("mesh"));
    }

    #[test]
    fn test_from_settings_descriptors() {
        let rs = Environment::from_settings(TopologyKind::ReplicaSet, EnvironmentSettings::default());
        assert_eq!(rs.descriptor().port, 31000);
        assert_eq!(rs.descriptor().replica_set.as_deref(), Some("rs"));
        assert_eq!(rs.state(), LifecycleState::Unstarted);

        let sharded = Environment::from_settings(TopologyKind::Sharded, EnvironmentSettings::default());
        assert_eq!(sharded.descriptor().port, 51000);
        assert_eq!(sharded.descriptor().replica_set, None);

        let auth =
            Environment::from_settings(TopologyKind::Authenticated, EnvironmentSettings::default());
        assert_eq!(
            auth.descriptor().credentials.as_ref().map(|c| c.username.as_str()),
            Some("root")
        );
    }

    #[test]
    fn test_external_options() {
        let options = LifecycleOptions::external();
        assert!(options.skip_startup);
        assert!(options.skip_shutdown);
    }
}
