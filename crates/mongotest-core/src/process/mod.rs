//! Process-backed collaborators
//!
//! [`ProcessManager`] launches `mongod`/`mongos` children according to a
//! [`TopologyLayout`]; [`ShellConnector`] talks to them through the shell.

mod shell;

pub use shell::{shell_args, ShellConnector};

use crate::environment::layout::{Binary, ProcessGroup, TopologyLayout};
use crate::environment::{ConnectionDescriptor, Connector, StopSignal, TopologyManager};
use crate::error::EnvError;
use crate::version::parse_version;
use async_trait::async_trait;
use semver::Version;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Locations of the server and shell executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    pub mongod: PathBuf,
    pub mongos: PathBuf,
    pub shell: PathBuf,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            mongod: PathBuf::from("mongod"),
            mongos: PathBuf::from("mongos"),
            shell: PathBuf::from("mongosh"),
        }
    }
}

struct RunningMember {
    name: String,
    port: u16,
    child: Child,
}

/// Runs a topology as local child processes
pub struct ProcessManager {
    layout: TopologyLayout,
    binaries: Binaries,
    host: String,
    connector: Arc<dyn Connector>,
    running: Vec<RunningMember>,
    ready_timeout: Duration,
    /// Replica sets are initiated and shards registered in the data on disk
    configured: bool,
}

impl ProcessManager {
    pub fn new(
        layout: TopologyLayout,
        binaries: Binaries,
        host: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            layout,
            binaries,
            host: host.into(),
            connector,
            running: Vec::new(),
            ready_timeout: READY_TIMEOUT,
            configured: false,
        }
    }

    /// How long each member gets to start accepting connections
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn layout(&self) -> &TopologyLayout {
        &self.layout
    }

    fn binary_path(&self, binary: Binary) -> &PathBuf {
        match binary {
            Binary::Mongod => &self.binaries.mongod,
            Binary::Mongos => &self.binaries.mongos,
        }
    }

    async fn launch_group(&mut self, group: &ProcessGroup) -> Result<(), EnvError> {
        let program = self.binary_path(group.binary()).clone();
        let first = self.running.len();

        for member in &group.members {
            let args = group.launch_args(member, &self.host);
            let name = format!("{}:{}", program.display(), member.port);
            debug!(process = %name, args = ?args, "spawning");

            let child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| EnvError::process(format!("failed to spawn {}", name), e))?;

            self.running.push(RunningMember {
                name,
                port: member.port,
                child,
            });
        }

        let deadline = Instant::now() + self.ready_timeout;
        for index in first..self.running.len() {
            wait_for_port(
                &self.host,
                &mut self.running[index],
                deadline,
                self.ready_timeout,
            )
            .await?;
        }

        self.configure_group(group, deadline).await
    }

    /// Initiate a replica set group and wait for its primary. A set whose
    /// data directories already hold its configuration is only waited on.
    async fn configure_group(
        &self,
        group: &ProcessGroup,
        deadline: Instant,
    ) -> Result<(), EnvError> {
        let Some(initiate) = group.initiate_command(&self.host) else {
            return Ok(());
        };
        let Some(seed) = group
            .members
            .iter()
            .find(|m| !m.arbiter)
            .or_else(|| group.members.first())
        else {
            return Ok(());
        };

        let descriptor = ConnectionDescriptor::new(&self.host, seed.port, "admin");
        let connection = self.connector.connect(&descriptor).await?;

        if self.configured {
            debug!(endpoint = %descriptor.endpoint(), "replica set already initiated");
        } else {
            match connection.run_command("admin", initiate).await {
                Ok(_) => info!(endpoint = %descriptor.endpoint(), "replica set initiated"),
                Err(e) if is_already_initialized(&e) => {
                    debug!(endpoint = %descriptor.endpoint(), "replica set already initiated")
                }
                Err(e) => return Err(e),
            }
        }

        loop {
            let reply = connection
                .run_command("admin", json!({ "isMaster": 1 }))
                .await?;
            if reply.get("ismaster").and_then(|v| v.as_bool()) == Some(true) {
                break;
            }
            if Instant::now() >= deadline {
                return Err(EnvError::Timeout {
                    operation: format!("primary election on {}", descriptor.endpoint()),
                    after: self.ready_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }

        connection.close().await
    }

    async fn register_shards(&self) -> Result<(), EnvError> {
        if self.configured {
            return Ok(());
        }
        let Some(router) = self
            .layout
            .groups
            .iter()
            .find(|g| g.binary() == Binary::Mongos)
            .and_then(|g| g.members.first())
        else {
            return Ok(());
        };

        let descriptor = ConnectionDescriptor::new(&self.host, router.port, "admin");
        let connection = self.connector.connect(&descriptor).await?;
        for command in self
            .layout
            .groups
            .iter()
            .filter_map(|g| g.add_shard_command(&self.host))
        {
            connection.run_command("admin", command).await?;
        }
        connection.close().await?;
        info!(router = %descriptor.endpoint(), "shards registered");
        Ok(())
    }
}

#[async_trait]
impl TopologyManager for ProcessManager {
    async fn discover(&self) -> Result<Version, EnvError> {
        let output = Command::new(&self.binaries.mongod)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                EnvError::process(
                    format!("failed to run {} --version", self.binaries.mongod.display()),
                    e,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_db_version(&stdout).ok_or_else(|| {
            EnvError::Version(stdout.lines().next().unwrap_or_default().to_string())
        })
    }

    async fn purge(&mut self) -> Result<(), EnvError> {
        for dbpath in self.layout.members().filter_map(|m| m.dbpath.as_ref()) {
            if tokio::fs::try_exists(dbpath).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(dbpath).await.map_err(|e| {
                    EnvError::process(format!("failed to remove {}", dbpath.display()), e)
                })?;
            }
            tokio::fs::create_dir_all(dbpath).await.map_err(|e| {
                EnvError::process(format!("failed to create {}", dbpath.display()), e)
            })?;
        }
        self.configured = false;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), EnvError> {
        let groups = self.layout.groups.clone();
        for group in &groups {
            self.launch_group(group).await?;
        }
        self.register_shards().await?;
        self.configured = true;
        Ok(())
    }

    async fn stop(&mut self, signal: StopSignal) -> Result<(), EnvError> {
        while let Some(mut member) = self.running.pop() {
            let result = match signal {
                StopSignal::Terminate => terminate(&mut member.child).await,
                StopSignal::Kill => member.child.kill().await,
            };
            if let Err(e) = result {
                let context = format!("failed to stop {}", member.name);
                self.running.push(member);
                return Err(EnvError::process(context, e));
            }
            debug!(process = %member.name, signal = ?signal, "stopped");
        }
        Ok(())
    }

    fn disable_majority_read_concern(&mut self) {
        for member in self.layout.members_mut() {
            member.enable_majority_read_concern = None;
        }
    }
}

async fn terminate(child: &mut Child) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await?;
        if !status.success() {
            warn!(pid, "kill -TERM exited with {}", status);
        }
    }
    child.wait().await.map(|_| ())
}

async fn wait_for_port(
    host: &str,
    member: &mut RunningMember,
    deadline: Instant,
    timeout: Duration,
) -> Result<(), EnvError> {
    loop {
        if TcpStream::connect((host, member.port)).await.is_ok() {
            debug!(process = %member.name, "accepting connections");
            return Ok(());
        }
        if let Some(status) = member
            .child
            .try_wait()
            .map_err(|e| EnvError::process(format!("failed to poll {}", member.name), e))?
        {
            return Err(EnvError::ProcessExited {
                name: member.name.clone(),
                status: status.to_string(),
            });
        }
        if Instant::now() >= deadline {
            return Err(EnvError::Timeout {
                operation: format!("waiting for {}", member.name),
                after: timeout,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// `replSetInitiate` on a set that already has a configuration
fn is_already_initialized(error: &EnvError) -> bool {
    matches!(error, EnvError::Command { message, .. } if message.contains("already initialized"))
}

/// Extract the server version from `mongod --version` output
pub fn parse_db_version(output: &str) -> Option<Version> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("db version"))
        .and_then(|rest| parse_version(rest.trim()))
}
