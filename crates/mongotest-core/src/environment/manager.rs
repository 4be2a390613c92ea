//! Seams to the process-level collaborators an environment is built on

use super::descriptor::ConnectionDescriptor;
use crate::error::EnvError;
use async_trait::async_trait;
use semver::Version;
use serde_json::Value;

/// How processes are asked to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM, letting the server shut down cleanly
    Terminate,
    /// SIGKILL
    Kill,
}

/// Options for an in-place restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOptions {
    /// Wipe data directories between stop and start
    pub purge: bool,
    /// Kill instead of terminating
    pub force_kill: bool,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self {
            purge: true,
            force_kill: true,
        }
    }
}

/// Launches and tears down the processes that make up a topology
#[async_trait]
pub trait TopologyManager: Send + Sync {
    /// Report the version of the server binary without starting anything
    async fn discover(&self) -> Result<Version, EnvError>;

    /// Remove on-disk state of every member
    async fn purge(&mut self) -> Result<(), EnvError>;

    /// Launch every member and wire the topology together
    async fn start(&mut self) -> Result<(), EnvError>;

    /// Stop every member
    async fn stop(&mut self, signal: StopSignal) -> Result<(), EnvError>;

    /// Stop and start again in place
    async fn restart(&mut self, options: RestartOptions) -> Result<(), EnvError> {
        let signal = if options.force_kill {
            StopSignal::Kill
        } else {
            StopSignal::Terminate
        };
        self.stop(signal).await?;
        if options.purge {
            self.purge().await?;
        }
        self.start().await
    }

    /// Drop the majority read concern option from every member's launch options
    fn disable_majority_read_concern(&mut self);
}

/// Opens logical connections to a running topology
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection. Implementations must not retry on failure.
    async fn connect(&self, descriptor: &ConnectionDescriptor)
        -> Result<Box<dyn Connection>, EnvError>;
}

/// A logical connection able to run database commands
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run `command` against database `db` and return the reply document
    async fn run_command(&self, db: &str, command: Value) -> Result<Value, EnvError>;

    async fn close(&self) -> Result<(), EnvError> {
        Ok(())
    }
}
