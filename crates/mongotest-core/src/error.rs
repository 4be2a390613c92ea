//! Error types shared across the core crate.
//!
//! Every error reports one of four kinds through `kind()`. The orchestrator
//! and CLI use the kind to decide what is fatal and how it is reported.

use crate::environment::LifecycleState;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Classification of every error the runner can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad topology tag, bad settings, or lifecycle misuse
    Configuration,
    /// Process start/stop/connect failure
    Environment,
    /// Version or capability probe failure during filter preparation
    Probe,
    /// Malformed test metadata
    FilterLogic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Environment => "environment",
            ErrorKind::Probe => "probe",
            ErrorKind::FilterLogic => "filter logic",
        };
        f.write_str(name)
    }
}

/// Errors raised by an [`Environment`](crate::Environment) or the collaborators beneath it
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("{context}: {source}")]
    Process {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} exited before becoming ready ({status})")]
    ProcessExited { name: String, status: String },

    #[error("cannot connect to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("cannot parse server version from '{0}'")]
    Version(String),

    #[error("{operation}() is not allowed while the environment is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("{operation} did not finish within {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl EnvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvError::InvalidTransition { .. } => ErrorKind::Configuration,
            _ => ErrorKind::Environment,
        }
    }

    pub(crate) fn process(context: impl Into<String>, source: std::io::Error) -> Self {
        EnvError::Process {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised while preparing filters
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("{filter} filter could not probe the environment: {source}")]
    Probe {
        filter: &'static str,
        #[source]
        source: EnvError,
    },

    #[error("{filter} filter could not determine the host version: {reason}")]
    HostVersion {
        filter: &'static str,
        reason: String,
    },
}

impl FilterError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Probe
    }
}

/// Malformed metadata found while loading tests
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{}: test '{test}' has malformed metadata: {reason}", file.display())]
    Malformed {
        file: PathBuf,
        test: String,
        reason: String,
    },

    #[error("{}: {reason}", file.display())]
    Manifest { file: PathBuf, reason: String },
}

impl MetadataError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FilterLogic
    }
}

/// Top-level error surfaced by the orchestrator
#[derive(Error, Debug)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error("filter preparation failed: {0}")]
    Preparation(#[from] FilterError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("run interrupted")]
    Interrupted,
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Configuration(_) => ErrorKind::Configuration,
            RunError::Environment(e) => e.kind(),
            RunError::Preparation(e) => e.kind(),
            RunError::Metadata(e) => e.kind(),
            RunError::Interrupted => ErrorKind::Environment,
        }
    }
}
