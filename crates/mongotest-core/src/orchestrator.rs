//! Run sequencing
//!
//! The orchestrator owns the environment for the whole run and walks
//! `Idle -> EnvironmentStarting -> Filtering -> Executing ->
//! EnvironmentStopping -> Done`. Teardown is attempted on every path out of
//! a started environment, including interruption.

use crate::environment::Environment;
use crate::error::RunError;
use crate::filter::{FilterPipeline, PreparedPipeline};
use crate::outcome::{RunSummary, TestRecord};
use crate::suite::TestSuite;
use async_trait::async_trait;
use std::fmt;
use std::future::{pending, Future};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the eligible tests of a suite
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Execute `suite`, consulting `predicate` once per test before running
    /// it. Ineligible tests must be recorded as skipped, never as failed.
    async fn execute(
        &self,
        suite: &TestSuite,
        predicate: &PreparedPipeline,
        env: &Environment,
    ) -> Vec<TestRecord>;
}

/// Step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    EnvironmentStarting,
    Filtering,
    Executing,
    EnvironmentStopping,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::EnvironmentStarting => "environment-starting",
            Phase::Filtering => "filtering",
            Phase::Executing => "executing",
            Phase::EnvironmentStopping => "environment-stopping",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<TestRecord>,
    pub summary: RunSummary,
    /// Process exit status derived from the failure count alone
    pub exit_code: i32,
    /// Set when teardown failed or timed out
    pub teardown_warning: Option<String>,
}

/// Sequences a single run against one environment
pub struct Orchestrator<E> {
    env: Environment,
    engine: E,
    stop_timeout: Duration,
    phases: Vec<Phase>,
}

impl<E: ExecutionEngine> Orchestrator<E> {
    pub fn new(env: Environment, engine: E) -> Self {
        Self {
            env,
            engine,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            phases: vec![Phase::Idle],
        }
    }

    /// Upper bound on how long teardown may block
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Idle)
    }

    /// Every phase entered so far, in order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run to completion
    pub async fn run(
        &mut self,
        suite: &TestSuite,
        pipeline: FilterPipeline,
    ) -> Result<RunOutcome, RunError> {
        self.run_until(suite, pipeline, pending::<()>()).await
    }

    /// Run until done or until `shutdown` resolves, whichever comes first.
    /// Either way the environment is stopped before returning.
    pub async fn run_until<S>(
        &mut self,
        suite: &TestSuite,
        pipeline: FilterPipeline,
        shutdown: S,
    ) -> Result<RunOutcome, RunError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let records = self.drive(suite, pipeline, &mut shutdown).await;
        let teardown_warning = self.teardown().await;
        self.enter(Phase::Done);

        let records = records?;
        let summary = RunSummary::from_records(&records);
        info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );

        Ok(RunOutcome {
            records,
            summary,
            exit_code: summary.exit_code(),
            teardown_warning,
        })
    }

    async fn drive<S>(
        &mut self,
        suite: &TestSuite,
        pipeline: FilterPipeline,
        shutdown: &mut std::pin::Pin<&mut S>,
    ) -> Result<Vec<TestRecord>, RunError>
    where
        S: Future<Output = ()>,
    {
        self.enter(Phase::EnvironmentStarting);
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => return Err(RunError::Interrupted),
            started = self.env.start() => started?,
        }

        self.enter(Phase::Filtering);
        let env = &self.env;
        let predicate = tokio::select! {
            biased;
            _ = shutdown.as_mut() => return Err(RunError::Interrupted),
            prepared = pipeline.prepare(env) => prepared?,
        };

        self.enter(Phase::Executing);
        let env = &self.env;
        let records = tokio::select! {
            biased;
            _ = shutdown.as_mut() => return Err(RunError::Interrupted),
            records = self.engine.execute(suite, &predicate, env) => records,
        };

        Ok(records)
    }

    /// Attempt `stop()` within the timeout; failures become a warning
    async fn teardown(&mut self) -> Option<String> {
        self.enter(Phase::EnvironmentStopping);
        let warning = match tokio::time::timeout(self.stop_timeout, self.env.stop()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("teardown failed: {}", e)),
            Err(_) => Some(format!(
                "teardown did not finish within {:?}",
                self.stop_timeout
            )),
        };
        if let Some(warning) = &warning {
            warn!(state = %self.env.state(), "{}", warning);
        }
        warning
    }

    fn enter(&mut self, phase: Phase) {
        self.phases.push(phase);
        match phase {
            Phase::Done => info!(phase = %phase, "run phase"),
            _ => info!(phase = %phase, topology = %self.env.kind(), "run phase"),
        }
    }
}
