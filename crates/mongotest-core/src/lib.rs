//! mongotest core
//!
//! Decision logic and lifecycle contract for running a MongoDB integration
//! suite against a live deployment:
//! - Metadata model attached to every discovered test
//! - Environment lifecycle shared by every topology (standalone, replica set,
//!   sharded cluster, authenticated standalone)
//! - Filter pipeline deciding run/skip per test
//! - Orchestrator sequencing start, filtering, execution and teardown
//!
//! # Example
//!
//! ```no_run
//! use mongotest_core::environment::{Environment, EnvironmentSettings, TopologyKind};
//! use mongotest_core::filter::{FilterPipeline, StandardFilters};
//!
//! # async fn demo() -> Result<(), mongotest_core::RunError> {
//! let kind: TopologyKind = "replicaset".parse()?;
//! let mut env = Environment::from_settings(kind, EnvironmentSettings::default());
//! env.start().await?;
//! let pipeline = FilterPipeline::standard(StandardFilters::for_topology(kind)).prepare(&env).await?;
//! # let _ = pipeline;
//! env.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod environment;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod orchestrator;
pub mod outcome;
pub mod process;
pub mod suite;
pub mod version;

pub use environment::{Environment, LifecycleState, TopologyKind};
pub use error::{EnvError, ErrorKind, FilterError, MetadataError, RunError};
pub use filter::{Filter, FilterPipeline, PreparedPipeline};
pub use metadata::TestMetadata;
pub use orchestrator::{ExecutionEngine, Orchestrator, Phase, RunOutcome};
pub use outcome::{RunSummary, TestRecord, TestResult};
pub use suite::{TestCase, TestSuite};
pub use version::VersionRange;
