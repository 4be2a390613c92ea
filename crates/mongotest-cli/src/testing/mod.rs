//! Test discovery, execution and reporting for the `run` command

pub mod discovery;
pub mod reporter;
pub mod runner;

pub use discovery::discover;
pub use reporter::{json_report, TestReporter};
pub use runner::ProcessExecutor;
