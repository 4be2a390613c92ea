//! Per-test results and aggregate counts

use crate::suite::TestCase;
use std::time::Duration;

/// Result of handing a single test to the execution engine
#[derive(Debug, Clone, PartialEq)]
pub enum TestResult {
    /// Test passed
    Pass { duration: Duration },
    /// Test failed with an error message
    Fail { error: String, duration: Duration },
    /// Test exceeded its timeout and was killed
    Timeout { duration: Duration },
    /// A filter judged the test ineligible
    Skipped { filter: &'static str },
}

impl TestResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, TestResult::Pass { .. })
    }

    /// Failures and timeouts both count against the run
    pub fn is_fail(&self) -> bool {
        matches!(self, TestResult::Fail { .. } | TestResult::Timeout { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestResult::Skipped { .. })
    }

    pub fn duration(&self) -> Duration {
        match self {
            TestResult::Pass { duration } => *duration,
            TestResult::Fail { duration, .. } => *duration,
            TestResult::Timeout { duration } => *duration,
            TestResult::Skipped { .. } => Duration::ZERO,
        }
    }
}

/// A test together with its result
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub test: TestCase,
    pub result: TestResult,
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_records(records: &[TestRecord]) -> Self {
        records.iter().fold(Self::default(), |mut summary, record| {
            if record.result.is_pass() {
                summary.passed += 1;
            } else if record.result.is_fail() {
                summary.failed += 1;
            } else {
                summary.skipped += 1;
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Process exit status: 0 when nothing failed, otherwise the failure
    /// count capped to what an exit status can carry
    pub fn exit_code(&self) -> i32 {
        self.failed.min(255) as i32
    }
}
