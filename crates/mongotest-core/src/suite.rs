//! Discovered tests

use crate::metadata::TestMetadata;
use std::path::PathBuf;
use std::time::Duration;

/// A single discovered test
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// Human readable test name
    pub name: String,
    /// Manifest the test was declared in
    pub file: PathBuf,
    /// Position of the declaration within its manifest (1-based)
    pub index: usize,
    /// Program and arguments that run the test body
    pub command: Vec<String>,
    /// Per-test timeout overriding the run default
    pub timeout: Option<Duration>,
    pub metadata: TestMetadata,
}

impl TestCase {
    /// Create a test with no metadata and no command
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: PathBuf::new(),
            index: 1,
            command: Vec::new(),
            timeout: None,
            metadata: TestMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: TestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }
}

/// An ordered set of discovered tests
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(tests: Vec<TestCase>) -> Self {
        Self { tests }
    }

    /// Keep only tests whose name contains `pattern`
    pub fn filter(&self, pattern: &str) -> Self {
        let tests = self
            .tests
            .iter()
            .filter(|t| t.name.contains(pattern))
            .cloned()
            .collect();
        TestSuite { tests }
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }
}
