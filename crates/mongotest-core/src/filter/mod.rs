//! Filter pipeline
//!
//! Every filter gets one chance to look at the running environment in
//! [`Filter::prepare`] and must answer [`Filter::decide`] from what it cached
//! there. Preparation is a type transition: only a [`PreparedPipeline`] can
//! make decisions, so a decision can never see an unprepared filter.

mod capability;
mod ci;
mod platform;
mod topology;
mod version;

pub use capability::CapabilityFilter;
pub use ci::{CiFilter, DEFAULT_CI_MARKERS};
pub use platform::{current_platform, PlatformFilter};
pub use topology::TopologyFilter;
pub use version::{DatabaseVersionFilter, HostVersionFilter, HostVersionSource};

use crate::environment::{Environment, TopologyKind};
use crate::error::FilterError;
use crate::metadata::{Capability, TestMetadata};
use crate::suite::TestSuite;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use tracing::debug;

/// One eligibility rule
#[async_trait]
pub trait Filter: Send + Sync {
    /// Short name reported when this filter skips a test
    fn name(&self) -> &'static str;

    /// Gather whatever environment facts `decide` needs. Runs once, possibly
    /// concurrently with other filters.
    async fn prepare(&self, _env: &Environment) -> Result<(), FilterError> {
        Ok(())
    }

    /// Whether the test is eligible to run. Absent requirements are always
    /// eligible.
    fn decide(&self, metadata: &TestMetadata) -> bool;
}

/// Filters waiting to be prepared
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Every built-in filter
    pub fn standard(config: StandardFilters) -> Self {
        let mut pipeline = Self::new()
            .with(TopologyFilter::new(config.topology))
            .with(
                HostVersionFilter::new(config.host_version).required(config.check_host_version),
            )
            .with(DatabaseVersionFilter::new(config.check_database_version))
            .with(PlatformFilter::current())
            .with(CiFilter::from_markers(config.ci_markers.as_slice()));
        for capability in Capability::ALL {
            pipeline.push(Box::new(CapabilityFilter::new(capability)));
        }
        pipeline
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Prepare every filter concurrently. The first failure aborts the rest.
    pub async fn prepare(self, env: &Environment) -> Result<PreparedPipeline, FilterError> {
        try_join_all(self.filters.iter().map(|filter| async move {
            filter.prepare(env).await?;
            debug!(filter = filter.name(), "filter prepared");
            Ok::<_, FilterError>(())
        }))
        .await?;

        Ok(PreparedPipeline {
            filters: self.filters,
        })
    }
}

/// Filters whose preparation has completed; read-only from here on
pub struct PreparedPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl PreparedPipeline {
    /// AND of every filter's decision. An empty pipeline accepts everything.
    pub fn decide(&self, metadata: &TestMetadata) -> bool {
        self.filters.iter().all(|f| f.decide(metadata))
    }

    /// Name of the first filter that rejects the test, if any
    pub fn rejected_by(&self, metadata: &TestMetadata) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|f| !f.decide(metadata))
            .map(|f| f.name())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Settings for [`FilterPipeline::standard`]
#[derive(Debug, Clone)]
pub struct StandardFilters {
    pub topology: TopologyKind,
    pub host_version: HostVersionSource,
    /// Resolve the host runtime version; when off, host requirements fail
    pub check_host_version: bool,
    /// Probe the live server version; when off, version requirements pass
    pub check_database_version: bool,
    pub ci_markers: Vec<String>,
}

impl StandardFilters {
    pub fn for_topology(topology: TopologyKind) -> Self {
        Self {
            topology,
            host_version: HostVersionSource::Unconfigured,
            check_host_version: true,
            check_database_version: true,
            ci_markers: DEFAULT_CI_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Only resolve versions that some test in `suite` asks for
    pub fn probing_only_for(mut self, suite: &TestSuite) -> Self {
        let needs_database = suite.tests.iter().any(|t| t.metadata.mongodb().is_some());
        let needs_host = suite.tests.iter().any(|t| t.metadata.host().is_some());
        self.check_database_version &= needs_database;
        self.check_host_version &= needs_host;
        self
    }

    pub fn without_database_version_check(mut self) -> Self {
        self.check_database_version = false;
        self
    }

    pub fn with_host_version(mut self, source: HostVersionSource) -> Self {
        self.host_version = source;
        self
    }

    pub fn with_ci_markers(mut self, markers: Vec<String>) -> Self {
        self.ci_markers = markers;
        self
    }
}
