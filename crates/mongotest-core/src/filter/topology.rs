use super::Filter;
use crate::environment::TopologyKind;
use crate::metadata::TestMetadata;

/// Runs a test only on the topologies it lists
#[derive(Debug, Clone)]
pub struct TopologyFilter {
    runtime: TopologyKind,
}

impl TopologyFilter {
    pub fn new(runtime: TopologyKind) -> Self {
        Self { runtime }
    }
}

impl Filter for TopologyFilter {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        metadata
            .topology()
            .map_or(true, |required| required.accepts(self.runtime.tag()))
    }
}
