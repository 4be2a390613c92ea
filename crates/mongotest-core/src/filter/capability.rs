use super::Filter;
use crate::environment::Environment;
use crate::error::FilterError;
use crate::metadata::{Capability, TestMetadata};
use async_trait::async_trait;
use std::sync::OnceLock;
use tracing::debug;

/// Runs tests that need a host capability only where a live probe finds it
pub struct CapabilityFilter {
    capability: Capability,
    probe: fn() -> bool,
    available: OnceLock<bool>,
}

impl CapabilityFilter {
    pub fn new(capability: Capability) -> Self {
        let probe = match capability {
            Capability::Ipv6 => probe_ipv6 as fn() -> bool,
            Capability::UnixSockets => probe_unix_sockets,
        };
        Self::with_probe(capability, probe)
    }

    pub fn with_probe(capability: Capability, probe: fn() -> bool) -> Self {
        Self {
            capability,
            probe,
            available: OnceLock::new(),
        }
    }
}

#[async_trait]
impl Filter for CapabilityFilter {
    fn name(&self) -> &'static str {
        self.capability.name()
    }

    async fn prepare(&self, _env: &Environment) -> Result<(), FilterError> {
        let available = *self.available.get_or_init(self.probe);
        debug!(capability = %self.capability, available, "capability probed");
        Ok(())
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        if !metadata.requires_feature(self.capability) {
            return true;
        }
        self.available.get().copied().unwrap_or(false)
    }
}

fn probe_ipv6() -> bool {
    std::net::TcpListener::bind("[::1]:0").is_ok()
}

#[cfg(unix)]
fn probe_unix_sockets() -> bool {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static PROBES: AtomicUsize = AtomicUsize::new(0);
    let path = std::env::temp_dir().join(format!(
        "mongotest-probe-{}-{}.sock",
        std::process::id(),
        PROBES.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_file(&path);
    let bound = std::os::unix::net::UnixListener::bind(&path).is_ok();
    let _ = std::fs::remove_file(&path);
    bound
}

#[cfg(not(unix))]
fn probe_unix_sockets() -> bool {
    false
}
