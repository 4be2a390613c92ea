use super::Filter;
use crate::metadata::TestMetadata;

/// Platform name in the vocabulary test metadata uses (`linux`, `darwin`,
/// `win32`, ...)
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

/// Runs a test only on the platform it names, or anywhere but a negated one
#[derive(Debug, Clone)]
pub struct PlatformFilter {
    platform: String,
}

impl PlatformFilter {
    pub fn current() -> Self {
        Self::with_platform(current_platform())
    }

    pub fn with_platform(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

impl Filter for PlatformFilter {
    fn name(&self) -> &'static str {
        "os"
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        metadata
            .os()
            .map_or(true, |required| required.accepts(&self.platform))
    }
}
