use super::Filter;
use crate::metadata::TestMetadata;
use std::ffi::OsStr;
use tracing::debug;

/// Environment variables that mark a run on a CI service when set to
/// anything but empty, `false` or `0`
pub const DEFAULT_CI_MARKERS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "TRAVIS",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "BUILDKITE",
];

/// Skips tests marked `ignore.ci` when running on CI
#[derive(Debug, Clone)]
pub struct CiFilter {
    detected: bool,
}

impl CiFilter {
    /// Check the markers once, now
    pub fn from_markers<S: AsRef<str>>(markers: &[S]) -> Self {
        let marker = markers
            .iter()
            .map(|m| m.as_ref())
            .find(|m| marker_set(std::env::var_os(m).as_deref()));
        if let Some(marker) = marker {
            debug!(marker, "CI environment detected");
        }
        Self {
            detected: marker.is_some(),
        }
    }

    pub fn with_detected(detected: bool) -> Self {
        Self { detected }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }
}

fn marker_set(value: Option<&OsStr>) -> bool {
    let Some(value) = value else {
        return false;
    };
    let value = value.to_string_lossy();
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

impl Filter for CiFilter {
    fn name(&self) -> &'static str {
        "ci"
    }

    fn decide(&self, metadata: &TestMetadata) -> bool {
        !(self.detected && metadata.ignored_on_ci())
    }
}
