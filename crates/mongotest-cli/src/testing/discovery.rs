//! Test discovery - find test declarations in `*.test.toml` manifests

use mongotest_core::{MetadataError, TestCase, TestMetadata, TestSuite};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use walkdir::WalkDir;

/// Suffix identifying a test manifest
pub const MANIFEST_SUFFIX: &str = ".test.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    test: Vec<RawTest>,
}

/// A `[[test]]` entry before its metadata is checked
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    name: String,
    command: Vec<String>,
    timeout_ms: Option<u64>,
    metadata: Option<toml::Value>,
}

/// Discover every test under `root`, which may be a directory or a single
/// manifest. Tests are ordered by file, then by declaration order.
pub fn discover(root: &Path) -> Result<TestSuite, MetadataError> {
    if !root.exists() {
        return Err(MetadataError::Manifest {
            file: root.to_path_buf(),
            reason: "no such file or directory".to_string(),
        });
    }

    if root.is_file() {
        return Ok(TestSuite::new(discover_tests_in_file(root)?));
    }

    let mut tests = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path during discovery");
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && is_manifest(path) {
            tests.extend(discover_tests_in_file(path)?);
        }
    }

    Ok(TestSuite::new(tests))
}

fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(MANIFEST_SUFFIX))
}

/// Parse the tests declared in a single manifest
fn discover_tests_in_file(path: &Path) -> Result<Vec<TestCase>, MetadataError> {
    let manifest_error = |reason: String| MetadataError::Manifest {
        file: path.to_path_buf(),
        reason,
    };

    let source =
        fs::read_to_string(path).map_err(|e| manifest_error(format!("cannot read: {}", e)))?;
    let manifest: Manifest = toml::from_str(&source).map_err(|e| manifest_error(e.to_string()))?;

    manifest
        .test
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            if raw.command.is_empty() {
                return Err(manifest_error(format!(
                    "test '{}' has an empty command",
                    raw.name
                )));
            }

            let metadata = match raw.metadata {
                Some(value) => TestMetadata::deserialize(value).map_err(|e| {
                    MetadataError::Malformed {
                        file: path.to_path_buf(),
                        test: raw.name.clone(),
                        reason: e.to_string().trim().to_string(),
                    }
                })?,
                None => TestMetadata::default(),
            };

            Ok(TestCase {
                name: raw.name,
                file: path.to_path_buf(),
                index: i + 1,
                command: raw.command,
                timeout: raw.timeout_ms.map(Duration::from_millis),
                metadata,
            })
        })
        .collect()
}
