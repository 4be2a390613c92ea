//! Discover command - list tests and their metadata

use crate::testing::discover;
use anyhow::{Context, Result};
use colored::*;
use mongotest_config::ConfigLoader;
use mongotest_core::{TestCase, TestSuite};
use std::path::{Path, PathBuf};

/// Run the discover command
pub fn run(path: Option<PathBuf>, json: bool) -> Result<()> {
    let root = match path {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().context("cannot determine the working directory")?;
            ConfigLoader::new()
                .load_from_directory(&cwd)
                .context("failed to load configuration")?
                .tests_path()
                .unwrap_or_else(|| PathBuf::from("."))
        }
    };

    let suite = discover(&root)?;
    if json {
        println!("{}", listing_json(&suite)?);
    } else {
        print_listing(&root, &suite);
    }
    Ok(())
}

fn listing_json(suite: &TestSuite) -> Result<serde_json::Value> {
    let tests = suite
        .tests
        .iter()
        .map(|test| -> Result<serde_json::Value> {
            Ok(serde_json::json!({
                "name": test.name,
                "file": test.file.display().to_string(),
                "index": test.index,
                "command": test.command,
                "timeout_ms": test.timeout.map(|t| t.as_millis() as u64),
                "metadata": serde_json::to_value(&test.metadata)
                    .with_context(|| format!("cannot serialize metadata of '{}'", test.name))?,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(serde_json::json!({
        "tests": suite.len(),
        "results": tests,
    }))
}

fn print_listing(root: &Path, suite: &TestSuite) {
    if suite.is_empty() {
        println!("{}", "No tests found.".yellow());
        return;
    }

    println!(
        "Found {} test{} in {}",
        suite.len().to_string().bold(),
        if suite.len() == 1 { "" } else { "s" },
        root.display()
    );
    println!();
    for test in &suite.tests {
        println!("  {} {}", test.name.bold(), requirements(test).dimmed());
    }
}

/// One-line summary of a test's requirements
fn requirements(test: &TestCase) -> String {
    let metadata = &test.metadata;
    let mut parts = Vec::new();
    if let Some(topology) = metadata.topology() {
        parts.push(format!("topology={}", topology.tags().join("|")));
    }
    if let Some(range) = metadata.mongodb() {
        parts.push(format!("mongodb {}", range.as_str()));
    }
    if let Some(range) = metadata.host() {
        parts.push(format!("host {}", range.as_str()));
    }
    if let Some(os) = metadata.os() {
        parts.push(format!("os={}", os.0));
    }
    if metadata.ignored_on_ci() {
        parts.push("not on CI".to_string());
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("({})", parts.join(", "))
    }
}
