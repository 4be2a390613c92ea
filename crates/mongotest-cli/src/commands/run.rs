//! Run command - start a topology, run the eligible tests, stop it

use crate::testing::{discover, json_report, ProcessExecutor, TestReporter};
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use mongotest_config::{Config, ConfigLoader, HostVersionSetting};
use mongotest_core::environment::{Credentials, EnvironmentSettings, LifecycleOptions};
use mongotest_core::filter::{FilterPipeline, HostVersionSource, StandardFilters};
use mongotest_core::process::Binaries;
use mongotest_core::{Environment, Orchestrator, RunError, TestSuite, TopologyKind};
use std::path::PathBuf;
use std::time::Duration;

/// Exit status after an operator interrupt
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Arguments for the run command
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Manifest file or directory
    pub path: Option<PathBuf>,
    /// Topology tag overriding the configured one
    pub environment: Option<String>,
    pub skip_startup: bool,
    pub timeout_ms: Option<u64>,
    pub skip_version_check: bool,
    /// Only run tests whose name contains this pattern
    pub grep: Option<String>,
    pub verbose: bool,
    pub json: bool,
    pub no_color: bool,
}

/// Run the command and return the process exit status
pub async fn run(args: RunArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let config = ConfigLoader::new()
        .load_from_directory(&cwd)
        .context("failed to load configuration")?;
    run_with_config(args, &config).await
}

pub async fn run_with_config(args: RunArgs, config: &Config) -> Result<i32> {
    if args.no_color {
        colored::control::set_override(false);
    }

    // Unknown tags must fail before anything is discovered or started
    let tag = args.environment.as_deref().unwrap_or(config.topology());
    let kind: TopologyKind = tag.parse()?;

    let root = test_root(&args, config);
    let mut suite = discover(&root)?;
    if let Some(pattern) = &args.grep {
        suite = suite.filter(pattern);
    }

    if suite.is_empty() {
        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "tests": 0,
                    "passed": 0,
                    "failed": 0,
                    "skipped": 0,
                    "message": "No tests found"
                })
            );
        } else {
            println!("{}", "No tests found.".yellow());
        }
        return Ok(0);
    }

    if !args.json {
        println!(
            "Found {} test{} in {}",
            suite.len().to_string().bold(),
            if suite.len() == 1 { "" } else { "s" },
            root.display()
        );
    }

    let env = Environment::from_settings(kind, environment_settings(&args, config));
    let pipeline = FilterPipeline::standard(standard_filters(kind, &args, config, &suite));
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeout());
    let mut orchestrator = Orchestrator::new(env, ProcessExecutor::new(timeout))
        .with_stop_timeout(config.stop_timeout());

    let spinner = if args.json {
        ProgressBar::hidden()
    } else {
        spinner(&format!("Running against {} topology...", kind))
    };
    let result = orchestrator.run_until(&suite, pipeline, interrupt()).await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            if args.json {
                println!("{}", json_report(&outcome, kind.tag()));
            } else {
                TestReporter::new(args.verbose)
                    .with_no_color(args.no_color)
                    .report(&outcome);
            }
            Ok(outcome.exit_code)
        }
        Err(RunError::Interrupted) => {
            eprintln!("{}", "Interrupted, topology stopped.".yellow().bold());
            Ok(INTERRUPTED_EXIT_CODE)
        }
        Err(e) => {
            let kind = e.kind();
            Err(anyhow::Error::new(e).context(format!("{} error", kind)))
        }
    }
}

fn test_root(args: &RunArgs, config: &Config) -> PathBuf {
    args.path
        .clone()
        .or_else(|| config.tests_path())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn environment_settings(args: &RunArgs, config: &Config) -> EnvironmentSettings {
    let skip = args.skip_startup || config.skip_startup();
    let (username, password) = config.credentials();

    EnvironmentSettings {
        binaries: Binaries {
            mongod: config.mongod(),
            mongos: config.mongos(),
            shell: config.shell(),
        },
        host: config.host().to_string(),
        database: config.database_name().to_string(),
        data_dir: config.data_dir(),
        credentials: Credentials::new(username, password),
        options: LifecycleOptions {
            skip_startup: skip,
            skip_shutdown: skip,
            stop_grace: config.stop_grace(),
        },
    }
}

fn standard_filters(
    kind: TopologyKind,
    args: &RunArgs,
    config: &Config,
    suite: &TestSuite,
) -> StandardFilters {
    let host_version = match config.host_version() {
        HostVersionSetting::Unconfigured => HostVersionSource::Unconfigured,
        HostVersionSetting::Fixed(version) => HostVersionSource::Fixed(version),
        HostVersionSetting::Command(argv) => HostVersionSource::Command(argv),
    };

    let mut filters = StandardFilters::for_topology(kind)
        .probing_only_for(suite)
        .with_host_version(host_version);
    if args.skip_version_check || config.skip_version_check() {
        filters = filters.without_database_version_check();
    }
    if let Some(markers) = config.ci_markers() {
        filters = filters.with_ci_markers(markers.to_vec());
    }
    filters
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.green} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
