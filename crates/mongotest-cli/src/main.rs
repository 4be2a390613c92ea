use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;
mod config;
mod logging;
mod testing;

/// MongoDB integration test runner.
///
/// Brings up a MongoDB topology, decides per test whether it can run against
/// it, runs the eligible tests and tears the topology down again.
///
/// EXAMPLES:
///     mongotest run                         Run tests against a standalone server
///     mongotest run test/ -e replicaset     Run against a replica set
///     mongotest run -s --skip-version-check Use a server that is already running
///     mongotest discover --json             List tests and their requirements
///
/// ENVIRONMENT VARIABLES:
///     MONGOTEST_TOPOLOGY     Default topology (single, replicaset, sharded, auth)
///     MONGOTEST_TIMEOUT_MS   Default per-test timeout
///     MONGOTEST_JSON         Set to '1' for JSON output by default
///     NO_COLOR               Set to disable colored output
///     RUST_LOG               Log filter (logs go to stderr)
#[derive(Parser)]
#[command(name = "mongotest")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests against a live topology
    ///
    /// Starts the selected topology, filters tests by their declared
    /// requirements, runs the rest and stops the topology. Exits with the
    /// number of failed tests.
    ///
    /// EXAMPLES:
    ///     mongotest run                        Tests from mongotest.toml or .
    ///     mongotest run test/functional        Tests under a directory
    ///     mongotest run -e sharded -t 60000    Sharded cluster, 60s per test
    ///     mongotest run --grep "change stream" Only matching test names
    #[command(visible_alias = "r")]
    Run {
        /// Manifest file or directory (defaults to runner.tests or .)
        path: Option<PathBuf>,
        /// Topology to run against
        #[arg(long, short = 'e', env = "MONGOTEST_TOPOLOGY")]
        environment: Option<String>,
        /// Use an already running topology; never start or stop it
        #[arg(long, short = 's')]
        skip_startup: bool,
        /// Per-test timeout in milliseconds
        #[arg(long, short = 't')]
        timeout: Option<u64>,
        /// Run `requires.mongodb` tests without probing the server version
        #[arg(long)]
        skip_version_check: bool,
        /// Only run tests whose name contains this pattern
        #[arg(long)]
        grep: Option<String>,
        /// Verbose output (one line per test, debug logging)
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Output results in JSON format
        #[arg(long, env = "MONGOTEST_JSON")]
        json: bool,
        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// List discovered tests and their metadata
    ///
    /// EXAMPLES:
    ///     mongotest discover                   Tests under the default path
    ///     mongotest discover test/ --json      Machine readable listing
    #[command(visible_alias = "d")]
    Discover {
        /// Manifest file or directory (defaults to runner.tests or .)
        path: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long, env = "MONGOTEST_JSON")]
        json: bool,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     mongotest completions bash > ~/.bash_completions/mongotest.bash
    ///     mongotest completions zsh > ~/.zfunc/_mongotest
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_config = config::Config::from_env();

    match cli.command {
        Commands::Run {
            path,
            environment,
            skip_startup,
            timeout,
            skip_version_check,
            grep,
            verbose,
            json,
            no_color,
        } => {
            logging::init(verbose);
            let args = commands::run::RunArgs {
                path,
                environment,
                skip_startup,
                timeout_ms: timeout,
                skip_version_check,
                grep,
                verbose,
                json: json || cli_config.default_json,
                no_color: no_color || cli_config.no_color,
            };
            let code = commands::run::run(args).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Discover { path, json } => {
            logging::init(false);
            if cli_config.no_color {
                colored::control::set_override(false);
            }
            commands::discover::run(path, json || cli_config.default_json)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "mongotest", &mut io::stdout());
        }
    }

    Ok(())
}
