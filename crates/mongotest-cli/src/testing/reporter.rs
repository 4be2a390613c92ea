//! Test reporter - display run results

use chrono::{SecondsFormat, Utc};
use colored::*;
use mongotest_core::{RunOutcome, TestRecord, TestResult};
use std::io::{self, Write};
use std::time::Duration;

/// Test reporter with output configuration
pub struct TestReporter {
    /// Show one line per test
    verbose: bool,
    /// Disable colored output
    no_color: bool,
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            no_color: false,
        }
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Report a finished run
    pub fn report(&self, outcome: &RunOutcome) {
        if self.no_color {
            colored::control::set_override(false);
        }

        for record in &outcome.records {
            self.print_test_result(record);
        }

        // Dots need a newline before the summary
        if !self.verbose && !outcome.records.is_empty() {
            println!();
        }

        println!();
        self.print_summary(outcome);
        self.print_failures(&outcome.records);

        if let Some(warning) = &outcome.teardown_warning {
            println!("{} {}", "warning:".yellow().bold(), warning);
        }

        if self.no_color {
            colored::control::unset_override();
        }
    }

    fn print_test_result(&self, record: &TestRecord) {
        let name = &record.test.name;
        match &record.result {
            TestResult::Pass { duration } => {
                if self.verbose {
                    println!("{} {} ({:.2?})", "PASS".green().bold(), name, duration);
                } else {
                    print!("{}", ".".green());
                    let _ = io::stdout().flush();
                }
            }
            TestResult::Fail { duration, .. } => {
                if self.verbose {
                    println!("{} {} ({:.2?})", "FAIL".red().bold(), name, duration);
                } else {
                    print!("{}", "F".red().bold());
                    let _ = io::stdout().flush();
                }
            }
            TestResult::Timeout { duration } => {
                if self.verbose {
                    println!(
                        "{} {} (timeout after {:.2?})",
                        "TIMEOUT".yellow().bold(),
                        name,
                        duration
                    );
                } else {
                    print!("{}", "T".yellow().bold());
                    let _ = io::stdout().flush();
                }
            }
            TestResult::Skipped { filter } => {
                if self.verbose {
                    println!("{} {} ({})", "SKIP".cyan().bold(), name, filter);
                } else {
                    print!("{}", "S".cyan());
                    let _ = io::stdout().flush();
                }
            }
        }
    }

    fn print_summary(&self, outcome: &RunOutcome) {
        let summary = &outcome.summary;
        let total_duration: Duration = outcome.records.iter().map(|r| r.result.duration()).sum();

        println!("{}", "─".repeat(50));

        let status = if summary.has_failures() {
            "FAILED".red().bold()
        } else {
            "PASSED".green().bold()
        };

        println!(
            "Test result: {} | {} total, {} passed, {} failed, {} skipped",
            status,
            summary.total().to_string().bold(),
            summary.passed.to_string().green().bold(),
            if summary.has_failures() {
                summary.failed.to_string().red().bold()
            } else {
                summary.failed.to_string().normal()
            },
            summary.skipped.to_string().cyan()
        );
        println!("Time: {:.2?}", total_duration);
    }

    fn print_failures(&self, records: &[TestRecord]) {
        let failures: Vec<_> = records.iter().filter(|r| r.result.is_fail()).collect();

        if failures.is_empty() {
            return;
        }

        println!();
        println!("{}", "Failures:".red().bold());
        println!();

        for record in failures {
            println!(
                "  {} {}:{}",
                "●".red(),
                record.test.file.display(),
                record.test.index
            );
            println!("    {}", record.test.name.bold());

            if let TestResult::Fail { error, .. } = &record.result {
                for line in error.lines() {
                    println!("      {}", line.dimmed());
                }
            } else if let TestResult::Timeout { duration } = &record.result {
                println!("      {} after {:.2?}", "Timed out".yellow(), duration);
            }
            println!();
        }
    }
}

/// One JSON document describing the run
pub fn json_report(outcome: &RunOutcome, topology: &str) -> serde_json::Value {
    let results: Vec<_> = outcome
        .records
        .iter()
        .map(|record| {
            let (status, detail) = match &record.result {
                TestResult::Pass { .. } => ("passed", None),
                TestResult::Fail { error, .. } => ("failed", Some(error.clone())),
                TestResult::Timeout { .. } => ("timeout", None),
                TestResult::Skipped { filter } => ("skipped", Some(filter.to_string())),
            };
            serde_json::json!({
                "name": record.test.name,
                "file": record.test.file.display().to_string(),
                "index": record.test.index,
                "status": status,
                "detail": detail,
                "duration_ms": record.result.duration().as_millis() as u64,
            })
        })
        .collect();

    serde_json::json!({
        "topology": topology,
        "tests": outcome.summary.total(),
        "passed": outcome.summary.passed,
        "failed": outcome.summary.failed,
        "skipped": outcome.summary.skipped,
        "exit_code": outcome.exit_code,
        "teardown_warning": outcome.teardown_warning,
        "results": results,
        "finished_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
