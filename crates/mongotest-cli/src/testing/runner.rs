//! Test runner - execute eligible tests as child processes

use async_trait::async_trait;
use mongotest_core::{
    Environment, ExecutionEngine, PreparedPipeline, TestCase, TestRecord, TestResult, TestSuite,
};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs each eligible test's command with the connection in its environment
pub struct ProcessExecutor {
    /// Timeout for tests that do not set their own
    timeout: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a single test
    async fn run_single_test(&self, test: &TestCase, env: &Environment) -> TestResult {
        let start = Instant::now();

        let Some((program, args)) = test.command.split_first() else {
            return TestResult::Fail {
                error: "test has no command".to_string(),
                duration: start.elapsed(),
            };
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in connection_env(env) {
            match value {
                Some(value) => command.env(key, value),
                None => command.env_remove(key),
            };
        }

        let timeout = test.timeout.unwrap_or(self.timeout);
        match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => TestResult::Timeout {
                duration: start.elapsed(),
            },
            Ok(Err(e)) => TestResult::Fail {
                error: format!("cannot run '{}': {}", program, e),
                duration: start.elapsed(),
            },
            Ok(Ok(output)) if output.status.success() => TestResult::Pass {
                duration: start.elapsed(),
            },
            Ok(Ok(output)) => TestResult::Fail {
                error: failure_message(&output),
                duration: start.elapsed(),
            },
        }
    }
}

#[async_trait]
impl ExecutionEngine for ProcessExecutor {
    async fn execute(
        &self,
        suite: &TestSuite,
        predicate: &PreparedPipeline,
        env: &Environment,
    ) -> Vec<TestRecord> {
        let mut records = Vec::with_capacity(suite.len());

        for test in &suite.tests {
            let result = match predicate.rejected_by(&test.metadata) {
                Some(filter) => {
                    debug!(test = %test.name, filter, "test skipped");
                    TestResult::Skipped { filter }
                }
                None => self.run_single_test(test, env).await,
            };
            info!(test = %test.name, passed = result.is_pass(), "test finished");
            records.push(TestRecord {
                test: test.clone(),
                result,
            });
        }

        records
    }
}

/// Variables describing the live topology. `None` means unset.
pub fn connection_env(env: &Environment) -> Vec<(&'static str, Option<String>)> {
    let descriptor = env.descriptor();
    vec![
        ("MONGOTEST_URI", Some(descriptor.uri())),
        ("MONGOTEST_HOST", Some(descriptor.host.clone())),
        ("MONGOTEST_PORT", Some(descriptor.port.to_string())),
        ("MONGOTEST_DB", Some(descriptor.database.clone())),
        ("MONGOTEST_TOPOLOGY", Some(env.kind().tag().to_string())),
        ("MONGOTEST_REPLSET", descriptor.replica_set.clone()),
    ]
}

/// Captured stderr, falling back to stdout, then to the exit status
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim_end().to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim_end().to_string();
    }
    format!("exited with {}", output.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongotest_core::environment::{EnvironmentSettings, LifecycleOptions, TopologyKind};
    use mongotest_core::filter::{FilterPipeline, TopologyFilter};
    use mongotest_core::metadata::TestMetadata;

    fn environment(kind: TopologyKind) -> Environment {
        let settings = EnvironmentSettings {
            options: LifecycleOptions::external(),
            ..Default::default()
        };
        Environment::from_settings(kind, settings)
    }

    fn shell_test(name: &str, script: &str) -> TestCase {
        TestCase::new(name).with_command(["sh", "-c", script])
    }

    async fn run(suite: TestSuite, env: &Environment, executor: ProcessExecutor) -> Vec<TestRecord> {
        let predicate = FilterPipeline::new()
            .with(TopologyFilter::new(env.kind()))
            .prepare(env)
            .await
            .unwrap();
        executor.execute(&suite, &predicate, env).await
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pass_fail_and_stderr_capture() {
        let env = environment(TopologyKind::Standalone);
        let suite = TestSuite::new(vec![
            shell_test("passes", "exit 0"),
            shell_test("fails", "echo 'assertion failed' >&2; exit 3"),
        ]);

        let records = run(suite, &env, ProcessExecutor::default()).await;

        assert!(records[0].result.is_pass());
        match &records[1].result {
            TestResult::Fail { error, .. } => assert_eq!(error, "assertion failed"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ineligible_test_is_skipped_not_run() {
        let env = environment(TopologyKind::Standalone);
        let metadata: TestMetadata =
            toml::from_str("[requires]\ntopology = \"replicaset\"\n").unwrap();
        let suite = TestSuite::new(vec![
            shell_test("replset only", "exit 1").with_metadata(metadata)
        ]);

        let records = run(suite, &env, ProcessExecutor::default()).await;

        assert_eq!(records[0].result, TestResult::Skipped { filter: "topology" });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let env = environment(TopologyKind::Standalone);
        let suite = TestSuite::new(vec![shell_test("slow", "sleep 5")]);

        let records = run(suite, &env, ProcessExecutor::new(Duration::from_millis(100))).await;

        assert!(matches!(records[0].result, TestResult::Timeout { .. }));
        assert!(records[0].result.is_fail());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connection_variables_reach_the_test() {
        let env = environment(TopologyKind::ReplicaSet);
        let suite = TestSuite::new(vec![shell_test(
            "env",
            "[ \"$MONGOTEST_PORT\" = 31000 ] && [ \"$MONGOTEST_REPLSET\" = rs ] && [ \"$MONGOTEST_TOPOLOGY\" = replicaset ]",
        )]);

        let records = run(suite, &env, ProcessExecutor::default()).await;

        assert!(records[0].result.is_pass(), "{:?}", records[0].result);
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let env = environment(TopologyKind::Standalone);
        let suite = TestSuite::new(vec![
            TestCase::new("ghost").with_command(["mongotest-no-such-program"])
        ]);

        let records = run(suite, &env, ProcessExecutor::default()).await;

        match &records[0].result {
            TestResult::Fail { error, .. } => assert!(error.contains("cannot run")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_env_unsets_replica_set_for_standalone() {
        let env = environment(TopologyKind::Standalone);
        let vars = connection_env(&env);
        assert!(vars.contains(&("MONGOTEST_REPLSET", None)));
        assert!(vars.contains(&("MONGOTEST_PORT", Some("27017".to_string()))));
    }
}
