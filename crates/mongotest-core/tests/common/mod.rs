//! Shared fakes for environment, pipeline and orchestrator tests
//!
//! The fakes record every call into a shared log so tests can assert on
//! ordering without a real server.

#![allow(dead_code)]

use async_trait::async_trait;
use mongotest_core::environment::{
    Connection, ConnectionDescriptor, Connector, Credentials, Environment, LifecycleOptions,
    StopSignal, TopologyKind, TopologyManager,
};
use mongotest_core::{
    EnvError, ExecutionEngine, Filter, FilterError, PreparedPipeline, TestMetadata, TestRecord,
    TestResult, TestSuite,
};
use semver::Version;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use pretty_assertions::assert_eq;

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// How the fake topology behaves
#[derive(Debug, Clone)]
pub struct Script {
    /// Reported by `discover` and by `buildInfo`
    pub server_version: String,
    pub fail_start: bool,
    pub fail_terminate: bool,
    pub hang_terminate: bool,
    pub fail_build_info: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            server_version: "4.2.1".to_string(),
            fail_start: false,
            fail_terminate: false,
            hang_terminate: false,
            fail_build_info: false,
        }
    }
}

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

pub struct FakeManager {
    log: CallLog,
    script: Script,
}

#[async_trait]
impl TopologyManager for FakeManager {
    async fn discover(&self) -> Result<Version, EnvError> {
        record(&self.log, "discover");
        Version::parse(&self.script.server_version)
            .map_err(|_| EnvError::Version(self.script.server_version.clone()))
    }

    async fn purge(&mut self) -> Result<(), EnvError> {
        record(&self.log, "purge");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), EnvError> {
        record(&self.log, "start");
        if self.script.fail_start {
            return Err(EnvError::ProcessExited {
                name: "mongod:27017".to_string(),
                status: "exit status: 100".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&mut self, signal: StopSignal) -> Result<(), EnvError> {
        record(&self.log, format!("stop:{:?}", signal));
        if signal == StopSignal::Terminate {
            if self.script.hang_terminate {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.script.fail_terminate {
                return Err(EnvError::Timeout {
                    operation: "terminate".to_string(),
                    after: Duration::from_secs(1),
                });
            }
        }
        Ok(())
    }

    fn disable_majority_read_concern(&mut self) {
        record(&self.log, "disable-majority-read-concern");
    }
}

pub struct FakeConnector {
    log: CallLog,
    script: Script,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, EnvError> {
        let call = match &descriptor.credentials {
            Some(creds) => format!("connect:{}", creds.username),
            None => "connect".to_string(),
        };
        record(&self.log, call);
        Ok(Box::new(FakeConnection {
            log: Arc::clone(&self.log),
            script: self.script.clone(),
        }))
    }
}

struct FakeConnection {
    log: CallLog,
    script: Script,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn run_command(&self, db: &str, command: Value) -> Result<Value, EnvError> {
        let name = command
            .as_object()
            .and_then(|doc| doc.keys().next().cloned())
            .unwrap_or_default();
        record(&self.log, format!("{}:{}", name, db));

        if name == "buildInfo" {
            if self.script.fail_build_info {
                return Err(EnvError::Connection {
                    endpoint: "localhost:27017".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            return Ok(json!({ "version": self.script.server_version, "ok": 1 }));
        }
        Ok(json!({ "ok": 1 }))
    }
}

/// Read side of the call log
#[derive(Clone)]
pub struct Calls(CallLog);

impl Calls {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.all().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.all().iter().position(|c| c == call)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub fn environment(
    kind: TopologyKind,
    script: Script,
    options: LifecycleOptions,
) -> (Environment, Calls) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut descriptor = ConnectionDescriptor::new("localhost", 27017, "integration_tests");
    if kind == TopologyKind::ReplicaSet {
        descriptor = descriptor.with_replica_set("rs");
    }
    if kind == TopologyKind::Authenticated {
        descriptor = descriptor.with_credentials(Credentials::new("root", "root"));
    }

    let env = Environment::new(
        kind,
        Box::new(FakeManager {
            log: Arc::clone(&log),
            script: script.clone(),
        }),
        Arc::new(FakeConnector {
            log: Arc::clone(&log),
            script,
        }),
        descriptor,
        options,
    );
    (env, Calls(log))
}

pub fn default_environment(kind: TopologyKind) -> (Environment, Calls) {
    environment(kind, Script::default(), LifecycleOptions::default())
}

pub fn metadata(toml: &str) -> TestMetadata {
    toml::from_str(toml).unwrap()
}

/// Engine that passes every eligible test unless its name is listed as failing
#[derive(Default)]
pub struct RecordingEngine {
    pub failing: Vec<String>,
    pub executed: Arc<Mutex<Vec<String>>>,
}

impl RecordingEngine {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn execute(
        &self,
        suite: &TestSuite,
        predicate: &PreparedPipeline,
        _env: &Environment,
    ) -> Vec<TestRecord> {
        suite
            .tests
            .iter()
            .map(|test| {
                let result = match predicate.rejected_by(&test.metadata) {
                    Some(filter) => TestResult::Skipped { filter },
                    None => {
                        self.executed.lock().unwrap().push(test.name.clone());
                        if self.failing.contains(&test.name) {
                            TestResult::Fail {
                                error: "assertion failed".to_string(),
                                duration: Duration::from_millis(1),
                            }
                        } else {
                            TestResult::Pass {
                                duration: Duration::from_millis(1),
                            }
                        }
                    }
                };
                TestRecord {
                    test: test.clone(),
                    result,
                }
            })
            .collect()
    }
}

/// Filter with a fixed answer
pub struct Fixed(pub &'static str, pub bool);

impl Filter for Fixed {
    fn name(&self) -> &'static str {
        self.0
    }

    fn decide(&self, _metadata: &TestMetadata) -> bool {
        self.1
    }
}

/// Filter whose preparation always fails
pub struct Broken;

#[async_trait]
impl Filter for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn prepare(&self, _env: &Environment) -> Result<(), FilterError> {
        Err(FilterError::HostVersion {
            filter: "broken",
            reason: "no runtime".to_string(),
        })
    }

    fn decide(&self, _metadata: &TestMetadata) -> bool {
        true
    }
}
