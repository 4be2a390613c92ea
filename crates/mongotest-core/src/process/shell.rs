use crate::environment::{Connection, ConnectionDescriptor, Connector};
use crate::error::EnvError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::trace;

/// Opens connections by driving the MongoDB shell, one invocation per command
#[derive(Debug, Clone)]
pub struct ShellConnector {
    shell: PathBuf,
}

impl ShellConnector {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl Connector for ShellConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, EnvError> {
        let connection = ShellConnection {
            shell: self.shell.clone(),
            descriptor: descriptor.clone(),
        };

        connection
            .run_command("admin", json!({ "ping": 1 }))
            .await
            .map_err(|e| match e {
                EnvError::Command { message, .. } => EnvError::Connection {
                    endpoint: descriptor.endpoint(),
                    message,
                },
                other => other,
            })?;

        Ok(Box::new(connection))
    }
}

struct ShellConnection {
    shell: PathBuf,
    descriptor: ConnectionDescriptor,
}

#[async_trait]
impl Connection for ShellConnection {
    async fn run_command(&self, db: &str, command: Value) -> Result<Value, EnvError> {
        let name = command_name(&command);
        let args = shell_args(&self.descriptor, db, &command);
        trace!(command = %name, endpoint = %self.descriptor.endpoint(), "running command");

        let output = Command::new(&self.shell)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                EnvError::process(format!("failed to run {}", self.shell.display()), e)
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_line(&stderr)
                .or_else(|| last_line(&stdout))
                .unwrap_or("shell exited without output")
                .to_string();
            return Err(EnvError::Connection {
                endpoint: self.descriptor.endpoint(),
                message,
            });
        }

        parse_reply(&name, &stdout)
    }
}

/// Arguments for a shell invocation that runs `command` against `db` and
/// prints the reply as JSON
pub fn shell_args(descriptor: &ConnectionDescriptor, db: &str, command: &Value) -> Vec<String> {
    let host = match &descriptor.replica_set {
        Some(set) => format!("{}/{}", set, descriptor.endpoint()),
        None => descriptor.host.clone(),
    };

    let mut args = vec!["--quiet".to_string(), "--host".to_string(), host];
    if descriptor.replica_set.is_none() {
        args.extend(["--port".to_string(), descriptor.port.to_string()]);
    }
    if let Some(creds) = &descriptor.credentials {
        args.extend([
            "--username".to_string(),
            creds.username.clone(),
            "--password".to_string(),
            creds.password.clone(),
            "--authenticationDatabase".to_string(),
            creds.auth_source.clone(),
        ]);
    }
    if descriptor.tls {
        args.push("--tls".to_string());
    }

    let script = format!(
        "JSON.stringify(db.getSiblingDB({}).runCommand({}))",
        Value::String(db.to_string()),
        command
    );
    args.extend(["--eval".to_string(), script]);
    args
}

fn command_name(command: &Value) -> String {
    command
        .as_object()
        .and_then(|doc| doc.keys().next())
        .cloned()
        .unwrap_or_else(|| "command".to_string())
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

fn parse_reply(command: &str, stdout: &str) -> Result<Value, EnvError> {
    let line = last_line(stdout).ok_or_else(|| EnvError::Command {
        command: command.to_string(),
        message: "empty reply".to_string(),
    })?;

    let reply: Value = serde_json::from_str(line).map_err(|e| EnvError::Command {
        command: command.to_string(),
        message: format!("unreadable reply '{}': {}", line, e),
    })?;

    let ok = reply.get("ok").and_then(Value::as_f64).unwrap_or(0.0);
    if ok != 1.0 {
        let message = reply
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("command returned ok: 0")
            .to_string();
        return Err(EnvError::Command {
            command: command.to_string(),
            message,
        });
    }

    Ok(reply)
}
