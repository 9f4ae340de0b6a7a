/// Identity lookup for the supervised node.
///
/// Queries the ROS graph (by default `rosnode info /rosout`) and extracts the
/// PID of the process currently serving the node. Every failure mode collapses
/// to "absent": the watchdog cannot tell a dead node from a flaky query.
use crate::config::ResolverConfig;
use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// OS-level process identifier of the supervised node instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Looks up the current identity of a logical process.
pub trait IdentityResolver {
    /// Returns `None` when the process is absent or the lookup itself failed.
    fn resolve(&mut self) -> impl Future<Output = Option<ProcessId>> + Send;
}

/// Resolver backed by an external command such as `rosnode info`.
pub struct CommandResolver {
    command: String,
    args: Vec<String>,
    pid_line: Regex,
    timeout: Duration,
}

impl CommandResolver {
    pub fn new(config: &ResolverConfig, timeout: Duration) -> Result<Self, regex::Error> {
        Ok(Self {
            command: config.command.clone(),
            args: build_args(config),
            pid_line: pid_line_pattern(&config.pid_field)?,
            timeout,
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, regex::Error> {
        Self::new(config, config.query_timeout())
    }

    async fn query(&self) -> Option<String> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    command = %self.command,
                    error = %e,
                    "failed to spawn resolver command"
                );
                return None;
            }
        };

        // Dropping the timed-out future drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(
                    command = %self.command,
                    error = %e,
                    "failed to collect resolver output"
                );
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    command = %self.command,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "resolver command timed out"
                );
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(
                command = %self.command,
                exit_code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "resolver command exited unsuccessfully"
            );
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl IdentityResolver for CommandResolver {
    async fn resolve(&mut self) -> Option<ProcessId> {
        let stdout = self.query().await?;
        let pid = extract_pid(&self.pid_line, &stdout);
        if pid.is_none() {
            tracing::debug!(command = %self.command, "no PID line in resolver output");
        }
        pid
    }
}

/// Build the command arguments, replacing `{node}` placeholders with the node name.
fn build_args(config: &ResolverConfig) -> Vec<String> {
    config
        .args
        .iter()
        .map(|arg| arg.replace("{node}", &config.node))
        .collect()
}

/// Matches `<field>: <digits>` on a line of its own, e.g. `Pid: 8812`.
fn pid_line_pattern(field: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?m)^[ \t]*{}[ \t]*:[ \t]*(\d+)[ \t]*\r?$",
        regex::escape(field.trim())
    ))
}

fn extract_pid(pid_line: &Regex, text: &str) -> Option<ProcessId> {
    let caps = pid_line.captures(text)?;
    caps.get(1)?.as_str().parse::<u32>().ok().map(ProcessId)
}
