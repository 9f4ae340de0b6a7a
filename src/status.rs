/// Status file: rewritten as JSON on every watchdog state transition so that
/// an outer supervisor (or a human with `cat`) can see what the watchdog saw last.
///
/// Writes go to a temp file in the same directory and are renamed into place.
use crate::config::ToleranceMode;
use crate::policy::LivenessPolicy;
use crate::resolver::ProcessId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Watchdog states written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    WaitingForStartup,
    Monitoring,
    Missing,
    Dead,
    Restarted,
}

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// PID of the watchdog itself.
    pub pid: u32,
    pub node: String,
    pub state: WatchState,
    pub mode: ToleranceMode,
    pub expected_pid: Option<ProcessId>,
    pub observed_pid: Option<ProcessId>,
    pub missing_streak: u32,
    pub max_attempts: u32,
    pub last_update: DateTime<Utc>,
}

pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically replace the status file with `snapshot`.
    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<(), StatusError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".watchdog.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a snapshot from the current policy state on each transition.
///
/// With no path configured every update is a no-op.
pub struct StatusReporter {
    file: Option<StatusFile>,
    pid: u32,
    node: String,
}

impl StatusReporter {
    pub fn new(path: Option<PathBuf>, node: &str) -> Self {
        Self {
            file: path.map(StatusFile::new),
            pid: std::process::id(),
            node: node.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Record a transition. Write failures are logged and otherwise ignored.
    pub fn update(
        &self,
        state: WatchState,
        policy: &LivenessPolicy,
        observed: Option<ProcessId>,
    ) {
        let Some(file) = &self.file else {
            return;
        };

        let snapshot = StatusSnapshot {
            pid: self.pid,
            node: self.node.clone(),
            state,
            mode: policy.mode(),
            expected_pid: policy.expected(),
            observed_pid: observed,
            missing_streak: policy.missing_streak(),
            max_attempts: policy.budget(),
            last_update: Utc::now(),
        };

        if let Err(e) = file.write(&snapshot) {
            tracing::warn!(
                error = %e,
                path = %file.path().display(),
                "failed to write status file"
            );
        }
    }
}

/// Errors from status file operations.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => write!(f, "failed to serialize status: {source}"),
            StatusError::Write { path, source } => {
                write!(
                    f,
                    "failed to write temp status file {}: {source}",
                    path.display()
                )
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}
