use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from watchdog.toml.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub resolver: ResolverConfig,
}

/// Steady-state behavior once the supervised process has been seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceMode {
    /// Any absence is terminal.
    Strict,
    /// Up to `max_attempts` consecutive absences are tolerated.
    #[default]
    Tolerant,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToleranceMode::Strict => write!(f, "strict"),
            ToleranceMode::Tolerant => write!(f, "tolerant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub tolerance_mode: ToleranceMode,
    pub max_attempts: u32,
    pub status_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Logical node name, substituted for `{node}` in `args`.
    pub node: String,
    pub command: String,
    pub args: Vec<String>,
    /// Field name of the PID line in the command output (`Pid: 1234`).
    pub pid_field: String,
    pub query_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            tolerance_mode: ToleranceMode::Tolerant,
            max_attempts: 6,
            status_file: None,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            node: "/rosout".to_string(),
            command: "rosnode".to_string(),
            args: vec!["info".to_string(), "{node}".to_string()],
            pid_field: "Pid".to_string(),
            query_timeout_secs: 5,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl ResolverConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Errors raised while loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML or has wrongly-typed values.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A value parsed fine but is unusable.
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid config value for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl Config {
    /// Load the config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject values that would make the watchdog spin or never query.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resolver.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "resolver.query_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resolver.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "resolver.command",
                reason: "must not be empty".to_string(),
            });
        }
        if self.resolver.pid_field.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "resolver.pid_field",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_deployed_script() {
        let config = Config::default();
        assert_eq!(config.monitor.poll_interval_secs, 10);
        assert_eq!(config.monitor.max_attempts, 6);
        assert_eq!(config.monitor.tolerance_mode, ToleranceMode::Tolerant);
        assert_eq!(config.resolver.command, "rosnode");
        assert_eq!(config.resolver.args, vec!["info", "{node}"]);
        assert_eq!(config.resolver.node, "/rosout");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[monitor]
tolerance_mode = "strict"
poll_interval_secs = 3
"#,
        )
        .unwrap();
        assert_eq!(config.monitor.tolerance_mode, ToleranceMode::Strict);
        assert_eq!(config.monitor.poll_interval_secs, 3);
        assert_eq!(config.monitor.max_attempts, 6);
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config: Config = toml::from_str(
            r#"
[monitor]
poll_interval_secs = 2
tolerance_mode = "tolerant"
max_attempts = 3
status_file = "/tmp/watchdog.status"

[resolver]
node = "/master_monitor"
command = "rosnode"
args = ["info", "{node}", "--quiet"]
pid_field = "PID"
query_timeout_secs = 8
"#,
        )
        .unwrap();
        assert_eq!(config.monitor.max_attempts, 3);
        assert_eq!(
            config.monitor.status_file,
            Some(PathBuf::from("/tmp/watchdog.status"))
        );
        assert_eq!(config.resolver.node, "/master_monitor");
        assert_eq!(config.resolver.pid_field, "PID");
        assert_eq!(config.resolver.query_timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(&path, "[monitor]\ntolerance_mode = \"lenient\"\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(&path, "[monitor]\nmax_attempts = 1\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.monitor.max_attempts, 1);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.monitor.poll_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "monitor.poll_interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.resolver.query_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = Config::default();
        config.resolver.command = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("resolver.command"));
    }

    #[test]
    fn test_round_trips_through_toml_for_dry_run() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("tolerance_mode = \"tolerant\""));
        assert!(!rendered.contains("status_file"));
    }
}
