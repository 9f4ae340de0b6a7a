mod config;
mod policy;
mod resolver;
mod status;
mod watchdog;

use clap::Parser;
use config::{Config, ToleranceMode};
use policy::LivenessPolicy;
use resolver::{CommandResolver, IdentityResolver};
use status::StatusReporter;
use std::path::PathBuf;
use std::process::ExitCode;
use watchdog::Watchdog;

/// Exit status for configuration and usage errors. Watch failures exit with 1.
const CONFIG_ERROR_EXIT: u8 = 2;

/// Liveness supervisor for the ROS rosout node: waits for it to start,
/// latches its PID, and exits non-zero once it dies or is restarted.
#[derive(Parser, Debug)]
#[command(name = "rosout-watchdog", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "watchdog.toml")]
    config: PathBuf,

    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Steady-state tolerance mode (overrides config)
    #[arg(long, value_enum)]
    mode: Option<ToleranceMode>,

    /// Consecutive misses tolerated in tolerant mode (overrides config)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Node to supervise, e.g. /rosout (overrides config)
    #[arg(long)]
    node: Option<String>,

    /// Write a JSON status file on every transition (overrides config)
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Validate config and print resolved settings, don't watch
    #[arg(long, conflicts_with = "probe")]
    dry_run: bool,

    /// Look up the node's PID once, print it, and exit
    #[arg(long)]
    probe: bool,

    /// Extra logging (every poll result, resolver failures)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Load the config file and layer CLI overrides on top.
    fn resolve_config(&self) -> Result<Config, config::ConfigError> {
        let mut config = Config::load(&self.config)?;

        if let Some(secs) = self.interval {
            config.monitor.poll_interval_secs = secs;
        }
        if let Some(mode) = self.mode {
            config.monitor.tolerance_mode = mode;
        }
        if let Some(attempts) = self.max_attempts {
            config.monitor.max_attempts = attempts;
        }
        if let Some(node) = &self.node {
            config.resolver.node = node.clone();
        }
        if let Some(path) = &self.status_file {
            config.monitor.status_file = Some(path.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_level())),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match cli.resolve_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    let mut resolver = match CommandResolver::from_config(&config.resolver) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, field = %config.resolver.pid_field, "invalid pid_field");
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("# config: {}", cli.config.display());
                print!("{rendered}");
                println!("Dry run mode: config validated, not watching.");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to render config");
                return ExitCode::from(CONFIG_ERROR_EXIT);
            }
        }
    }

    if cli.probe {
        return match resolver.resolve().await {
            Some(pid) => {
                println!("{}", pid);
                ExitCode::SUCCESS
            }
            None => {
                println!("{} not found", config.resolver.node);
                ExitCode::FAILURE
            }
        };
    }

    tracing::info!(
        node = %config.resolver.node,
        mode = %config.monitor.tolerance_mode,
        max_attempts = config.monitor.max_attempts,
        interval_secs = config.monitor.poll_interval_secs,
        "rosout-watchdog starting"
    );

    let policy = LivenessPolicy::new(
        config.monitor.tolerance_mode,
        config.monitor.max_attempts,
    );
    let status = StatusReporter::new(config.monitor.status_file.clone(), &config.resolver.node);
    let failure = Watchdog::new(
        resolver,
        policy,
        config.monitor.poll_interval(),
        &config.resolver.node,
    )
    .with_status(status)
    .run()
    .await;

    tracing::error!(error = %failure, "exiting");
    ExitCode::FAILURE
}
