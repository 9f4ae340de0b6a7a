/// Singleton process watchdog.
///
/// Blocks until the supervised node shows up, latches its PID, then polls on a
/// fixed interval. Returns only when the node is gone for longer than the
/// tolerance budget or has been replaced by a different process.
use crate::policy::{LivenessPolicy, Verdict, WatchdogError};
use crate::resolver::{IdentityResolver, ProcessId};
use crate::status::{StatusReporter, WatchState};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Watchdog<R> {
    resolver: R,
    policy: LivenessPolicy,
    poll_interval: Duration,
    node: String,
    status: StatusReporter,
    startup_waits: u32,
    polls: u64,
}

impl<R: IdentityResolver> Watchdog<R> {
    pub fn new(resolver: R, policy: LivenessPolicy, poll_interval: Duration, node: &str) -> Self {
        Self {
            resolver,
            policy,
            poll_interval,
            node: node.to_string(),
            status: StatusReporter::disabled(),
            startup_waits: 0,
            polls: 0,
        }
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    /// Watch until a terminal failure. There is no successful outcome.
    pub async fn run(mut self) -> WatchdogError {
        self.await_startup().await;
        self.monitor().await
    }

    /// Poll until the node is present, then latch its PID. Waits indefinitely.
    pub async fn await_startup(&mut self) -> ProcessId {
        loop {
            if let Some(pid) = self.resolver.resolve().await {
                self.policy.latch(pid);
                info!(node = %self.node, %pid, "{} PID: {}", self.short_name(), pid);
                self.status.update(WatchState::Monitoring, &self.policy, Some(pid));
                return pid;
            }

            self.startup_waits += 1;
            info!(
                node = %self.node,
                waits = self.startup_waits,
                "waiting for startup"
            );
            self.status.update(WatchState::WaitingForStartup, &self.policy, None);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Steady-state loop: poll, decide, sleep.
    pub async fn monitor(&mut self) -> WatchdogError {
        loop {
            let observed = self.resolver.resolve().await;
            self.polls += 1;

            match self.policy.evaluate(observed) {
                Verdict::Alive => {
                    debug!(node = %self.node, poll = self.polls, "process alive");
                    self.status.update(WatchState::Monitoring, &self.policy, observed);
                }
                Verdict::Missing {
                    streak,
                    max_attempts,
                } => {
                    warn!(node = %self.node, streak, max_attempts, "not found, waiting");
                    self.status.update(WatchState::Missing, &self.policy, observed);
                }
                Verdict::Terminate(failure) => {
                    let state = match failure {
                        WatchdogError::AbsenceExceeded { .. } => WatchState::Dead,
                        WatchdogError::IdentityMismatch { .. } => WatchState::Restarted,
                    };
                    error!(node = %self.node, poll = self.polls, "{failure}");
                    self.status.update(state, &self.policy, observed);
                    return failure;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Number of "waiting for startup" observations emitted so far.
    #[allow(dead_code)]
    pub fn startup_waits(&self) -> u32 {
        self.startup_waits
    }

    /// Steady-state polls performed so far.
    #[allow(dead_code)]
    pub fn polls(&self) -> u64 {
        self.polls
    }

    #[allow(dead_code)]
    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// `/rosout` -> `rosout`, as it appears in the startup line.
    fn short_name(&self) -> &str {
        self.node.trim_start_matches('/')
    }
}
