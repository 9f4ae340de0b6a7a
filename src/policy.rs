use crate::config::ToleranceMode;
use crate::resolver::ProcessId;

/// Terminal failures. The watchdog never recovers from either; it reports
/// and exits so an outer process manager can restart the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// The process could not be found: immediately in strict mode, after the
    /// tolerance budget in tolerant mode.
    AbsenceExceeded {
        expected: ProcessId,
        streak: u32,
        mode: ToleranceMode,
    },
    /// A different process instance now serves the node.
    IdentityMismatch {
        expected: ProcessId,
        found: ProcessId,
    },
}

impl std::fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogError::AbsenceExceeded {
                expected,
                streak,
                mode: ToleranceMode::Strict,
            } => write!(
                f,
                "process not alive (expected pid {expected}, missing for {streak} poll)"
            ),
            WatchdogError::AbsenceExceeded {
                expected, streak, ..
            } => write!(
                f,
                "process assumed dead (expected pid {expected}, missing for {streak} consecutive polls)"
            ),
            WatchdogError::IdentityMismatch { expected, found } => write!(
                f,
                "process has been restarted (expected pid {expected}, found pid {found})"
            ),
        }
    }
}

impl std::error::Error for WatchdogError {}

/// Decision returned by the policy after one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The expected process answered.
    Alive,
    /// Absent, but still within the tolerance budget.
    Missing { streak: u32, max_attempts: u32 },
    /// Stop watching and exit with failure.
    Terminate(WatchdogError),
}

/// Per-poll liveness state for one supervised process.
///
/// Holds the identity latched at startup and the count of consecutive
/// absent polls. The latched identity is never replaced: a different PID
/// is a restart, and restarts are terminal.
#[derive(Debug)]
pub struct LivenessPolicy {
    mode: ToleranceMode,
    max_attempts: u32,
    expected: Option<ProcessId>,
    missing_streak: u32,
}

impl LivenessPolicy {
    pub fn new(mode: ToleranceMode, max_attempts: u32) -> Self {
        Self {
            mode,
            max_attempts,
            expected: None,
            missing_streak: 0,
        }
    }

    /// Record the identity seen at startup. Only the first call takes effect.
    pub fn latch(&mut self, pid: ProcessId) {
        match self.expected {
            None => self.expected = Some(pid),
            Some(existing) => {
                tracing::warn!(%existing, ignored = %pid, "identity already latched");
            }
        }
    }

    /// Evaluate one poll result and decide whether to keep watching.
    pub fn evaluate(&mut self, observed: Option<ProcessId>) -> Verdict {
        match (observed, self.expected) {
            (Some(found), None) => {
                self.latch(found);
                self.missing_streak = 0;
                Verdict::Alive
            }
            (Some(found), Some(expected)) if found == expected => {
                self.missing_streak = 0;
                Verdict::Alive
            }
            (Some(found), Some(expected)) => {
                Verdict::Terminate(WatchdogError::IdentityMismatch { expected, found })
            }
            (None, expected) => {
                self.missing_streak = self.missing_streak.saturating_add(1);
                let budget = self.budget();
                match expected {
                    Some(expected) if self.missing_streak > budget => {
                        Verdict::Terminate(WatchdogError::AbsenceExceeded {
                            expected,
                            streak: self.missing_streak,
                            mode: self.mode,
                        })
                    }
                    _ => Verdict::Missing {
                        streak: self.missing_streak,
                        max_attempts: budget,
                    },
                }
            }
        }
    }

    /// Consecutive absences tolerated before declaring the process dead.
    pub fn budget(&self) -> u32 {
        match self.mode {
            ToleranceMode::Strict => 0,
            ToleranceMode::Tolerant => self.max_attempts,
        }
    }

    pub fn mode(&self) -> ToleranceMode {
        self.mode
    }

    pub fn expected(&self) -> Option<ProcessId> {
        self.expected
    }

    pub fn missing_streak(&self) -> u32 {
        self.missing_streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PID: ProcessId = ProcessId(42);

    fn latched(mode: ToleranceMode, max_attempts: u32) -> LivenessPolicy {
        let mut policy = LivenessPolicy::new(mode, max_attempts);
        policy.latch(PID);
        policy
    }

    #[test]
    fn test_strict_matching_pid_stays_alive() {
        let mut policy = latched(ToleranceMode::Strict, 6);
        assert_eq!(policy.evaluate(Some(PID)), Verdict::Alive);
        assert_eq!(policy.evaluate(Some(PID)), Verdict::Alive);
        assert_eq!(policy.missing_streak(), 0);
    }

    #[test]
    fn test_strict_single_absence_terminates() {
        let mut policy = latched(ToleranceMode::Strict, 6);
        assert_eq!(
            policy.evaluate(None),
            Verdict::Terminate(WatchdogError::AbsenceExceeded {
                expected: PID,
                streak: 1,
                mode: ToleranceMode::Strict,
            })
        );
    }

    #[test]
    fn test_strict_ignores_max_attempts() {
        let policy = latched(ToleranceMode::Strict, 6);
        assert_eq!(policy.budget(), 0);
    }

    #[test]
    fn test_tolerant_budget_exhausted_on_k_plus_one() {
        let mut policy = latched(ToleranceMode::Tolerant, 2);
        assert_eq!(
            policy.evaluate(None),
            Verdict::Missing {
                streak: 1,
                max_attempts: 2
            }
        );
        assert_eq!(
            policy.evaluate(None),
            Verdict::Missing {
                streak: 2,
                max_attempts: 2
            }
        );
        assert!(matches!(
            policy.evaluate(None),
            Verdict::Terminate(WatchdogError::AbsenceExceeded { streak: 3, .. })
        ));
    }

    #[test]
    fn test_tolerant_present_resets_streak() {
        let mut policy = latched(ToleranceMode::Tolerant, 2);
        policy.evaluate(None);
        policy.evaluate(None);
        assert_eq!(policy.missing_streak(), 2);

        assert_eq!(policy.evaluate(Some(PID)), Verdict::Alive);
        assert_eq!(policy.missing_streak(), 0);

        assert!(matches!(policy.evaluate(None), Verdict::Missing { streak: 1, .. }));
    }

    #[test]
    fn test_tolerant_zero_attempts_behaves_strictly() {
        let mut policy = latched(ToleranceMode::Tolerant, 0);
        assert!(matches!(
            policy.evaluate(None),
            Verdict::Terminate(WatchdogError::AbsenceExceeded { streak: 1, .. })
        ));
    }

    #[test]
    fn test_mismatch_terminates_in_both_modes() {
        for mode in [ToleranceMode::Strict, ToleranceMode::Tolerant] {
            let mut policy = latched(mode, 6);
            assert_eq!(
                policy.evaluate(Some(ProcessId(99))),
                Verdict::Terminate(WatchdogError::IdentityMismatch {
                    expected: PID,
                    found: ProcessId(99),
                })
            );
        }
    }

    #[test]
    fn test_mismatch_not_tolerated_mid_streak() {
        let mut policy = latched(ToleranceMode::Tolerant, 6);
        policy.evaluate(None);
        policy.evaluate(None);
        assert!(matches!(
            policy.evaluate(Some(ProcessId(7))),
            Verdict::Terminate(WatchdogError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn test_expected_is_never_reassigned() {
        let mut policy = latched(ToleranceMode::Tolerant, 6);
        policy.latch(ProcessId(7));
        assert_eq!(policy.expected(), Some(PID));

        policy.evaluate(Some(PID));
        policy.evaluate(Some(ProcessId(99)));
        assert_eq!(policy.expected(), Some(PID));
    }

    #[test]
    fn test_evaluate_before_latch_latches_first_present() {
        let mut policy = LivenessPolicy::new(ToleranceMode::Strict, 0);
        assert!(matches!(policy.evaluate(None), Verdict::Missing { streak: 1, .. }));
        assert_eq!(policy.evaluate(Some(PID)), Verdict::Alive);
        assert_eq!(policy.expected(), Some(PID));
        assert_eq!(policy.missing_streak(), 0);
    }

    #[test]
    fn test_error_messages() {
        let strict = WatchdogError::AbsenceExceeded {
            expected: PID,
            streak: 1,
            mode: ToleranceMode::Strict,
        };
        assert!(strict.to_string().starts_with("process not alive"));

        let tolerant = WatchdogError::AbsenceExceeded {
            expected: PID,
            streak: 7,
            mode: ToleranceMode::Tolerant,
        };
        assert!(tolerant.to_string().starts_with("process assumed dead"));

        let mismatch = WatchdogError::IdentityMismatch {
            expected: PID,
            found: ProcessId(99),
        };
        assert!(mismatch.to_string().contains("found pid 99"));
    }
}
