//! Per-instance readiness gate.
//!
//! A gate is opened by the fleet scheduler for one instance that has AOF
//! persistence enabled. It polls the instance until it is idle with no
//! rewrite queued, firing a queued rewrite once the log has grown enough,
//! and only then releases the scheduler to move on.
//!
//! ```text
//!            ┌──────────── busy / queued ─────────────┐
//!            ▼                                        │
//!        POLLING ── idle, nothing queued ──▶ CLEAR    │
//!            │                                        │
//!            ├── query or parse failure ──▶ CLEAR (fail-open)
//!            │                                        │
//!            └── idle, queued, grown enough ── trigger┘
//! ```
//!
//! A trigger never clears the gate on the same iteration: the rewrite it
//! started still has to be observed running and then finishing.

use std::time::Duration;

use aofc_status::{PersistenceSnapshot, DEFAULT_GROWTH_THRESHOLD_PERCENT};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::instance::{self, StoreInstance};

/// Default delay between two polls of the same instance.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default deadline for a single status query or trigger call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Polling and admission policy shared by every gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    /// Delay between polls (also the scheduler's delay between passes).
    pub poll_interval: Duration,

    /// A queued rewrite fires only when the log grew strictly more than this.
    pub growth_threshold_percent: i64,

    /// Deadline for each status query and trigger call.
    pub call_timeout: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            growth_threshold_percent: DEFAULT_GROWTH_THRESHOLD_PERCENT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// What one poll of an instance asks the gate to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Idle with nothing queued: release the scheduler.
    Clear,

    /// Idle with a rewrite queued and the log grown enough: trigger it.
    Fire,

    /// Idle with a rewrite queued but below the growth threshold.
    Hold,

    /// A snapshot save or a rewrite is running.
    Busy,
}

impl PollDecision {
    /// Decide from one snapshot.
    pub fn from_snapshot(snapshot: &PersistenceSnapshot, growth_threshold_percent: i64) -> Self {
        if !snapshot.is_idle() {
            PollDecision::Busy
        } else if !snapshot.rewrite_scheduled {
            PollDecision::Clear
        } else if snapshot.should_fire_rewrite(growth_threshold_percent) {
            PollDecision::Fire
        } else {
            PollDecision::Hold
        }
    }
}

/// Why a gate released the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The instance was observed idle with nothing queued.
    Idle,

    /// The status query failed.
    QueryFailed,

    /// The status report could not be parsed.
    ParseFailed,
}

impl ClearReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearReason::Idle => "idle",
            ClearReason::QueryFailed => "query_failed",
            ClearReason::ParseFailed => "parse_failed",
        }
    }

    /// Whether the gate released because of an error rather than idleness.
    pub fn is_fail_open(&self) -> bool {
        !matches!(self, ClearReason::Idle)
    }
}

/// How a gate invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateExit {
    /// The scheduler may advance to the next instance.
    Clear(ClearReason),

    /// Shutdown was signaled while the gate was open.
    Shutdown,
}

/// Summary of one gate invocation, returned to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateReport {
    pub exit: GateExit,

    /// Status polls performed.
    pub polls: u32,

    /// Rewrite triggers issued (successful or not).
    pub triggers: u32,
}

/// Readiness gate for a single instance.
///
/// A gate is cheap and single-use: the scheduler builds a fresh one for each
/// instance on each pass, so no completion state ever carries over.
pub struct ReadinessGate<'a> {
    instance: &'a dyn StoreInstance,
    policy: &'a GatePolicy,
}

impl<'a> ReadinessGate<'a> {
    pub fn new(instance: &'a dyn StoreInstance, policy: &'a GatePolicy) -> Self {
        Self { instance, policy }
    }

    /// Poll until the instance is clear or shutdown is signaled.
    ///
    /// There is no overall deadline; each individual call is bounded by the
    /// policy's call timeout.
    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> GateReport {
        let name = self.instance.name();
        let mut polls = 0u32;
        let mut triggers = 0u32;

        loop {
            if *shutdown.borrow() {
                debug!(instance = %name, polls, "Gate interrupted by shutdown");
                return GateReport {
                    exit: GateExit::Shutdown,
                    polls,
                    triggers,
                };
            }

            polls += 1;
            let snapshot = match instance::probe(self.instance, self.policy.call_timeout).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let reason = match e {
                        CoordinatorError::Parse { .. } => ClearReason::ParseFailed,
                        _ => ClearReason::QueryFailed,
                    };
                    warn!(
                        instance = %name,
                        reason = reason.as_str(),
                        error = %e,
                        "Status unavailable, releasing gate"
                    );
                    return GateReport {
                        exit: GateExit::Clear(reason),
                        polls,
                        triggers,
                    };
                }
            };

            match PollDecision::from_snapshot(&snapshot, self.policy.growth_threshold_percent) {
                PollDecision::Clear => {
                    return GateReport {
                        exit: GateExit::Clear(ClearReason::Idle),
                        polls,
                        triggers,
                    };
                }
                PollDecision::Fire => {
                    triggers += 1;
                    match instance::trigger(self.instance, self.policy.call_timeout).await {
                        Ok(()) => info!(
                            instance = %name,
                            current_log_size = snapshot.current_log_size,
                            base_log_size = snapshot.base_log_size,
                            growth_rate_percent = ?snapshot.growth_rate_percent(),
                            "Triggered AOF rewrite"
                        ),
                        Err(e) => warn!(instance = %name, error = %e, "AOF rewrite trigger failed"),
                    }
                }
                PollDecision::Hold => debug!(
                    instance = %name,
                    growth_rate_percent = ?snapshot.growth_rate_percent(),
                    "Rewrite queued below growth threshold"
                ),
                PollDecision::Busy => debug!(
                    instance = %name,
                    bgsave_in_progress = snapshot.bgsave_in_progress,
                    bgsave_elapsed_seconds = snapshot.bgsave_elapsed_seconds,
                    rewrite_in_progress = snapshot.rewrite_in_progress,
                    rewrite_elapsed_seconds = snapshot.rewrite_elapsed_seconds,
                    "Persistence busy"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender means nobody can ever release us.
                    if changed.is_err() {
                        return GateReport {
                            exit: GateExit::Shutdown,
                            polls,
                            triggers,
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn snapshot(
        bgsave_in_progress: bool,
        rewrite_in_progress: bool,
        rewrite_scheduled: bool,
        current_log_size: i64,
        base_log_size: i64,
    ) -> PersistenceSnapshot {
        PersistenceSnapshot {
            bgsave_in_progress,
            rewrite_enabled: true,
            rewrite_in_progress,
            rewrite_scheduled,
            current_log_size,
            base_log_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_policy_default() {
        let policy = GatePolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_millis(10));
        assert_eq!(policy.growth_threshold_percent, 75);
        assert_eq!(policy.call_timeout, Duration::from_secs(5));
    }

    #[rstest]
    #[case::idle(snapshot(false, false, false, 500, 100), 75, PollDecision::Clear)]
    #[case::saving(snapshot(true, false, false, 0, 0), 75, PollDecision::Busy)]
    #[case::rewriting(snapshot(false, true, false, 0, 0), 75, PollDecision::Busy)]
    #[case::busy_and_queued(snapshot(true, true, true, 500, 100), 75, PollDecision::Busy)]
    #[case::grown(snapshot(false, false, true, 176, 100), 75, PollDecision::Fire)]
    #[case::not_grown(snapshot(false, false, true, 175, 100), 75, PollDecision::Hold)]
    #[case::shrunk(snapshot(false, false, true, 20, 100), 75, PollDecision::Hold)]
    #[case::no_base(snapshot(false, false, true, 3, 0), 75, PollDecision::Fire)]
    #[case::negative_base(snapshot(false, false, true, 5, -10), 75, PollDecision::Hold)]
    #[case::below_default(snapshot(false, false, true, 130, 100), 75, PollDecision::Hold)]
    #[case::above_custom(snapshot(false, false, true, 130, 100), 25, PollDecision::Fire)]
    fn test_poll_decision(
        #[case] status: PersistenceSnapshot,
        #[case] threshold: i64,
        #[case] expected: PollDecision,
    ) {
        assert_eq!(PollDecision::from_snapshot(&status, threshold), expected);
    }

    #[test]
    fn test_clear_reason_labels() {
        assert_eq!(ClearReason::Idle.as_str(), "idle");
        assert!(!ClearReason::Idle.is_fail_open());
        assert!(ClearReason::QueryFailed.is_fail_open());
        assert!(ClearReason::ParseFailed.is_fail_open());
    }
}
