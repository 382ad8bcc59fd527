//! Fleet scheduler.
//!
//! Walks the fleet in a fixed order, opening a [`ReadinessGate`] for every
//! instance with AOF persistence enabled and awaiting it before moving on.
//! Since at most one gate is ever open, at most one instance is admitted to
//! rewrite its log at any moment.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::CoordinatorError;
use crate::gate::{GateExit, GatePolicy, ReadinessGate};
use crate::instance::{self, StoreInstance};

/// Counters for a single pass over the fleet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Instances whose status was read.
    pub examined: usize,

    /// Instances skipped because AOF persistence is disabled.
    pub skipped_disabled: usize,

    /// Instances that went through a readiness gate.
    pub gated: usize,

    /// Gates that released because of a query or parse failure.
    pub failed_open: usize,

    /// Rewrite triggers issued during the pass.
    pub rewrites_triggered: u32,

    /// The pass stopped early because shutdown was signaled.
    pub interrupted: bool,
}

/// Serializes AOF rewrite admission across a fixed, ordered fleet.
pub struct FleetScheduler {
    instances: Vec<Arc<dyn StoreInstance>>,
    policy: GatePolicy,
}

impl FleetScheduler {
    /// Create a scheduler over `instances`, visited in the given order.
    pub fn new(instances: Vec<Arc<dyn StoreInstance>>, policy: GatePolicy) -> Self {
        Self { instances, policy }
    }

    pub fn instances(&self) -> &[Arc<dyn StoreInstance>] {
        &self.instances
    }

    /// Run passes until shutdown is signaled.
    ///
    /// A failed pass is logged and retried on the next tick; nothing but
    /// shutdown ends the loop.
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            instances = self.instances.len(),
            poll_interval_ms = self.policy.poll_interval.as_millis() as u64,
            growth_threshold_percent = self.policy.growth_threshold_percent,
            "Starting fleet scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_pass(&mut shutdown).await {
                Ok(stats) if stats.interrupted => break,
                Ok(stats) if stats.rewrites_triggered > 0 || stats.failed_open > 0 => info!(
                    examined = stats.examined,
                    skipped_disabled = stats.skipped_disabled,
                    gated = stats.gated,
                    failed_open = stats.failed_open,
                    rewrites_triggered = stats.rewrites_triggered,
                    "Fleet pass complete"
                ),
                Ok(stats) => debug!(
                    examined = stats.examined,
                    skipped_disabled = stats.skipped_disabled,
                    gated = stats.gated,
                    "Fleet pass complete"
                ),
                Err(e) => warn!(
                    instance = %e.instance(),
                    reason = e.reason_code(),
                    error = %e,
                    "Fleet pass aborted, retrying next tick"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Fleet scheduler shutting down");
    }

    /// Perform one pass over the fleet.
    ///
    /// Fails as soon as any instance's enablement check cannot be completed;
    /// instances after it are not visited until the next pass.
    pub async fn run_pass(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PassStats, CoordinatorError> {
        let mut stats = PassStats::default();

        for instance in &self.instances {
            if *shutdown.borrow() {
                stats.interrupted = true;
                return Ok(stats);
            }

            let snapshot = instance::probe(instance.as_ref(), self.policy.call_timeout).await?;
            stats.examined += 1;

            if !snapshot.rewrite_enabled {
                debug!(instance = %instance.name(), "AOF disabled, skipping");
                stats.skipped_disabled += 1;
                continue;
            }

            stats.gated += 1;
            let report = ReadinessGate::new(instance.as_ref(), &self.policy)
                .run(shutdown)
                .await;
            stats.rewrites_triggered += report.triggers;

            match report.exit {
                GateExit::Shutdown => {
                    stats.interrupted = true;
                    return Ok(stats);
                }
                GateExit::Clear(reason) => {
                    if reason.is_fail_open() {
                        stats.failed_open += 1;
                    }
                    debug!(
                        instance = %instance.name(),
                        reason = reason.as_str(),
                        polls = report.polls,
                        triggers = report.triggers,
                        "Gate cleared"
                    );
                }
            }
        }

        Ok(stats)
    }
}
