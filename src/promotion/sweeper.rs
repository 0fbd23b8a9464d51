//! Timeout Sweeper
//!
//! The only periodic activity: on every tick, force-finalize builds whose
//! gate deadline has passed, then purge finalized builds past retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::controller::{PromotionController, SweepReport};

/// Periodic driver for `sweep_timeouts` and `purge_expired`.
pub struct TimeoutSweeper {
    controller: Arc<PromotionController>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(controller: Arc<PromotionController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Run one sweep at `now`.
    pub fn tick(&self, now: DateTime<Utc>) -> (SweepReport, usize) {
        let report = self.controller.sweep_timeouts_at(now);
        let purged = self.controller.purge_expired_at(now);
        (report, purged)
    }

    /// Spawn the sweep loop. It stops once `shutdown` flips to `true` or
    /// its sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            event = "SWEEPER_START",
            interval_ms = self.interval.as_millis() as u64,
            "timeout sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (report, purged) = self.tick(Utc::now());
                    if report.timed_out > 0 || report.faults > 0 || purged > 0 {
                        tracing::info!(
                            event = "SWEEP_COMPLETE",
                            examined = report.examined,
                            timed_out = report.timed_out,
                            faults = report.faults,
                            purged,
                            "timeout sweep"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(event = "SWEEPER_STOP", "timeout sweeper stopped");
    }
}
