//! Promotion Observability
//!
//! Observability describes what happened; it never decides what happens.
//! A failure to log or count must not change a promotion outcome.
//!
//! Every build emits at least: registration, and exactly one finalization.

use std::sync::Arc;

use super::decision::{Decision, PromotionDecision};
use super::environment::EnvironmentTarget;
use super::event::BuildId;
use super::gate::GateOutcome;
use crate::observability::MetricsRegistry;

/// Promotion lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionEvent {
    /// promotion.build_registered
    BuildRegistered {
        build_id: BuildId,
        environment: EnvironmentTarget,
    },

    /// promotion.duplicate_registration
    DuplicateRegistration { build_id: BuildId },

    /// promotion.gate_reported
    GateReported {
        build_id: BuildId,
        gate: String,
        outcome: GateOutcome,
        advisory: bool,
    },

    /// promotion.late_gate_report
    /// Report arrived after the build was finalized; ignored.
    LateGateReport { build_id: BuildId, gate: String },

    /// promotion.timed_out
    TimedOut {
        build_id: BuildId,
        pending: Vec<String>,
    },

    /// promotion.decision_finalized
    DecisionFinalized { decision: PromotionDecision },

    /// promotion.dispatch_failed
    DispatchFailed {
        build_id: BuildId,
        collaborator: &'static str,
        error: String,
    },

    /// promotion.records_purged
    RecordsPurged { count: usize },
}

impl PromotionEvent {
    /// Get the event name for logging/metrics.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::BuildRegistered { .. } => "promotion.build_registered",
            Self::DuplicateRegistration { .. } => "promotion.duplicate_registration",
            Self::GateReported { .. } => "promotion.gate_reported",
            Self::LateGateReport { .. } => "promotion.late_gate_report",
            Self::TimedOut { .. } => "promotion.timed_out",
            Self::DecisionFinalized { .. } => "promotion.decision_finalized",
            Self::DispatchFailed { .. } => "promotion.dispatch_failed",
            Self::RecordsPurged { .. } => "promotion.records_purged",
        }
    }
}

/// Turns promotion events into log lines and counter updates.
#[derive(Debug, Clone, Default)]
pub struct PromotionObserver {
    metrics: Arc<MetricsRegistry>,
}

impl PromotionObserver {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Emit an event.
    pub fn emit(&self, event: PromotionEvent) {
        let name = event.event_name();
        match event {
            PromotionEvent::BuildRegistered {
                build_id,
                environment,
            } => {
                self.metrics.increment_builds_registered();
                tracing::info!(event = name, build_id = %build_id, environment = %environment, "build registered");
            }
            PromotionEvent::DuplicateRegistration { build_id } => {
                self.metrics.increment_duplicate_registrations();
                tracing::debug!(event = name, build_id = %build_id, "duplicate registration ignored");
            }
            PromotionEvent::GateReported {
                build_id,
                gate,
                outcome,
                advisory,
            } => {
                if advisory {
                    self.metrics.increment_advisory_gate_reports();
                } else {
                    self.metrics.increment_gate_reports();
                }
                tracing::info!(event = name, build_id = %build_id, gate = %gate, outcome = %outcome, advisory, "gate reported");
            }
            PromotionEvent::LateGateReport { build_id, gate } => {
                self.metrics.increment_late_gate_reports();
                tracing::info!(event = name, build_id = %build_id, gate = %gate, "gate report after finalization ignored");
            }
            PromotionEvent::TimedOut { build_id, pending } => {
                self.metrics.increment_timeouts();
                tracing::warn!(event = name, build_id = %build_id, pending = %pending.join(","), "gate deadline elapsed");
            }
            PromotionEvent::DecisionFinalized { decision } => {
                match decision.decision {
                    Decision::Deploy => self.metrics.increment_decisions_deploy(),
                    Decision::Hold => self.metrics.increment_decisions_hold(),
                    Decision::Reject => self.metrics.increment_decisions_reject(),
                }
                tracing::info!(
                    event = name,
                    build_id = %decision.build_id,
                    environment = %decision.environment,
                    decision = %decision.decision,
                    "{}",
                    decision.explain()
                );
            }
            PromotionEvent::DispatchFailed {
                build_id,
                collaborator,
                error,
            } => {
                self.metrics.increment_dispatch_failures();
                tracing::error!(event = name, build_id = %build_id, collaborator, error = %error, "dispatch failed; not retried");
            }
            PromotionEvent::RecordsPurged { count } => {
                self.metrics.add_records_purged(count as u64);
                if count > 0 {
                    tracing::debug!(event = name, count, "finalized records purged");
                }
            }
        }
    }
}
