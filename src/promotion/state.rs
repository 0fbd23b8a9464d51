//! Build Promotion State Machine
//!
//! - States are explicit and enumerable
//! - Finalized is entered exactly once and is irreversible
//! - Forbidden transitions are explicit errors, never silently ignored
//!
//! ```text
//! Pending ──first gate report──▶ AwaitingGates
//!    │                                │
//!    └────────────finalize────────────┴──▶ Finalized
//! ```

use chrono::{DateTime, Duration, Utc};

use super::decision::PromotionDecision;
use super::environment::EnvironmentTarget;
use super::errors::{PromotionError, PromotionResult};
use super::evaluator::{EvaluationContext, PromotionEvaluator};
use super::event::BuildEvent;
use super::gate::GateSet;

/// Lifecycle state of one build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildState {
    /// Registered, no gate reported yet.
    Pending,

    /// At least one gate reported; waiting for the rest.
    AwaitingGates,

    /// Decision made and dispatched. Terminal.
    Finalized {
        /// The decision that was dispatched
        decision: PromotionDecision,
    },
}

impl BuildState {
    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::AwaitingGates => "AwaitingGates",
            Self::Finalized { .. } => "Finalized",
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }

    /// Finalized decision, if any.
    pub fn decision(&self) -> Option<&PromotionDecision> {
        match self {
            Self::Finalized { decision } => Some(decision),
            _ => None,
        }
    }

    /// Pending → AwaitingGates
    pub fn begin_gate_wait(self) -> PromotionResult<Self> {
        match self {
            Self::Pending => Ok(Self::AwaitingGates),
            _ => Err(PromotionError::forbidden_transition(
                self.state_name(),
                "AwaitingGates",
            )),
        }
    }

    /// Pending | AwaitingGates → Finalized
    pub fn finalize(self, decision: PromotionDecision) -> PromotionResult<Self> {
        match self {
            Self::Pending | Self::AwaitingGates => Ok(Self::Finalized { decision }),
            Self::Finalized { .. } => Err(PromotionError::forbidden_transition(
                "Finalized",
                "Finalized",
            )),
        }
    }
}

/// Everything the controller knows about one build.
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub event: BuildEvent,
    pub environment: EnvironmentTarget,
    pub artifact_ref: String,
    pub gates: GateSet,
    pub state: BuildState,
    pub registered_at: DateTime<Utc>,
    /// Gates still pending at this instant count as failed.
    pub deadline: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl BuildRecord {
    /// Create a record in `Pending` with every required gate pending.
    pub fn new(
        event: BuildEvent,
        environment: EnvironmentTarget,
        required_gates: &[String],
        registered_at: DateTime<Utc>,
        gate_timeout: Duration,
    ) -> Self {
        let artifact_ref = event.resolved_artifact();
        Self {
            event,
            environment,
            artifact_ref,
            gates: GateSet::with_required(required_gates.iter().cloned()),
            state: BuildState::Pending,
            registered_at,
            deadline: registered_at + gate_timeout,
            finalized_at: None,
        }
    }

    /// Evaluate current gate state.
    pub fn evaluate(&self, now: DateTime<Utc>) -> PromotionDecision {
        if let Some(decision) = self.state.decision() {
            return decision.clone();
        }
        PromotionEvaluator::evaluate(&self.context(now))
    }

    /// Evaluate as of the gate deadline.
    pub fn evaluate_expired(&self, now: DateTime<Utc>) -> PromotionDecision {
        PromotionEvaluator::evaluate_expired(&self.context(now))
    }

    /// Decision as of `now`, whether or not a sweep has run yet.
    ///
    /// An open record past its deadline reads as timed out. Does not
    /// finalize.
    pub fn current_decision(&self, now: DateTime<Utc>) -> PromotionDecision {
        if !self.state.is_finalized() && self.is_expired(now) {
            return self.evaluate_expired(now);
        }
        self.evaluate(now)
    }

    /// Move to `Finalized`. Fails if already finalized.
    pub fn finalize(
        &mut self,
        decision: PromotionDecision,
        now: DateTime<Utc>,
    ) -> PromotionResult<()> {
        if self.state.is_finalized() {
            return Err(PromotionError::forbidden_transition("Finalized", "Finalized"));
        }
        let state = std::mem::replace(&mut self.state, BuildState::Pending);
        self.state = state.finalize(decision)?;
        self.finalized_at = Some(now);
        Ok(())
    }

    /// Record that the first gate report arrived.
    pub fn mark_awaiting_gates(&mut self) -> PromotionResult<()> {
        if matches!(self.state, BuildState::Pending) {
            self.state = std::mem::replace(&mut self.state, BuildState::Pending).begin_gate_wait()?;
        }
        Ok(())
    }

    /// Whether the gate deadline has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Whether a finalized record has outlived the retention window.
    pub fn is_past_retention(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.finalized_at
            .map(|at| now > at + retention)
            .unwrap_or(false)
    }

    fn context(&self, now: DateTime<Utc>) -> EvaluationContext<'_> {
        EvaluationContext {
            build_id: &self.event.build_id,
            environment: self.environment,
            artifact_ref: &self.artifact_ref,
            gates: &self.gates,
            now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotion::decision::{Decision, DecisionReason};
    use crate::promotion::gate::GateOutcome;

    fn record(now: DateTime<Utc>) -> BuildRecord {
        BuildRecord::new(
            BuildEvent::new("1", "develop"),
            EnvironmentTarget::Staging,
            &["tests".to_string(), "security-scan".to_string()],
            now,
            Duration::seconds(60),
        )
    }

    #[test]
    fn test_pending_to_awaiting_gates() {
        let state = BuildState::Pending.begin_gate_wait().unwrap();
        assert_eq!(state.state_name(), "AwaitingGates");
    }

    #[test]
    fn test_awaiting_gates_cannot_restart_wait() {
        let err = BuildState::AwaitingGates.begin_gate_wait().unwrap_err();
        assert_eq!(
            err,
            PromotionError::forbidden_transition("AwaitingGates", "AwaitingGates")
        );
    }

    #[test]
    fn test_finalize_is_irreversible() {
        let now = Utc::now();
        let mut rec = record(now);
        let decision = rec.evaluate_expired(now);

        rec.finalize(decision.clone(), now).unwrap();
        assert!(rec.state.is_finalized());
        assert_eq!(rec.finalized_at, Some(now));

        let err = rec.finalize(decision.clone(), now).unwrap_err();
        assert!(matches!(err, PromotionError::ForbiddenTransition { .. }));
        // The first decision survives the rejected second finalization
        assert_eq!(rec.state.decision(), Some(&decision));
    }

    #[test]
    fn test_finalized_record_evaluates_to_recorded_decision() {
        let now = Utc::now();
        let mut rec = record(now);
        let rejected = rec.evaluate_expired(now);
        rec.finalize(rejected, now).unwrap();

        rec.gates.record("tests", GateOutcome::Passed);
        rec.gates.record("security-scan", GateOutcome::Passed);

        assert_eq!(rec.evaluate(now).decision, Decision::Reject);
    }

    #[test]
    fn test_mark_awaiting_gates_is_idempotent() {
        let mut rec = record(Utc::now());
        rec.mark_awaiting_gates().unwrap();
        rec.mark_awaiting_gates().unwrap();
        assert_eq!(rec.state.state_name(), "AwaitingGates");
    }

    #[test]
    fn test_deadline_and_retention() {
        let now = Utc::now();
        let mut rec = record(now);

        assert!(!rec.is_expired(now + Duration::seconds(59)));
        assert!(rec.is_expired(now + Duration::seconds(60)));

        assert!(!rec.is_past_retention(now, Duration::seconds(10)));
        let decision = rec.evaluate_expired(now);
        rec.finalize(decision, now).unwrap();
        assert!(!rec.is_past_retention(now + Duration::seconds(10), Duration::seconds(10)));
        assert!(rec.is_past_retention(now + Duration::seconds(11), Duration::seconds(10)));
    }

    #[test]
    fn test_current_decision_reads_expired_record_as_timed_out() {
        let now = Utc::now();
        let mut rec = record(now);
        rec.gates.record("tests", GateOutcome::Passed);

        assert_eq!(rec.current_decision(now).decision, Decision::Hold);

        let late = rec.current_decision(now + Duration::seconds(60));
        assert_eq!(late.decision, Decision::Reject);
        assert!(matches!(late.reason, DecisionReason::TimedOut { .. }));
        assert!(!rec.state.is_finalized());
    }
}
