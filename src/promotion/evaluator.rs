//! Promotion Evaluation
//!
//! Evaluation is deterministic and side-effect free: the same gate state
//! always yields the same decision.
//!
//! - Failed beats pending: any failed required gate rejects.
//! - Deploy only when every required gate passed.
//! - Otherwise hold.
//! - Non-deployable targets always hold.

use chrono::{DateTime, Utc};

use super::decision::{Decision, DecisionReason, PromotionDecision};
use super::environment::EnvironmentTarget;
use super::event::BuildId;
use super::gate::GateSet;

/// Inputs describing one build at one instant.
pub struct EvaluationContext<'a> {
    pub build_id: &'a BuildId,
    pub environment: EnvironmentTarget,
    pub artifact_ref: &'a str,
    pub gates: &'a GateSet,
    pub now: DateTime<Utc>,
}

/// Promotion evaluator
pub struct PromotionEvaluator;

impl PromotionEvaluator {
    /// Evaluate current gate state.
    pub fn evaluate(ctx: &EvaluationContext<'_>) -> PromotionDecision {
        let (decision, reason) = Self::verdict(ctx.environment, ctx.gates);
        Self::build(ctx, decision, reason)
    }

    /// Evaluate at the gate deadline.
    ///
    /// Pending gates count as failures here; ambiguous state never deploys.
    pub fn evaluate_expired(ctx: &EvaluationContext<'_>) -> PromotionDecision {
        match Self::verdict(ctx.environment, ctx.gates) {
            (Decision::Hold, DecisionReason::GatesPending { gates }) => {
                Self::build(ctx, Decision::Reject, DecisionReason::TimedOut { gates })
            }
            (decision, reason) => Self::build(ctx, decision, reason),
        }
    }

    fn verdict(environment: EnvironmentTarget, gates: &GateSet) -> (Decision, DecisionReason) {
        if !environment.is_deployable() {
            return (Decision::Hold, DecisionReason::NotDeployable);
        }

        if let Some(failed) = gates.first_failed() {
            return (
                Decision::Reject,
                DecisionReason::GateFailed {
                    gate: failed.to_string(),
                },
            );
        }

        let pending = gates.pending();
        if pending.is_empty() {
            (Decision::Deploy, DecisionReason::AllGatesPassed)
        } else {
            (Decision::Hold, DecisionReason::GatesPending { gates: pending })
        }
    }

    fn build(
        ctx: &EvaluationContext<'_>,
        decision: Decision,
        reason: DecisionReason,
    ) -> PromotionDecision {
        PromotionDecision {
            build_id: ctx.build_id.clone(),
            environment: ctx.environment,
            artifact_ref: ctx.artifact_ref.to_string(),
            decision,
            reason,
            gate_results: ctx.gates.clone(),
            decided_at: ctx.now,
        }
    }
}
