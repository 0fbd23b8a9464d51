//! Promotion Decisions
//!
//! Every decision carries an explicit reason so it can always be explained
//! after the fact.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::environment::EnvironmentTarget;
use super::event::BuildId;
use super::gate::GateSet;

/// Outcome of a promotion evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Deploy,
    Hold,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Hold => "hold",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// Every required gate passed.
    AllGatesPassed,

    /// A required gate failed.
    GateFailed { gate: String },

    /// Required gates are still pending.
    GatesPending { gates: Vec<String> },

    /// The gate deadline elapsed with gates still pending.
    TimedOut { gates: Vec<String> },

    /// The ref maps to no environment.
    NotDeployable,
}

impl DecisionReason {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::AllGatesPassed => "all required gates passed".to_string(),
            Self::GateFailed { gate } => format!("required gate '{}' failed", gate),
            Self::GatesPending { gates } => {
                format!("waiting on required gates: {}", gates.join(", "))
            }
            Self::TimedOut { gates } => format!(
                "gate deadline elapsed with gates pending: {}",
                gates.join(", ")
            ),
            Self::NotDeployable => "ref is not mapped to a deployable environment".to_string(),
        }
    }
}

/// The controller's verdict on one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub build_id: BuildId,
    pub environment: EnvironmentTarget,
    pub artifact_ref: String,
    pub decision: Decision,
    pub reason: DecisionReason,
    pub gate_results: GateSet,
    pub decided_at: DateTime<Utc>,
}

impl PromotionDecision {
    /// Whether this decision ends the build's lifecycle.
    ///
    /// Hold is terminal only for non-deployable refs.
    pub fn is_terminal(&self) -> bool {
        match self.decision {
            Decision::Deploy | Decision::Reject => true,
            Decision::Hold => matches!(self.reason, DecisionReason::NotDeployable),
        }
    }

    /// One-line explanation for logs.
    pub fn explain(&self) -> String {
        format!(
            "{} build {} to {}: {}",
            self.decision,
            self.build_id,
            self.environment,
            self.reason.description()
        )
    }
}
