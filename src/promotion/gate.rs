//! Gates
//!
//! A gate is a named check that must clear before promotion. Outcomes are
//! a closed variant; which names are required is configured per
//! environment. External tools (test runners, scanners, reviewers) only
//! ever report an outcome for a name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::decision::PromotionDecision;
use super::errors::{PromotionError, PromotionResult};

/// Longest accepted gate name.
pub const MAX_GATE_NAME_LEN: usize = 64;

/// Latest known outcome of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateOutcome {
    Pending,
    Passed,
    Failed,
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Passed or failed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "passed" | "pass" | "success" => Ok(Self::Passed),
            "failed" | "fail" | "failure" => Ok(Self::Failed),
            other => Err(format!("unknown gate outcome: {}", other)),
        }
    }
}

fn gate_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static gate name pattern"))
}

/// Validate a gate name's format.
pub fn validate_gate_name(name: &str) -> PromotionResult<()> {
    if name.is_empty() {
        return Err(PromotionError::invalid_gate_name(name, "name cannot be empty"));
    }
    if name.len() > MAX_GATE_NAME_LEN {
        return Err(PromotionError::invalid_gate_name(
            name,
            "name exceeds 64 characters",
        ));
    }
    if !gate_name_pattern().is_match(name) {
        return Err(PromotionError::invalid_gate_name(
            name,
            "name may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(())
}

/// Gate results for one build.
///
/// Required gates start out `Pending`. Advisory gates (reported but not
/// required for the build's environment) are kept apart so they are
/// visible in notifications without ever influencing a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSet {
    pub required: BTreeMap<String, GateOutcome>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub advisory: BTreeMap<String, GateOutcome>,
}

impl GateSet {
    /// Create a gate set with every required gate pending.
    pub fn with_required<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: names
                .into_iter()
                .map(|name| (name.into(), GateOutcome::Pending))
                .collect(),
            advisory: BTreeMap::new(),
        }
    }

    /// Whether the named gate is required.
    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains_key(name)
    }

    /// Record an outcome. Returns the previous outcome of that gate, if any.
    pub fn record(&mut self, name: &str, outcome: GateOutcome) -> Option<GateOutcome> {
        match self.required.get_mut(name) {
            Some(slot) => Some(std::mem::replace(slot, outcome)),
            None => self.advisory.insert(name.to_string(), outcome),
        }
    }

    /// Required gates still pending, in name order.
    pub fn pending(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|(_, outcome)| **outcome == GateOutcome::Pending)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// First failed required gate, in name order.
    pub fn first_failed(&self) -> Option<&str> {
        self.required
            .iter()
            .find(|(_, outcome)| **outcome == GateOutcome::Failed)
            .map(|(name, _)| name.as_str())
    }
}

/// How a gate report was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum GateReport {
    /// Required gate updated; carries the decision evaluated afterwards.
    /// `finalized` is set when this report finalized the build.
    Applied {
        decision: PromotionDecision,
        finalized: bool,
    },

    /// Gate is not required for this build's environment; recorded only.
    Advisory { decision: PromotionDecision },

    /// Build was already finalized; the report changed nothing.
    AfterFinalization { decision: PromotionDecision },
}

impl GateReport {
    /// Decision current after the report.
    pub fn decision(&self) -> &PromotionDecision {
        match self {
            Self::Applied { decision, .. }
            | Self::Advisory { decision }
            | Self::AfterFinalization { decision } => decision,
        }
    }

    /// Whether this particular report finalized the build.
    pub fn finalized_build(&self) -> bool {
        matches!(self, Self::Applied { finalized: true, .. })
    }

    /// Short label for logs and API bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Advisory { .. } => "advisory",
            Self::AfterFinalization { .. } => "after_finalization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_name_validation() {
        assert!(validate_gate_name("tests").is_ok());
        assert!(validate_gate_name("security-scan").is_ok());
        assert!(validate_gate_name("manual_approval.v2").is_ok());

        assert!(validate_gate_name("").is_err());
        assert!(validate_gate_name("has space").is_err());
        assert!(validate_gate_name("slash/name").is_err());
        assert!(validate_gate_name(&"x".repeat(MAX_GATE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_outcome_parsing() {
        assert_eq!("passed".parse::<GateOutcome>().unwrap(), GateOutcome::Passed);
        assert_eq!("FAILED".parse::<GateOutcome>().unwrap(), GateOutcome::Failed);
        assert_eq!("success".parse::<GateOutcome>().unwrap(), GateOutcome::Passed);
        assert!("maybe".parse::<GateOutcome>().is_err());
    }

    #[test]
    fn test_required_gates_start_pending() {
        let gates = GateSet::with_required(["tests", "security-scan"]);

        assert_eq!(gates.pending(), vec!["security-scan", "tests"]);
        assert!(gates.first_failed().is_none());
    }

    #[test]
    fn test_record_splits_required_and_advisory() {
        let mut gates = GateSet::with_required(["tests"]);

        assert_eq!(
            gates.record("tests", GateOutcome::Passed),
            Some(GateOutcome::Pending)
        );
        assert_eq!(gates.record("lint", GateOutcome::Failed), None);

        assert_eq!(gates.required.len(), 1);
        assert_eq!(gates.advisory.get("lint"), Some(&GateOutcome::Failed));
        assert!(gates.first_failed().is_none());
    }

    #[test]
    fn test_latest_report_wins() {
        let mut gates = GateSet::with_required(["tests"]);
        gates.record("tests", GateOutcome::Failed);
        gates.record("tests", GateOutcome::Passed);

        assert_eq!(gates.required["tests"], GateOutcome::Passed);
    }
}
