//! Environment Resolution
//!
//! Every build ref maps deterministically to one target environment.
//! Refs that match no configured entry are not deployable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment target of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTarget {
    Staging,
    Production,
    /// The ref is not deployable.
    None,
}

impl EnvironmentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
            Self::None => "none",
        }
    }

    /// Whether builds for this target can ever be dispatched.
    pub fn is_deployable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for EnvironmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            "none" => Ok(Self::None),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

/// Branch → environment mapping.
///
/// Keys are exact branch names, or prefixes ending in `*`
/// (`release/*`). An exact key beats any pattern; between patterns the
/// longest prefix wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchMapping {
    exact: BTreeMap<String, EnvironmentTarget>,
    prefixes: Vec<(String, EnvironmentTarget)>,
}

impl BranchMapping {
    /// Build a mapping from configured entries.
    pub fn new(entries: &BTreeMap<String, EnvironmentTarget>) -> Self {
        let mut exact = BTreeMap::new();
        let mut prefixes = Vec::new();

        for (key, target) in entries {
            match key.strip_suffix('*') {
                Some(prefix) => prefixes.push((prefix.to_string(), *target)),
                None => {
                    exact.insert(key.clone(), *target);
                }
            }
        }

        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self { exact, prefixes }
    }

    /// Resolve the target for a ref.
    ///
    /// Accepts both short branch names and `refs/heads/<branch>`.
    pub fn resolve(&self, git_ref: &str) -> EnvironmentTarget {
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);

        if let Some(target) = self.exact.get(branch) {
            return *target;
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| branch.starts_with(prefix.as_str()))
            .map(|(_, target)| *target)
            .unwrap_or(EnvironmentTarget::None)
    }

    /// Number of configured entries.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
