//! Build Event Types
//!
//! A build event identifies one commit/push: the ref it targets, a unique
//! build identifier, and the artifact produced for it. Events are created
//! by the upstream build trigger and are immutable once registered.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::decision::PromotionDecision;
use super::errors::{PromotionError, PromotionResult};

/// Unique build identifier assigned by the upstream trigger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BuildId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A build to be considered for promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Unique build identifier
    pub build_id: BuildId,

    /// Branch the commit was pushed to
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Reference to the built artifact (image tag, package URL, ...)
    #[serde(default)]
    pub artifact_ref: Option<String>,

    /// Commit SHA, for observability only
    #[serde(default)]
    pub commit: Option<String>,
}

impl BuildEvent {
    /// Create a new build event.
    pub fn new(build_id: impl Into<BuildId>, git_ref: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            git_ref: git_ref.into(),
            artifact_ref: None,
            commit: None,
        }
    }

    /// Set the artifact reference.
    pub fn with_artifact(mut self, artifact_ref: impl Into<String>) -> Self {
        self.artifact_ref = Some(artifact_ref.into());
        self
    }

    /// Set the commit SHA.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Artifact reference, falling back to `<ref>@<build_id>`.
    pub fn resolved_artifact(&self) -> String {
        match &self.artifact_ref {
            Some(artifact) if !artifact.trim().is_empty() => artifact.clone(),
            _ => format!("{}@{}", self.git_ref, self.build_id),
        }
    }

    /// Validate the event format.
    pub fn validate(&self) -> PromotionResult<()> {
        if self.git_ref.trim().is_empty() {
            return Err(PromotionError::InvalidEvent("ref cannot be empty".into()));
        }
        if self.build_id.as_str().trim().is_empty() {
            return Err(PromotionError::InvalidEvent(
                "build_id cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a build registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// Build accepted; gates are awaited.
    Registered { build_id: BuildId },

    /// Build accepted and finalized on the spot (non-deployable ref).
    Finalized(PromotionDecision),

    /// Same build delivered again while still pending.
    AlreadyRegistered { build_id: BuildId },

    /// Same build delivered again after finalization; prior decision returned.
    AlreadyFinalized(PromotionDecision),
}

impl Registration {
    /// Build identifier this registration refers to.
    pub fn build_id(&self) -> &BuildId {
        match self {
            Self::Registered { build_id } | Self::AlreadyRegistered { build_id } => build_id,
            Self::Finalized(decision) | Self::AlreadyFinalized(decision) => &decision.build_id,
        }
    }

    /// Whether this call was a redelivery of a known build.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered { .. } | Self::AlreadyFinalized(_)
        )
    }

    /// Decision, if the build is already finalized.
    pub fn decision(&self) -> Option<&PromotionDecision> {
        match self {
            Self::Finalized(decision) | Self::AlreadyFinalized(decision) => Some(decision),
            _ => None,
        }
    }
}
