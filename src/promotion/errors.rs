//! Promotion Error Types
//!
//! Validation failures are local to the caller and never affect other
//! builds. A promotion that cannot be proven safe is rejected, not guessed.

use thiserror::Error;

/// Result type for promotion operations
pub type PromotionResult<T> = Result<T, PromotionError>;

/// Promotion error kinds, for observability and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionErrorKind {
    /// Build event failed format validation
    InvalidEvent,

    /// Build was never registered or has aged out of retention
    UnknownBuild,

    /// Gate name is malformed
    InvalidGateName,

    /// Forbidden state transition attempted
    ForbiddenTransition,

    /// Unexpected fault while handling a single build
    Internal,
}

impl PromotionErrorKind {
    /// Stable code string for logs and API bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEvent => "INVALID_EVENT",
            Self::UnknownBuild => "UNKNOWN_BUILD",
            Self::InvalidGateName => "INVALID_GATE_NAME",
            Self::ForbiddenTransition => "FORBIDDEN_TRANSITION",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Promotion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("invalid build event: {0}")]
    InvalidEvent(String),

    #[error("unknown build: {0}")]
    UnknownBuild(String),

    #[error("invalid gate name '{name}': {reason}")]
    InvalidGateName { name: String, reason: &'static str },

    #[error("forbidden transition: {from} → {to}")]
    ForbiddenTransition { from: &'static str, to: &'static str },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PromotionError {
    /// Create a forbidden transition error.
    pub fn forbidden_transition(from: &'static str, to: &'static str) -> Self {
        Self::ForbiddenTransition { from, to }
    }

    /// Create an invalid gate name error.
    pub fn invalid_gate_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidGateName {
            name: name.into(),
            reason,
        }
    }

    /// Lock poisoned by a panic while another caller held it.
    pub(crate) fn poisoned(build_id: impl std::fmt::Display) -> Self {
        Self::Internal(format!("state for build {} is poisoned", build_id))
    }

    /// Get the error kind.
    pub fn kind(&self) -> PromotionErrorKind {
        match self {
            Self::InvalidEvent(_) => PromotionErrorKind::InvalidEvent,
            Self::UnknownBuild(_) => PromotionErrorKind::UnknownBuild,
            Self::InvalidGateName { .. } => PromotionErrorKind::InvalidGateName,
            Self::ForbiddenTransition { .. } => PromotionErrorKind::ForbiddenTransition,
            Self::Internal(_) => PromotionErrorKind::Internal,
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidEvent(_) => 400,
            Self::UnknownBuild(_) => 404,
            Self::InvalidGateName { .. } => 400,
            Self::ForbiddenTransition { .. } => 409,
            Self::Internal(_) => 500,
        }
    }
}
