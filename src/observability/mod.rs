//! Observability subsystem
//!
//! - Structured logging through `tracing`
//! - Counter metrics
//! - Named lifecycle events
//!
//! Observability failure must never change a promotion outcome.
//!
//! # Usage
//!
//! ```ignore
//! use promoter::observability::{init_logging, log_event, Event, LogFormat};
//!
//! init_logging("info", LogFormat::Json)?;
//! log_event(Event::BootStart);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{env_filter, init_logging, LogFormat};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

use thiserror::Error;

/// Observability error. Never fatal to promotion.
#[derive(Debug, Clone, Error)]
#[error("observability failure: {message}")]
pub struct ObservabilityError {
    message: String,
}

impl ObservabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    if event.is_fatal() {
        tracing::error!(event = event.as_str());
    } else {
        tracing::info!(event = event.as_str());
    }
}

/// Log a lifecycle event with a detail message
pub fn log_event_with_detail(event: Event, detail: &str) {
    if event.is_fatal() {
        tracing::error!(event = event.as_str(), detail);
    } else {
        tracing::info!(event = event.as_str(), detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_error_display() {
        let err = ObservabilityError::new("test message");
        assert!(err.to_string().contains("test message"));
        assert_eq!(err.message(), "test message");
    }

    #[test]
    fn test_log_event_without_subscriber() {
        // No subscriber installed: must not panic
        log_event(Event::BootStart);
        log_event_with_detail(Event::ConfigInvalid, "missing branches");
    }
}
