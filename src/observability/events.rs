//! Process lifecycle events
//!
//! Promotion-level events live with the promotion module; these cover
//! the service around it.

use std::fmt;

/// Observable process events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Startup complete, ready to serve
    BootComplete,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,

    // Configuration
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Configuration rejected (FATAL)
    ConfigInvalid,

    // Serving
    /// HTTP listener bound
    ServerListening,
    /// HTTP server failed (FATAL)
    ServerFailed,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::BootComplete => "BOOT_COMPLETE",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigInvalid => "CONFIG_INVALID",
            Event::ServerListening => "SERVER_LISTENING",
            Event::ServerFailed => "SERVER_FAILED",
        }
    }

    /// Fatal events end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ConfigInvalid | Event::ServerFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let all = [
            Event::BootStart,
            Event::BootComplete,
            Event::ShutdownStart,
            Event::ShutdownComplete,
            Event::ConfigLoaded,
            Event::ConfigInvalid,
            Event::ServerListening,
            Event::ServerFailed,
        ];
        for event in all {
            let name = event.as_str();
            assert!(name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::ConfigInvalid.is_fatal());
        assert!(Event::ServerFailed.is_fatal());
        assert!(!Event::BootComplete.is_fatal());
    }
}
