//! Structured logging setup
//!
//! - One log line = one event
//! - JSON by default, human-readable text on request
//! - `RUST_LOG` overrides the configured level

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{ObservabilityError, ObservabilityResult};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => f.write_str("json"),
            LogFormat::Text => f.write_str("text"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Build the filter: `RUST_LOG` if set, else the configured level.
pub fn env_filter(level: &str) -> ObservabilityResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| ObservabilityError::new(format!("invalid log level '{}': {}", level, e))),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: &str, format: LogFormat) -> ObservabilityResult<()> {
    let filter = env_filter(level)?;

    let json = (format == LogFormat::Json)
        .then(|| fmt_layer::layer().json().with_current_span(false));
    let text = (format == LogFormat::Text).then(|| fmt_layer::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| ObservabilityError::new(format!("logging already initialized: {}", e)))
}
