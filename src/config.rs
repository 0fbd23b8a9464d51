//! Service configuration
//!
//! Loaded once at start from a JSON file, then overridden from the
//! process environment (`HOST`, `PORT`, `ENVIRONMENT`, `LOG_LEVEL`,
//! `DEBUG`). Immutable afterwards.
//!
//! Timing values have no built-in default: a missing `gate_timeout_secs`
//! or `retention_secs` is a load error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::observability::LogFormat;
use crate::promotion::{
    validate_gate_name, BranchMapping, CommandExecutor, ControllerConfig, DeployExecutor,
    EnvironmentTarget, LogExecutor,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors. Always fatal at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoterConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    /// Deployment label reported by `/health` (default "development")
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Branch name or `prefix*` → target
    pub branches: BTreeMap<String, EnvironmentTarget>,

    /// Target name → required gate names
    #[serde(default)]
    pub required_gates: BTreeMap<String, Vec<String>>,

    pub gate_timeout_secs: u64,

    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// `[program, args...]`; absent means directives are only logged
    #[serde(default)]
    pub deploy_command: Option<Vec<String>>,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sweep_interval() -> u64 {
    5
}

impl PromoterConfig {
    /// Load from file, apply process environment, validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without environment overrides or validation.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Env {
                var: "PORT",
                reason: format!("'{}': {}", port, e),
            })?;
        }

        if let Some(environment) = lookup("ENVIRONMENT") {
            self.environment = environment;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_ascii_lowercase();
        }

        if let Some(debug) = lookup("DEBUG") {
            if matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                self.log_level = "debug".to_string();
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.branches.is_empty() {
            return Err(ConfigError::invalid("branches must map at least one branch"));
        }

        for key in self.branches.keys() {
            if key.is_empty() || key == "*" {
                return Err(ConfigError::invalid(format!(
                    "branch key '{}' matches nothing or everything",
                    key
                )));
            }
        }

        let required = self.parsed_required_gates()?;

        for target in self.branches.values().filter(|t| t.is_deployable()) {
            match required.get(target) {
                Some(gates) if !gates.is_empty() => {}
                _ => {
                    return Err(ConfigError::invalid(format!(
                        "required_gates has no gates for mapped environment '{}'",
                        target
                    )))
                }
            }
        }

        if self.gate_timeout_secs == 0 {
            return Err(ConfigError::invalid("gate_timeout_secs must be > 0"));
        }

        if self.retention_secs == 0 {
            return Err(ConfigError::invalid("retention_secs must be > 0"));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("sweep_interval_secs must be > 0"));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(format!(
                "log_level '{}' is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if let Some(command) = &self.deploy_command {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::invalid("deploy_command must name a program"));
            }
        }

        Ok(())
    }

    /// Required gates keyed by target, with names checked.
    fn parsed_required_gates(&self) -> ConfigResult<BTreeMap<EnvironmentTarget, Vec<String>>> {
        let mut parsed = BTreeMap::new();

        for (name, gates) in &self.required_gates {
            let target: EnvironmentTarget = name
                .parse()
                .map_err(|e: String| ConfigError::invalid(format!("required_gates: {}", e)))?;

            if !target.is_deployable() {
                return Err(ConfigError::invalid(
                    "required_gates cannot list gates for 'none'",
                ));
            }

            for gate in gates {
                validate_gate_name(gate)
                    .map_err(|e| ConfigError::invalid(format!("required_gates.{}: {}", name, e)))?;
            }

            let mut unique = gates.clone();
            unique.sort();
            unique.dedup();
            if unique.len() != gates.len() {
                return Err(ConfigError::invalid(format!(
                    "required_gates.{} lists a gate twice",
                    name
                )));
            }

            parsed.insert(target, gates.clone());
        }

        Ok(parsed)
    }

    /// Controller policy derived from this configuration.
    pub fn controller_config(&self) -> ConfigResult<ControllerConfig> {
        Ok(ControllerConfig {
            branches: BranchMapping::new(&self.branches),
            required_gates: self.parsed_required_gates()?,
            gate_timeout: seconds(self.gate_timeout_secs, "gate_timeout_secs")?,
            retention: seconds(self.retention_secs, "retention_secs")?,
        })
    }

    /// Deploy executor for this configuration.
    pub fn executor(&self) -> ConfigResult<Arc<dyn DeployExecutor>> {
        match &self.deploy_command {
            Some(command) => {
                let executor = CommandExecutor::new(command)
                    .map_err(|e| ConfigError::invalid(format!("deploy_command: {}", e)))?;
                Ok(Arc::new(executor))
            }
            None => Ok(Arc::new(LogExecutor)),
        }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn seconds(value: u64, field: &str) -> ConfigResult<chrono::Duration> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ConfigError::invalid(format!("{} is out of range", field)))
}
