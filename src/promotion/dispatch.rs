//! Directive and Notification Dispatch
//!
//! The controller hands each finalized decision to two opaque
//! collaborators: a deployment executor (only for deployable targets) and
//! a notification sink (always). Dispatch is fire-and-forget; delivery
//! retries belong to the executor, never to the controller.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::decision::{Decision, PromotionDecision};
use super::environment::EnvironmentTarget;
use super::event::BuildId;
use super::gate::GateOutcome;

/// Instruction for the deployment executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDirective {
    pub environment: EnvironmentTarget,
    pub build_id: BuildId,
    pub artifact_ref: String,
    pub decision: Decision,
}

impl From<&PromotionDecision> for DeployDirective {
    fn from(d: &PromotionDecision) -> Self {
        Self {
            environment: d.environment,
            build_id: d.build_id.clone(),
            artifact_ref: d.artifact_ref.clone(),
            decision: d.decision,
        }
    }
}

/// Observability payload emitted for every finalized decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub build_id: BuildId,
    pub environment: EnvironmentTarget,
    pub decision: Decision,
    pub reason: String,
    pub gate_results: BTreeMap<String, GateOutcome>,
}

impl From<&PromotionDecision> for Notification {
    fn from(d: &PromotionDecision) -> Self {
        let mut gate_results = d.gate_results.required.clone();
        for (name, outcome) in &d.gate_results.advisory {
            gate_results.entry(name.clone()).or_insert(*outcome);
        }
        Self {
            id: Uuid::new_v4(),
            build_id: d.build_id.clone(),
            environment: d.environment,
            decision: d.decision,
            reason: d.reason.description(),
            gate_results,
        }
    }
}

/// Dispatch failures. Logged and counted; never retried by the controller.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("failed to launch deploy command: {0}")]
    Launch(String),

    #[error("sink rejected notification: {0}")]
    Sink(String),
}

/// Performs (or hands off) the actual deployment.
pub trait DeployExecutor: Send + Sync {
    fn dispatch(&self, directive: &DeployDirective) -> Result<(), DispatchError>;
}

/// Receives decision notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Executor that only logs directives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExecutor;

impl DeployExecutor for LogExecutor {
    fn dispatch(&self, directive: &DeployDirective) -> Result<(), DispatchError> {
        tracing::info!(
            event = "DEPLOY_DIRECTIVE",
            build_id = %directive.build_id,
            environment = %directive.environment,
            artifact_ref = %directive.artifact_ref,
            decision = %directive.decision,
            "deploy directive issued"
        );
        Ok(())
    }
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DispatchError> {
        let gates = serde_json::to_string(&notification.gate_results)
            .map_err(|e| DispatchError::Sink(e.to_string()))?;
        tracing::info!(
            event = "PROMOTION_NOTIFICATION",
            notification_id = %notification.id,
            build_id = %notification.build_id,
            environment = %notification.environment,
            decision = %notification.decision,
            reason = %notification.reason,
            gates = %gates,
            "promotion decision"
        );
        Ok(())
    }
}

/// Executor that launches an external program per directive.
///
/// The directive is passed through `PROMOTE_*` environment variables. The
/// child runs on the tokio runtime; its exit status is logged and never
/// fed back into the controller.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Create from a `[program, args...]` vector.
    pub fn new(command: &[String]) -> Result<Self, DispatchError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| DispatchError::Launch("deploy command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Environment passed to the child.
    pub fn env_for(directive: &DeployDirective) -> [(&'static str, String); 4] {
        [
            ("PROMOTE_ENVIRONMENT", directive.environment.to_string()),
            ("PROMOTE_BUILD_ID", directive.build_id.to_string()),
            ("PROMOTE_ARTIFACT_REF", directive.artifact_ref.clone()),
            ("PROMOTE_DECISION", directive.decision.to_string()),
        ]
    }
}

impl DeployExecutor for CommandExecutor {
    fn dispatch(&self, directive: &DeployDirective) -> Result<(), DispatchError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in Self::env_for(directive) {
            command.env(key, value);
        }

        let _guard = handle.enter();
        let mut child = command
            .spawn()
            .map_err(|e| DispatchError::Launch(format!("{}: {}", self.program, e)))?;

        let build_id = directive.build_id.clone();
        handle.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!(event = "DEPLOY_COMMAND_EXITED", build_id = %build_id, "deploy command succeeded");
                }
                Ok(status) => {
                    tracing::warn!(event = "DEPLOY_COMMAND_EXITED", build_id = %build_id, status = %status, "deploy command failed");
                }
                Err(e) => {
                    tracing::error!(event = "DEPLOY_COMMAND_EXITED", build_id = %build_id, error = %e, "deploy command could not be awaited");
                }
            }
        });
        Ok(())
    }
}

/// Executor that records directives in memory.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    directives: Mutex<Vec<DeployDirective>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directives received so far, in dispatch order.
    pub fn directives(&self) -> Vec<DeployDirective> {
        self.directives
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl DeployExecutor for MemoryExecutor {
    fn dispatch(&self, directive: &DeployDirective) -> Result<(), DispatchError> {
        self.directives
            .lock()
            .map_err(|_| DispatchError::Unavailable("lock poisoned".into()))?
            .push(directive.clone());
        Ok(())
    }
}

/// Sink that records notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.notifications
            .lock()
            .map_err(|_| DispatchError::Sink("lock poisoned".into()))?
            .push(notification.clone());
        Ok(())
    }
}
