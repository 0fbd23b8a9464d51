//! Release Promotion
//!
//! Decides, per build, whether its artifact is promoted to staging or
//! production:
//! - Builds are registered once and finalized exactly once
//! - Deploy only when every required gate passed
//! - Any failed required gate rejects
//! - Gates still pending at the deadline reject; ambiguity never deploys
//! - Refs with no environment hold and are never dispatched
//!
//! Deployment and notification delivery are external collaborators behind
//! the `DeployExecutor` and `NotificationSink` traits.

mod controller;
mod decision;
mod dispatch;
mod environment;
mod errors;
mod evaluator;
mod event;
mod gate;
mod observability;
mod state;
mod sweeper;

pub use controller::{BuildStatus, ControllerConfig, PromotionController, SweepReport};
pub use decision::{Decision, DecisionReason, PromotionDecision};
pub use dispatch::{
    CommandExecutor, DeployDirective, DeployExecutor, DispatchError, LogExecutor, LogNotifier,
    MemoryExecutor, MemoryNotifier, Notification, NotificationSink,
};
pub use environment::{BranchMapping, EnvironmentTarget};
pub use errors::{PromotionError, PromotionErrorKind, PromotionResult};
pub use evaluator::{EvaluationContext, PromotionEvaluator};
pub use event::{BuildEvent, BuildId, Registration};
pub use gate::{validate_gate_name, GateOutcome, GateReport, GateSet, MAX_GATE_NAME_LEN};
pub use observability::{PromotionEvent, PromotionObserver};
pub use state::{BuildRecord, BuildState};
pub use sweeper::TimeoutSweeper;
