//! Promotion Controller
//!
//! Coordinates builds from registration to a single dispatched decision:
//! - Validates inbound events and gate reports
//! - Resolves each build's environment and required gates
//! - Evaluates after every report and on timeout
//! - Finalizes exactly once, then dispatches exactly once
//!
//! Non-Responsibilities:
//! - Does not build artifacts or run checks
//! - Does not retry deliveries to the executor
//! - Does not re-promote rejected builds; that takes a new build event
//!
//! Builds live in an index map of per-build records, each behind its own
//! mutex. The map lock only guards lookups, inserts and removals; it is
//! never held while a record is locked, and a record lock is never held
//! across dispatch.
//!
//! Purged builds leave a tombstone (ref and final decision) so that a
//! redelivered event can never open a second promotion. The tombstone
//! lock is only taken while the map lock is held.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::decision::{DecisionReason, PromotionDecision};
use super::dispatch::{DeployDirective, DeployExecutor, Notification, NotificationSink};
use super::environment::{BranchMapping, EnvironmentTarget};
use super::errors::{PromotionError, PromotionResult};
use super::event::{BuildEvent, BuildId, Registration};
use super::gate::{validate_gate_name, GateOutcome, GateReport, GateSet};
use super::observability::{PromotionEvent, PromotionObserver};
use super::state::BuildRecord;

/// Routing and timing policy, fixed for the controller's lifetime.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub branches: BranchMapping,
    pub required_gates: BTreeMap<EnvironmentTarget, Vec<String>>,
    /// Time from registration after which pending gates count as failed.
    pub gate_timeout: Duration,
    /// How long finalized builds stay addressable.
    pub retention: Duration,
}

impl ControllerConfig {
    /// Required gates for a target. Non-deployable targets have none.
    pub fn required_for(&self, environment: EnvironmentTarget) -> &[String] {
        if !environment.is_deployable() {
            return &[];
        }
        self.required_gates
            .get(&environment)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Read-only view of one build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStatus {
    pub build_id: BuildId,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub environment: EnvironmentTarget,
    pub artifact_ref: String,
    pub state: &'static str,
    pub gates: GateSet,
    pub decision: PromotionDecision,
    pub registered_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Outcome of one timeout sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Builds examined
    pub examined: usize,
    /// Builds force-finalized by the sweep
    pub timed_out: usize,
    /// Builds whose evaluation faulted; left untouched
    pub faults: usize,
}

/// What remains of a purged build.
#[derive(Debug, Clone)]
struct Tombstone {
    git_ref: String,
    decision: PromotionDecision,
}

impl Tombstone {
    fn of(rec: &BuildRecord) -> Option<Self> {
        rec.state.decision().map(|decision| Self {
            git_ref: rec.event.git_ref.clone(),
            decision: decision.clone(),
        })
    }
}

/// Index slot found (or created) for a registration.
enum Slot {
    Existing(Arc<Mutex<BuildRecord>>),
    Retired(Tombstone),
    Inserted(EnvironmentTarget, Option<PromotionDecision>),
}

/// Promotion Controller
pub struct PromotionController {
    config: ControllerConfig,
    builds: RwLock<HashMap<BuildId, Arc<Mutex<BuildRecord>>>>,
    retired: RwLock<HashMap<BuildId, Tombstone>>,
    executor: Arc<dyn DeployExecutor>,
    notifier: Arc<dyn NotificationSink>,
    observer: PromotionObserver,
}

impl PromotionController {
    /// Create a new controller with no builds.
    pub fn new(
        config: ControllerConfig,
        executor: Arc<dyn DeployExecutor>,
        notifier: Arc<dyn NotificationSink>,
        observer: PromotionObserver,
    ) -> Self {
        Self {
            config,
            builds: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashMap::new()),
            executor,
            notifier,
            observer,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn observer(&self) -> &PromotionObserver {
        &self.observer
    }

    /// Number of tracked builds.
    pub fn len(&self) -> usize {
        self.builds.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a build event.
    ///
    /// Redelivery of a known build is idempotent: a pending build answers
    /// `AlreadyRegistered`, a finalized one returns its prior decision.
    /// This holds after the record is purged too.
    pub fn register_build(&self, event: BuildEvent) -> PromotionResult<Registration> {
        self.register_build_at(event, Utc::now())
    }

    pub fn register_build_at(
        &self,
        event: BuildEvent,
        now: DateTime<Utc>,
    ) -> PromotionResult<Registration> {
        event.validate()?;

        let slot = {
            let mut builds = self
                .builds
                .write()
                .map_err(|_| PromotionError::Internal("build index poisoned".into()))?;

            let retired = self
                .retired
                .read()
                .map_err(|_| PromotionError::Internal("tombstone index poisoned".into()))?
                .get(&event.build_id)
                .cloned();

            match (builds.get(&event.build_id).cloned(), retired) {
                (Some(record), _) => Slot::Existing(record),
                (None, Some(tombstone)) => Slot::Retired(tombstone),
                (None, None) => {
                    let (record, finalized) = self.new_record(event.clone(), now)?;
                    let environment = record.environment;
                    builds.insert(event.build_id.clone(), Arc::new(Mutex::new(record)));
                    Slot::Inserted(environment, finalized)
                }
            }
        };

        match slot {
            Slot::Existing(record) => self.duplicate_registration(&event, &record),
            Slot::Retired(tombstone) => self.retired_registration(&event, tombstone),
            Slot::Inserted(environment, finalized) => {
                Ok(self.announce_registration(&event, environment, finalized))
            }
        }
    }

    /// Build a fresh record, finalizing it on the spot when no gate could
    /// ever change the outcome.
    fn new_record(
        &self,
        event: BuildEvent,
        now: DateTime<Utc>,
    ) -> PromotionResult<(BuildRecord, Option<PromotionDecision>)> {
        let environment = self.config.branches.resolve(&event.git_ref);
        let required = self.config.required_for(environment);
        let mut record =
            BuildRecord::new(event, environment, required, now, self.config.gate_timeout);

        let decision = record.evaluate(now);
        if decision.is_terminal() {
            record.finalize(decision.clone(), now)?;
            return Ok((record, Some(decision)));
        }
        Ok((record, None))
    }

    fn announce_registration(
        &self,
        event: &BuildEvent,
        environment: EnvironmentTarget,
        finalized: Option<PromotionDecision>,
    ) -> Registration {
        self.observer.emit(PromotionEvent::BuildRegistered {
            build_id: event.build_id.clone(),
            environment,
        });

        match finalized {
            Some(decision) => {
                self.finish(&decision);
                Registration::Finalized(decision)
            }
            None => Registration::Registered {
                build_id: event.build_id.clone(),
            },
        }
    }

    fn duplicate_registration(
        &self,
        event: &BuildEvent,
        record: &Arc<Mutex<BuildRecord>>,
    ) -> PromotionResult<Registration> {
        let rec = lock(record, &event.build_id)?;

        if rec.event.git_ref != event.git_ref {
            return Err(PromotionError::InvalidEvent(format!(
                "build {} is already registered for ref '{}'",
                event.build_id, rec.event.git_ref
            )));
        }

        self.observer.emit(PromotionEvent::DuplicateRegistration {
            build_id: event.build_id.clone(),
        });

        Ok(match rec.state.decision() {
            Some(decision) => Registration::AlreadyFinalized(decision.clone()),
            None => Registration::AlreadyRegistered {
                build_id: event.build_id.clone(),
            },
        })
    }

    fn retired_registration(
        &self,
        event: &BuildEvent,
        tombstone: Tombstone,
    ) -> PromotionResult<Registration> {
        if tombstone.git_ref != event.git_ref {
            return Err(PromotionError::InvalidEvent(format!(
                "build {} was already promoted for ref '{}'",
                event.build_id, tombstone.git_ref
            )));
        }

        self.observer.emit(PromotionEvent::DuplicateRegistration {
            build_id: event.build_id.clone(),
        });
        Ok(Registration::AlreadyFinalized(tombstone.decision))
    }

    // =========================================================================
    // GATE REPORTS
    // =========================================================================

    /// Record a gate outcome and re-evaluate.
    ///
    /// Only `Passed` and `Failed` can be reported; a gate never goes back
    /// to pending.
    pub fn report_gate(
        &self,
        build_id: &BuildId,
        gate: &str,
        outcome: GateOutcome,
    ) -> PromotionResult<GateReport> {
        self.report_gate_at(build_id, gate, outcome, Utc::now())
    }

    pub fn report_gate_at(
        &self,
        build_id: &BuildId,
        gate: &str,
        outcome: GateOutcome,
        now: DateTime<Utc>,
    ) -> PromotionResult<GateReport> {
        if outcome == GateOutcome::Pending {
            return Err(PromotionError::InvalidEvent(format!(
                "gate '{}' must be reported as passed or failed",
                gate
            )));
        }

        let record = self.record(build_id)?;

        let (report, finalized) = {
            let mut rec = lock(&record, build_id)?;

            if rec.is_past_retention(now, self.config.retention) {
                return Err(PromotionError::UnknownBuild(build_id.to_string()));
            }

            validate_gate_name(gate)?;

            // The deadline is absolute: a report that arrives after it
            // finds the build already timed out.
            let timed_out = self.expire_locked(&mut rec, now)?;

            if let Some(decision) = rec.state.decision().cloned() {
                drop(rec);
                if let Some(timed_out) = timed_out {
                    self.finish(&timed_out);
                }
                self.observer.emit(PromotionEvent::LateGateReport {
                    build_id: build_id.clone(),
                    gate: gate.to_string(),
                });
                return Ok(GateReport::AfterFinalization { decision });
            }

            let advisory = !rec.gates.is_required(gate);
            rec.gates.record(gate, outcome);
            rec.mark_awaiting_gates()?;

            self.observer.emit(PromotionEvent::GateReported {
                build_id: build_id.clone(),
                gate: gate.to_string(),
                outcome,
                advisory,
            });

            let decision = rec.evaluate(now);
            if advisory {
                (GateReport::Advisory { decision }, None)
            } else if decision.is_terminal() {
                rec.finalize(decision.clone(), now)?;
                (
                    GateReport::Applied {
                        decision: decision.clone(),
                        finalized: true,
                    },
                    Some(decision),
                )
            } else {
                (
                    GateReport::Applied {
                        decision,
                        finalized: false,
                    },
                    None,
                )
            }
        };

        if let Some(decision) = finalized {
            self.finish(&decision);
        }
        Ok(report)
    }

    // =========================================================================
    // EVALUATION & TIMEOUTS
    // =========================================================================

    /// Current decision for a build. Pure; never finalizes.
    ///
    /// A build past its deadline reads as timed out even before the sweep
    /// gets to it.
    pub fn evaluate(&self, build_id: &BuildId) -> PromotionResult<PromotionDecision> {
        self.evaluate_at(build_id, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        build_id: &BuildId,
        now: DateTime<Utc>,
    ) -> PromotionResult<PromotionDecision> {
        let record = self.record(build_id)?;
        let rec = lock(&record, build_id)?;

        if rec.is_past_retention(now, self.config.retention) {
            return Err(PromotionError::UnknownBuild(build_id.to_string()));
        }
        Ok(rec.current_decision(now))
    }

    /// Force-finalize a build whose gate deadline has elapsed.
    ///
    /// Returns the decision when this call finalized the build, `None` if
    /// the build was already final or its deadline has not passed.
    pub fn on_timeout(&self, build_id: &BuildId) -> PromotionResult<Option<PromotionDecision>> {
        self.on_timeout_at(build_id, Utc::now())
    }

    pub fn on_timeout_at(
        &self,
        build_id: &BuildId,
        now: DateTime<Utc>,
    ) -> PromotionResult<Option<PromotionDecision>> {
        let record = self.record(build_id)?;
        let finalized = {
            let mut rec = lock(&record, build_id)?;
            self.expire_locked(&mut rec, now)?
        };

        if let Some(decision) = &finalized {
            self.finish(decision);
        }
        Ok(finalized)
    }

    /// Apply the timeout to every open build.
    ///
    /// A fault in one build is contained and counted; the sweep moves on.
    pub fn sweep_timeouts(&self) -> SweepReport {
        self.sweep_timeouts_at(Utc::now())
    }

    pub fn sweep_timeouts_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for (build_id, record) in self.snapshot() {
            report.examined += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut rec = lock(&record, &build_id)?;
                self.expire_locked(&mut rec, now)
            }));

            match outcome {
                Ok(Ok(Some(decision))) => {
                    report.timed_out += 1;
                    self.finish(&decision);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    report.faults += 1;
                    tracing::error!(event = "SWEEP_FAULT", build_id = %build_id, error = %e, "timeout check failed");
                }
                Err(_) => {
                    report.faults += 1;
                    tracing::error!(event = "SWEEP_FAULT", build_id = %build_id, "timeout check panicked");
                }
            }
        }

        report
    }

    /// Drop finalized builds older than the retention window, keeping a
    /// tombstone of each decision.
    ///
    /// A build whose lock was poisoned can no longer be finalized or
    /// swept, so it is dropped once its gate deadline has passed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let retention = self.config.retention;

        let mut stale = Vec::new();
        for (build_id, record) in self.snapshot() {
            match record.lock() {
                Ok(rec) => {
                    if rec.is_past_retention(now, retention) {
                        stale.push((build_id, Tombstone::of(&rec)));
                    }
                }
                Err(poisoned) => {
                    let rec = poisoned.into_inner();
                    if rec.is_expired(now) {
                        tracing::warn!(event = "PURGE_POISONED", build_id = %build_id, "dropping poisoned build record");
                        stale.push((build_id, Tombstone::of(&rec)));
                    }
                }
            };
        }

        let purged = if stale.is_empty() {
            0
        } else {
            self.remove_records(stale)
        };

        self.observer
            .emit(PromotionEvent::RecordsPurged { count: purged });
        purged
    }

    /// Swap records for their tombstones under one short map lock.
    fn remove_records(&self, stale: Vec<(BuildId, Option<Tombstone>)>) -> usize {
        let Ok(mut builds) = self.builds.write() else {
            return 0;
        };
        let Ok(mut retired) = self.retired.write() else {
            return 0;
        };

        let mut purged = 0;
        for (build_id, tombstone) in stale {
            if builds.remove(&build_id).is_none() {
                continue;
            }
            purged += 1;
            if let Some(tombstone) = tombstone {
                retired.insert(build_id, tombstone);
            }
        }
        purged
    }

    // =========================================================================
    // READ-ONLY VIEWS
    // =========================================================================

    /// Status of one build.
    pub fn build_status(&self, build_id: &BuildId) -> PromotionResult<BuildStatus> {
        let now = Utc::now();
        let record = self.record(build_id)?;
        let rec = lock(&record, build_id)?;
        if rec.is_past_retention(now, self.config.retention) {
            return Err(PromotionError::UnknownBuild(build_id.to_string()));
        }
        Ok(status_of(&rec, now))
    }

    /// Status of every tracked build, oldest first.
    pub fn list_builds(&self) -> Vec<BuildStatus> {
        let now = Utc::now();
        let mut statuses: Vec<BuildStatus> = self
            .snapshot()
            .into_iter()
            .filter_map(|(_, record)| record.lock().ok().map(|rec| status_of(&rec, now)))
            .collect();
        statuses.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.build_id.cmp(&b.build_id))
        });
        statuses
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn record(&self, build_id: &BuildId) -> PromotionResult<Arc<Mutex<BuildRecord>>> {
        self.builds
            .read()
            .map_err(|_| PromotionError::Internal("build index poisoned".into()))?
            .get(build_id)
            .cloned()
            .ok_or_else(|| PromotionError::UnknownBuild(build_id.to_string()))
    }

    fn snapshot(&self) -> Vec<(BuildId, Arc<Mutex<BuildRecord>>)> {
        self.builds
            .read()
            .map(|builds| {
                builds
                    .iter()
                    .map(|(id, record)| (id.clone(), Arc::clone(record)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Finalize an open, expired record. Caller holds the record lock.
    fn expire_locked(
        &self,
        rec: &mut BuildRecord,
        now: DateTime<Utc>,
    ) -> PromotionResult<Option<PromotionDecision>> {
        if rec.state.is_finalized() || !rec.is_expired(now) {
            return Ok(None);
        }

        let decision = rec.evaluate_expired(now);
        rec.finalize(decision.clone(), now)?;

        if let DecisionReason::TimedOut { gates } = &decision.reason {
            self.observer.emit(PromotionEvent::TimedOut {
                build_id: decision.build_id.clone(),
                pending: gates.clone(),
            });
        }
        Ok(Some(decision))
    }

    /// Emit and dispatch a freshly finalized decision. Called exactly once
    /// per build, by whichever caller won the finalize transition.
    fn finish(&self, decision: &PromotionDecision) {
        self.observer.emit(PromotionEvent::DecisionFinalized {
            decision: decision.clone(),
        });

        if decision.environment.is_deployable() {
            if let Err(e) = self.executor.dispatch(&DeployDirective::from(decision)) {
                self.observer.emit(PromotionEvent::DispatchFailed {
                    build_id: decision.build_id.clone(),
                    collaborator: "executor",
                    error: e.to_string(),
                });
            }
        }

        if let Err(e) = self.notifier.notify(&Notification::from(decision)) {
            self.observer.emit(PromotionEvent::DispatchFailed {
                build_id: decision.build_id.clone(),
                collaborator: "notifier",
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
impl PromotionController {
    /// Poison one build's lock by panicking while holding it.
    pub(crate) fn poison_for_test(&self, build_id: &BuildId) {
        if let Ok(record) = self.record(build_id) {
            let _ = std::thread::spawn(move || {
                let _guard = record.lock().unwrap();
                panic!("poisoning build record");
            })
            .join();
        }
    }
}

fn lock<'a>(
    record: &'a Mutex<BuildRecord>,
    build_id: &BuildId,
) -> PromotionResult<MutexGuard<'a, BuildRecord>> {
    record
        .lock()
        .map_err(|_| PromotionError::poisoned(build_id))
}

fn status_of(rec: &BuildRecord, now: DateTime<Utc>) -> BuildStatus {
    BuildStatus {
        build_id: rec.event.build_id.clone(),
        git_ref: rec.event.git_ref.clone(),
        environment: rec.environment,
        artifact_ref: rec.artifact_ref.clone(),
        state: rec.state.state_name(),
        gates: rec.gates.clone(),
        decision: rec.current_decision(now),
        registered_at: rec.registered_at,
        deadline: rec.deadline,
        finalized_at: rec.finalized_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;
    use crate::promotion::decision::Decision;
    use crate::promotion::dispatch::{MemoryExecutor, MemoryNotifier};

    struct Harness {
        controller: PromotionController,
        executor: Arc<MemoryExecutor>,
        notifier: Arc<MemoryNotifier>,
    }

    fn harness() -> Harness {
        let branches = [
            ("develop".to_string(), EnvironmentTarget::Staging),
            ("main".to_string(), EnvironmentTarget::Production),
        ]
        .into_iter()
        .collect();
        let required_gates = [
            (
                EnvironmentTarget::Staging,
                vec!["tests".to_string(), "security-scan".to_string()],
            ),
            (
                EnvironmentTarget::Production,
                vec![
                    "tests".to_string(),
                    "security-scan".to_string(),
                    "manual-approval".to_string(),
                ],
            ),
        ]
        .into_iter()
        .collect();

        let config = ControllerConfig {
            branches: BranchMapping::new(&branches),
            required_gates,
            gate_timeout: Duration::minutes(30),
            retention: Duration::hours(1),
        };
        let executor = Arc::new(MemoryExecutor::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let controller = PromotionController::new(
            config,
            executor.clone(),
            notifier.clone(),
            PromotionObserver::new(Arc::new(MetricsRegistry::new())),
        );
        Harness {
            controller,
            executor,
            notifier,
        }
    }

    fn id(s: &str) -> BuildId {
        BuildId::new(s)
    }

    #[test]
    fn test_develop_all_gates_pass_deploys_to_staging() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let first = h
            .controller
            .report_gate(&id("1"), "tests", GateOutcome::Passed)
            .unwrap();
        assert_eq!(first.decision().decision, Decision::Hold);
        assert!(!first.finalized_build());

        let second = h
            .controller
            .report_gate(&id("1"), "security-scan", GateOutcome::Passed)
            .unwrap();
        assert!(second.finalized_build());
        assert_eq!(second.decision().decision, Decision::Deploy);
        assert_eq!(second.decision().environment, EnvironmentTarget::Staging);

        let directives = h.executor.directives();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].environment, EnvironmentTarget::Staging);
        assert_eq!(directives[0].decision, Decision::Deploy);
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    #[test]
    fn test_failed_gate_rejects_and_later_pass_is_ignored() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let failed = h
            .controller
            .report_gate(&id("1"), "tests", GateOutcome::Failed)
            .unwrap();
        assert_eq!(failed.decision().decision, Decision::Reject);
        assert!(failed.finalized_build());

        let late = h
            .controller
            .report_gate(&id("1"), "security-scan", GateOutcome::Passed)
            .unwrap();
        assert!(matches!(late, GateReport::AfterFinalization { .. }));
        assert_eq!(late.decision().decision, Decision::Reject);

        assert_eq!(h.executor.directives().len(), 1);
        assert_eq!(h.executor.directives()[0].decision, Decision::Reject);
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    #[test]
    fn test_unmapped_branch_holds_without_dispatch() {
        let h = harness();
        let registration = h
            .controller
            .register_build(BuildEvent::new("1", "feature/x"))
            .unwrap();

        let decision = registration.decision().unwrap();
        assert_eq!(decision.decision, Decision::Hold);
        assert_eq!(decision.reason, DecisionReason::NotDeployable);

        let report = h
            .controller
            .report_gate(&id("1"), "tests", GateOutcome::Passed)
            .unwrap();
        assert_eq!(report.decision().decision, Decision::Hold);

        assert!(h.executor.directives().is_empty());
        assert_eq!(h.notifier.notifications().len(), 1);
        assert_eq!(
            h.notifier.notifications()[0].environment,
            EnvironmentTarget::None
        );
    }

    #[test]
    fn test_register_rejects_empty_ref() {
        let h = harness();
        let err = h
            .controller
            .register_build(BuildEvent::new("1", ""))
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidEvent(_)));
        assert!(h.controller.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let again = h
            .controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();
        assert!(matches!(again, Registration::AlreadyRegistered { .. }));

        h.controller
            .report_gate(&id("1"), "tests", GateOutcome::Failed)
            .unwrap();

        let after = h
            .controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();
        match after {
            Registration::AlreadyFinalized(decision) => {
                assert_eq!(decision.decision, Decision::Reject)
            }
            other => panic!("expected AlreadyFinalized, got {:?}", other),
        }
        assert_eq!(h.executor.directives().len(), 1);
    }

    #[test]
    fn test_duplicate_id_with_other_ref_is_invalid() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let err = h
            .controller
            .register_build(BuildEvent::new("1", "main"))
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidEvent(_)));
    }

    #[test]
    fn test_report_for_unknown_build() {
        let h = harness();
        let err = h
            .controller
            .report_gate(&id("404"), "tests", GateOutcome::Passed)
            .unwrap_err();
        assert_eq!(err, PromotionError::UnknownBuild("404".into()));
    }

    #[test]
    fn test_malformed_gate_name_leaves_state_unchanged() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let err = h
            .controller
            .report_gate(&id("1"), "bad gate", GateOutcome::Passed)
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidGateName { .. }));

        let status = h.controller.build_status(&id("1")).unwrap();
        assert_eq!(status.state, "Pending");
        assert!(status.gates.advisory.is_empty());
    }

    #[test]
    fn test_advisory_gate_is_recorded_but_ignored() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();

        let report = h
            .controller
            .report_gate(&id("1"), "lint", GateOutcome::Failed)
            .unwrap();
        assert!(matches!(report, GateReport::Advisory { .. }));
        assert_eq!(report.decision().decision, Decision::Hold);

        h.controller
            .report_gate(&id("1"), "tests", GateOutcome::Passed)
            .unwrap();
        let last = h
            .controller
            .report_gate(&id("1"), "security-scan", GateOutcome::Passed)
            .unwrap();
        assert_eq!(last.decision().decision, Decision::Deploy);
        assert_eq!(
            last.decision().gate_results.advisory.get("lint"),
            Some(&GateOutcome::Failed)
        );
    }

    #[test]
    fn test_evaluate_is_pure() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "main"))
            .unwrap();

        for _ in 0..3 {
            let d = h.controller.evaluate(&id("1")).unwrap();
            assert_eq!(d.decision, Decision::Hold);
        }
        assert_eq!(
            h.controller.build_status(&id("1")).unwrap().state,
            "Pending"
        );
        assert!(h.notifier.notifications().is_empty());
    }

    #[test]
    fn test_timeout_rejects_pending_build() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "main"), t0)
            .unwrap();
        h.controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, t0)
            .unwrap();

        let early = h
            .controller
            .on_timeout_at(&id("1"), t0 + Duration::minutes(29))
            .unwrap();
        assert!(early.is_none());

        let decision = h
            .controller
            .on_timeout_at(&id("1"), t0 + Duration::minutes(30))
            .unwrap()
            .unwrap();
        assert_eq!(decision.decision, Decision::Reject);
        assert!(matches!(decision.reason, DecisionReason::TimedOut { .. }));

        let again = h
            .controller
            .on_timeout_at(&id("1"), t0 + Duration::minutes(31))
            .unwrap();
        assert!(again.is_none());
        assert_eq!(h.executor.directives().len(), 1);
    }

    #[test]
    fn test_report_after_deadline_finds_build_timed_out() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "develop"), t0)
            .unwrap();
        h.controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, t0)
            .unwrap();

        let report = h
            .controller
            .report_gate_at(
                &id("1"),
                "security-scan",
                GateOutcome::Passed,
                t0 + Duration::minutes(45),
            )
            .unwrap();

        assert!(matches!(report, GateReport::AfterFinalization { .. }));
        assert_eq!(report.decision().decision, Decision::Reject);
        assert_eq!(h.executor.directives().len(), 1);
        assert_eq!(h.executor.directives()[0].decision, Decision::Reject);
    }

    #[test]
    fn test_sweep_finalizes_only_expired_builds() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("old", "develop"), t0)
            .unwrap();
        h.controller
            .register_build_at(
                BuildEvent::new("new", "develop"),
                t0 + Duration::minutes(20),
            )
            .unwrap();

        let report = h.controller.sweep_timeouts_at(t0 + Duration::minutes(35));

        assert_eq!(report.examined, 2);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.faults, 0);
        assert_eq!(h.executor.directives()[0].build_id, id("old"));
        assert_eq!(
            h.controller.build_status(&id("new")).unwrap().state,
            "Pending"
        );
    }

    #[test]
    fn test_retention_window() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "develop"), t0)
            .unwrap();
        h.controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Failed, t0)
            .unwrap();

        let within = t0 + Duration::minutes(59);
        let late = h
            .controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, within)
            .unwrap();
        assert!(matches!(late, GateReport::AfterFinalization { .. }));

        let beyond = t0 + Duration::minutes(61);
        let err = h
            .controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, beyond)
            .unwrap_err();
        assert!(matches!(err, PromotionError::UnknownBuild(_)));

        assert_eq!(h.controller.purge_expired_at(beyond), 1);
        assert!(h.controller.is_empty());
        assert_eq!(h.controller.observer().metrics().snapshot().records_purged, 1);
    }

    #[test]
    fn test_purge_keeps_open_builds() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "develop"), t0)
            .unwrap();

        assert_eq!(h.controller.purge_expired_at(t0 + Duration::days(7)), 0);
        assert_eq!(h.controller.len(), 1);
    }

    #[test]
    fn test_redelivery_after_purge_keeps_prior_decision() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "develop"), t0)
            .unwrap();
        for gate in ["tests", "security-scan"] {
            h.controller
                .report_gate_at(&id("1"), gate, GateOutcome::Passed, t0)
                .unwrap();
        }

        let later = t0 + Duration::hours(3);
        assert_eq!(h.controller.purge_expired_at(later), 1);
        assert!(h.controller.is_empty());

        let registration = h
            .controller
            .register_build_at(BuildEvent::new("1", "develop"), later)
            .unwrap();
        assert!(matches!(registration, Registration::AlreadyFinalized(_)));
        assert_eq!(
            registration.decision().map(|d| d.decision),
            Some(Decision::Deploy)
        );
        assert!(h.controller.is_empty());

        let err = h
            .controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, later)
            .unwrap_err();
        assert!(matches!(err, PromotionError::UnknownBuild(_)));
        assert!(matches!(
            h.controller.evaluate_at(&id("1"), later),
            Err(PromotionError::UnknownBuild(_))
        ));

        let err = h
            .controller
            .register_build_at(BuildEvent::new("1", "main"), later)
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidEvent(_)));

        assert_eq!(h.executor.directives().len(), 1);
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    #[test]
    fn test_pending_outcome_cannot_be_reported() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "develop"))
            .unwrap();
        h.controller
            .report_gate(&id("1"), "tests", GateOutcome::Passed)
            .unwrap();

        let err = h
            .controller
            .report_gate(&id("1"), "tests", GateOutcome::Pending)
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidEvent(_)));

        let status = h.controller.build_status(&id("1")).unwrap();
        assert_eq!(status.gates.required["tests"], GateOutcome::Passed);

        h.controller
            .report_gate(&id("1"), "security-scan", GateOutcome::Passed)
            .unwrap();
        assert_eq!(h.executor.directives().len(), 1);
        assert_eq!(h.executor.directives()[0].decision, Decision::Deploy);
    }

    #[test]
    fn test_evaluate_after_deadline_reads_timed_out() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("1", "develop"), t0)
            .unwrap();
        h.controller
            .report_gate_at(&id("1"), "tests", GateOutcome::Passed, t0)
            .unwrap();

        let late = t0 + Duration::minutes(31);
        let decision = h.controller.evaluate_at(&id("1"), late).unwrap();
        assert_eq!(decision.decision, Decision::Reject);
        assert_eq!(
            decision.reason,
            DecisionReason::TimedOut {
                gates: vec!["security-scan".to_string()]
            }
        );

        // Still open until the sweep runs
        assert!(h.executor.directives().is_empty());
        assert_eq!(
            h.controller.build_status(&id("1")).unwrap().state,
            "AwaitingGates"
        );

        let swept = h.controller.on_timeout_at(&id("1"), late).unwrap();
        assert_eq!(swept, Some(decision));
        assert_eq!(h.executor.directives().len(), 1);
    }

    #[test]
    fn test_list_builds_oldest_first() {
        let h = harness();
        let t0 = Utc::now();
        h.controller
            .register_build_at(BuildEvent::new("b", "develop"), t0 + Duration::seconds(1))
            .unwrap();
        h.controller
            .register_build_at(BuildEvent::new("a", "main"), t0)
            .unwrap();

        let ids: Vec<_> = h
            .controller
            .list_builds()
            .into_iter()
            .map(|s| s.build_id)
            .collect();
        assert_eq!(ids, vec![id("a"), id("b")]);
    }

    #[test]
    fn test_metrics_track_decisions() {
        let h = harness();
        h.controller
            .register_build(BuildEvent::new("1", "feature/y"))
            .unwrap();
        h.controller
            .register_build(BuildEvent::new("2", "develop"))
            .unwrap();
        h.controller
            .report_gate(&id("2"), "tests", GateOutcome::Failed)
            .unwrap();

        let snapshot = h.controller.observer().metrics().snapshot();
        assert_eq!(snapshot.builds_registered, 2);
        assert_eq!(snapshot.decisions_hold, 1);
        assert_eq!(snapshot.decisions_reject, 1);
        assert_eq!(snapshot.decisions_deploy, 0);
    }
}
