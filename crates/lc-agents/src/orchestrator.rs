//! AgentOrchestrator -- drives a case through its lifecycle and runs the
//! phase automation every time the case lands in a new phase.
//!
//! One async mutex per case serializes transitions and runs for that case;
//! unrelated cases proceed in parallel. Each handler is bounded by a timeout
//! and never retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lc_bridge::event_bus::EventBus;
use lc_bridge::protocol::{BridgeMessage, PhaseChangedPayload, RunSummary};
use lc_core::config::Config;
use lc_core::store::{CaseStore, StoreError};
use lc_core::types::{
    AgentRun, CaseId, CaseStateView, Claim, Complexity, DisputeType, LandType, LocationClass,
    Phase, Task, TaskNotification, TransitionOutcome,
};
use lc_telemetry::metrics::{global_metrics, names};
use lc_telemetry::tracing_setup::create_run_span;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn, Instrument};

use crate::collaborators::{CollaboratorError, DocumentDrafter, DraftRequest};
use crate::negotiation::{LandValuator, NegotiationAgent, ProposalError};
use crate::state_machine::CaseStateMachine;
use crate::task_agent::{BusNotifier, TaskAgent, WorkloadBoard};
use crate::timeline::generate_timeline;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures inside a phase handler. They end up in `AgentRun::errors`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("proposal error: {0}")]
    Proposal(#[from] ProposalError),
    #[error("document drafting failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{phase} handler timed out after {}s", .timeout.as_secs_f64())]
    Timeout { phase: Phase, timeout: Duration },
}

/// Failures of orchestrator operations themselves.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("case {0} already exists")]
    AlreadyExists(CaseId),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CaseError>;

// ---------------------------------------------------------------------------
// Case profile
// ---------------------------------------------------------------------------

const PROFILE_KEY: &str = "case_profile";

/// Facts about the dispute that the phase handlers work from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseProfile {
    pub dispute_type: DisputeType,
    pub complexity: Complexity,
    pub location: String,
    /// Overrides the class derived from `location`.
    pub location_class: Option<LocationClass>,
    pub area_acres: f64,
    pub land_type: LandType,
    pub claims: [Claim; 2],
}

impl Default for CaseProfile {
    fn default() -> Self {
        Self {
            dispute_type: DisputeType::Ownership,
            complexity: Complexity::Medium,
            location: "delhi".to_string(),
            location_class: None,
            area_acres: 1.0,
            land_type: LandType::Agricultural,
            claims: default_claims(),
        }
    }
}

/// Placeholder claims used until the parties' real claims are captured.
pub fn default_claims() -> [Claim; 2] {
    [
        Claim::new("Party A", 60.0, 15, 5),
        Claim::new("Party B", 40.0, 8, 3),
    ]
}

impl CaseProfile {
    pub fn from_config(config: &lc_core::config::OrchestratorConfig) -> Self {
        Self {
            dispute_type: config.default_dispute_type,
            complexity: config.default_complexity,
            location: config.default_location.clone(),
            area_acres: config.default_area_acres,
            ..Self::default()
        }
    }

    pub fn location_class(&self) -> LocationClass {
        self.location_class
            .unwrap_or_else(|| LocationClass::classify(&self.location))
    }
}

/// Per-call overrides for an automation run. Set fields are also remembered
/// for the case's later runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRequest {
    pub dispute_type: Option<DisputeType>,
    pub complexity: Option<Complexity>,
    pub location: Option<String>,
    pub location_class: Option<LocationClass>,
    pub area_acres: Option<f64>,
    pub land_type: Option<LandType>,
    pub claims: Option<[Claim; 2]>,
    pub triggered_by: Option<String>,
}

impl AutomationRequest {
    fn apply_to(self, profile: &mut CaseProfile) {
        if let Some(v) = self.dispute_type {
            profile.dispute_type = v;
        }
        if let Some(v) = self.complexity {
            profile.complexity = v;
        }
        if let Some(v) = self.location {
            profile.location = v;
        }
        if self.location_class.is_some() {
            profile.location_class = self.location_class;
        }
        if let Some(v) = self.area_acres {
            profile.area_acres = v;
        }
        if let Some(v) = self.land_type {
            profile.land_type = v;
        }
        if let Some(v) = self.claims {
            profile.claims = v;
        }
    }
}

struct CaseEntry {
    machine: CaseStateMachine,
    profile: CaseProfile,
}

impl CaseEntry {
    fn hydrate(machine: CaseStateMachine, fallback: &CaseProfile) -> Self {
        let profile = match machine.context().get(PROFILE_KEY) {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                warn!(
                    case_id = machine.case_id(),
                    error = %e,
                    "stored case profile unreadable, using default"
                );
                fallback.clone()
            }),
            None => fallback.clone(),
        };
        Self { machine, profile }
    }

    fn remember_profile(&mut self) {
        match serde_json::to_value(&self.profile) {
            Ok(v) => {
                self.machine.context_mut().insert(PROFILE_KEY.to_string(), v);
            }
            Err(e) => {
                warn!(
                    case_id = self.machine.case_id(),
                    error = %e,
                    "failed to serialize case profile"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AgentOrchestrator
// ---------------------------------------------------------------------------

pub struct AgentOrchestrator {
    cases: DashMap<CaseId, Arc<Mutex<CaseEntry>>>,
    runs: DashMap<String, AgentRun>,
    next_run: AtomicU64,
    store: Arc<dyn CaseStore>,
    task_agent: Arc<TaskAgent>,
    negotiation: Arc<NegotiationAgent>,
    drafter: Arc<dyn DocumentDrafter>,
    notifications: Option<Arc<BusNotifier>>,
    bus: EventBus,
    handler_timeout: Duration,
    default_profile: CaseProfile,
}

impl AgentOrchestrator {
    pub fn new(
        store: Arc<dyn CaseStore>,
        task_agent: Arc<TaskAgent>,
        negotiation: Arc<NegotiationAgent>,
        drafter: Arc<dyn DocumentDrafter>,
        bus: EventBus,
    ) -> Self {
        Self {
            cases: DashMap::new(),
            runs: DashMap::new(),
            next_run: AtomicU64::new(1),
            store,
            task_agent,
            negotiation,
            drafter,
            notifications: None,
            bus,
            handler_timeout: Duration::from_secs(30),
            default_profile: CaseProfile::default(),
        }
    }

    /// Wire the full agent stack from configuration: assignee roster, rate
    /// table, notification history and handler timeout.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CaseStore>,
        drafter: Arc<dyn DocumentDrafter>,
        bus: EventBus,
    ) -> Self {
        let notifier = Arc::new(BusNotifier::new(
            bus.clone(),
            config.notifications.history_capacity,
        ));
        let workloads = Arc::new(WorkloadBoard::new(config.assignment.workloads()));
        let task_agent = Arc::new(TaskAgent::new(workloads, notifier.clone()));
        let negotiation = Arc::new(NegotiationAgent::new(LandValuator::with_rates(
            &config.valuation.location_rates,
        )));

        let mut orchestrator = Self::new(store, task_agent, negotiation, drafter, bus)
            .with_handler_timeout(config.orchestrator.handler_timeout())
            .with_default_profile(CaseProfile::from_config(&config.orchestrator));
        orchestrator.notifications = Some(notifier);
        orchestrator
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_default_profile(mut self, profile: CaseProfile) -> Self {
        self.default_profile = profile;
        self
    }

    pub fn task_agent(&self) -> &Arc<TaskAgent> {
        &self.task_agent
    }

    pub fn negotiation_agent(&self) -> &Arc<NegotiationAgent> {
        &self.negotiation
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Case registry
    // -----------------------------------------------------------------------

    /// Case slot, hydrated from the store on first touch. Unknown cases start
    /// in `Intake`.
    async fn slot(&self, case_id: CaseId) -> Result<Arc<Mutex<CaseEntry>>> {
        if let Some(slot) = self.cases.get(&case_id) {
            return Ok(Arc::clone(slot.value()));
        }
        let machine = match self.store.load_case(case_id).await? {
            Some(snapshot) => CaseStateMachine::from_snapshot(snapshot),
            None => CaseStateMachine::new(case_id),
        };
        let entry = CaseEntry::hydrate(machine, &self.default_profile);
        let slot = self
            .cases
            .entry(case_id)
            .or_insert_with(|| Arc::new(Mutex::new(entry)));
        Ok(Arc::clone(slot.value()))
    }

    /// Register a case explicitly, optionally starting past `Intake`.
    pub async fn create_case(
        &self,
        case_id: CaseId,
        initial_phase: Phase,
        profile: Option<CaseProfile>,
    ) -> Result<CaseStateView> {
        let entry = CaseEntry {
            machine: CaseStateMachine::starting_at(case_id, initial_phase),
            profile: profile.unwrap_or_else(|| self.default_profile.clone()),
        };
        // Reserve the id locked so concurrent lookups wait for the outcome.
        let slot = Arc::new(Mutex::new(entry));
        let mut guard = Arc::clone(&slot).lock_owned().await;
        match self.cases.entry(case_id) {
            Entry::Occupied(_) => return Err(CaseError::AlreadyExists(case_id)),
            Entry::Vacant(v) => {
                v.insert(slot);
            }
        }

        let stored = match self.store.load_case(case_id).await {
            Ok(stored) => stored,
            Err(e) => {
                self.release_reservation(case_id, &mut guard);
                return Err(e.into());
            }
        };
        if let Some(snapshot) = stored {
            *guard = CaseEntry::hydrate(
                CaseStateMachine::from_snapshot(snapshot),
                &self.default_profile,
            );
            return Err(CaseError::AlreadyExists(case_id));
        }

        guard.remember_profile();
        if let Err(e) = self.store.save_case(&guard.machine.snapshot()).await {
            self.release_reservation(case_id, &mut guard);
            return Err(e.into());
        }
        info!(case_id, phase = %initial_phase, "case registered");
        Ok(guard.machine.state_view())
    }

    /// Undo a `create_case` reservation after a store failure. The entry is
    /// reset to a fresh `Intake` case for anyone already waiting on it, and
    /// dropped from the registry when nobody is.
    fn release_reservation(&self, case_id: CaseId, guard: &mut OwnedMutexGuard<CaseEntry>) {
        **guard = CaseEntry::hydrate(CaseStateMachine::new(case_id), &self.default_profile);
        // Held by the registry and the guard only.
        self.cases.remove_if(&case_id, |_, slot| Arc::strong_count(slot) == 2);
    }

    pub async fn state_view(&self, case_id: CaseId) -> Result<CaseStateView> {
        let slot = self.slot(case_id).await?;
        let entry = slot.lock().await;
        Ok(entry.machine.state_view())
    }

    pub async fn can_transition(&self, case_id: CaseId, target: Phase) -> Result<bool> {
        let slot = self.slot(case_id).await?;
        let entry = slot.lock().await;
        Ok(entry.machine.can_transition(target))
    }

    pub async fn profile(&self, case_id: CaseId) -> Result<CaseProfile> {
        let slot = self.slot(case_id).await?;
        let entry = slot.lock().await;
        Ok(entry.profile.clone())
    }

    async fn persist(&self, entry: &CaseEntry) {
        if let Err(e) = self.store.save_case(&entry.machine.snapshot()).await {
            error!(case_id = entry.machine.case_id(), error = %e, "failed to persist case state");
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Move a case to `target` and run the new phase's automation.
    ///
    /// An illegal target is reported in the outcome with the valid
    /// alternatives; nothing changes and no run is created. The case lock is
    /// held across the transition and the run.
    pub async fn transition_case(
        &self,
        case_id: CaseId,
        target: Phase,
        reason: Option<String>,
        triggered_by: &str,
    ) -> Result<TransitionOutcome> {
        let slot = self.slot(case_id).await?;
        let mut entry = slot.lock().await;

        let record = match entry.machine.transition(target, reason, triggered_by) {
            Ok(record) => record,
            Err(e) => {
                global_metrics().increment_counter(names::TRANSITION_REJECTIONS_TOTAL, &[]);
                warn!(case_id, error = %e, "transition rejected");
                return Ok(TransitionOutcome::rejected(e.to_string(), e.valid_transitions()));
            }
        };

        global_metrics().increment_counter(
            names::CASE_TRANSITIONS_TOTAL,
            &[("from", record.from.as_str()), ("to", record.to.as_str())],
        );
        self.persist(&entry).await;
        self.bus.publish(BridgeMessage::PhaseChanged(PhaseChangedPayload {
            case_id,
            from: record.from,
            to: record.to,
            triggered_by: record.triggered_by.clone(),
            reason: record.reason.clone(),
            timestamp: record.timestamp,
        }));

        let run = self.execute_run(&entry, triggered_by).await;
        Ok(TransitionOutcome::accepted(target, run))
    }

    // -----------------------------------------------------------------------
    // Automation runs
    // -----------------------------------------------------------------------

    /// Run the automation for the case's current phase.
    pub async fn run_automation(
        &self,
        case_id: CaseId,
        request: AutomationRequest,
    ) -> Result<AgentRun> {
        let slot = self.slot(case_id).await?;
        let mut entry = slot.lock().await;

        let triggered_by = request
            .triggered_by
            .clone()
            .unwrap_or_else(|| "system".to_string());
        request.apply_to(&mut entry.profile);
        entry.remember_profile();
        self.persist(&entry).await;

        Ok(self.execute_run(&entry, &triggered_by).await)
    }

    fn next_run_id(&self, case_id: CaseId) -> String {
        let n = self.next_run.fetch_add(1, Ordering::Relaxed);
        format!("RUN-{case_id}-{n:04}")
    }

    /// Execute one run for the entry's current phase. The returned run is
    /// always finished.
    async fn execute_run(&self, entry: &CaseEntry, triggered_by: &str) -> AgentRun {
        let case_id = entry.machine.case_id();
        let phase = entry.machine.phase();
        let mut run = AgentRun::start(self.next_run_id(case_id), case_id, phase, triggered_by);
        self.runs.insert(run.run_id.clone(), run.clone());

        let (span, _trace_id) = create_run_span(&run.run_id, case_id, phase.as_str());
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.handler_timeout,
            self.dispatch(phase, case_id, &entry.profile, &mut run.results),
        )
        .instrument(span.clone())
        .await;

        match outcome {
            Ok(Ok(())) => run.complete(),
            Ok(Err(e)) => run.fail(e.to_string()),
            Err(_) => run.fail(
                HandlerError::Timeout {
                    phase,
                    timeout: self.handler_timeout,
                }
                .to_string(),
            ),
        }

        let elapsed = started.elapsed().as_secs_f64();
        let metrics = global_metrics();
        metrics.increment_counter(
            names::AGENT_RUNS_TOTAL,
            &[("phase", phase.as_str()), ("status", run.status.as_str())],
        );
        metrics.record_histogram(names::AGENT_RUN_DURATION_SECONDS, elapsed);

        span.in_scope(|| {
            if run.errors.is_empty() {
                info!(status = run.status.as_str(), elapsed_secs = elapsed, "agent run finished");
            } else {
                warn!(status = run.status.as_str(), errors = ?run.errors, "agent run failed");
            }
        });

        self.runs.insert(run.run_id.clone(), run.clone());
        if let Err(e) = self.store.save_run(&run).await {
            error!(run_id = %run.run_id, error = %e, "failed to persist agent run");
        }
        self.bus
            .publish(BridgeMessage::RunCompleted(RunSummary::from(&run)));
        run
    }

    async fn dispatch(
        &self,
        phase: Phase,
        case_id: CaseId,
        profile: &CaseProfile,
        results: &mut Map<String, Value>,
    ) -> std::result::Result<(), HandlerError> {
        match phase {
            Phase::Intake => {
                let timeline = generate_timeline(
                    case_id,
                    profile.dispute_type,
                    profile.complexity,
                    profile.location_class(),
                    Utc::now(),
                );
                results.insert("timeline".into(), serde_json::to_value(&timeline)?);
            }
            Phase::Verification => {
                results.insert(
                    "verificationNote".into(),
                    json!("Document verification ready for processing"),
                );
            }
            Phase::Analysis => {
                let valuation = self.negotiation.estimate_land_value(
                    profile.area_acres,
                    &profile.location,
                    profile.land_type,
                )?;
                results.insert("landValuation".into(), serde_json::to_value(&valuation)?);
            }
            Phase::Negotiation => {
                let valuation = self.negotiation.estimate_land_value(
                    profile.area_acres,
                    &profile.location,
                    profile.land_type,
                )?;
                let [a, b] = &profile.claims;
                let proposals = self.negotiation.generate_proposals(
                    case_id,
                    profile.dispute_type,
                    a,
                    b,
                    &valuation,
                )?;
                results.insert("proposals".into(), serde_json::to_value(&proposals)?);
                self.store.save_proposals(&proposals).await?;
            }
            Phase::Resolution => {
                let [a, b] = &profile.claims;
                let request = DraftRequest::standard(case_id, &a.party_name, &b.party_name);
                let outcome = self.drafter.draft_settlement(&request).await?;
                let agreement = if outcome.success {
                    json!({
                        "generated": true,
                        "documentType": "settlement_agreement",
                        "cached": outcome.cached,
                    })
                } else {
                    json!({ "generated": false, "error": outcome.error })
                };
                results.insert("settlementAgreement".into(), agreement);
            }
            Phase::Closure => {}
        }

        // Created tasks are recorded even when the store write fails.
        let tasks = self.task_agent.create_tasks_for_phase(case_id, phase, true);
        record_tasks(results, &tasks);
        self.store.save_tasks(&tasks).await?;

        if phase == Phase::Closure {
            results.insert("caseClosed".into(), json!(true));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_run(&self, run_id: &str) -> Option<AgentRun> {
        self.runs.get(run_id).map(|r| r.value().clone())
    }

    pub fn runs_for_case(&self, case_id: CaseId) -> Vec<AgentRun> {
        let mut runs: Vec<AgentRun> = self
            .runs
            .iter()
            .filter(|r| r.case_id == case_id)
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| (a.started_at, &a.run_id).cmp(&(b.started_at, &b.run_id)));
        runs
    }

    pub fn tasks_for_case(&self, case_id: CaseId) -> Vec<Task> {
        self.task_agent.tasks_for_case(case_id)
    }

    /// Most recent task notifications, oldest first. Empty unless the
    /// orchestrator was built with [`AgentOrchestrator::from_config`].
    pub fn recent_notifications(&self, limit: usize) -> Vec<TaskNotification> {
        self.notifications
            .as_ref()
            .map(|n| n.recent(limit))
            .unwrap_or_default()
    }
}

fn record_tasks(results: &mut Map<String, Value>, tasks: &[Task]) {
    results.insert("tasksCreated".into(), json!(tasks.len()));
    results.insert(
        "taskIds".into(),
        Value::Array(tasks.iter().map(|t| json!(t.task_id)).collect()),
    );
}
