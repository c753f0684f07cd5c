use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lc_agents::collaborators::{
    CollaboratorError, DocumentDrafter, DraftOutcome, DraftRequest, TemplateDrafter,
};
use lc_agents::orchestrator::{AgentOrchestrator, AutomationRequest, CaseError, CaseProfile};
use lc_bridge::event_bus::EventBus;
use lc_bridge::protocol::BridgeMessage;
use lc_core::config::Config;
use lc_core::store::{CaseStore, InMemoryStore, StoreError};
use lc_core::types::{
    AgentRun, CaseId, CaseSnapshot, Claim, DisputeType, Phase, RunStatus, SettlementProposal,
    Task,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Drafters
// ---------------------------------------------------------------------------

struct Unavailable;

#[async_trait]
impl DocumentDrafter for Unavailable {
    async fn draft_settlement(
        &self,
        _request: &DraftRequest,
    ) -> Result<DraftOutcome, CollaboratorError> {
        Err(CollaboratorError::Unavailable("drafting service down".into()))
    }
}

struct SoftFailure;

#[async_trait]
impl DocumentDrafter for SoftFailure {
    async fn draft_settlement(
        &self,
        _request: &DraftRequest,
    ) -> Result<DraftOutcome, CollaboratorError> {
        Ok(DraftOutcome {
            success: false,
            cached: false,
            error: Some("template missing".into()),
        })
    }
}

struct Slow;

#[async_trait]
impl DocumentDrafter for Slow {
    async fn draft_settlement(
        &self,
        _request: &DraftRequest,
    ) -> Result<DraftOutcome, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(DraftOutcome {
            success: true,
            cached: false,
            error: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// In-memory store that yields before every call, with switchable outages.
#[derive(Default)]
struct SlowStore {
    inner: InMemoryStore,
    case_writes_down: bool,
    task_writes_down: bool,
}

#[async_trait]
impl CaseStore for SlowStore {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseSnapshot>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.load_case(case_id).await
    }

    async fn save_case(&self, snapshot: &CaseSnapshot) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if self.case_writes_down {
            return Err(StoreError::Unavailable("cases down".into()));
        }
        self.inner.save_case(snapshot).await
    }

    async fn save_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.save_run(run).await
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if self.task_writes_down {
            return Err(StoreError::Unavailable("tasks down".into()));
        }
        self.inner.save_tasks(tasks).await
    }

    async fn save_proposals(&self, proposals: &[SettlementProposal]) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.save_proposals(proposals).await
    }
}

fn orchestrator_on(store: Arc<SlowStore>) -> AgentOrchestrator {
    AgentOrchestrator::from_config(
        &Config::default(),
        store,
        Arc::new(TemplateDrafter::new()),
        EventBus::new(),
    )
}

fn orchestrator_with(
    store: Arc<InMemoryStore>,
    drafter: Arc<dyn DocumentDrafter>,
) -> AgentOrchestrator {
    AgentOrchestrator::from_config(&Config::default(), store, drafter, EventBus::new())
}

fn orchestrator() -> (AgentOrchestrator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (
        orchestrator_with(store.clone(), Arc::new(TemplateDrafter::new())),
        store,
    )
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skipping_a_phase_is_rejected_without_a_run() {
    let (orch, store) = orchestrator();

    let outcome = orch
        .transition_case(1, Phase::Analysis, None, "officer")
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.run.is_none());
    assert_eq!(
        outcome.error.as_deref(),
        Some("Cannot transition from intake to analysis")
    );
    assert_eq!(outcome.valid_transitions, vec![Phase::Verification]);

    let view = orch.state_view(1).await.unwrap();
    assert_eq!(view.current_phase, Phase::Intake);
    assert_eq!(view.transition_count, 0);
    assert!(orch.runs_for_case(1).is_empty());
    assert!(store.tasks_for_case(1).is_empty());
}

#[tokio::test]
async fn full_lifecycle_runs_every_phase() {
    let (orch, store) = orchestrator();
    let case = 2;

    let steps = [
        (Phase::Verification, "verificationNote"),
        (Phase::Analysis, "landValuation"),
        (Phase::Negotiation, "proposals"),
        (Phase::Resolution, "settlementAgreement"),
        (Phase::Closure, "caseClosed"),
    ];
    for (phase, key) in steps {
        let outcome = orch
            .transition_case(case, phase, Some("next step".into()), "officer")
            .await
            .unwrap();
        assert!(outcome.success, "{phase}: {:?}", outcome.error);
        assert_eq!(outcome.new_phase, Some(phase));

        let run = outcome.run.unwrap();
        assert_eq!(run.status, RunStatus::Completed, "{phase}: {:?}", run.errors);
        assert_eq!(run.phase_at_start, phase);
        assert!(run.completed_at.is_some());
        assert!(run.results.contains_key(key), "{phase} missing {key}");
        assert!(run.results.contains_key("tasksCreated"));
        assert_eq!(store.run(&run.run_id).unwrap().status, RunStatus::Completed);
    }

    let runs = orch.runs_for_case(case);
    assert_eq!(runs.len(), 5);
    assert!(runs.iter().all(|r| r.run_id.starts_with("RUN-2-")));

    let analysis = &runs[1].results;
    assert_eq!(analysis["landValuation"]["totalValueLakhs"], json!(300.0));
    assert_eq!(analysis["tasksCreated"], json!(3));

    let negotiation = &runs[2].results;
    assert_eq!(negotiation["proposals"].as_array().unwrap().len(), 3);
    assert_eq!(
        negotiation["proposals"][0]["title"],
        json!("Weighted Split (63-37)")
    );
    assert_eq!(orch.negotiation_agent().proposals_for_case(case).len(), 3);

    assert_eq!(
        runs[3].results["settlementAgreement"],
        json!({"generated": true, "documentType": "settlement_agreement", "cached": false})
    );
    assert_eq!(runs[4].results["caseClosed"], json!(true));

    let view = orch.state_view(case).await.unwrap();
    assert_eq!(view.current_phase, Phase::Closure);
    assert!(view.valid_transitions.is_empty());
    assert_eq!(view.transition_count, 5);

    assert_eq!(store.tasks_for_case(case).len(), 16);
    assert_eq!(orch.tasks_for_case(case).len(), 16);
    assert!(!orch.recent_notifications(5).is_empty());
}

#[tokio::test]
async fn concurrent_transitions_on_one_case_serialize() {
    let (orch, _) = orchestrator();

    let (first, second) = tokio::join!(
        orch.transition_case(3, Phase::Verification, None, "a"),
        orch.transition_case(3, Phase::Verification, None, "b"),
    );
    let successes = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|o| o.success)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(orch.runs_for_case(3).len(), 1);
}

#[tokio::test]
async fn phase_change_and_run_are_published() {
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let orch = AgentOrchestrator::from_config(
        &Config::default(),
        Arc::new(InMemoryStore::new()),
        Arc::new(TemplateDrafter::new()),
        bus,
    );

    orch.transition_case(4, Phase::Verification, None, "officer")
        .await
        .unwrap();

    let messages: Vec<BridgeMessage> = rx.try_iter().collect();
    match messages.first() {
        Some(BridgeMessage::PhaseChanged(p)) => {
            assert_eq!(p.case_id, 4);
            assert_eq!((p.from, p.to), (Phase::Intake, Phase::Verification));
            assert_eq!(p.triggered_by, "officer");
        }
        other => panic!("expected PhaseChanged first, got {other:?}"),
    }
    match messages.last() {
        Some(BridgeMessage::RunCompleted(r)) => {
            assert_eq!(r.case_id, 4);
            assert_eq!(r.status, RunStatus::Completed);
            assert!(r.result_keys.contains(&"verificationNote".to_string()));
        }
        other => panic!("expected RunCompleted last, got {other:?}"),
    }
    let created = messages
        .iter()
        .filter(|m| matches!(m, BridgeMessage::TaskNotification(_)))
        .count();
    assert_eq!(created, 3);
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn intake_automation_uses_request_overrides() {
    let (orch, _) = orchestrator();

    let run = orch
        .run_automation(
            5,
            AutomationRequest {
                dispute_type: Some(DisputeType::Boundary),
                location: Some("Nagpur".into()),
                triggered_by: Some("clerk".into()),
                ..AutomationRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.triggered_by, "clerk");
    assert_eq!(run.phase_at_start, Phase::Intake);
    assert_eq!(run.results["timeline"]["totalDays"], json!(61));
    assert_eq!(run.results["timeline"]["locationClass"], json!("rural"));
    assert_eq!(run.results["tasksCreated"], json!(2));

    let profile = orch.profile(5).await.unwrap();
    assert_eq!(profile.dispute_type, DisputeType::Boundary);
    assert_eq!(profile.location, "Nagpur");
    assert_eq!(orch.get_run(&run.run_id).unwrap().run_id, run.run_id);
    assert!(orch.get_run("RUN-0-0000").is_none());
}

#[tokio::test]
async fn invalid_area_fails_the_run() {
    let (orch, _) = orchestrator();
    orch.create_case(6, Phase::Verification, None).await.unwrap();
    orch.run_automation(
        6,
        AutomationRequest {
            area_acres: Some(-2.0),
            ..AutomationRequest::default()
        },
    )
    .await
    .unwrap();

    let outcome = orch
        .transition_case(6, Phase::Analysis, None, "officer")
        .await
        .unwrap();
    assert!(outcome.success);
    let run = outcome.run.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].contains("invalid land area"));
    assert_eq!(orch.state_view(6).await.unwrap().current_phase, Phase::Analysis);
}

#[tokio::test]
async fn drafter_error_fails_resolution_run() {
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator_with(store.clone(), Arc::new(Unavailable));
    orch.create_case(7, Phase::Negotiation, None).await.unwrap();

    let outcome = orch
        .transition_case(7, Phase::Resolution, None, "mediator")
        .await
        .unwrap();
    assert!(outcome.success);
    let run = outcome.run.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.errors[0].contains("drafting service down"));
    assert!(!run.results.contains_key("settlementAgreement"));
    assert_eq!(store.run(&run.run_id).unwrap().status, RunStatus::Failed);
}

#[tokio::test]
async fn soft_drafter_failure_still_completes() {
    let orch = orchestrator_with(Arc::new(InMemoryStore::new()), Arc::new(SoftFailure));
    orch.create_case(8, Phase::Negotiation, None).await.unwrap();

    let run = orch
        .transition_case(8, Phase::Resolution, None, "mediator")
        .await
        .unwrap()
        .run
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.results["settlementAgreement"],
        json!({"generated": false, "error": "template missing"})
    );
    assert_eq!(run.results["tasksCreated"], json!(3));
}

#[tokio::test]
async fn slow_handler_times_out() {
    let orch = orchestrator_with(Arc::new(InMemoryStore::new()), Arc::new(Slow))
        .with_handler_timeout(Duration::from_millis(50));
    orch.create_case(9, Phase::Negotiation, None).await.unwrap();

    let run = orch
        .transition_case(9, Phase::Resolution, None, "mediator")
        .await
        .unwrap()
        .run
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.errors[0].contains("timed out"), "{:?}", run.errors);
    assert_eq!(orch.state_view(9).await.unwrap().current_phase, Phase::Resolution);
}

// ---------------------------------------------------------------------------
// Registry and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_case_is_rejected() {
    let (orch, _) = orchestrator();
    let view = orch.create_case(10, Phase::Analysis, None).await.unwrap();
    assert_eq!(view.current_phase, Phase::Analysis);
    assert!(view.context_data.contains_key("analysis_started_at"));

    assert!(matches!(
        orch.create_case(10, Phase::Intake, None).await,
        Err(CaseError::AlreadyExists(10))
    ));
    assert!(orch.can_transition(10, Phase::Negotiation).await.unwrap());
    assert!(!orch.can_transition(10, Phase::Closure).await.unwrap());
}

#[tokio::test]
async fn state_survives_in_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let first = orchestrator_with(store.clone(), Arc::new(TemplateDrafter::new()));
    first
        .run_automation(
            11,
            AutomationRequest {
                dispute_type: Some(DisputeType::Inheritance),
                ..AutomationRequest::default()
            },
        )
        .await
        .unwrap();
    first
        .transition_case(11, Phase::Verification, None, "officer")
        .await
        .unwrap();

    let second = orchestrator_with(store.clone(), Arc::new(TemplateDrafter::new()));
    let view = second.state_view(11).await.unwrap();
    assert_eq!(view.current_phase, Phase::Verification);
    assert_eq!(view.previous_phase, Some(Phase::Intake));
    assert_eq!(view.transition_count, 1);
    assert_eq!(
        second.profile(11).await.unwrap().dispute_type,
        DisputeType::Inheritance
    );
    assert!(matches!(
        second.create_case(11, Phase::Intake, None).await,
        Err(CaseError::AlreadyExists(11))
    ));
}

#[tokio::test]
async fn create_and_lookup_race_agree_with_the_store() {
    let store = Arc::new(SlowStore::default());
    let orch = orchestrator_on(store.clone());

    let (created, seen) = tokio::join!(
        orch.create_case(12, Phase::Analysis, None),
        orch.state_view(12)
    );
    assert_eq!(created.unwrap().current_phase, Phase::Analysis);
    assert_eq!(seen.unwrap().current_phase, Phase::Analysis);

    let (seen, created) = tokio::join!(
        orch.state_view(13),
        orch.create_case(13, Phase::Verification, None)
    );
    assert_eq!(seen.unwrap().current_phase, Phase::Verification);
    assert_eq!(created.unwrap().current_phase, Phase::Verification);

    for (case, phase) in [(12, Phase::Analysis), (13, Phase::Verification)] {
        let stored = store.load_case(case).await.unwrap().unwrap();
        assert_eq!(stored.current_phase, phase);
        assert_eq!(orch.state_view(case).await.unwrap().current_phase, phase);
    }
}

#[tokio::test]
async fn failed_case_write_releases_the_id() {
    let store = Arc::new(SlowStore {
        case_writes_down: true,
        ..SlowStore::default()
    });
    let orch = orchestrator_on(store.clone());

    let err = orch
        .create_case(14, Phase::Analysis, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::Store(_)));
    assert!(store.load_case(14).await.unwrap().is_none());
    assert_eq!(orch.state_view(14).await.unwrap().current_phase, Phase::Intake);
}

#[tokio::test]
async fn unreadable_stored_profile_falls_back_to_default() {
    let store = Arc::new(InMemoryStore::new());
    let mut snapshot = CaseSnapshot::new(15, Phase::Verification);
    snapshot
        .context_data
        .insert("case_profile".into(), json!({"disputeType": 42}));
    store.save_case(&snapshot).await.unwrap();

    let orch = orchestrator_with(store.clone(), Arc::new(TemplateDrafter::new()));
    assert_eq!(
        orch.profile(15).await.unwrap(),
        CaseProfile::from_config(&Config::default().orchestrator)
    );
    assert_eq!(orch.state_view(15).await.unwrap().current_phase, Phase::Verification);
}

// ---------------------------------------------------------------------------
// Store failures and hostile input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_task_write_still_reports_created_tasks() {
    let store = Arc::new(SlowStore {
        task_writes_down: true,
        ..SlowStore::default()
    });
    let orch = orchestrator_on(store.clone());

    let run = orch
        .run_automation(16, AutomationRequest::default())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert!(
        run.errors[0].contains("storage backend unavailable: tasks down"),
        "{:?}",
        run.errors
    );
    assert!(run.results.contains_key("timeline"));
    assert_eq!(run.results["tasksCreated"], json!(2));

    let mut held: Vec<String> = orch
        .tasks_for_case(16)
        .into_iter()
        .map(|t| t.task_id)
        .collect();
    let mut reported: Vec<String> = run.results["taskIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap().to_string())
        .collect();
    held.sort();
    reported.sort();
    assert_eq!(held, reported);
    assert!(store.inner.tasks_for_case(16).is_empty());

    orch.create_case(17, Phase::Analysis, None).await.unwrap();
    let run = orch
        .transition_case(17, Phase::Negotiation, None, "mediator")
        .await
        .unwrap()
        .run
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.results["proposals"].as_array().unwrap().len(), 3);
    assert_eq!(run.results["tasksCreated"], json!(4));
}

#[tokio::test]
async fn oversized_evidence_counts_still_complete_negotiation() {
    let (orch, store) = orchestrator();
    let profile = CaseProfile {
        claims: [
            Claim::new("Ravi", 50.0, u32::MAX, u32::MAX),
            Claim::new("Meena", 50.0, 1, 1),
        ],
        ..CaseProfile::default()
    };
    orch.create_case(18, Phase::Analysis, Some(profile))
        .await
        .unwrap();

    let run = orch
        .transition_case(18, Phase::Negotiation, None, "mediator")
        .await
        .unwrap()
        .run
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed, "{:?}", run.errors);
    let proposals = run.results["proposals"].as_array().unwrap();
    assert_eq!(proposals[0]["terms"]["party1Share"], json!(75));
    assert_eq!(proposals[0]["terms"]["party2Share"], json!(25));

    assert!(orch
        .runs_for_case(18)
        .iter()
        .all(|r| r.status != RunStatus::Running && r.completed_at.is_some()));
    assert_eq!(store.run(&run.run_id).unwrap().status, RunStatus::Completed);
}
