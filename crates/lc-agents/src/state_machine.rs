use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lc_core::types::{
    CaseId, CaseSnapshot, CaseStateView, ContextData, Phase, TransitionRecord,
};
use lc_telemetry::metrics::{global_metrics, names};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A transition request that the phase graph does not allow.
///
/// Rejection leaves the machine untouched: no history record, no hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl TransitionError {
    /// Phases that would have been accepted from `from`.
    pub fn valid_transitions(&self) -> Vec<Phase> {
        self.from.successors().to_vec()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook {hook} failed: {message}")]
    Failed { hook: String, message: String },
}

impl HookError {
    pub fn failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Failed {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Exit,
    Transition,
    Enter,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookStage::Exit => "exit",
            HookStage::Transition => "transition",
            HookStage::Enter => "enter",
        })
    }
}

/// What a hook is told about the transition it runs in.
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    pub case_id: CaseId,
    pub stage: HookStage,
    pub record: &'a TransitionRecord,
}

impl HookEvent<'_> {
    /// Phase the hook is registered against: `from` for exit hooks, `to`
    /// otherwise.
    pub fn phase(&self) -> Phase {
        match self.stage {
            HookStage::Exit => self.record.from,
            HookStage::Transition | HookStage::Enter => self.record.to,
        }
    }
}

/// Lifecycle callback. Errors are logged and counted by the machine but never
/// abort the transition that triggered them.
pub trait PhaseHook: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, event: &HookEvent<'_>, context: &mut ContextData) -> Result<(), HookError>;
}

/// Writes `<phase>_started_at` on entry and `<phase>_completed_at` on exit.
#[derive(Debug, Default)]
pub struct PhaseStamp;

impl PhaseStamp {
    pub fn started_key(phase: Phase) -> String {
        format!("{phase}_started_at")
    }

    pub fn completed_key(phase: Phase) -> String {
        format!("{phase}_completed_at")
    }

    fn stamp(context: &mut ContextData, key: String, at: DateTime<Utc>) {
        context.insert(key, serde_json::Value::String(at.to_rfc3339()));
    }
}

impl PhaseHook for PhaseStamp {
    fn name(&self) -> &str {
        "phase_stamp"
    }

    fn run(&self, event: &HookEvent<'_>, context: &mut ContextData) -> Result<(), HookError> {
        let at = event.record.timestamp;
        match event.stage {
            HookStage::Enter => Self::stamp(context, Self::started_key(event.phase()), at),
            HookStage::Exit => Self::stamp(context, Self::completed_key(event.phase()), at),
            HookStage::Transition => {}
        }
        Ok(())
    }
}

/// Emits one structured log line per transition.
#[derive(Debug, Default)]
pub struct TransitionLog;

impl PhaseHook for TransitionLog {
    fn name(&self) -> &str {
        "transition_log"
    }

    fn run(&self, event: &HookEvent<'_>, _context: &mut ContextData) -> Result<(), HookError> {
        let record = event.record;
        tracing::info!(
            case_id = event.case_id,
            from = %record.from,
            to = %record.to,
            triggered_by = %record.triggered_by,
            reason = record.reason.as_deref().unwrap_or(""),
            "case transitioned"
        );
        Ok(())
    }
}

fn run_hooks(
    hooks: Option<&Vec<Arc<dyn PhaseHook>>>,
    event: &HookEvent<'_>,
    context: &mut ContextData,
) {
    for hook in hooks.into_iter().flatten() {
        if let Err(e) = hook.run(event, context) {
            tracing::warn!(
                case_id = event.case_id,
                hook = hook.name(),
                stage = %event.stage,
                error = %e,
                "phase hook failed"
            );
            global_metrics()
                .increment_counter(names::HOOK_FAILURES_TOTAL, &[("hook", hook.name())]);
        }
    }
}

// ---------------------------------------------------------------------------
// CaseStateMachine
// ---------------------------------------------------------------------------

/// Lifecycle of one case over the fixed phase graph.
///
/// Hooks registered per phase run in registration order; registration is
/// additive. Every machine starts with [`PhaseStamp`] on entry and exit of
/// each phase and [`TransitionLog`] as a transition hook.
pub struct CaseStateMachine {
    case_id: CaseId,
    current: Phase,
    previous: Option<Phase>,
    history: Vec<TransitionRecord>,
    context: ContextData,
    enter_hooks: BTreeMap<Phase, Vec<Arc<dyn PhaseHook>>>,
    exit_hooks: BTreeMap<Phase, Vec<Arc<dyn PhaseHook>>>,
    transition_hooks: Vec<Arc<dyn PhaseHook>>,
}

impl CaseStateMachine {
    /// New case in `Intake`.
    pub fn new(case_id: CaseId) -> Self {
        Self::starting_at(case_id, Phase::Intake)
    }

    /// New case in an arbitrary phase. The starting phase gets its
    /// `_started_at` stamp immediately.
    pub fn starting_at(case_id: CaseId, phase: Phase) -> Self {
        let mut machine = Self::from_snapshot(CaseSnapshot::new(case_id, phase));
        PhaseStamp::stamp(&mut machine.context, PhaseStamp::started_key(phase), Utc::now());
        machine
    }

    /// Rehydrate a machine from stored state. Built-in hooks are installed;
    /// custom hooks have to be registered again.
    pub fn from_snapshot(snapshot: CaseSnapshot) -> Self {
        let mut machine = Self {
            case_id: snapshot.case_id,
            current: snapshot.current_phase,
            previous: snapshot.previous_phase,
            history: snapshot.transition_history,
            context: snapshot.context_data,
            enter_hooks: BTreeMap::new(),
            exit_hooks: BTreeMap::new(),
            transition_hooks: Vec::new(),
        };
        let stamp: Arc<dyn PhaseHook> = Arc::new(PhaseStamp);
        for phase in Phase::ALL {
            machine.on_enter(phase, Arc::clone(&stamp));
            machine.on_exit(phase, Arc::clone(&stamp));
        }
        machine.on_transition(Arc::new(TransitionLog));
        machine
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        CaseSnapshot {
            case_id: self.case_id,
            current_phase: self.current,
            previous_phase: self.previous,
            transition_history: self.history.clone(),
            context_data: self.context.clone(),
        }
    }

    pub fn case_id(&self) -> CaseId {
        self.case_id
    }

    pub fn phase(&self) -> Phase {
        self.current
    }

    pub fn previous_phase(&self) -> Option<Phase> {
        self.previous
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn context(&self) -> &ContextData {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextData {
        &mut self.context
    }

    pub fn valid_transitions(&self) -> Vec<Phase> {
        self.current.successors().to_vec()
    }

    pub fn can_transition(&self, target: Phase) -> bool {
        self.current.can_transition_to(target)
    }

    pub fn on_enter(&mut self, phase: Phase, hook: Arc<dyn PhaseHook>) {
        self.enter_hooks.entry(phase).or_default().push(hook);
    }

    pub fn on_exit(&mut self, phase: Phase, hook: Arc<dyn PhaseHook>) {
        self.exit_hooks.entry(phase).or_default().push(hook);
    }

    pub fn on_transition(&mut self, hook: Arc<dyn PhaseHook>) {
        self.transition_hooks.push(hook);
    }

    /// Move the case to `target`.
    ///
    /// Order on success: history record appended, exit hooks of the old
    /// phase, phase updated, transition hooks, entry hooks of the new phase.
    pub fn transition(
        &mut self,
        target: Phase,
        reason: Option<String>,
        triggered_by: impl Into<String>,
    ) -> Result<TransitionRecord, TransitionError> {
        let from = self.current;
        if !from.can_transition_to(target) {
            tracing::debug!(
                case_id = self.case_id,
                from = %from,
                to = %target,
                "transition rejected"
            );
            return Err(TransitionError { from, to: target });
        }

        let record = TransitionRecord {
            from,
            to: target,
            timestamp: Utc::now(),
            reason,
            triggered_by: triggered_by.into(),
        };
        self.history.push(record.clone());

        let event = |stage| HookEvent {
            case_id: self.case_id,
            stage,
            record: &record,
        };

        run_hooks(self.exit_hooks.get(&from), &event(HookStage::Exit), &mut self.context);

        self.previous = Some(from);
        self.current = target;

        run_hooks(
            Some(&self.transition_hooks),
            &event(HookStage::Transition),
            &mut self.context,
        );
        run_hooks(self.enter_hooks.get(&target), &event(HookStage::Enter), &mut self.context);

        Ok(record)
    }

    pub fn state_view(&self) -> CaseStateView {
        CaseStateView {
            case_id: self.case_id,
            current_phase: self.current,
            previous_phase: self.previous,
            valid_transitions: self.valid_transitions(),
            transition_count: self.history.len(),
            context_data: self.context.clone(),
        }
    }
}

impl fmt::Debug for CaseStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseStateMachine")
            .field("case_id", &self.case_id)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("history_len", &self.history.len())
            .field("transition_hooks", &self.transition_hooks.len())
            .finish()
    }
}
