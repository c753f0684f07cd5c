use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lc_core::types::{AgentRun, CaseId, Phase, RunStatus, TaskNotification};

/// Events observers can react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum BridgeMessage {
    TaskNotification(TaskNotification),
    PhaseChanged(PhaseChangedPayload),
    RunCompleted(RunSummary),
    PendingSummary(PendingSummaryPayload),
}

impl BridgeMessage {
    /// Case the event belongs to, if it is case-scoped.
    pub fn case_id(&self) -> Option<CaseId> {
        match self {
            BridgeMessage::TaskNotification(n) => Some(n.case_id),
            BridgeMessage::PhaseChanged(p) => Some(p.case_id),
            BridgeMessage::RunCompleted(r) => Some(r.case_id),
            BridgeMessage::PendingSummary(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::TaskNotification(_) => "task_notification",
            BridgeMessage::PhaseChanged(_) => "phase_changed",
            BridgeMessage::RunCompleted(_) => "run_completed",
            BridgeMessage::PendingSummary(_) => "pending_summary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChangedPayload {
    pub case_id: CaseId,
    pub from: Phase,
    pub to: Phase,
    pub triggered_by: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub case_id: CaseId,
    pub phase: Phase,
    pub status: RunStatus,
    pub result_keys: Vec<String>,
    pub errors: Vec<String>,
}

impl From<&AgentRun> for RunSummary {
    fn from(run: &AgentRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            case_id: run.case_id,
            phase: run.phase_at_start,
            status: run.status,
            result_keys: run.results.keys().cloned().collect(),
            errors: run.errors.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummaryPayload {
    pub active_tasks: usize,
    pub overdue_tasks: usize,
    pub unassigned_tasks: usize,
    pub timestamp: DateTime<Utc>,
}
