use std::sync::Arc;

use chrono::{DateTime, Utc};
use lc_agents::task_agent::TaskAgent;
use lc_bridge::protocol::PendingSummaryPayload;
use lc_core::types::CaseId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of one overdue sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Tasks newly moved to `Overdue` by this sweep.
    pub overdue_task_ids: Vec<String>,
    /// Distinct cases those tasks belong to.
    pub affected_cases: Vec<CaseId>,
    pub timestamp: DateTime<Utc>,
}

impl SweepReport {
    pub fn overdue_count(&self) -> usize {
        self.overdue_task_ids.len()
    }
}

/// Periodic checks over the task agent's open work.
pub struct PatrolRunner {
    tasks: Arc<TaskAgent>,
}

impl PatrolRunner {
    pub fn new(tasks: Arc<TaskAgent>) -> Self {
        Self { tasks }
    }

    /// Mark every active task past its deadline as overdue. A task is only
    /// ever reported by the first sweep that sees it late.
    pub fn sweep_overdue(&self, now: DateTime<Utc>) -> SweepReport {
        debug!("overdue sweep starting");
        let overdue = self.tasks.check_overdue_tasks(now);

        let mut affected_cases: Vec<CaseId> = overdue.iter().map(|t| t.case_id).collect();
        affected_cases.sort_unstable();
        affected_cases.dedup();

        let report = SweepReport {
            overdue_task_ids: overdue.into_iter().map(|t| t.task_id).collect(),
            affected_cases,
            timestamp: now,
        };
        if report.overdue_count() > 0 {
            info!(
                overdue = report.overdue_count(),
                cases = report.affected_cases.len(),
                "overdue sweep completed"
            );
        }
        report
    }

    /// Counts of open work across every case.
    pub fn pending_summary(&self, now: DateTime<Utc>) -> PendingSummaryPayload {
        PendingSummaryPayload {
            active_tasks: self.tasks.active_count(),
            overdue_tasks: self.tasks.overdue_count(),
            unassigned_tasks: self.tasks.unassigned_count(),
            timestamp: now,
        }
    }
}
