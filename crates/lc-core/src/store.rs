use async_trait::async_trait;
use dashmap::DashMap;

use crate::types::{AgentRun, CaseId, CaseSnapshot, SettlementProposal, Task};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// CaseStore
// ---------------------------------------------------------------------------

/// Durable storage for case state and everything hanging off a case.
///
/// The orchestrator hydrates case machines through `load_case` and writes
/// back after every transition and run. Writes are upserts keyed by the
/// record's identifier.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseSnapshot>>;
    async fn save_case(&self, snapshot: &CaseSnapshot) -> Result<()>;
    async fn save_run(&self, run: &AgentRun) -> Result<()>;
    async fn save_tasks(&self, tasks: &[Task]) -> Result<()>;
    async fn save_proposals(&self, proposals: &[SettlementProposal]) -> Result<()>;
}

/// Single-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    cases: DashMap<CaseId, CaseSnapshot>,
    runs: DashMap<String, AgentRun>,
    tasks: DashMap<String, Task>,
    proposals: DashMap<String, SettlementProposal>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    pub fn run(&self, run_id: &str) -> Option<AgentRun> {
        self.runs.get(run_id).map(|r| r.value().clone())
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.value().clone())
    }

    pub fn proposal(&self, proposal_id: &str) -> Option<SettlementProposal> {
        self.proposals.get(proposal_id).map(|p| p.value().clone())
    }

    pub fn tasks_for_case(&self, case_id: CaseId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.case_id == case_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseSnapshot>> {
        Ok(self.cases.get(&case_id).map(|c| c.value().clone()))
    }

    async fn save_case(&self, snapshot: &CaseSnapshot) -> Result<()> {
        self.cases.insert(snapshot.case_id, snapshot.clone());
        Ok(())
    }

    async fn save_run(&self, run: &AgentRun) -> Result<()> {
        self.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.tasks.insert(task.task_id.clone(), task.clone());
        }
        Ok(())
    }

    async fn save_proposals(&self, proposals: &[SettlementProposal]) -> Result<()> {
        for proposal in proposals {
            self.proposals
                .insert(proposal.proposal_id.clone(), proposal.clone());
        }
        Ok(())
    }
}
