use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use lc_bridge::event_bus::EventBus;
use lc_bridge::protocol::BridgeMessage;
use lc_core::types::TaskPriority::{High, Low, Medium, Urgent};
use lc_core::types::{
    AssigneeId, CaseId, NotificationKind, Phase, Task, TaskNotification, TaskPriority, TaskStatus,
    TriggerType,
};
use lc_telemetry::metrics::{global_metrics, names};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task {task_id} is already {status:?}")]
    AlreadyClosed { task_id: String, status: TaskStatus },
}

pub type Result<T> = std::result::Result<T, TaskError>;

// ---------------------------------------------------------------------------
// Phase templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TaskTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub deadline_days: i64,
    pub priority: TaskPriority,
}

const fn tpl(
    title: &'static str,
    description: &'static str,
    deadline_days: i64,
    priority: TaskPriority,
) -> TaskTemplate {
    TaskTemplate {
        title,
        description,
        deadline_days,
        priority,
    }
}

const INTAKE: &[TaskTemplate] = &[
    tpl("Review Case Submission", "Review initial case details", 1, High),
    tpl("Request Missing Documents", "Identify and request missing docs", 2, Medium),
];

const VERIFICATION: &[TaskTemplate] = &[
    tpl("Verify Uploaded Documents", "Run OCR and verification", 2, High),
    tpl("Cross-check Land Records", "Verify against Bhulekh", 3, High),
    tpl("Prepare Verification Report", "Generate discrepancy report", 1, Medium),
];

const ANALYSIS: &[TaskTemplate] = &[
    tpl("Analyze Dispute Details", "Deep analysis of dispute", 3, High),
    tpl("Generate Timeline", "Create case timeline", 1, Medium),
    tpl("Identify Settlement Options", "Preliminary options", 2, Medium),
];

const NEGOTIATION: &[TaskTemplate] = &[
    tpl("Contact All Parties", "Initial outreach", 2, Urgent),
    tpl("Schedule Mediation", "Set mediation date", 3, High),
    tpl("Prepare Settlement Proposals", "Draft options", 5, Medium),
    tpl("Document Negotiation Progress", "Track discussions", 7, Low),
];

const RESOLUTION: &[TaskTemplate] = &[
    tpl("Draft Settlement Agreement", "Prepare legal docs", 5, Urgent),
    tpl("Get Party Approvals", "Collect signatures", 7, High),
    tpl("Finalize Documentation", "Complete paperwork", 3, Medium),
];

const CLOSURE: &[TaskTemplate] = &[
    tpl("Archive Case Documents", "Organize final docs", 2, Medium),
    tpl("Send Closure Notification", "Notify all parties", 1, High),
    tpl("Update Case Status", "Mark as closed", 1, Low),
];

pub fn templates_for(phase: Phase) -> &'static [TaskTemplate] {
    match phase {
        Phase::Intake => INTAKE,
        Phase::Verification => VERIFICATION,
        Phase::Analysis => ANALYSIS,
        Phase::Negotiation => NEGOTIATION,
        Phase::Resolution => RESOLUTION,
        Phase::Closure => CLOSURE,
    }
}

// ---------------------------------------------------------------------------
// WorkloadBoard
// ---------------------------------------------------------------------------

/// Open-task counter per assignee, shared by every case.
#[derive(Debug, Default)]
pub struct WorkloadBoard {
    loads: Mutex<BTreeMap<AssigneeId, u32>>,
}

impl WorkloadBoard {
    pub fn new(initial: BTreeMap<AssigneeId, u32>) -> Self {
        Self {
            loads: Mutex::new(initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<AssigneeId, u32>> {
        self.loads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick the least-loaded assignee (ties go to the lowest id) and count the
    /// new task against them, in one critical section. `None` when the
    /// roster is empty.
    pub fn pick_and_increment(&self) -> Option<AssigneeId> {
        let mut loads = self.lock();
        let (&id, load) = loads.iter_mut().min_by_key(|(id, load)| (**load, **id))?;
        *load = load.saturating_add(1);
        Some(id)
    }

    /// Release one task from `assignee`, never going below zero.
    pub fn release(&self, assignee: AssigneeId) {
        if let Some(load) = self.lock().get_mut(&assignee) {
            *load = load.saturating_sub(1);
        }
    }

    pub fn load_of(&self, assignee: AssigneeId) -> Option<u32> {
        self.lock().get(&assignee).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<AssigneeId, u32> {
        self.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Outbound task notifications. Delivery is fire-and-forget: implementations
/// must not block and cannot fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &TaskNotification);
}

/// Publishes notifications on the event bus and keeps a bounded history.
pub struct BusNotifier {
    bus: EventBus,
    history: Mutex<VecDeque<TaskNotification>>,
    capacity: usize,
}

impl BusNotifier {
    pub fn new(bus: EventBus, capacity: usize) -> Self {
        Self {
            bus,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Up to `limit` most recent notifications, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<TaskNotification> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Notifier for BusNotifier {
    fn notify(&self, notification: &TaskNotification) {
        info!(
            kind = notification.kind.as_str(),
            task_id = %notification.task_id,
            case_id = notification.case_id,
            assigned_to = ?notification.assigned_to,
            "{}",
            notification.message
        );
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if self.capacity > 0 {
                if history.len() == self.capacity {
                    history.pop_front();
                }
                history.push_back(notification.clone());
            }
        }
        self.bus
            .publish(BridgeMessage::TaskNotification(notification.clone()));
    }
}

fn notification_message(task: &Task, kind: NotificationKind) -> String {
    match kind {
        NotificationKind::Created => format!(
            "New task '{}' created for Case #{}. Deadline: {}",
            task.title,
            task.case_id,
            task.deadline.format("%Y-%m-%d")
        ),
        NotificationKind::Completed => format!(
            "Task '{}' for Case #{} has been completed.",
            task.title, task.case_id
        ),
        NotificationKind::Overdue => format!(
            "OVERDUE: Task '{}' for Case #{} is past deadline!",
            task.title, task.case_id
        ),
        NotificationKind::Cancelled => format!(
            "Task '{}' for Case #{} has been cancelled.",
            task.title, task.case_id
        ),
    }
}

// ---------------------------------------------------------------------------
// TaskAgent
// ---------------------------------------------------------------------------

/// Ad-hoc task raised by an event rather than a phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTaskRequest {
    pub case_id: CaseId,
    pub title: String,
    pub description: String,
    pub trigger: TriggerType,
    pub priority: TaskPriority,
    pub deadline_days: i64,
}

impl EventTaskRequest {
    pub fn new(case_id: CaseId, title: impl Into<String>, trigger: TriggerType) -> Self {
        Self {
            case_id,
            title: title.into(),
            description: String::new(),
            trigger,
            priority: TaskPriority::Medium,
            deadline_days: 3,
        }
    }
}

/// Creates tasks from phase templates and balances them across assignees.
pub struct TaskAgent {
    tasks: DashMap<String, Task>,
    workloads: Arc<WorkloadBoard>,
    notifier: Arc<dyn Notifier>,
    next_id: AtomicU64,
}

impl TaskAgent {
    pub fn new(workloads: Arc<WorkloadBoard>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            tasks: DashMap::new(),
            workloads,
            notifier,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn workloads(&self) -> &WorkloadBoard {
        &self.workloads
    }

    fn next_task_id(&self, case_id: CaseId) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("TASK-{case_id}-{n:04}")
    }

    #[allow(clippy::too_many_arguments)]
    fn build_task(
        &self,
        case_id: CaseId,
        title: &str,
        description: &str,
        priority: TaskPriority,
        trigger: TriggerType,
        deadline_days: i64,
        phase: Option<Phase>,
        auto_assign: bool,
    ) -> Task {
        let now = Utc::now();
        let mut task = Task {
            task_id: self.next_task_id(case_id),
            case_id,
            title: title.to_string(),
            description: description.to_string(),
            priority,
            status: TaskStatus::Pending,
            trigger,
            created_at: now,
            deadline: now + Duration::days(deadline_days),
            assigned_to: None,
            assigned_at: None,
            completed_at: None,
            phase,
        };
        if auto_assign {
            match self.workloads.pick_and_increment() {
                Some(assignee) => {
                    task.assigned_to = Some(assignee);
                    task.assigned_at = Some(now);
                    task.status = TaskStatus::Assigned;
                }
                None => warn!(
                    task_id = %task.task_id,
                    case_id,
                    "no assignees configured, task left unassigned"
                ),
            }
        }
        task
    }

    fn emit(&self, task: &Task, kind: NotificationKind) {
        self.notifier.notify(&TaskNotification {
            kind,
            task_id: task.task_id.clone(),
            case_id: task.case_id,
            title: task.title.clone(),
            assigned_to: task.assigned_to,
            priority: task.priority,
            message: notification_message(task, kind),
            timestamp: Utc::now(),
        });
    }

    fn store(&self, task: &Task) {
        self.tasks.insert(task.task_id.clone(), task.clone());
        self.emit(task, NotificationKind::Created);
    }

    fn refresh_active_gauge(&self) {
        global_metrics().set_gauge(names::TASKS_ACTIVE, self.active_count() as i64);
    }

    /// Instantiate the phase's task templates for a case.
    pub fn create_tasks_for_phase(
        &self,
        case_id: CaseId,
        phase: Phase,
        auto_assign: bool,
    ) -> Vec<Task> {
        let created: Vec<Task> = templates_for(phase)
            .iter()
            .map(|t| {
                let task = self.build_task(
                    case_id,
                    t.title,
                    t.description,
                    t.priority,
                    TriggerType::StateTransition,
                    t.deadline_days,
                    Some(phase),
                    auto_assign,
                );
                self.store(&task);
                task
            })
            .collect();

        global_metrics().increment_counter_by(
            names::TASKS_CREATED_TOTAL,
            &[("phase", phase.as_str())],
            created.len() as u64,
        );
        self.refresh_active_gauge();
        debug!(case_id, phase = %phase, count = created.len(), "phase tasks created");
        created
    }

    /// Create a single task in response to an event. Always auto-assigned.
    pub fn create_event_task(&self, request: EventTaskRequest) -> Task {
        let task = self.build_task(
            request.case_id,
            &request.title,
            &request.description,
            request.priority,
            request.trigger,
            request.deadline_days,
            None,
            true,
        );
        self.store(&task);
        global_metrics().increment_counter(names::TASKS_CREATED_TOTAL, &[("phase", "event")]);
        self.refresh_active_gauge();
        task
    }

    /// Mark an assigned task as being worked on.
    pub fn start_task(&self, task_id: &str) -> Result<Task> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if entry.status.is_closed() {
            return Err(TaskError::AlreadyClosed {
                task_id: task_id.to_string(),
                status: entry.status,
            });
        }
        entry.status = TaskStatus::InProgress;
        Ok(entry.clone())
    }

    fn close(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        let task = {
            let mut entry = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
            if entry.status.is_closed() {
                return Err(TaskError::AlreadyClosed {
                    task_id: task_id.to_string(),
                    status: entry.status,
                });
            }
            entry.status = status;
            if status == TaskStatus::Completed {
                entry.completed_at = Some(Utc::now());
            }
            entry.clone()
        };
        if let Some(assignee) = task.assigned_to {
            self.workloads.release(assignee);
        }
        self.refresh_active_gauge();
        Ok(task)
    }

    /// Complete a task and free its assignee's slot.
    pub fn complete_task(&self, task_id: &str) -> Result<Task> {
        let task = self.close(task_id, TaskStatus::Completed)?;
        self.emit(&task, NotificationKind::Completed);
        Ok(task)
    }

    /// Soft-cancel a task. The record stays; the assignee's slot is freed.
    pub fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let task = self.close(task_id, TaskStatus::Cancelled)?;
        self.emit(&task, NotificationKind::Cancelled);
        Ok(task)
    }

    /// Move every active task whose deadline is before `now` to `Overdue`.
    ///
    /// Each task is reported once; a second sweep at the same `now` returns
    /// nothing.
    pub fn check_overdue_tasks(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut overdue = Vec::new();
        for mut entry in self.tasks.iter_mut() {
            if entry.status.is_active() && entry.deadline < now {
                entry.status = TaskStatus::Overdue;
                overdue.push(entry.clone());
            }
        }
        overdue.sort_by(|a, b| (a.created_at, &a.task_id).cmp(&(b.created_at, &b.task_id)));

        for task in &overdue {
            self.emit(task, NotificationKind::Overdue);
        }
        if !overdue.is_empty() {
            global_metrics().increment_counter_by(
                names::TASKS_OVERDUE_TOTAL,
                &[],
                overdue.len() as u64,
            );
            self.refresh_active_gauge();
            info!(count = overdue.len(), "tasks marked overdue");
        }
        overdue
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.value().clone())
    }

    fn collect(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| keep(t.value()))
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| (a.created_at, &a.task_id).cmp(&(b.created_at, &b.task_id)));
        tasks
    }

    pub fn tasks_for_case(&self, case_id: CaseId) -> Vec<Task> {
        self.collect(|t| t.case_id == case_id)
    }

    /// Tasks not yet picked up, across all cases.
    pub fn pending_tasks(&self) -> Vec<Task> {
        self.collect(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Assigned))
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_active()).count()
    }

    pub fn overdue_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Overdue)
            .count()
    }

    pub fn unassigned_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && t.assigned_to.is_none())
            .count()
    }
}
