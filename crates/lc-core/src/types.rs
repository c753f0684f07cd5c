use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Case identifiers are assigned by the (external) case registry.
pub type CaseId = u64;

/// User id of a case worker that tasks can be assigned to.
pub type AssigneeId = u32;

/// Open key/value blob attached to a case and mutated by lifecycle hooks.
pub type ContextData = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intake,
    Verification,
    Analysis,
    Negotiation,
    Resolution,
    Closure,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Intake,
        Phase::Verification,
        Phase::Analysis,
        Phase::Negotiation,
        Phase::Resolution,
        Phase::Closure,
    ];

    /// Phases directly reachable from `self`.
    ///
    /// Work can always be sent one step back (more documents, failed
    /// mediation) but never skipped forward. `Closure` has no successors.
    pub fn successors(&self) -> &'static [Phase] {
        match self {
            Phase::Intake => &[Phase::Verification],
            Phase::Verification => &[Phase::Analysis, Phase::Intake],
            Phase::Analysis => &[Phase::Negotiation, Phase::Verification],
            Phase::Negotiation => &[Phase::Resolution, Phase::Analysis],
            Phase::Resolution => &[Phase::Closure, Phase::Negotiation],
            Phase::Closure => &[],
        }
    }

    /// Returns `true` when a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intake => "intake",
            Phase::Verification => "verification",
            Phase::Analysis => "analysis",
            Phase::Negotiation => "negotiation",
            Phase::Resolution => "resolution",
            Phase::Closure => "closure",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| ParseEnumError::new("phase", s))
    }
}

// ---------------------------------------------------------------------------
// Case state
// ---------------------------------------------------------------------------

/// One entry of a case's transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub triggered_by: String,
}

/// Serializable image of a case state machine, as handed to the
/// persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSnapshot {
    pub case_id: CaseId,
    pub current_phase: Phase,
    pub previous_phase: Option<Phase>,
    pub transition_history: Vec<TransitionRecord>,
    pub context_data: ContextData,
}

impl CaseSnapshot {
    pub fn new(case_id: CaseId, phase: Phase) -> Self {
        Self {
            case_id,
            current_phase: phase,
            previous_phase: None,
            transition_history: Vec::new(),
            context_data: ContextData::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispute descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisputeType {
    #[default]
    #[serde(rename = "ownership_dispute")]
    Ownership,
    #[serde(rename = "boundary_dispute")]
    Boundary,
    #[serde(rename = "inheritance_dispute")]
    Inheritance,
    #[serde(rename = "encroachment")]
    Encroachment,
    #[serde(rename = "title_issue")]
    TitleIssue,
}

impl DisputeType {
    pub const ALL: [DisputeType; 5] = [
        DisputeType::Ownership,
        DisputeType::Boundary,
        DisputeType::Inheritance,
        DisputeType::Encroachment,
        DisputeType::TitleIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeType::Ownership => "ownership_dispute",
            DisputeType::Boundary => "boundary_dispute",
            DisputeType::Inheritance => "inheritance_dispute",
            DisputeType::Encroachment => "encroachment",
            DisputeType::TitleIssue => "title_issue",
        }
    }

    /// Parse a free-form dispute label, falling back to `Ownership` for
    /// anything unrecognised.
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            tracing::warn!(dispute_type = s, "unknown dispute type, using ownership");
            DisputeType::Ownership
        })
    }
}

impl fmt::Display for DisputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ownership" | "ownership_dispute" => Ok(DisputeType::Ownership),
            "boundary" | "boundary_dispute" => Ok(DisputeType::Boundary),
            "inheritance" | "inheritance_dispute" => Ok(DisputeType::Inheritance),
            "encroachment" | "encroachment_dispute" => Ok(DisputeType::Encroachment),
            "title" | "title_issue" => Ok(DisputeType::TitleIssue),
            _ => Err(ParseEnumError::new("dispute type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
            Complexity::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Complexity::Low),
            "medium" => Ok(Complexity::Medium),
            "high" => Ok(Complexity::High),
            "very_high" | "very-high" => Ok(Complexity::VeryHigh),
            _ => Err(ParseEnumError::new("complexity", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationClass {
    Rural,
    #[default]
    Urban,
    Remote,
    Metropolitan,
}

impl LocationClass {
    /// Cities whose land offices run on the urban schedule.
    const URBAN_CENTRES: [&'static str; 3] = ["delhi", "mumbai", "bangalore"];

    /// Classify a location name. Known urban centres are `Urban`, anything
    /// else is treated as `Rural`.
    pub fn classify(location: &str) -> Self {
        let needle = location.trim().to_ascii_lowercase();
        if Self::URBAN_CENTRES.contains(&needle.as_str()) {
            LocationClass::Urban
        } else {
            LocationClass::Rural
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationClass::Rural => "rural",
            LocationClass::Urban => "urban",
            LocationClass::Remote => "remote",
            LocationClass::Metropolitan => "metropolitan",
        }
    }
}

impl fmt::Display for LocationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationClass {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rural" => Ok(LocationClass::Rural),
            "urban" => Ok(LocationClass::Urban),
            "remote" => Ok(LocationClass::Remote),
            "metropolitan" => Ok(LocationClass::Metropolitan),
            _ => Err(ParseEnumError::new("location class", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandType {
    #[default]
    Agricultural,
    Residential,
    Commercial,
    Industrial,
}

impl LandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LandType::Agricultural => "agricultural",
            LandType::Residential => "residential",
            LandType::Commercial => "commercial",
            LandType::Industrial => "industrial",
        }
    }
}

impl FromStr for LandType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agricultural" => Ok(LandType::Agricultural),
            "residential" => Ok(LandType::Residential),
            "commercial" => Ok(LandType::Commercial),
            "industrial" => Ok(LandType::Industrial),
            _ => Err(ParseEnumError::new("land type", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One orchestrated automation pass for a case at a given phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRun {
    pub run_id: String,
    pub case_id: CaseId,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub phase_at_start: Phase,
    pub status: RunStatus,
    pub results: serde_json::Map<String, serde_json::Value>,
    pub errors: Vec<String>,
}

impl AgentRun {
    /// Create a run that is already `Running`.
    pub fn start(
        run_id: impl Into<String>,
        case_id: CaseId,
        phase: Phase,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            case_id,
            triggered_by: triggered_by.into(),
            started_at: Utc::now(),
            completed_at: None,
            phase_at_start: phase,
            status: RunStatus::Running,
            results: serde_json::Map::new(),
            errors: Vec::new(),
        }
    }

    /// Mark the run completed. A finished run is never reopened.
    pub fn complete(&mut self) {
        if self.status.is_finished() {
            return;
        }
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run failed with `error`. A finished run is never reopened.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_finished() {
            return;
        }
        self.errors.push(error.into());
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Overdue,
    Cancelled,
}

impl TaskStatus {
    /// Active tasks still count against a deadline.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::InProgress
        )
    }

    /// `Completed` and `Cancelled` are final.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    StateTransition,
    TimeBased,
    DocumentUpload,
    ResponseReceived,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub case_id: CaseId,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub trigger: TriggerType,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub assigned_to: Option<AssigneeId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Phase whose template produced the task, if any.
    pub phase: Option<Phase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Created,
    Completed,
    Overdue,
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Created => "created",
            NotificationKind::Completed => "completed",
            NotificationKind::Overdue => "overdue",
            NotificationKind::Cancelled => "cancelled",
        }
    }
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotification {
    pub kind: NotificationKind,
    pub task_id: String,
    pub case_id: CaseId,
    pub title: String,
    pub assigned_to: Option<AssigneeId>,
    pub priority: TaskPriority,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub name: String,
    pub description: String,
    pub phase: Phase,
    pub duration_days: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: MilestoneStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub case_id: CaseId,
    pub dispute_type: DisputeType,
    pub complexity: Complexity,
    pub location_class: LocationClass,
    pub generated_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub expected_completion: DateTime<Utc>,
    pub total_days: u32,
    pub milestones: Vec<Milestone>,
    /// Days spent in each phase, summed over its milestones.
    pub phase_summary: BTreeMap<Phase, u32>,
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// One party's assertion of ownership share with supporting evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub party_name: String,
    /// Claimed share, 0-100.
    pub claimed_percentage: f64,
    pub claimed_area: Option<f64>,
    pub supporting_documents: u32,
    pub years_possessed: u32,
    pub legal_basis: Option<String>,
}

impl Claim {
    pub fn new(
        party_name: impl Into<String>,
        claimed_percentage: f64,
        years_possessed: u32,
        supporting_documents: u32,
    ) -> Self {
        Self {
            party_name: party_name.into(),
            claimed_percentage,
            claimed_area: None,
            supporting_documents,
            years_possessed,
            legal_basis: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandValuation {
    pub area_acres: f64,
    pub location: String,
    pub land_type: LandType,
    pub rate_per_acre_lakhs: f64,
    pub total_value_lakhs: f64,
    pub total_value_crores: f64,
    pub estimation_basis: String,
    pub disclaimer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    EqualSplit,
    WeightedSplit,
    Buyout,
    Compensation,
}

impl SettlementType {
    /// Static confidence heuristic per proposal shape.
    pub fn confidence(&self) -> f64 {
        match self {
            SettlementType::WeightedSplit => 0.75,
            SettlementType::Buyout => 0.65,
            SettlementType::Compensation => 0.70,
            SettlementType::EqualSplit => 0.60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    CounterProposed,
}

impl ProposalStatus {
    /// Only a pending proposal can be answered.
    pub fn can_transition_to(&self, target: ProposalStatus) -> bool {
        matches!(
            (self, target),
            (ProposalStatus::Pending, ProposalStatus::Accepted)
                | (ProposalStatus::Pending, ProposalStatus::Rejected)
                | (ProposalStatus::Pending, ProposalStatus::CounterProposed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementProposal {
    pub proposal_id: String,
    pub case_id: CaseId,
    pub settlement_type: SettlementType,
    pub title: String,
    pub description: String,
    pub terms: serde_json::Map<String, serde_json::Value>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub confidence_score: f64,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Caller-facing views
// ---------------------------------------------------------------------------

/// Current state of a case as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStateView {
    pub case_id: CaseId,
    pub current_phase: Phase,
    pub previous_phase: Option<Phase>,
    pub valid_transitions: Vec<Phase>,
    pub transition_count: usize,
    pub context_data: ContextData,
}

/// Result of a transition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub success: bool,
    pub new_phase: Option<Phase>,
    pub run: Option<AgentRun>,
    pub error: Option<String>,
    /// Phases that would have been accepted, reported on rejection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_transitions: Vec<Phase>,
}

impl TransitionOutcome {
    pub fn accepted(new_phase: Phase, run: AgentRun) -> Self {
        Self {
            success: true,
            new_phase: Some(new_phase),
            run: Some(run),
            error: None,
            valid_transitions: Vec::new(),
        }
    }

    pub fn rejected(error: impl Into<String>, valid_transitions: Vec<Phase>) -> Self {
        Self {
            success: false,
            new_phase: None,
            run: None,
            error: Some(error.into()),
            valid_transitions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_graph_matches_fixed_edges() {
        assert_eq!(Phase::Intake.successors(), &[Phase::Verification]);
        assert!(Phase::Verification.can_transition_to(Phase::Intake));
        assert!(Phase::Resolution.can_transition_to(Phase::Closure));
        assert!(!Phase::Intake.can_transition_to(Phase::Analysis));
        assert!(Phase::Closure.is_terminal());
        for target in Phase::ALL {
            assert!(!Phase::Closure.can_transition_to(target));
        }
    }

    #[test]
    fn phase_parses_case_insensitively() {
        assert_eq!("Negotiation".parse::<Phase>().unwrap(), Phase::Negotiation);
        assert!("archived".parse::<Phase>().is_err());
    }

    #[test]
    fn dispute_type_accepts_short_and_long_labels() {
        assert_eq!("boundary".parse::<DisputeType>().unwrap(), DisputeType::Boundary);
        assert_eq!(
            "inheritance_dispute".parse::<DisputeType>().unwrap(),
            DisputeType::Inheritance
        );
        assert_eq!(DisputeType::parse_or_default("water_rights"), DisputeType::Ownership);
    }

    #[test]
    fn location_classify_known_cities() {
        assert_eq!(LocationClass::classify("Delhi"), LocationClass::Urban);
        assert_eq!(LocationClass::classify("varanasi"), LocationClass::Rural);
    }

    #[test]
    fn run_is_not_reopened_after_finishing() {
        let mut run = AgentRun::start("RUN-1-0001", 1, Phase::Intake, "system");
        assert_eq!(run.status, RunStatus::Running);
        run.fail("boom");
        let completed_at = run.completed_at;
        run.complete();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.completed_at, completed_at);
        assert_eq!(run.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn records_serialize_with_camel_case_fields() {
        let run = AgentRun::start("RUN-7-0001", 7, Phase::Analysis, "api");
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["runId"], "RUN-7-0001");
        assert_eq!(json["phaseAtStart"], "analysis");
        assert!(json["completedAt"].is_null());
    }

    #[test]
    fn proposal_status_only_leaves_pending() {
        assert!(ProposalStatus::Pending.can_transition_to(ProposalStatus::Accepted));
        assert!(!ProposalStatus::Accepted.can_transition_to(ProposalStatus::Rejected));
    }
}
