//! Template-driven case timelines.
//!
//! Everything here is pure: same inputs, same milestones. The start date is
//! a parameter so callers (and tests) pin the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use lc_core::types::{
    CaseId, Complexity, DisputeType, LocationClass, Milestone, MilestoneStatus, Phase, Timeline,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TemplateEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub phase: Phase,
    pub base_days: u32,
}

const fn entry(
    name: &'static str,
    phase: Phase,
    base_days: u32,
    description: &'static str,
) -> TemplateEntry {
    TemplateEntry {
        name,
        description,
        phase,
        base_days,
    }
}

const OWNERSHIP: &[TemplateEntry] = &[
    entry("Document Collection", Phase::Intake, 7, "Gather ownership documents"),
    entry("Title Verification", Phase::Verification, 5, "Verify title deeds"),
    entry("Ownership Analysis", Phase::Analysis, 7, "Analyze ownership claims"),
    entry("Party Notification", Phase::Negotiation, 3, "Notify all parties"),
    entry("Mediation Sessions", Phase::Negotiation, 21, "Conduct mediation"),
    entry("Agreement Drafting", Phase::Resolution, 7, "Draft settlement"),
    entry("Final Sign-off", Phase::Closure, 5, "Complete signatures"),
];

const BOUNDARY: &[TemplateEntry] = &[
    entry("Survey Request", Phase::Intake, 5, "Request land survey"),
    entry("Survey Execution", Phase::Verification, 14, "Complete survey"),
    entry("Boundary Analysis", Phase::Analysis, 7, "Analyze survey results"),
    entry("Neighbor Consultation", Phase::Negotiation, 14, "Consult with neighbors"),
    entry("Boundary Agreement", Phase::Resolution, 7, "Draft boundary agreement"),
    entry("Registration", Phase::Closure, 7, "Register new boundaries"),
];

const INHERITANCE: &[TemplateEntry] = &[
    entry("Heir Identification", Phase::Intake, 7, "Identify all legal heirs"),
    entry("Will Verification", Phase::Verification, 10, "Locate and verify will"),
    entry("Asset Valuation", Phase::Analysis, 14, "Value inheritance"),
    entry("Heir Negotiation", Phase::Negotiation, 30, "Negotiate partition"),
    entry("Partition Deed", Phase::Resolution, 14, "Draft partition deed"),
    entry("Mutation Entry", Phase::Closure, 21, "Update land records"),
];

const ENCROACHMENT: &[TemplateEntry] = &[
    entry("Evidence Collection", Phase::Intake, 5, "Collect encroachment proof"),
    entry("Site Inspection", Phase::Verification, 7, "Physical verification"),
    entry("Extent Analysis", Phase::Analysis, 5, "Measure encroachment"),
    entry("Mediation Window", Phase::Negotiation, 14, "Attempt amicable resolution"),
    entry("Notice Period", Phase::Negotiation, 30, "Legal notice period"),
    entry("Eviction/Settlement", Phase::Resolution, 14, "Execute resolution"),
    entry("Restoration", Phase::Closure, 7, "Restore boundaries"),
];

const TITLE_ISSUE: &[TemplateEntry] = &[
    entry("Title Search", Phase::Intake, 7, "Search title history"),
    entry("Chain Verification", Phase::Verification, 14, "Verify ownership chain"),
    entry("Defect Analysis", Phase::Analysis, 10, "Identify title defects"),
    entry("Stakeholder Meeting", Phase::Negotiation, 7, "Meet with parties"),
    entry("Title Rectification", Phase::Resolution, 21, "Correct title issues"),
    entry("Registration Update", Phase::Closure, 14, "Update registry"),
];

pub fn template_for(dispute_type: DisputeType) -> &'static [TemplateEntry] {
    match dispute_type {
        DisputeType::Ownership => OWNERSHIP,
        DisputeType::Boundary => BOUNDARY,
        DisputeType::Inheritance => INHERITANCE,
        DisputeType::Encroachment => ENCROACHMENT,
        DisputeType::TitleIssue => TITLE_ISSUE,
    }
}

pub fn complexity_multiplier(complexity: Complexity) -> f64 {
    match complexity {
        Complexity::Low => 0.8,
        Complexity::Medium => 1.0,
        Complexity::High => 1.5,
        Complexity::VeryHigh => 2.0,
    }
}

/// Signed day offset applied to the first milestone only.
pub fn location_adjustment_days(location: LocationClass) -> i64 {
    match location {
        LocationClass::Rural => 7,
        LocationClass::Urban => 0,
        LocationClass::Remote => 14,
        LocationClass::Metropolitan => -3,
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Build the milestone chain for a case.
///
/// Each entry lasts `max(1, round(base * multiplier))` days, the first one
/// shifted by the location offset before the floor. Milestones are
/// back-to-back; the first is `InProgress`.
pub fn generate_timeline(
    case_id: CaseId,
    dispute_type: DisputeType,
    complexity: Complexity,
    location_class: LocationClass,
    start: DateTime<Utc>,
) -> Timeline {
    let multiplier = complexity_multiplier(complexity);
    let location_days = location_adjustment_days(location_class);

    let mut milestones = Vec::new();
    let mut cursor = start;
    for (i, item) in template_for(dispute_type).iter().enumerate() {
        let mut days = (f64::from(item.base_days) * multiplier).round() as i64;
        if i == 0 {
            days += location_days;
        }
        let days = days.max(1);
        let end = cursor + Duration::days(days);
        milestones.push(Milestone {
            name: item.name.to_string(),
            description: item.description.to_string(),
            phase: item.phase,
            duration_days: days as u32,
            start_date: cursor,
            end_date: end,
            status: if i == 0 {
                MilestoneStatus::InProgress
            } else {
                MilestoneStatus::Pending
            },
        });
        cursor = end;
    }

    let total_days: u32 = milestones.iter().map(|m| m.duration_days).sum();
    let mut phase_summary = BTreeMap::new();
    for m in &milestones {
        *phase_summary.entry(m.phase).or_insert(0) += m.duration_days;
    }

    tracing::debug!(
        case_id,
        dispute_type = %dispute_type,
        complexity = %complexity,
        location = %location_class,
        total_days,
        milestones = milestones.len(),
        "timeline generated"
    );

    Timeline {
        case_id,
        dispute_type,
        complexity,
        location_class,
        generated_at: Utc::now(),
        start_date: start,
        expected_completion: start + Duration::days(i64::from(total_days)),
        total_days,
        milestones,
        phase_summary,
    }
}

// ---------------------------------------------------------------------------
// Milestone updates
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("timeline for case {case_id} has no milestone named {name:?}")]
    UnknownMilestone { case_id: CaseId, name: String },
}

/// Set a milestone's status. Completing a milestone promotes the next one to
/// `InProgress`.
pub fn update_milestone_status(
    timeline: &mut Timeline,
    name: &str,
    status: MilestoneStatus,
) -> Result<(), TimelineError> {
    let idx = timeline
        .milestones
        .iter()
        .position(|m| m.name == name)
        .ok_or_else(|| TimelineError::UnknownMilestone {
            case_id: timeline.case_id,
            name: name.to_string(),
        })?;

    timeline.milestones[idx].status = status;
    if status == MilestoneStatus::Completed {
        if let Some(next) = timeline.milestones.get_mut(idx + 1) {
            next.status = MilestoneStatus::InProgress;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Complexity assessment
// ---------------------------------------------------------------------------

/// Inputs for scoring a case's complexity before a timeline is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityFactors {
    pub dispute_type: DisputeType,
    pub party_count: u32,
    pub document_count: u32,
    pub has_legal_issues: bool,
    pub value_crores: f64,
}

impl Default for ComplexityFactors {
    fn default() -> Self {
        Self {
            dispute_type: DisputeType::Ownership,
            party_count: 2,
            document_count: 1,
            has_legal_issues: false,
            value_crores: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub level: Complexity,
    pub score: u32,
}

pub fn assess_complexity(factors: &ComplexityFactors) -> ComplexityAssessment {
    let mut score = match factors.dispute_type {
        DisputeType::Inheritance => 4,
        DisputeType::Ownership | DisputeType::TitleIssue => 3,
        DisputeType::Boundary | DisputeType::Encroachment => 2,
    };

    score += match factors.party_count {
        n if n > 4 => 3,
        n if n > 2 => 1,
        _ => 0,
    };
    score += match factors.document_count {
        n if n > 10 => 2,
        n if n > 5 => 1,
        _ => 0,
    };
    if factors.has_legal_issues {
        score += 2;
    }
    if factors.value_crores > 10.0 {
        score += 3;
    } else if factors.value_crores > 1.0 {
        score += 1;
    }

    let level = match score {
        0..=3 => Complexity::Low,
        4..=6 => Complexity::Medium,
        7..=9 => Complexity::High,
        _ => Complexity::VeryHigh,
    };
    ComplexityAssessment { level, score }
}
