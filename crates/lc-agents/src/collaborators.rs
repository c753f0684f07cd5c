//! Interfaces to services outside the core: document drafting lives here,
//! persistence is `lc_core::store::CaseStore`, notifications are
//! [`crate::task_agent::Notifier`].

use async_trait::async_trait;
use dashmap::DashMap;
use lc_core::types::CaseId;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rejected request: {0}")]
    Rejected(String),
}

/// Inputs for a settlement agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub case_id: CaseId,
    pub party_names: [String; 2],
    pub party_details: [String; 2],
    pub dispute_subject: String,
    pub settlement_terms: String,
    pub consideration_details: String,
    pub timeline_details: String,
}

impl DraftRequest {
    /// Agreement between the two named parties with the stock wording used
    /// when no negotiated terms were captured.
    pub fn standard(case_id: CaseId, party_a: &str, party_b: &str) -> Self {
        Self {
            case_id,
            party_names: [party_a.to_string(), party_b.to_string()],
            party_details: [
                "resident of Delhi".to_string(),
                "resident of Delhi".to_string(),
            ],
            dispute_subject: "land ownership".to_string(),
            settlement_terms: "Division of property as per agreed terms".to_string(),
            consideration_details: "As mutually agreed".to_string(),
            timeline_details: "Completion within 90 days".to_string(),
        }
    }
}

/// What the drafting service reported. `success == false` is a soft failure:
/// the run still completes and records the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOutcome {
    pub success: bool,
    pub cached: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait DocumentDrafter: Send + Sync {
    async fn draft_settlement(&self, request: &DraftRequest)
        -> Result<DraftOutcome, CollaboratorError>;
}

/// Renders a plain-text agreement locally and keeps one draft per case.
#[derive(Debug, Default)]
pub struct TemplateDrafter {
    drafts: DashMap<CaseId, String>,
}

impl TemplateDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft_for(&self, case_id: CaseId) -> Option<String> {
        self.drafts.get(&case_id).map(|d| d.value().clone())
    }

    fn render(request: &DraftRequest) -> String {
        format!(
            "SETTLEMENT AGREEMENT (Case #{case})\n\n\
             Between {a}, {a_details}, and {b}, {b_details},\n\
             concerning {subject}.\n\n\
             Terms: {terms}\n\
             Consideration: {consideration}\n\
             Timeline: {timeline}\n",
            case = request.case_id,
            a = request.party_names[0],
            a_details = request.party_details[0],
            b = request.party_names[1],
            b_details = request.party_details[1],
            subject = request.dispute_subject,
            terms = request.settlement_terms,
            consideration = request.consideration_details,
            timeline = request.timeline_details,
        )
    }
}

#[async_trait]
impl DocumentDrafter for TemplateDrafter {
    async fn draft_settlement(
        &self,
        request: &DraftRequest,
    ) -> Result<DraftOutcome, CollaboratorError> {
        if request.party_names.iter().any(|n| n.trim().is_empty()) {
            return Err(CollaboratorError::Rejected(
                "both party names are required".to_string(),
            ));
        }
        let cached = self.drafts.contains_key(&request.case_id);
        if !cached {
            self.drafts.insert(request.case_id, Self::render(request));
        }
        Ok(DraftOutcome {
            success: true,
            cached,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_draft_is_cached() {
        let drafter = TemplateDrafter::new();
        let req = DraftRequest::standard(5, "Party A", "Party B");
        assert!(!drafter.draft_settlement(&req).await.unwrap().cached);
        assert!(drafter.draft_settlement(&req).await.unwrap().cached);
        let text = drafter.draft_for(5).unwrap();
        assert!(text.contains("Case #5"));
        assert!(text.contains("Completion within 90 days"));
    }

    #[tokio::test]
    async fn blank_party_is_rejected() {
        let drafter = TemplateDrafter::new();
        let req = DraftRequest::standard(6, "Party A", " ");
        assert!(matches!(
            drafter.draft_settlement(&req).await,
            Err(CollaboratorError::Rejected(_))
        ));
    }
}
