use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use lc_core::types::{
    CaseId, Claim, DisputeType, LandType, LandValuation, ProposalStatus, SettlementProposal,
    SettlementType,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("proposal not found: {0}")]
    NotFound(String),
    #[error("proposal {proposal_id} cannot move from {from:?} to {to:?}")]
    InvalidStatusChange {
        proposal_id: String,
        from: ProposalStatus,
        to: ProposalStatus,
    },
    #[error("invalid claim from {party}: {reason}")]
    InvalidClaim { party: String, reason: String },
    #[error("invalid land area: {0}")]
    InvalidArea(f64),
}

pub type Result<T> = std::result::Result<T, ProposalError>;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Land valuation
// ---------------------------------------------------------------------------

/// Lakh per acre for locations without a table entry.
pub const FALLBACK_RATE_LAKHS: f64 = 10.0;

const VALUATION_DISCLAIMER: &str = "This is an estimated value for negotiation purposes only";

fn builtin_rates() -> BTreeMap<String, f64> {
    [
        ("mumbai", 500.0),
        ("pune", 80.0),
        ("bangalore", 150.0),
        ("delhi", 300.0),
        ("lucknow", 40.0),
        ("varanasi", 30.0),
        ("nagpur", 25.0),
        ("mysore", 45.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn land_type_multiplier(land_type: LandType) -> f64 {
    match land_type {
        LandType::Agricultural => 1.0,
        LandType::Residential => 2.5,
        LandType::Commercial => 4.0,
        LandType::Industrial => 3.0,
    }
}

/// Market-average land rates, keyed by lower-cased location.
#[derive(Debug, Clone)]
pub struct LandValuator {
    rates: BTreeMap<String, f64>,
}

impl Default for LandValuator {
    fn default() -> Self {
        Self {
            rates: builtin_rates(),
        }
    }
}

impl LandValuator {
    /// Built-in table with `extra` entries layered on top.
    pub fn with_rates(extra: &BTreeMap<String, f64>) -> Self {
        let mut valuator = Self::default();
        for (location, rate) in extra {
            valuator.rates.insert(location.to_ascii_lowercase(), *rate);
        }
        valuator
    }

    pub fn base_rate(&self, location: &str) -> f64 {
        self.rates
            .get(&location.trim().to_ascii_lowercase())
            .copied()
            .unwrap_or(FALLBACK_RATE_LAKHS)
    }

    pub fn estimate(
        &self,
        area_acres: f64,
        location: &str,
        land_type: LandType,
    ) -> Result<LandValuation> {
        if !area_acres.is_finite() || area_acres < 0.0 {
            return Err(ProposalError::InvalidArea(area_acres));
        }
        let rate = self.base_rate(location) * land_type_multiplier(land_type);
        let total = area_acres * rate;
        Ok(LandValuation {
            area_acres,
            location: location.to_string(),
            land_type,
            rate_per_acre_lakhs: rate,
            total_value_lakhs: total,
            total_value_crores: total / 100.0,
            estimation_basis: "market_average".to_string(),
            disclaimer: VALUATION_DISCLAIMER.to_string(),
        })
    }
}

/// Valuation against the built-in rate table.
pub fn estimate_land_value(
    area_acres: f64,
    location: &str,
    land_type: LandType,
) -> Result<LandValuation> {
    LandValuator::default().estimate(area_acres, location, land_type)
}

// ---------------------------------------------------------------------------
// Claim analysis
// ---------------------------------------------------------------------------

/// Evidence score: possession years and documents are capped at 30 points
/// each, the claimed share contributes up to 40.
pub fn score_claim(claim: &Claim) -> f64 {
    let years = (f64::from(claim.years_possessed) * 2.0).min(30.0);
    let docs = (f64::from(claim.supporting_documents) * 5.0).min(30.0);
    years + docs + claim.claimed_percentage * 0.4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyAllocation {
    pub name: String,
    pub score: f64,
    pub recommended_share: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAnalysis {
    pub party_a: PartyAllocation,
    pub party_b: PartyAllocation,
    pub analysis_factors: Vec<String>,
}

/// Split 100% between two claims in proportion to their scores. Rounding
/// lands on party A; the shares always sum to 100.
pub fn analyze_claims(a: &Claim, b: &Claim) -> ClaimAnalysis {
    let score_a = score_claim(a);
    let score_b = score_claim(b);
    let total = score_a + score_b;

    let share_a = if total <= 0.0 {
        50
    } else {
        ((score_a / total) * 100.0).round().clamp(0.0, 100.0) as u32
    };

    ClaimAnalysis {
        party_a: PartyAllocation {
            name: a.party_name.clone(),
            score: score_a,
            recommended_share: share_a,
        },
        party_b: PartyAllocation {
            name: b.party_name.clone(),
            score: score_b,
            recommended_share: 100 - share_a,
        },
        analysis_factors: ["years_possessed", "supporting_documents", "claimed_percentage"]
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

fn validate_claim(claim: &Claim) -> Result<()> {
    let pct = claim.claimed_percentage;
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(ProposalError::InvalidClaim {
            party: claim.party_name.clone(),
            reason: format!("claimed percentage {pct} is outside 0-100"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// NegotiationAgent
// ---------------------------------------------------------------------------

/// Generates and tracks settlement proposals.
pub struct NegotiationAgent {
    proposals: DashMap<String, SettlementProposal>,
    valuator: LandValuator,
    next_id: AtomicU64,
}

impl Default for NegotiationAgent {
    fn default() -> Self {
        Self::new(LandValuator::default())
    }
}

impl NegotiationAgent {
    pub fn new(valuator: LandValuator) -> Self {
        Self {
            proposals: DashMap::new(),
            valuator,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn valuator(&self) -> &LandValuator {
        &self.valuator
    }

    pub fn estimate_land_value(
        &self,
        area_acres: f64,
        location: &str,
        land_type: LandType,
    ) -> Result<LandValuation> {
        self.valuator.estimate(area_acres, location, land_type)
    }

    fn next_proposal_id(&self, case_id: CaseId) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("PROP-{case_id}-{n:03}")
    }

    fn proposal(
        &self,
        case_id: CaseId,
        settlement_type: SettlementType,
        title: String,
        description: String,
        terms: serde_json::Value,
        rationale: String,
    ) -> SettlementProposal {
        let terms = match terms {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        SettlementProposal {
            proposal_id: self.next_proposal_id(case_id),
            case_id,
            settlement_type,
            title,
            description,
            terms,
            status: ProposalStatus::Pending,
            created_at: Utc::now(),
            confidence_score: settlement_type.confidence(),
            rationale,
        }
    }

    /// Produce two or three proposals for a two-party dispute.
    ///
    /// Ownership and inheritance disputes open with an evidence-weighted
    /// split. A buyout of the smaller share is always offered. Boundary and
    /// encroachment disputes close with a compensation offer, everything
    /// else with an equal split.
    pub fn generate_proposals(
        &self,
        case_id: CaseId,
        dispute_type: DisputeType,
        a: &Claim,
        b: &Claim,
        valuation: &LandValuation,
    ) -> Result<Vec<SettlementProposal>> {
        validate_claim(a)?;
        validate_claim(b)?;

        let analysis = analyze_claims(a, b);
        let share_a = analysis.party_a.recommended_share;
        let share_b = analysis.party_b.recommended_share;
        let total_value = valuation.total_value_lakhs;
        let area = valuation.area_acres;
        let portion = |value: f64, share: u32| round2(value * f64::from(share) / 100.0);

        let mut proposals = Vec::with_capacity(3);

        if matches!(dispute_type, DisputeType::Ownership | DisputeType::Inheritance) {
            proposals.push(self.proposal(
                case_id,
                SettlementType::WeightedSplit,
                format!("Weighted Split ({share_a}-{share_b})"),
                format!(
                    "Divide the property based on evidence-weighted claims: {} gets {share_a}%, {} gets {share_b}%",
                    a.party_name, b.party_name
                ),
                json!({
                    "party1Name": a.party_name,
                    "party2Name": b.party_name,
                    "party1Share": share_a,
                    "party2Share": share_b,
                    "party1Area": portion(area, share_a),
                    "party2Area": portion(area, share_b),
                    "party1Value": portion(total_value, share_a),
                    "party2Value": portion(total_value, share_b),
                }),
                format!(
                    "Based on {} combined years of possession and {} supporting documents",
                    u64::from(a.years_possessed) + u64::from(b.years_possessed),
                    u64::from(a.supporting_documents) + u64::from(b.supporting_documents)
                ),
            ));
        }

        // Party B sells on a tie.
        let (buyer, seller, seller_share) = if share_a >= share_b {
            (a, b, share_b)
        } else {
            (b, a, share_a)
        };
        let buyout = portion(total_value, seller_share);
        proposals.push(self.proposal(
            case_id,
            SettlementType::Buyout,
            format!("Buyout at ₹{buyout} Lakhs"),
            format!(
                "{} buys out {}'s share at market value",
                buyer.party_name, seller.party_name
            ),
            json!({
                "buyer": buyer.party_name,
                "seller": seller.party_name,
                "buyoutAmountLakhs": buyout,
                "paymentTerms": "50% upfront, 50% within 6 months",
                "transferTimeline": "Complete within 90 days of payment",
            }),
            "Buyout provides clean resolution with single ownership".to_string(),
        ));

        if matches!(dispute_type, DisputeType::Boundary | DisputeType::Encroachment) {
            let encroached = round2((area * 0.1).min(0.5));
            let compensation = round2(encroached * valuation.rate_per_acre_lakhs);
            proposals.push(self.proposal(
                case_id,
                SettlementType::Compensation,
                format!("Compensation of ₹{compensation} Lakhs + Restoration"),
                "Encroaching party pays compensation and restores boundaries".to_string(),
                json!({
                    "encroachedArea": encroached,
                    "compensationLakhs": compensation,
                    "restorationTimeline": "30 days",
                    "boundaryDemarcation": "Joint survey within 15 days",
                }),
                "Appropriate for encroachment cases with clear boundaries".to_string(),
            ));
        } else {
            proposals.push(self.proposal(
                case_id,
                SettlementType::EqualSplit,
                "Equal 50-50 Split".to_string(),
                "Equal division of property between both parties".to_string(),
                json!({
                    "party1Share": 50,
                    "party2Share": 50,
                    "party1Area": round2(area / 2.0),
                    "party2Area": round2(area / 2.0),
                }),
                "Simple equal division when claims are comparable".to_string(),
            ));
        }

        for p in &proposals {
            self.proposals.insert(p.proposal_id.clone(), p.clone());
        }
        tracing::debug!(
            case_id,
            dispute_type = %dispute_type,
            share_a,
            share_b,
            count = proposals.len(),
            "settlement proposals generated"
        );
        Ok(proposals)
    }

    /// Record a party's answer to a pending proposal. Counter-terms are kept
    /// under `terms.counterProposal` when the answer is a counter-proposal.
    pub fn update_proposal_status(
        &self,
        proposal_id: &str,
        status: ProposalStatus,
        counter_terms: Option<serde_json::Value>,
    ) -> Result<SettlementProposal> {
        let mut proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| ProposalError::NotFound(proposal_id.to_string()))?;

        if !proposal.status.can_transition_to(status) {
            return Err(ProposalError::InvalidStatusChange {
                proposal_id: proposal_id.to_string(),
                from: proposal.status,
                to: status,
            });
        }
        proposal.status = status;
        if status == ProposalStatus::CounterProposed {
            if let Some(terms) = counter_terms {
                proposal.terms.insert("counterProposal".to_string(), terms);
            }
        }
        tracing::info!(proposal_id, status = ?status, "proposal status updated");
        Ok(proposal.clone())
    }

    pub fn get(&self, proposal_id: &str) -> Option<SettlementProposal> {
        self.proposals.get(proposal_id).map(|p| p.value().clone())
    }

    pub fn proposals_for_case(&self, case_id: CaseId) -> Vec<SettlementProposal> {
        let mut proposals: Vec<SettlementProposal> = self
            .proposals
            .iter()
            .filter(|p| p.case_id == case_id)
            .map(|p| p.value().clone())
            .collect();
        proposals.sort_by(|a, b| {
            (a.created_at, &a.proposal_id).cmp(&(b.created_at, &b.proposal_id))
        });
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_capped() {
        let heavy = Claim::new("A", 100.0, 40, 20);
        assert_eq!(score_claim(&heavy), 100.0);
    }

    #[test]
    fn zero_scores_split_evenly() {
        let a = Claim::new("A", 0.0, 0, 0);
        let b = Claim::new("B", 0.0, 0, 0);
        let analysis = analyze_claims(&a, &b);
        assert_eq!(analysis.party_a.recommended_share, 50);
        assert_eq!(analysis.party_b.recommended_share, 50);
    }

    #[test]
    fn valuation_uses_table_and_multiplier() {
        let v = estimate_land_value(2.0, "Pune", LandType::Commercial).unwrap();
        assert_eq!(v.rate_per_acre_lakhs, 320.0);
        assert_eq!(v.total_value_lakhs, 640.0);
        assert_eq!(v.total_value_crores, 6.4);

        let unknown = estimate_land_value(1.0, "shimla", LandType::Agricultural).unwrap();
        assert_eq!(unknown.rate_per_acre_lakhs, FALLBACK_RATE_LAKHS);
        assert!(estimate_land_value(-1.0, "delhi", LandType::Agricultural).is_err());
    }

    #[test]
    fn extra_rates_override_builtin() {
        let extra = [("Delhi".to_string(), 350.0), ("agra".to_string(), 35.0)]
            .into_iter()
            .collect();
        let valuator = LandValuator::with_rates(&extra);
        assert_eq!(valuator.base_rate("delhi"), 350.0);
        assert_eq!(valuator.base_rate("AGRA"), 35.0);
        assert_eq!(valuator.base_rate("mumbai"), 500.0);
    }

    #[test]
    fn out_of_range_claim_rejected() {
        let agent = NegotiationAgent::default();
        let v = estimate_land_value(1.0, "delhi", LandType::Agricultural).unwrap();
        let err = agent
            .generate_proposals(
                1,
                DisputeType::Ownership,
                &Claim::new("A", 120.0, 1, 1),
                &Claim::new("B", 10.0, 1, 1),
                &v,
            )
            .unwrap_err();
        assert!(matches!(err, ProposalError::InvalidClaim { .. }));
        assert!(agent.proposals_for_case(1).is_empty());
    }
}
