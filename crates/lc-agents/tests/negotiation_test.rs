use lc_agents::negotiation::{analyze_claims, estimate_land_value, NegotiationAgent, ProposalError};
use lc_core::types::{
    Claim, DisputeType, LandType, LandValuation, ProposalStatus, SettlementType,
};
use serde_json::json;

fn party_a() -> Claim {
    Claim::new("Ravi", 60.0, 15, 5)
}

fn party_b() -> Claim {
    Claim::new("Meena", 40.0, 8, 3)
}

fn delhi_two_acres() -> LandValuation {
    estimate_land_value(2.0, "delhi", LandType::Agricultural).unwrap()
}

#[test]
fn evidence_scores_split_63_37() {
    let analysis = analyze_claims(&party_a(), &party_b());
    assert_eq!(analysis.party_a.score, 79.0);
    assert_eq!(analysis.party_b.score, 47.0);
    assert_eq!(analysis.party_a.recommended_share, 63);
    assert_eq!(analysis.party_b.recommended_share, 37);
}

#[test]
fn ownership_dispute_gets_weighted_buyout_and_equal() {
    let agent = NegotiationAgent::default();
    let proposals = agent
        .generate_proposals(20, DisputeType::Ownership, &party_a(), &party_b(), &delhi_two_acres())
        .unwrap();

    let types: Vec<_> = proposals.iter().map(|p| p.settlement_type).collect();
    assert_eq!(
        types,
        vec![
            SettlementType::WeightedSplit,
            SettlementType::Buyout,
            SettlementType::EqualSplit,
        ]
    );

    let weighted = &proposals[0];
    assert_eq!(weighted.title, "Weighted Split (63-37)");
    assert_eq!(weighted.confidence_score, 0.75);
    assert_eq!(weighted.terms["party1Share"], json!(63));
    assert_eq!(weighted.terms["party1Area"], json!(1.26));
    assert_eq!(weighted.terms["party2Value"], json!(222.0));

    let buyout = &proposals[1];
    assert_eq!(buyout.terms["buyer"], json!("Ravi"));
    assert_eq!(buyout.terms["seller"], json!("Meena"));
    assert_eq!(buyout.terms["buyoutAmountLakhs"], json!(222.0));

    assert!(proposals.iter().all(|p| p.status == ProposalStatus::Pending));
    assert!(proposals.iter().all(|p| p.proposal_id.starts_with("PROP-20-")));
    assert_eq!(agent.proposals_for_case(20).len(), 3);
}

#[test]
fn proposal_mix_per_dispute_type() {
    let agent = NegotiationAgent::default();
    let expected = [
        (
            DisputeType::Ownership,
            vec![
                SettlementType::WeightedSplit,
                SettlementType::Buyout,
                SettlementType::EqualSplit,
            ],
        ),
        (
            DisputeType::Inheritance,
            vec![
                SettlementType::WeightedSplit,
                SettlementType::Buyout,
                SettlementType::EqualSplit,
            ],
        ),
        (DisputeType::Boundary, vec![SettlementType::Buyout, SettlementType::Compensation]),
        (DisputeType::Encroachment, vec![SettlementType::Buyout, SettlementType::Compensation]),
        (DisputeType::TitleIssue, vec![SettlementType::Buyout, SettlementType::EqualSplit]),
    ];
    for (case_id, (dispute_type, types)) in (30..).zip(expected) {
        let proposals = agent
            .generate_proposals(case_id, dispute_type, &party_a(), &party_b(), &delhi_two_acres())
            .unwrap();
        let got: Vec<_> = proposals.iter().map(|p| p.settlement_type).collect();
        assert_eq!(got, types, "{dispute_type}");
    }
}

#[test]
fn compensation_caps_encroached_area() {
    let agent = NegotiationAgent::default();
    let valuation = estimate_land_value(10.0, "pune", LandType::Agricultural).unwrap();
    let proposals = agent
        .generate_proposals(40, DisputeType::Encroachment, &party_a(), &party_b(), &valuation)
        .unwrap();
    let compensation = proposals
        .iter()
        .find(|p| p.settlement_type == SettlementType::Compensation)
        .unwrap();
    assert_eq!(compensation.terms["encroachedArea"], json!(0.5));
    assert_eq!(compensation.terms["compensationLakhs"], json!(40.0));
}

#[test]
fn tied_shares_make_party_b_the_seller() {
    let agent = NegotiationAgent::default();
    let a = Claim::new("Asha", 50.0, 10, 2);
    let b = Claim::new("Bilal", 50.0, 10, 2);
    let proposals = agent
        .generate_proposals(50, DisputeType::TitleIssue, &a, &b, &delhi_two_acres())
        .unwrap();
    let buyout = &proposals[0];
    assert_eq!(buyout.settlement_type, SettlementType::Buyout);
    assert_eq!(buyout.terms["buyer"], json!("Asha"));
    assert_eq!(buyout.terms["seller"], json!("Bilal"));
    assert_eq!(buyout.terms["buyoutAmountLakhs"], json!(300.0));
}

#[test]
fn stronger_party_b_buys_out_a() {
    let agent = NegotiationAgent::default();
    let proposals = agent
        .generate_proposals(51, DisputeType::Boundary, &party_b(), &party_a(), &delhi_two_acres())
        .unwrap();
    assert_eq!(proposals[0].terms["buyer"], json!("Ravi"));
    assert_eq!(proposals[0].terms["seller"], json!("Meena"));
}

#[test]
fn counter_proposal_keeps_counter_terms() {
    let agent = NegotiationAgent::default();
    let proposals = agent
        .generate_proposals(60, DisputeType::Ownership, &party_a(), &party_b(), &delhi_two_acres())
        .unwrap();
    let id = proposals[0].proposal_id.clone();

    let updated = agent
        .update_proposal_status(
            &id,
            ProposalStatus::CounterProposed,
            Some(json!({"party1Share": 55})),
        )
        .unwrap();
    assert_eq!(updated.status, ProposalStatus::CounterProposed);
    assert_eq!(updated.terms["counterProposal"], json!({"party1Share": 55}));
    assert_eq!(agent.get(&id).unwrap().status, ProposalStatus::CounterProposed);

    let err = agent
        .update_proposal_status(&id, ProposalStatus::Accepted, None)
        .unwrap_err();
    assert!(matches!(err, ProposalError::InvalidStatusChange { .. }));
}

#[test]
fn accepting_ignores_counter_terms() {
    let agent = NegotiationAgent::default();
    let proposals = agent
        .generate_proposals(61, DisputeType::Boundary, &party_a(), &party_b(), &delhi_two_acres())
        .unwrap();
    let updated = agent
        .update_proposal_status(
            &proposals[1].proposal_id,
            ProposalStatus::Accepted,
            Some(json!({})),
        )
        .unwrap();
    assert!(!updated.terms.contains_key("counterProposal"));
    assert!(matches!(
        agent.update_proposal_status("PROP-0-999", ProposalStatus::Rejected, None),
        Err(ProposalError::NotFound(_))
    ));
}

#[test]
fn huge_evidence_counts_hit_the_caps() {
    let heavy = Claim::new("Ravi", 50.0, u32::MAX, u32::MAX);
    let light = Claim::new("Meena", 50.0, 1, 1);

    let analysis = analyze_claims(&heavy, &light);
    assert_eq!(analysis.party_a.score, 80.0);
    assert_eq!(analysis.party_b.score, 27.0);
    assert_eq!(analysis.party_a.recommended_share, 75);
    assert_eq!(analysis.party_b.recommended_share, 25);

    let proposals = NegotiationAgent::default()
        .generate_proposals(70, DisputeType::Ownership, &heavy, &light, &delhi_two_acres())
        .unwrap();
    assert_eq!(proposals[0].settlement_type, SettlementType::WeightedSplit);
    assert_eq!(
        proposals[0].rationale,
        "Based on 4294967296 combined years of possession and 4294967296 supporting documents"
    );
}

#[test]
fn shares_always_sum_to_100() {
    let years = [0, 1, 7, 15, 16, 1_000, u32::MAX];
    let docs = [0, 1, 5, 6, 250, u32::MAX];
    let pcts = [0.0, 0.5, 33.3, 50.0, 100.0, -40.0, -1.0e9, f64::NAN, f64::INFINITY];

    for &ya in &years {
        for &da in &docs {
            for &pa in &pcts {
                let a = Claim::new("A", pa, ya, da);
                for &yb in &[0, 3, u32::MAX] {
                    for &pb in &pcts {
                        let b = Claim::new("B", pb, yb, 2);
                        let analysis = analyze_claims(&a, &b);
                        let (share_a, share_b) = (
                            analysis.party_a.recommended_share,
                            analysis.party_b.recommended_share,
                        );
                        assert_eq!(share_a + share_b, 100, "a={a:?} b={b:?}");
                        assert!(share_a <= 100, "a={a:?} b={b:?}");
                    }
                }
            }
        }
    }
}
