use proptest::prelude::*;
use sfq_core::approvals::{ApprovalLedger, SuggestionInput, SuggestionStatus, VoteDecision};
use sfq_core::error::codes;
use sfq_core::tokens::{TokenAuthenticator, TokenConfig};

const APPROVERS: [&str; 4] = ["ana@x.io", "bo@x.io", "cy@x.io", "di@x.io"];

fn auth() -> TokenAuthenticator {
    TokenAuthenticator::new(&TokenConfig {
        secret: "ledger-secret".to_string(),
        ttl_secs: 600,
    })
    .unwrap()
}

#[test]
fn token_gated_submit_records_votes_for_the_token_approver() {
    let ledger = ApprovalLedger::new();
    let auth = auth();
    ledger
        .upsert_suggestions(
            "sess-1",
            &[
                SuggestionInput { id: "q1".into(), text: "We encrypt at rest.".into() },
                SuggestionInput { id: "q2".into(), text: "MFA is enforced.".into() },
            ],
        )
        .unwrap();

    let token = auth.issue("sess-1", "ana@x.io", None).unwrap();
    let res = ledger
        .submit_decisions(
            &auth,
            &token,
            &[
                VoteDecision { suggestion_id: "q1".into(), accept: true },
                VoteDecision { suggestion_id: "q2".into(), accept: false },
            ],
        )
        .unwrap();
    assert_eq!(res.updated, 2);
    assert_eq!(res.approver, "ana@x.io");

    let review = ledger.review_session(&auth, &token).unwrap();
    assert_eq!(review.session_id, "sess-1");
    assert_eq!(review.suggestions.len(), 2);
    assert!(review.suggestions[0].accepted_by.contains("ana@x.io"));
    assert!(review.suggestions[1].rejected_by.contains("ana@x.io"));

    let required = vec!["ana@x.io".to_string()];
    let st = ledger.status("sess-1", &required);
    assert_eq!(st[0].status, SuggestionStatus::Accepted);
    assert_eq!(st[1].status, SuggestionStatus::Rejected);
}

#[test]
fn padded_identities_match_on_both_sides() {
    let ledger = ApprovalLedger::new();
    ledger.record_vote("sess-1", "q1", " ana@x.io ", true).unwrap();
    ledger.record_vote("sess-1", "q1", "bo@x.io", true).unwrap();

    let required = vec![" ana@x.io".to_string(), "bo@x.io\t".to_string(), "  ".to_string()];
    assert_eq!(ledger.status("sess-1", &required)[0].status, SuggestionStatus::Accepted);

    ledger.record_vote("sess-1", "q1", "bo@x.io", false).unwrap();
    assert_eq!(ledger.status("sess-1", &required)[0].status, SuggestionStatus::Rejected);

    let blank_only = vec!["   ".to_string()];
    assert_eq!(ledger.status("sess-1", &blank_only)[0].status, SuggestionStatus::Pending);
}

#[test]
fn invalid_token_changes_nothing() {
    let ledger = ApprovalLedger::new();
    let err = ledger
        .submit_decisions(
            &auth(),
            "garbage.token",
            &[VoteDecision { suggestion_id: "q1".into(), accept: true }],
        )
        .unwrap_err();
    assert_eq!(err.code, codes::INVALID_TOKEN);
    assert!(ledger.list_suggestions("sess-1").is_empty());
}

#[test]
fn concurrent_votes_are_all_recorded() {
    let ledger = std::sync::Arc::new(ApprovalLedger::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for j in 0..50 {
                    ledger
                        .record_vote("s", &format!("q{j}"), &format!("approver{i}"), true)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let all = ledger.list_suggestions("s");
    assert_eq!(all.len(), 50);
    assert!(all.iter().all(|s| s.accepted_by.len() == 8));
}

proptest! {
    #[test]
    fn status_follows_set_rule(
        votes in proptest::collection::vec((0usize..4, any::<bool>()), 0..20),
        required_mask in 0u8..16,
    ) {
        let ledger = ApprovalLedger::new();
        ledger
            .upsert_suggestions("s", &[SuggestionInput { id: "q".into(), text: "t".into() }])
            .unwrap();
        for (who, accept) in &votes {
            ledger.record_vote("s", "q", APPROVERS[*who], *accept).unwrap();
        }
        let required: Vec<String> = (0..4)
            .filter(|i| required_mask & (1 << i) != 0)
            .map(|i| APPROVERS[i].to_string())
            .collect();

        let s = &ledger.list_suggestions("s")[0];
        prop_assert!(s.accepted_by.is_disjoint(&s.rejected_by));

        let superset = required.iter().all(|r| s.accepted_by.contains(r));
        let disjoint = required.iter().all(|r| !s.rejected_by.contains(r));
        let status = s.status(&required);
        prop_assert_eq!(
            status == SuggestionStatus::Accepted,
            !required.is_empty() && superset && disjoint
        );
        if required.is_empty() {
            prop_assert_eq!(status, SuggestionStatus::Pending);
        }
    }
}
