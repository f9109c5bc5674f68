//! Integration tests for vault governance.
//!
//! Covers the proposal lifecycle end to end: vault creation, posting,
//! voting with flips, cancellation, and membership changes executed by the
//! creator or by an auth token holder.

use quorum_custody::proposal::ProposalState;
use quorum_custody::{
    Address, Authority, CustodyEngine, CustodyError, Denied, InMemoryTransfers, ProposalPayload,
    Record, StateViolation, VaultId,
};

fn addr(label: &str) -> Address {
    Address::derive(label)
}

/// Helper: an initialised engine with a three-member vault
/// (approval 2, cancellation 2).
fn three_member_vault() -> (CustodyEngine, VaultId) {
    let engine = CustodyEngine::new(InMemoryTransfers::new());
    engine.initialize(addr("root")).unwrap();
    let vault = engine
        .create_vault(&[addr("alice"), addr("bob"), addr("carol")], 2, 2)
        .unwrap();
    (engine, vault)
}

/// Helper: creates and posts a proposal from alice.
fn posted_proposal(engine: &CustodyEngine, vault: &VaultId, payload: ProposalPayload) -> u64 {
    let id = engine.create_proposal(&addr("alice"), vault, payload).unwrap();
    engine.post_proposal(&addr("alice"), vault, id).unwrap();
    id
}

fn assert_tally_invariant(engine: &CustodyEngine, vault: &VaultId, id: u64) {
    let proposal = engine.proposal(vault, id).unwrap();
    let yes = proposal.votes().values().filter(|v| **v).count() as u64;
    let no = proposal.votes().values().filter(|v| !**v).count() as u64;
    assert_eq!(proposal.approval_votes(), yes);
    assert_eq!(proposal.cancellation_votes(), no);
}

// ---------------------------------------------------------------------------
// Vault Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn vault_starts_with_given_members_and_thresholds() {
    let (engine, vault) = three_member_vault();
    let info = engine.vault(&vault).unwrap();

    assert_eq!(info.participants, vec![addr("alice"), addr("bob"), addr("carol")]);
    assert_eq!(info.approval_threshold, 2);
    assert_eq!(info.cancellation_threshold, 2);
    assert_eq!(info.proposal_count, 0);
    assert!(engine.is_participant(&vault, &addr("bob")).unwrap());
    assert!(!engine.is_participant(&vault, &addr("mallory")).unwrap());
}

#[test]
fn unknown_vault_is_not_found() {
    let (engine, _) = three_member_vault();
    let result = engine.create_proposal(&addr("alice"), &VaultId::new(), ProposalPayload::new());
    assert!(matches!(result, Err(CustodyError::NotFound(Record::Vault))));
}

#[test]
fn proposal_ids_are_sequential() {
    let (engine, vault) = three_member_vault();
    let first = engine
        .create_proposal(&addr("alice"), &vault, ProposalPayload::new())
        .unwrap();
    let second = engine
        .create_proposal(&addr("bob"), &vault, ProposalPayload::new())
        .unwrap();
    assert_eq!((first, second), (0, 1));
    assert_eq!(engine.proposal_count(&vault).unwrap(), 2);
    assert_eq!(engine.proposal(&vault, 1).unwrap().creator(), &addr("bob"));
}

#[test]
fn proposal_keeps_opaque_messages() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().message(b"quarterly rebalance".to_vec());
    let id = engine.create_proposal(&addr("alice"), &vault, payload).unwrap();

    let proposal = engine.proposal(&vault, id).unwrap();
    assert_eq!(proposal.opaque_messages(), &[b"quarterly rebalance".to_vec()]);
    assert_eq!(proposal.state(), ProposalState::Draft);
}

// ---------------------------------------------------------------------------
// Posting
// ---------------------------------------------------------------------------

#[test]
fn post_twice_fails_already_posted() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());

    let result = engine.post_proposal(&addr("alice"), &vault, id);
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::AlreadyPosted))
    ));
    assert_eq!(engine.proposal(&vault, id).unwrap().state(), ProposalState::Posted);
}

#[test]
fn vote_before_posting_fails_not_posted() {
    let (engine, vault) = three_member_vault();
    let id = engine
        .create_proposal(&addr("alice"), &vault, ProposalPayload::new())
        .unwrap();

    let result = engine.cast_vote(&addr("bob"), &vault, id, true);
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::NotPosted))
    ));
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

#[test]
fn non_member_cannot_vote() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());

    let result = engine.cast_vote(&addr("mallory"), &vault, id, true);
    assert!(matches!(
        result,
        Err(CustodyError::Unauthorized(Denied::NotParticipant))
    ));
}

#[test]
fn repeated_vote_fails_vote_unchanged() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());

    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();
    let result = engine.cast_vote(&addr("bob"), &vault, id, true);
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::VoteUnchanged))
    ));
    assert_eq!(engine.proposal(&vault, id).unwrap().approval_votes(), 1);
}

#[test]
fn flipped_vote_moves_between_tallies() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());

    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, false).unwrap();
    assert_tally_invariant(&engine, &vault, id);

    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();
    let proposal = engine.proposal(&vault, id).unwrap();
    assert_eq!(proposal.approval_votes(), 2);
    assert_eq!(proposal.cancellation_votes(), 0);
    assert_eq!(proposal.votes().len(), 2);
    assert_tally_invariant(&engine, &vault, id);
}

#[test]
fn tally_invariant_holds_through_mixed_voting() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());

    let script = [
        ("alice", true),
        ("bob", false),
        ("bob", true),
        ("carol", false),
        ("carol", true),
        ("alice", false),
    ];
    for (voter, approve) in script {
        engine.cast_vote(&addr(voter), &vault, id, approve).unwrap();
        assert_tally_invariant(&engine, &vault, id);
    }
    let proposal = engine.proposal(&vault, id).unwrap();
    assert_eq!(proposal.approval_votes(), 2);
    assert_eq!(proposal.cancellation_votes(), 1);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancellation_blocks_votes_and_execution_permanently() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);

    engine.cast_vote(&addr("bob"), &vault, id, false).unwrap();
    engine.cast_vote(&addr("carol"), &vault, id, false).unwrap();

    // Any further vote, including a would-be approval, is refused.
    let result = engine.cast_vote(&addr("alice"), &vault, id, true);
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled))
    ));
    let result = engine.cast_vote(&addr("bob"), &vault, id, true);
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled))
    ));

    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled))
    ));
    assert!(!engine.is_participant(&vault, &addr("dave")).unwrap());
}

#[test]
fn cancellation_overrides_earlier_approval() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);

    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();
    // Bob changes his mind; carol joins him.
    engine.cast_vote(&addr("bob"), &vault, id, false).unwrap();
    engine.cast_vote(&addr("carol"), &vault, id, false).unwrap();

    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled))
    ));
}

// ---------------------------------------------------------------------------
// Membership Changes
// ---------------------------------------------------------------------------

#[test]
fn execution_requires_approval() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();

    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::InsufficientApprovals {
            approvals: 1,
            threshold: 2
        })
    ));
}

#[test]
fn creator_executes_additions_and_removals() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new()
        .add_participant(addr("dave"))
        .remove_participant(addr("carol"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    engine
        .execute_participant_changes(&vault, id, Authority::Creator(addr("alice")))
        .unwrap();

    assert_eq!(
        engine.participants(&vault).unwrap(),
        vec![addr("alice"), addr("bob"), addr("dave")]
    );
}

#[test]
fn token_holder_executes() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().remove_participant(addr("carol"));
    let id = engine.create_proposal(&addr("alice"), &vault, payload).unwrap();
    let token = engine.post_proposal(&addr("alice"), &vault, id).unwrap();
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    engine
        .execute_participant_changes(&vault, id, Authority::Token(token))
        .unwrap();
    assert!(!engine.is_participant(&vault, &addr("carol")).unwrap());
}

#[test]
fn non_creator_address_cannot_execute() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("bob")));
    assert!(matches!(
        result,
        Err(CustodyError::Unauthorized(Denied::NotCreator))
    ));
}

#[test]
fn token_for_another_proposal_rejected() {
    let (engine, vault) = three_member_vault();
    let other = engine
        .create_proposal(&addr("alice"), &vault, ProposalPayload::new())
        .unwrap();
    let wrong_token = engine.post_proposal(&addr("alice"), &vault, other).unwrap();

    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    let result = engine.execute_participant_changes(&vault, id, Authority::Token(wrong_token));
    assert!(matches!(result, Err(CustodyError::AuthTokenVaultMismatch)));
}

#[test]
fn remove_then_add_keeps_member() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new()
        .remove_participant(addr("bob"))
        .add_participant(addr("bob"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("carol"), &vault, id, true).unwrap();

    engine
        .execute_participant_changes(&vault, id, Authority::Creator(addr("alice")))
        .unwrap();

    assert!(engine.is_participant(&vault, &addr("bob")).unwrap());
    // Re-insertion moves bob to the end.
    assert_eq!(
        engine.participants(&vault).unwrap(),
        vec![addr("alice"), addr("carol"), addr("bob")]
    );
}

#[test]
fn empty_payload_fails_no_pending_changes() {
    let (engine, vault) = three_member_vault();
    let id = posted_proposal(&engine, &vault, ProposalPayload::new());
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::NoPendingChanges))
    ));
}

#[test]
fn second_execution_fails_no_pending_changes() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new().add_participant(addr("dave"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    engine
        .execute_participant_changes(&vault, id, Authority::Creator(addr("alice")))
        .unwrap();
    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::InvalidState(StateViolation::NoPendingChanges))
    ));
    assert_eq!(engine.participants(&vault).unwrap().len(), 4);
}

#[test]
fn removed_member_loses_vote_rights_but_keeps_cast_votes() {
    let (engine, vault) = three_member_vault();
    let removal = ProposalPayload::new().remove_participant(addr("carol"));
    let id = posted_proposal(&engine, &vault, removal);
    let other = posted_proposal(&engine, &vault, ProposalPayload::new());

    engine.cast_vote(&addr("carol"), &vault, other, true).unwrap();
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();
    engine
        .execute_participant_changes(&vault, id, Authority::Creator(addr("alice")))
        .unwrap();

    let result = engine.cast_vote(&addr("carol"), &vault, other, false);
    assert!(matches!(
        result,
        Err(CustodyError::Unauthorized(Denied::NotParticipant))
    ));
    assert_eq!(engine.proposal(&vault, other).unwrap().approval_votes(), 1);
}

#[test]
fn failed_execution_has_no_side_effects() {
    let (engine, vault) = three_member_vault();
    let payload = ProposalPayload::new()
        .add_participant(addr("dave"))
        .remove_participant(addr("nobody"));
    let id = posted_proposal(&engine, &vault, payload);
    engine.cast_vote(&addr("alice"), &vault, id, true).unwrap();
    engine.cast_vote(&addr("bob"), &vault, id, true).unwrap();

    let before = engine.snapshot().unwrap();
    let result = engine.execute_participant_changes(&vault, id, Authority::Creator(addr("alice")));
    assert!(matches!(
        result,
        Err(CustodyError::NotFound(Record::Participant))
    ));
    assert_eq!(engine.snapshot().unwrap(), before);
}
