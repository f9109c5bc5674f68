//! Vault creation, proposals, voting and membership changes.

use tracing::{debug, info, warn};

use super::vault::Vault;
use super::CustodyEngine;
use crate::error::{CustodyError, Result, StateViolation};
use crate::participants::ParticipantRegistry;
use crate::proposal::{Proposal, ProposalPayload, Thresholds};
use crate::transfer::TransferPrimitive;
use crate::types::{Address, ProposalId, VaultId};
use crate::withdrawal::AuthToken;

/// Who is executing a proposal's membership changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The proposal's creator, identified by address.
    Creator(Address),
    /// Any holder of the proposal's auth token.
    Token(AuthToken),
}

/// Fails unless the proposal may execute, logging cancellation blocks.
pub(super) fn ensure_executable(
    vault_id: &VaultId,
    proposal_id: ProposalId,
    thresholds: &Thresholds,
    proposal: &Proposal,
) -> Result<()> {
    proposal.ensure_executable(thresholds).map_err(|err| {
        if matches!(err, CustodyError::InvalidState(StateViolation::AlreadyCancelled)) {
            warn!(
                vault = %vault_id,
                proposal = proposal_id,
                cancellations = proposal.cancellation_votes(),
                "execution blocked: proposal cancelled"
            );
        }
        err
    })
}

impl<P: TransferPrimitive> CustodyEngine<P> {
    /// Creates a vault and returns its id.
    ///
    /// Thresholds are absolute vote counts. A threshold above the member
    /// count is accepted; it only makes the outcome unreachable.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `DuplicateParticipant` if an address repeats.
    pub fn create_vault(
        &self,
        participants: &[Address],
        approval_threshold: u64,
        cancellation_threshold: u64,
    ) -> Result<VaultId> {
        let mut state = self.state.write();
        state.registry.require_initialized()?;

        let members = ParticipantRegistry::from_addresses(participants)?;
        let vault_id = VaultId::new();
        let thresholds = Thresholds {
            approval: approval_threshold,
            cancellation: cancellation_threshold,
        };
        state
            .vaults
            .add(vault_id, Vault::new(vault_id, members, thresholds))?;

        info!(
            vault = %vault_id,
            participants = participants.len(),
            approval_threshold,
            cancellation_threshold,
            "vault created"
        );
        Ok(vault_id)
    }

    /// Opens a draft proposal and returns its id.
    ///
    /// # Errors
    ///
    /// `NotFound(Vault)` or `Unauthorized(NotParticipant)`.
    pub fn create_proposal(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        payload: ProposalPayload,
    ) -> Result<ProposalId> {
        let mut state = self.state.write();
        let vault = state.vaults.borrow_mut(vault_id)?;
        vault.ensure_participant(caller)?;

        let adds = payload.add.len();
        let removes = payload.remove.len();
        let proposal_id = vault.push_proposal(Proposal::new(*caller, payload))?;

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            creator = %caller,
            adds,
            removes,
            "proposal created"
        );
        Ok(proposal_id)
    }

    /// Freezes the proposal, opens it for votes and mints its auth token.
    ///
    /// # Errors
    ///
    /// `NotFound(Vault | Proposal)`, `Unauthorized(NotCreator)`, or
    /// `InvalidState(AlreadyPosted)`.
    pub fn post_proposal(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
    ) -> Result<AuthToken> {
        let mut state = self.state.write();
        let vault = state.vaults.borrow_mut(vault_id)?;
        let proposal = vault.proposal_mut(proposal_id)?;
        proposal.ensure_creator(caller)?;
        proposal.post()?;

        info!(vault = %vault_id, proposal = proposal_id, "proposal posted");
        Ok(AuthToken::mint(*vault_id, proposal_id))
    }

    /// Records the caller's vote: `true` approves, `false` cancels.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal)`
    /// - `Unauthorized(NotParticipant)`
    /// - `InvalidState(NotPosted | AlreadyCancelled | VoteUnchanged)`
    pub fn cast_vote(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        approve: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let vault = state.vaults.borrow_mut(vault_id)?;
        vault.ensure_participant(caller)?;
        let thresholds = vault.thresholds;
        let proposal = vault.proposal_mut(proposal_id)?;
        proposal.cast_vote(*caller, approve, &thresholds)?;

        debug!(
            vault = %vault_id,
            proposal = proposal_id,
            voter = %caller,
            approve,
            approvals = proposal.approval_votes(),
            cancellations = proposal.cancellation_votes(),
            "vote recorded"
        );
        if proposal.is_cancelled(&thresholds) {
            info!(vault = %vault_id, proposal = proposal_id, "proposal cancelled");
        }
        Ok(())
    }

    /// Applies the proposal's membership changes: removals first, then
    /// additions, so an address in both sets ends up a member.
    ///
    /// Succeeds once. The pending sets are consumed, so a second call fails
    /// with `InvalidState(NoPendingChanges)`. Votes already cast by removed
    /// members stay in the tally.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal)`
    /// - `Unauthorized(NotCreator)` or `AuthTokenVaultMismatch`
    /// - `InvalidState(NotPosted | AlreadyCancelled | NoPendingChanges)`
    /// - `InsufficientApprovals`
    /// - `NotFound(Participant)` if a removal names a non-member
    /// - `DuplicateParticipant` if an addition is already a member
    pub fn execute_participant_changes(
        &self,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        authority: Authority,
    ) -> Result<()> {
        let mut state = self.state.write();
        let vault = state.vaults.borrow_mut(vault_id)?;

        let members = {
            let proposal = vault.proposal(proposal_id)?;
            match authority {
                Authority::Creator(caller) => proposal.ensure_creator(&caller)?,
                Authority::Token(token) => token.ensure_matches(vault_id, proposal_id)?,
            }
            ensure_executable(vault_id, proposal_id, &vault.thresholds, proposal)?;
            if !proposal.has_pending_changes() {
                return Err(CustodyError::InvalidState(StateViolation::NoPendingChanges));
            }

            let mut members = vault.participants.clone();
            for address in proposal.pending_remove() {
                members.remove(address)?;
            }
            for address in proposal.pending_add() {
                members.add(*address)?;
            }
            members
        };

        vault.participants = members;
        let (removed, added) = vault.proposal_mut(proposal_id)?.take_pending_changes();

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            removed = removed.len(),
            added = added.len(),
            participants = vault.participants.len(),
            "membership changes executed"
        );
        Ok(())
    }
}
