//! Withdrawal requests and the four redemption paths.
//!
//! Requesting requires the proposal's creator and a draft proposal.
//! Redeeming runs the fixed check sequence
//!
//! ```text
//! vault -> proposal -> registration -> posted -> not cancelled -> approved
//!       -> pending request -> ledger sufficiency
//! ```
//!
//! and only then writes: the request is deleted in the same step that pays
//! it out. If the transfer primitive refuses the payout, the ledger and the
//! request are put back before the error is returned.

use tracing::{debug, error, info, warn};

use super::governance::ensure_executable;
use super::CustodyEngine;
use crate::error::{CustodyError, Record, Result};
use crate::proposal::Proposal;
use crate::transfer::TransferPrimitive;
use crate::types::{Address, AssetId, Coin, CustodyObject, ObjectKind, ProposalId, VaultId};
use crate::withdrawal::{
    AuthToken, AuthedAmountRequest, AuthedObjectsRequest, DirectTransferRequest,
    ObjectTransferRequest, RequestKind,
};

/// Outcome of [`CustodyEngine::transfer_object_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTransferReceipt {
    pub recipient: Address,
    /// Domain key of the transferred object.
    pub key: String,
    /// Units delivered to the recipient.
    pub delivered: u64,
    /// Units returned to the vault.
    pub change: u64,
    /// Slot holding the change, if any was returned.
    pub change_slot: Option<u64>,
}

/// Creator and draft checks shared by every request call.
fn ensure_request_allowed(proposal: &Proposal, caller: &Address) -> Result<()> {
    proposal.ensure_creator(caller)?;
    proposal.ensure_draft()
}

/// Logs a redemption that found no pending request. Usually a replay.
fn note_missing_request(
    err: CustodyError,
    vault_id: &VaultId,
    proposal_id: ProposalId,
    kind: RequestKind,
) -> CustodyError {
    if matches!(err, CustodyError::NotFound(Record::PendingRequest)) {
        warn!(
            vault = %vault_id,
            proposal = proposal_id,
            request = %kind,
            "no pending request (never made or already redeemed)"
        );
    }
    err
}

impl<P: TransferPrimitive> CustodyEngine<P> {
    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Attaches (or replaces) a transfer of `amount` to `recipient`.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal | AssetRegistration)`
    /// - `Unauthorized(NotCreator)`
    /// - `InvalidState(AlreadyPosted)`
    pub fn request_direct_transfer(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        asset: &AssetId,
        recipient: Address,
        amount: u64,
    ) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let proposal = state.vaults.borrow(vault_id)?.proposal(proposal_id)?;
        state.registry.ledger(asset)?;
        ensure_request_allowed(proposal, caller)?;

        let replaced = state.requests.put_direct(
            *vault_id,
            proposal_id,
            asset.clone(),
            DirectTransferRequest { recipient, amount },
        )?;
        debug!(
            vault = %vault_id,
            proposal = proposal_id,
            asset = %asset,
            recipient = %recipient,
            amount,
            replaced,
            "direct transfer requested"
        );
        Ok(())
    }

    /// Attaches (or replaces) a token-redeemable pull of `amount`. Same
    /// errors as [`request_direct_transfer`](Self::request_direct_transfer).
    pub fn request_authed_amount(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        asset: &AssetId,
        amount: u64,
    ) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let proposal = state.vaults.borrow(vault_id)?.proposal(proposal_id)?;
        state.registry.ledger(asset)?;
        ensure_request_allowed(proposal, caller)?;

        let replaced = state.requests.put_authed_amount(
            *vault_id,
            proposal_id,
            asset.clone(),
            AuthedAmountRequest { amount },
        )?;
        debug!(
            vault = %vault_id,
            proposal = proposal_id,
            asset = %asset,
            amount,
            replaced,
            "authorized pull requested"
        );
        Ok(())
    }

    /// Attaches (or replaces) a token-redeemable pull of the objects in
    /// `ids`. Slot ids are checked at redemption, not here.
    pub fn request_authed_objects(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        kind: &ObjectKind,
        ids: Vec<u64>,
    ) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let proposal = state.vaults.borrow(vault_id)?.proposal(proposal_id)?;
        state.registry.object_ledger(kind)?;
        ensure_request_allowed(proposal, caller)?;

        let count = ids.len();
        let replaced = state.requests.put_authed_objects(
            *vault_id,
            proposal_id,
            kind.clone(),
            AuthedObjectsRequest { ids },
        )?;
        debug!(
            vault = %vault_id,
            proposal = proposal_id,
            kind = %kind,
            count,
            replaced,
            "authorized object pull requested"
        );
        Ok(())
    }

    /// Attaches (or replaces) a transfer of `quantity` units of the object in
    /// `slot_id` to `recipient`.
    #[allow(clippy::too_many_arguments)]
    pub fn request_object_transfer(
        &self,
        caller: &Address,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        kind: &ObjectKind,
        slot_id: u64,
        recipient: Address,
        quantity: u64,
    ) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let proposal = state.vaults.borrow(vault_id)?.proposal(proposal_id)?;
        state.registry.object_ledger(kind)?;
        ensure_request_allowed(proposal, caller)?;

        let replaced = state.requests.put_object_transfer(
            *vault_id,
            proposal_id,
            kind.clone(),
            ObjectTransferRequest {
                slot_id,
                recipient,
                quantity,
            },
        )?;
        debug!(
            vault = %vault_id,
            proposal = proposal_id,
            kind = %kind,
            slot_id,
            quantity,
            replaced,
            "object transfer requested"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Redemption
    // -----------------------------------------------------------------------

    /// Pays the proposal's direct transfer of `asset` to its recipient.
    ///
    /// No caller check: once the proposal passes, anyone may trigger it.
    /// A partial amount splits the balance and leaves the rest in the vault;
    /// an exact amount drains the entry.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal | AssetRegistration | PendingRequest)`
    /// - `InvalidState(NotPosted | AlreadyCancelled)`
    /// - `InsufficientApprovals`
    /// - `InsufficientFunds`
    /// - any error from the transfer primitive (state is restored)
    pub fn withdraw_to(&self, vault_id: &VaultId, proposal_id: ProposalId, asset: &AssetId) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let request = {
            let vault = state.vaults.borrow(vault_id)?;
            let proposal = vault.proposal(proposal_id)?;
            let ledger = state.registry.ledger(asset)?;
            ensure_executable(vault_id, proposal_id, &vault.thresholds, proposal)?;
            let request = state
                .requests
                .direct(*vault_id, proposal_id, asset)
                .map_err(|e| {
                    note_missing_request(e, vault_id, proposal_id, RequestKind::DirectTransfer(asset.clone()))
                })?
                .clone();
            ledger.check_withdrawal(vault_id, request.amount)?;
            request
        };

        state.requests.take_direct(*vault_id, proposal_id, asset)?;
        let ledger = state.registry.ledger_mut(asset)?;
        let coin = ledger.withdraw(vault_id, request.amount)?;

        if let Err(err) = self.transfers.deposit(&request.recipient, coin.clone()) {
            ledger.deposit(*vault_id, coin)?;
            state
                .requests
                .put_direct(*vault_id, proposal_id, asset.clone(), request)?;
            return Err(err);
        }

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            asset = %asset,
            recipient = %request.recipient,
            amount = request.amount,
            remaining = ledger.balance(vault_id),
            "direct transfer executed"
        );
        Ok(())
    }

    /// Redeems the token's pull of `asset` and hands the value to the caller.
    ///
    /// The token is the capability; no signer is checked. Each request pays
    /// out once: redeeming again, with this or any copy of the token, fails
    /// with `NotFound(PendingRequest)`.
    ///
    /// # Errors
    ///
    /// Same as [`withdraw_to`](Self::withdraw_to), minus transfer errors.
    pub fn withdraw(&self, token: AuthToken, asset: &AssetId) -> Result<Coin> {
        let vault_id = token.vault_id();
        let proposal_id = token.proposal_id();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let amount = {
            let vault = state.vaults.borrow(&vault_id)?;
            let proposal = vault.proposal(proposal_id)?;
            let ledger = state.registry.ledger(asset)?;
            ensure_executable(&vault_id, proposal_id, &vault.thresholds, proposal)?;
            let amount = state
                .requests
                .authed_amount(vault_id, proposal_id, asset)
                .map_err(|e| {
                    note_missing_request(e, &vault_id, proposal_id, RequestKind::AuthedAmount(asset.clone()))
                })?
                .amount;
            ledger.check_withdrawal(&vault_id, amount)?;
            amount
        };

        state.requests.take_authed_amount(vault_id, proposal_id, asset)?;
        let ledger = state.registry.ledger_mut(asset)?;
        let coin = ledger.withdraw(&vault_id, amount)?;

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            asset = %asset,
            amount,
            remaining = ledger.balance(&vault_id),
            "authorized pull redeemed"
        );
        Ok(coin)
    }

    /// Redeems the token's pull of `kind` objects and hands them to the
    /// caller in request order.
    ///
    /// All or nothing: if any requested slot is missing (or listed twice),
    /// nothing is removed and the request stays pending.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal | AssetRegistration | PendingRequest | Slot)`
    /// - `InvalidState(NotPosted | AlreadyCancelled)`
    /// - `InsufficientApprovals`
    pub fn withdraw_objects(&self, token: AuthToken, kind: &ObjectKind) -> Result<Vec<CustodyObject>> {
        let vault_id = token.vault_id();
        let proposal_id = token.proposal_id();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let ids = {
            let vault = state.vaults.borrow(&vault_id)?;
            let proposal = vault.proposal(proposal_id)?;
            let ledger = state.registry.object_ledger(kind)?;
            ensure_executable(&vault_id, proposal_id, &vault.thresholds, proposal)?;
            let ids = state
                .requests
                .authed_objects(vault_id, proposal_id, kind)
                .map_err(|e| {
                    note_missing_request(e, &vault_id, proposal_id, RequestKind::AuthedObjectIds(kind.clone()))
                })?
                .ids
                .clone();
            ledger.check_slots(&vault_id, &ids)?;
            ids
        };

        state.requests.take_authed_objects(vault_id, proposal_id, kind)?;
        let objects = state
            .registry
            .object_ledger_mut(kind)?
            .withdraw(&vault_id, &ids)?;

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            kind = %kind,
            count = objects.len(),
            "authorized object pull redeemed"
        );
        Ok(objects)
    }

    /// Executes the proposal's object transfer of `kind`.
    ///
    /// The whole object leaves the vault and is deposited with
    /// `intermediary`, which must be able to forward it. The change
    /// (`object.quantity - quantity`) comes back into the vault under a new
    /// slot with the same key, and exactly `quantity` goes to the recipient.
    ///
    /// # Errors
    ///
    /// - `NotFound(Vault | Proposal | AssetRegistration | PendingRequest | Slot)`
    /// - `InvalidState(NotPosted | AlreadyCancelled)`
    /// - `InsufficientApprovals`
    /// - `InsufficientTokens` if the object holds fewer than `quantity` units
    /// - any error from the transfer primitive (state is restored)
    pub fn transfer_object_to(
        &self,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        kind: &ObjectKind,
        intermediary: &Address,
    ) -> Result<ObjectTransferReceipt> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let request = {
            let vault = state.vaults.borrow(vault_id)?;
            let proposal = vault.proposal(proposal_id)?;
            let ledger = state.registry.object_ledger(kind)?;
            ensure_executable(vault_id, proposal_id, &vault.thresholds, proposal)?;
            let request = state
                .requests
                .object_transfer(*vault_id, proposal_id, kind)
                .map_err(|e| {
                    note_missing_request(e, vault_id, proposal_id, RequestKind::ObjectTransfer(kind.clone()))
                })?
                .clone();

            let object = ledger
                .slot(vault_id, request.slot_id)
                .ok_or(CustodyError::missing(Record::Slot))?;
            if object.quantity < request.quantity {
                return Err(CustodyError::InsufficientTokens {
                    requested: request.quantity,
                    available: object.quantity,
                });
            }
            if object.quantity > request.quantity {
                ledger
                    .next_slot_id(vault_id)
                    .checked_add(1)
                    .ok_or(CustodyError::Overflow)?;
            }
            request
        };

        state.requests.take_object_transfer(*vault_id, proposal_id, kind)?;
        let ledger = state.registry.object_ledger_mut(kind)?;
        let object = ledger
            .withdraw(vault_id, &[request.slot_id])?
            .pop()
            .ok_or(CustodyError::missing(Record::Slot))?;

        let change = match self.route_through(intermediary, &object, &request) {
            Ok(change) => change,
            Err(err) => {
                ledger.reinstate(vault_id, request.slot_id, object)?;
                state
                    .requests
                    .put_object_transfer(*vault_id, proposal_id, kind.clone(), request)?;
                return Err(err);
            }
        };

        let returned = change.as_ref().map(|c| c.quantity).unwrap_or(0);
        let change_slot = match change {
            Some(change) => Some(ledger.deposit(*vault_id, change)?),
            None => None,
        };

        info!(
            vault = %vault_id,
            proposal = proposal_id,
            kind = %kind,
            key = %object.key,
            recipient = %request.recipient,
            delivered = request.quantity,
            change = returned,
            "object transfer executed"
        );
        Ok(ObjectTransferReceipt {
            recipient: request.recipient,
            key: object.key,
            delivered: request.quantity,
            change: returned,
            change_slot,
        })
    }

    /// Moves `object` through `intermediary`: delivers `request.quantity` to
    /// the recipient and returns the change as an object.
    ///
    /// On failure every unit still held by the intermediary is pulled back,
    /// so the caller can reinstate the original object.
    fn route_through(
        &self,
        intermediary: &Address,
        object: &CustodyObject,
        request: &ObjectTransferRequest,
    ) -> Result<Option<CustodyObject>> {
        self.transfers.deposit_object(intermediary, object.clone())?;

        let mut held = object.quantity;
        let outcome = self.forward(intermediary, object, request, &mut held);
        if outcome.is_err() && held > 0 {
            if let Err(unwind) =
                self.transfers
                    .withdraw_object(intermediary, &object.kind, &object.key, held)
            {
                error!(
                    intermediary = %intermediary,
                    key = %object.key,
                    held,
                    error = %unwind,
                    "failed to recover units from intermediary"
                );
            }
        }
        outcome
    }

    fn forward(
        &self,
        intermediary: &Address,
        object: &CustodyObject,
        request: &ObjectTransferRequest,
        held: &mut u64,
    ) -> Result<Option<CustodyObject>> {
        let (kind, key) = (&object.kind, object.key.as_str());

        let available = self.transfers.balance_of(intermediary, kind, key);
        if available < request.quantity {
            return Err(CustodyError::InsufficientTokens {
                requested: request.quantity,
                available,
            });
        }

        let change = object.quantity.saturating_sub(request.quantity);
        let change = if change > 0 {
            let piece = self
                .transfers
                .withdraw_object(intermediary, kind, key, change)?;
            *held -= change;
            Some(piece)
        } else {
            None
        };

        self.transfers
            .transfer(intermediary, kind, key, &request.recipient, request.quantity)?;
        *held = 0;
        Ok(change)
    }
}
