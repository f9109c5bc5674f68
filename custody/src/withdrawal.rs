//! # Withdrawal Requests and Auth Tokens
//!
//! A withdrawal request is an intent attached to a draft proposal by its
//! creator. There are four kinds, each stored in its own table keyed by
//! `(vault, proposal, type tag)`:
//!
//! | kind              | redeemed by                        | pays out to           |
//! |-------------------|------------------------------------|-----------------------|
//! | `DirectTransfer`  | anyone, once the proposal passes   | the fixed recipient   |
//! | `AuthedAmount`    | the holder of the [`AuthToken`]    | the caller            |
//! | `AuthedObjectIds` | the holder of the [`AuthToken`]    | the caller            |
//! | `ObjectTransfer`  | anyone, once the proposal passes   | the fixed recipient   |
//!
//! Re-requesting a kind for the same key replaces the old request. Redeeming
//! deletes the entry in the same step that reads it, which is what makes a
//! request redeemable exactly once: a retried call finds nothing and fails
//! with `NotFound(PendingRequest)`.

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Record, Result};
use crate::storage::Table;
use crate::types::{Address, AssetId, ObjectKind, ProposalId, VaultId};

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

/// Bearer capability minted when a proposal is posted.
///
/// Possession is authority: redemption checks no signer. The fields are
/// private and the type cannot be deserialized, so the only way to obtain a
/// token is from [`CustodyEngine::post_proposal`](crate::CustodyEngine::post_proposal).
/// Copies are allowed; every copy redeems the same pending requests, which
/// can each be redeemed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AuthToken {
    vault_id: VaultId,
    proposal_id: ProposalId,
}

impl AuthToken {
    pub(crate) fn mint(vault_id: VaultId, proposal_id: ProposalId) -> Self {
        Self {
            vault_id,
            proposal_id,
        }
    }

    /// Vault the token was minted for.
    pub fn vault_id(&self) -> VaultId {
        self.vault_id
    }

    /// Proposal the token was minted for.
    pub fn proposal_id(&self) -> ProposalId {
        self.proposal_id
    }

    /// Fails with [`CustodyError::AuthTokenVaultMismatch`] unless the token
    /// belongs to `(vault_id, proposal_id)`.
    pub fn ensure_matches(&self, vault_id: &VaultId, proposal_id: ProposalId) -> Result<()> {
        if self.vault_id != *vault_id || self.proposal_id != proposal_id {
            return Err(CustodyError::AuthTokenVaultMismatch);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Pay `amount` of an asset to a fixed recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectTransferRequest {
    /// Paid by the transfer primitive on redemption.
    pub recipient: Address,
    pub amount: u64,
}

/// Hand `amount` of an asset to whoever redeems the auth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthedAmountRequest {
    pub amount: u64,
}

/// Hand the objects in `ids` to whoever redeems the auth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthedObjectsRequest {
    /// Slot ids, redeemed in this order.
    pub ids: Vec<u64>,
}

/// Deliver `quantity` units of the object in `slot_id` to `recipient`,
/// returning the change to the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTransferRequest {
    pub slot_id: u64,
    pub recipient: Address,
    pub quantity: u64,
}

/// A pending request of any kind, as returned by the engine's views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingWithdrawalRequest {
    DirectTransfer(DirectTransferRequest),
    AuthedAmount(AuthedAmountRequest),
    AuthedObjectIds(AuthedObjectsRequest),
    ObjectTransfer(ObjectTransferRequest),
}

/// Selects one request table and its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    DirectTransfer(AssetId),
    AuthedAmount(AssetId),
    AuthedObjectIds(ObjectKind),
    ObjectTransfer(ObjectKind),
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::DirectTransfer(asset) => write!(f, "direct transfer of {asset}"),
            RequestKind::AuthedAmount(asset) => write!(f, "authorized pull of {asset}"),
            RequestKind::AuthedObjectIds(kind) => write!(f, "authorized pull of {kind} objects"),
            RequestKind::ObjectTransfer(kind) => write!(f, "object transfer of {kind}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type AssetKey = (VaultId, ProposalId, AssetId);
type ObjectKey = (VaultId, ProposalId, ObjectKind);

/// Stores a request, removing any previous one under the same key first.
/// Returns `true` if a request was replaced.
fn replace<K: Ord + Clone, V>(table: &mut Table<K, V>, key: K, value: V) -> Result<bool> {
    let replaced = table.contains(&key);
    if replaced {
        table.remove(&key)?;
    }
    table.add(key, value)?;
    Ok(replaced)
}

/// Every pending withdrawal request of every vault.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawalRequestRegistry {
    direct: Table<AssetKey, DirectTransferRequest>,
    authed_amount: Table<AssetKey, AuthedAmountRequest>,
    authed_objects: Table<ObjectKey, AuthedObjectsRequest>,
    object_transfers: Table<ObjectKey, ObjectTransferRequest>,
}

impl Default for WithdrawalRequestRegistry {
    fn default() -> Self {
        Self {
            direct: Table::new(Record::PendingRequest),
            authed_amount: Table::new(Record::PendingRequest),
            authed_objects: Table::new(Record::PendingRequest),
            object_transfers: Table::new(Record::PendingRequest),
        }
    }
}

impl WithdrawalRequestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // -- store (replace) ----------------------------------------------------

    /// Stores a direct transfer. Returns `true` if it replaced an earlier one.
    pub fn put_direct(
        &mut self,
        vault: VaultId,
        proposal: ProposalId,
        asset: AssetId,
        request: DirectTransferRequest,
    ) -> Result<bool> {
        replace(&mut self.direct, (vault, proposal, asset), request)
    }

    /// Stores a token pull of an amount. Returns `true` on replacement.
    pub fn put_authed_amount(
        &mut self,
        vault: VaultId,
        proposal: ProposalId,
        asset: AssetId,
        request: AuthedAmountRequest,
    ) -> Result<bool> {
        replace(&mut self.authed_amount, (vault, proposal, asset), request)
    }

    /// Stores a token pull of slot ids. Returns `true` on replacement.
    pub fn put_authed_objects(
        &mut self,
        vault: VaultId,
        proposal: ProposalId,
        kind: ObjectKind,
        request: AuthedObjectsRequest,
    ) -> Result<bool> {
        replace(&mut self.authed_objects, (vault, proposal, kind), request)
    }

    /// Stores an object transfer. Returns `true` on replacement.
    pub fn put_object_transfer(
        &mut self,
        vault: VaultId,
        proposal: ProposalId,
        kind: ObjectKind,
        request: ObjectTransferRequest,
    ) -> Result<bool> {
        replace(&mut self.object_transfers, (vault, proposal, kind), request)
    }

    // -- inspect ------------------------------------------------------------

    /// The pending direct transfer, or `NotFound(PendingRequest)`.
    pub fn direct(&self, vault: VaultId, proposal: ProposalId, asset: &AssetId) -> Result<&DirectTransferRequest> {
        self.direct.borrow(&(vault, proposal, asset.clone()))
    }

    /// The pending amount pull, or `NotFound(PendingRequest)`.
    pub fn authed_amount(&self, vault: VaultId, proposal: ProposalId, asset: &AssetId) -> Result<&AuthedAmountRequest> {
        self.authed_amount.borrow(&(vault, proposal, asset.clone()))
    }

    /// The pending object pull, or `NotFound(PendingRequest)`.
    pub fn authed_objects(&self, vault: VaultId, proposal: ProposalId, kind: &ObjectKind) -> Result<&AuthedObjectsRequest> {
        self.authed_objects.borrow(&(vault, proposal, kind.clone()))
    }

    /// The pending object transfer, or `NotFound(PendingRequest)`.
    pub fn object_transfer(&self, vault: VaultId, proposal: ProposalId, kind: &ObjectKind) -> Result<&ObjectTransferRequest> {
        self.object_transfers.borrow(&(vault, proposal, kind.clone()))
    }

    /// Looks up a request of any kind without consuming it.
    pub fn pending(&self, vault: VaultId, proposal: ProposalId, kind: &RequestKind) -> Option<PendingWithdrawalRequest> {
        match kind {
            RequestKind::DirectTransfer(asset) => self
                .direct(vault, proposal, asset)
                .ok()
                .cloned()
                .map(PendingWithdrawalRequest::DirectTransfer),
            RequestKind::AuthedAmount(asset) => self
                .authed_amount(vault, proposal, asset)
                .ok()
                .cloned()
                .map(PendingWithdrawalRequest::AuthedAmount),
            RequestKind::AuthedObjectIds(object_kind) => self
                .authed_objects(vault, proposal, object_kind)
                .ok()
                .cloned()
                .map(PendingWithdrawalRequest::AuthedObjectIds),
            RequestKind::ObjectTransfer(object_kind) => self
                .object_transfer(vault, proposal, object_kind)
                .ok()
                .cloned()
                .map(PendingWithdrawalRequest::ObjectTransfer),
        }
    }

    // -- consume (delete-on-read) -------------------------------------------

    /// Removes and returns the direct transfer.
    pub fn take_direct(&mut self, vault: VaultId, proposal: ProposalId, asset: &AssetId) -> Result<DirectTransferRequest> {
        self.direct.remove(&(vault, proposal, asset.clone()))
    }

    /// Removes and returns the amount pull.
    pub fn take_authed_amount(&mut self, vault: VaultId, proposal: ProposalId, asset: &AssetId) -> Result<AuthedAmountRequest> {
        self.authed_amount.remove(&(vault, proposal, asset.clone()))
    }

    /// Removes and returns the object pull.
    pub fn take_authed_objects(&mut self, vault: VaultId, proposal: ProposalId, kind: &ObjectKind) -> Result<AuthedObjectsRequest> {
        self.authed_objects.remove(&(vault, proposal, kind.clone()))
    }

    /// Removes and returns the object transfer.
    pub fn take_object_transfer(&mut self, vault: VaultId, proposal: ProposalId, kind: &ObjectKind) -> Result<ObjectTransferRequest> {
        self.object_transfers.remove(&(vault, proposal, kind.clone()))
    }

    /// Total number of pending requests across all kinds.
    pub fn len(&self) -> usize {
        self.direct.len() + self.authed_amount.len() + self.authed_objects.len() + self.object_transfers.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
