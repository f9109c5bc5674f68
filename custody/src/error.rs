//! Error types for the custody engine.
//!
//! Every public operation returns [`Result`]. A returned error always means
//! the call was rejected before its first write: no vote, ledger entry or
//! pending request is touched by a failed call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, AssetId};

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CustodyError>;

/// The kinds of record the engine stores. Used to name what a lookup failed
/// to find or what an insert collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// No vault with the given id.
    Vault,
    /// The vault has no proposal at the given index.
    Proposal,
    /// The asset type or object kind was never enabled.
    AssetRegistration,
    /// No pending withdrawal request of the requested kind (never made,
    /// or already redeemed).
    PendingRequest,
    /// A membership removal names an address that is not a participant.
    Participant,
    /// The object ledger has no slot with the given id.
    Slot,
    /// A vault has no ledger entry for the asset (its balance is zero).
    Balance,
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Vault => write!(f, "vault"),
            Record::Proposal => write!(f, "proposal"),
            Record::AssetRegistration => write!(f, "asset registration"),
            Record::PendingRequest => write!(f, "pending withdrawal request"),
            Record::Participant => write!(f, "participant"),
            Record::Slot => write!(f, "object slot"),
            Record::Balance => write!(f, "ledger balance"),
        }
    }
}

/// Why a caller was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// The caller is not a current participant of the vault.
    NotParticipant,
    /// The caller did not create the proposal.
    NotCreator,
    /// Bootstrap calls are reserved to the root identity.
    NotRoot,
}

impl std::fmt::Display for Denied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denied::NotParticipant => write!(f, "caller is not a participant"),
            Denied::NotCreator => write!(f, "caller is not the proposal creator"),
            Denied::NotRoot => write!(f, "caller is not the root identity"),
        }
    }
}

/// Proposal state preconditions that did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    /// The proposal was already posted.
    AlreadyPosted,
    /// The proposal is still a draft.
    NotPosted,
    /// Cancellation votes reached the cancellation threshold.
    AlreadyCancelled,
    /// The caller re-cast the vote they already hold.
    VoteUnchanged,
    /// The proposal carries no membership changes to execute.
    NoPendingChanges,
}

impl std::fmt::Display for StateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateViolation::AlreadyPosted => write!(f, "proposal already posted"),
            StateViolation::NotPosted => write!(f, "proposal not posted"),
            StateViolation::AlreadyCancelled => write!(f, "proposal cancelled"),
            StateViolation::VoteUnchanged => write!(f, "vote unchanged"),
            StateViolation::NoPendingChanges => write!(f, "no pending membership changes"),
        }
    }
}

/// Errors that can occur during custody operations.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// The engine has not been bootstrapped with a root identity.
    #[error("custody engine not initialized")]
    NotInitialized,

    /// A one-time registration was attempted twice.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A required record does not exist.
    #[error("not found: {0}")]
    NotFound(Record),

    /// The caller lacks the authority for this call.
    #[error("unauthorized: {0}")]
    Unauthorized(Denied),

    /// The proposal is not in a state that allows this call.
    #[error("invalid state: {0}")]
    InvalidState(StateViolation),

    /// The vault's ledger cannot cover the requested amount.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the request asks for.
        requested: u64,
        /// Amount held by the vault.
        available: u64,
    },

    /// The proposal has not collected enough approval votes.
    #[error("insufficient approvals: {approvals} of {threshold}")]
    InsufficientApprovals {
        /// Approval votes recorded so far.
        approvals: u64,
        /// Approval threshold of the vault.
        threshold: u64,
    },

    /// The custodied object does not hold the requested quantity.
    #[error("insufficient tokens: requested {requested}, available {available}")]
    InsufficientTokens {
        /// Quantity the request asks for.
        requested: u64,
        /// Quantity the intermediary would hold.
        available: u64,
    },

    /// The token was minted for a different vault or proposal.
    #[error("auth token does not match the target vault and proposal")]
    AuthTokenVaultMismatch,

    /// Two coins of different assets were combined.
    #[error("asset mismatch: expected {expected}, found {found}")]
    AssetMismatch {
        /// Asset of the receiving coin.
        expected: AssetId,
        /// Asset of the coin being merged in.
        found: AssetId,
    },

    /// The address is already registered as a participant.
    #[error("duplicate participant: {0}")]
    DuplicateParticipant(Address),

    /// A key-value table already holds the key.
    #[error("duplicate {0} entry")]
    DuplicateKey(Record),

    /// A balance or counter would exceed `u64::MAX`.
    #[error("arithmetic overflow")]
    Overflow,

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl CustodyError {
    /// Shorthand for [`CustodyError::NotFound`].
    pub(crate) fn missing(what: Record) -> Self {
        CustodyError::NotFound(what)
    }
}
