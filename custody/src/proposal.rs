//! # Proposals and Voting
//!
//! A proposal is one unit of governance work on a vault: an optional
//! membership change, optional opaque messages, and any number of withdrawal
//! requests (kept in the [`withdrawal`](crate::withdrawal) registry).
//!
//! ## Lifecycle
//!
//! ```text
//! Draft ──post──▶ Posted
//! ```
//!
//! Posting happens once and never reverts. While a proposal is a draft its
//! creator may attach or replace withdrawal requests; posting freezes them
//! and mints the proposal's auth token.
//!
//! ## Voting
//!
//! Each participant holds at most one vote per proposal. Re-voting with the
//! opposite value moves the vote from one tally to the other; re-voting with
//! the same value is rejected. The tallies always equal the number of `true`
//! and `false` entries in `votes`.
//!
//! Cancellation is not a state. A proposal whose cancellation tally reached
//! the vault's cancellation threshold is cancelled for good: it accepts no
//! further votes and nothing on it can be executed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Denied, Result, StateViolation};
use crate::types::Address;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Posting state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Created, still editable by its creator. Not open for votes.
    Draft,
    /// Frozen and open for votes.
    Posted,
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalState::Draft => write!(f, "Draft"),
            ProposalState::Posted => write!(f, "Posted"),
        }
    }
}

/// The vault's two absolute vote thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Approval votes needed to execute.
    pub approval: u64,
    /// Cancellation votes that permanently block a proposal.
    pub cancellation: u64,
}

/// What a proposal carries besides withdrawal requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPayload {
    /// Addresses to add as participants.
    pub add: BTreeSet<Address>,
    /// Addresses to remove from the participants.
    pub remove: BTreeSet<Address>,
    /// Free-form data the engine stores but never interprets.
    pub messages: Vec<Vec<u8>>,
}

impl ProposalPayload {
    /// An empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `address` to the pending additions.
    pub fn add_participant(mut self, address: Address) -> Self {
        self.add.insert(address);
        self
    }

    /// Adds `address` to the pending removals.
    pub fn remove_participant(mut self, address: Address) -> Self {
        self.remove.insert(address);
        self
    }

    /// Appends an opaque message.
    pub fn message(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.messages.push(bytes.into());
        self
    }
}

/// A proposal with its vote tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    creator: Address,
    state: ProposalState,
    votes: BTreeMap<Address, bool>,
    approval_votes: u64,
    cancellation_votes: u64,
    pending_add: BTreeSet<Address>,
    pending_remove: BTreeSet<Address>,
    opaque_messages: Vec<Vec<u8>>,
    created_at: DateTime<Utc>,
    posted_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// Creates a draft with an empty tally.
    pub fn new(creator: Address, payload: ProposalPayload) -> Self {
        Self {
            creator,
            state: ProposalState::Draft,
            votes: BTreeMap::new(),
            approval_votes: 0,
            cancellation_votes: 0,
            pending_add: payload.add,
            pending_remove: payload.remove,
            opaque_messages: payload.messages,
            created_at: Utc::now(),
            posted_at: None,
        }
    }

    /// The participant who opened the proposal.
    pub fn creator(&self) -> &Address {
        &self.creator
    }

    /// Draft or Posted.
    pub fn state(&self) -> ProposalState {
        self.state
    }

    /// Votes currently recorded as approvals.
    pub fn approval_votes(&self) -> u64 {
        self.approval_votes
    }

    /// Votes currently recorded as cancellations.
    pub fn cancellation_votes(&self) -> u64 {
        self.cancellation_votes
    }

    /// Recorded votes: `true` approves, `false` cancels.
    pub fn votes(&self) -> &BTreeMap<Address, bool> {
        &self.votes
    }

    /// The vote `voter` currently holds, if any.
    pub fn vote_of(&self, voter: &Address) -> Option<bool> {
        self.votes.get(voter).copied()
    }

    /// Addresses to add when membership changes execute.
    pub fn pending_add(&self) -> &BTreeSet<Address> {
        &self.pending_add
    }

    /// Addresses to remove when membership changes execute.
    pub fn pending_remove(&self) -> &BTreeSet<Address> {
        &self.pending_remove
    }

    /// Payload bytes carried for the host, never interpreted.
    pub fn opaque_messages(&self) -> &[Vec<u8>] {
        &self.opaque_messages
    }

    /// When the proposal was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the proposal was posted, if it has been.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    // -----------------------------------------------------------------------
    // State checks
    // -----------------------------------------------------------------------

    /// Fails with `Unauthorized(NotCreator)` unless `caller` created this.
    pub fn ensure_creator(&self, caller: &Address) -> Result<()> {
        if *caller != self.creator {
            return Err(CustodyError::Unauthorized(Denied::NotCreator));
        }
        Ok(())
    }

    /// Fails with `InvalidState(AlreadyPosted)` once posted.
    pub fn ensure_draft(&self) -> Result<()> {
        if self.state == ProposalState::Posted {
            return Err(CustodyError::InvalidState(StateViolation::AlreadyPosted));
        }
        Ok(())
    }

    /// Fails with `InvalidState(NotPosted)` while still a draft.
    pub fn ensure_posted(&self) -> Result<()> {
        if self.state == ProposalState::Draft {
            return Err(CustodyError::InvalidState(StateViolation::NotPosted));
        }
        Ok(())
    }

    /// Returns `true` once the cancellation tally reached the threshold.
    pub fn is_cancelled(&self, thresholds: &Thresholds) -> bool {
        self.cancellation_votes >= thresholds.cancellation
    }

    /// Returns `true` if the approval tally reached the threshold.
    pub fn is_approved(&self, thresholds: &Thresholds) -> bool {
        self.approval_votes >= thresholds.approval
    }

    /// The gate shared by every execution path.
    ///
    /// Checked in this order: posted, not cancelled, approved. Re-evaluated
    /// on every call; there is no cached "approved" flag.
    ///
    /// # Errors
    ///
    /// `InvalidState(NotPosted)`, `InvalidState(AlreadyCancelled)` or
    /// [`CustodyError::InsufficientApprovals`].
    pub fn ensure_executable(&self, thresholds: &Thresholds) -> Result<()> {
        self.ensure_posted()?;
        if self.is_cancelled(thresholds) {
            return Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled));
        }
        if !self.is_approved(thresholds) {
            return Err(CustodyError::InsufficientApprovals {
                approvals: self.approval_votes,
                threshold: thresholds.approval,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Moves the proposal from `Draft` to `Posted`.
    pub fn post(&mut self) -> Result<()> {
        self.ensure_draft()?;
        self.state = ProposalState::Posted;
        self.posted_at = Some(Utc::now());
        Ok(())
    }

    /// Records `voter`'s vote. The caller is expected to have checked
    /// membership.
    ///
    /// # Errors
    ///
    /// - `InvalidState(NotPosted)` on a draft.
    /// - `InvalidState(AlreadyCancelled)` once cancelled.
    /// - `InvalidState(VoteUnchanged)` if `voter` already holds this vote.
    pub fn cast_vote(&mut self, voter: Address, approve: bool, thresholds: &Thresholds) -> Result<()> {
        self.ensure_posted()?;
        if self.is_cancelled(thresholds) {
            return Err(CustodyError::InvalidState(StateViolation::AlreadyCancelled));
        }

        let previous = self.vote_of(&voter);
        if previous == Some(approve) {
            return Err(CustodyError::InvalidState(StateViolation::VoteUnchanged));
        }

        // Compute both tallies before writing so an overflow leaves no trace.
        let (mut approvals, mut cancellations) = (self.approval_votes, self.cancellation_votes);
        match previous {
            Some(true) => approvals = approvals.saturating_sub(1),
            Some(false) => cancellations = cancellations.saturating_sub(1),
            None => {}
        }
        if approve {
            approvals = approvals.checked_add(1).ok_or(CustodyError::Overflow)?;
        } else {
            cancellations = cancellations.checked_add(1).ok_or(CustodyError::Overflow)?;
        }

        self.votes.insert(voter, approve);
        self.approval_votes = approvals;
        self.cancellation_votes = cancellations;
        Ok(())
    }

    /// Returns `true` if the proposal carries membership changes.
    pub fn has_pending_changes(&self) -> bool {
        !self.pending_add.is_empty() || !self.pending_remove.is_empty()
    }

    /// Removes and returns the pending `(remove, add)` sets.
    pub fn take_pending_changes(&mut self) -> (BTreeSet<Address>, BTreeSet<Address>) {
        (
            std::mem::take(&mut self.pending_remove),
            std::mem::take(&mut self.pending_add),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
