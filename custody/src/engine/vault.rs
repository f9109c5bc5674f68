//! The vault aggregate: members, thresholds and the ordered proposal list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Denied, Record, Result};
use crate::participants::ParticipantRegistry;
use crate::proposal::{Proposal, Thresholds};
use crate::types::{Address, ProposalId, VaultId};

/// A multisignature vault.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Vault {
    pub(crate) id: VaultId,
    pub(crate) participants: ParticipantRegistry,
    /// Fixed at creation.
    pub(crate) thresholds: Thresholds,
    /// Indexed by [`ProposalId`]. Append-only.
    pub(crate) proposals: Vec<Proposal>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Vault {
    pub(crate) fn new(id: VaultId, participants: ParticipantRegistry, thresholds: Thresholds) -> Self {
        Self {
            id,
            participants,
            thresholds,
            proposals: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub(crate) fn ensure_participant(&self, caller: &Address) -> Result<()> {
        if !self.participants.contains(caller) {
            return Err(CustodyError::Unauthorized(Denied::NotParticipant));
        }
        Ok(())
    }

    pub(crate) fn proposal(&self, id: ProposalId) -> Result<&Proposal> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.proposals.get(index))
            .ok_or(CustodyError::missing(Record::Proposal))
    }

    pub(crate) fn proposal_mut(&mut self, id: ProposalId) -> Result<&mut Proposal> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.proposals.get_mut(index))
            .ok_or(CustodyError::missing(Record::Proposal))
    }

    /// Appends a proposal and returns its id.
    pub(crate) fn push_proposal(&mut self, proposal: Proposal) -> Result<ProposalId> {
        let id = ProposalId::try_from(self.proposals.len()).map_err(|_| CustodyError::Overflow)?;
        self.proposals.push(proposal);
        Ok(id)
    }

    pub(crate) fn info(&self) -> VaultInfo {
        VaultInfo {
            id: self.id,
            participants: self.participants.addresses(),
            approval_threshold: self.thresholds.approval,
            cancellation_threshold: self.thresholds.cancellation,
            proposal_count: self.proposals.len(),
            created_at: self.created_at,
        }
    }
}

/// Read-only summary of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultInfo {
    pub id: VaultId,
    /// Members in insertion order.
    pub participants: Vec<Address>,
    pub approval_threshold: u64,
    pub cancellation_threshold: u64,
    pub proposal_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalPayload;

    fn vault() -> Vault {
        let members = ParticipantRegistry::from_addresses(&[Address::derive("a")]).unwrap();
        Vault::new(
            VaultId::new(),
            members,
            Thresholds {
                approval: 1,
                cancellation: 1,
            },
        )
    }

    #[test]
    fn proposal_index_equal_to_length_is_not_found() {
        let mut vault = vault();
        let id = vault
            .push_proposal(Proposal::new(Address::derive("a"), ProposalPayload::new()))
            .unwrap();
        assert_eq!(id, 0);
        vault.proposal(0).unwrap();
        assert!(matches!(
            vault.proposal(1),
            Err(CustodyError::NotFound(Record::Proposal))
        ));
    }

    #[test]
    fn non_member_rejected() {
        let vault = vault();
        vault.ensure_participant(&Address::derive("a")).unwrap();
        assert!(matches!(
            vault.ensure_participant(&Address::derive("z")),
            Err(CustodyError::Unauthorized(Denied::NotParticipant))
        ));
    }

    #[test]
    fn info_reflects_vault() {
        let vault = vault();
        let info = vault.info();
        assert_eq!(info.id, vault.id);
        assert_eq!(info.participants, vec![Address::derive("a")]);
        assert_eq!(info.proposal_count, 0);
    }
}
