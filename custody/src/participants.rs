//! Participant registry of a single vault.
//!
//! Membership is the only authorization signal the engine uses: an address
//! may create proposals and vote exactly while it is present here. Entries
//! iterate in insertion order.

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Record, Result};
use crate::types::Address;

/// One registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The participant's identity.
    pub address: Address,
    /// Always `true` while the entry exists. Kept for schema compatibility;
    /// no call ever produces a present-but-inactive participant.
    pub active: bool,
}

/// Ordered set of a vault's participants.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParticipantRegistry {
    entries: Vec<Participant>,
}

impl ParticipantRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from an initial member list.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::DuplicateParticipant`] if an address appears
    /// twice. Callers are expected to deduplicate.
    pub fn from_addresses(addresses: &[Address]) -> Result<Self> {
        let mut registry = Self::new();
        for address in addresses {
            registry.add(*address)?;
        }
        Ok(registry)
    }

    /// Appends a participant.
    pub fn add(&mut self, address: Address) -> Result<()> {
        if self.contains(&address) {
            return Err(CustodyError::DuplicateParticipant(address));
        }
        self.entries.push(Participant {
            address,
            active: true,
        });
        Ok(())
    }

    /// Removes a participant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(Participant)` if the address is not a member.
    pub fn remove(&mut self, address: &Address) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|p| p.address == *address)
            .ok_or(CustodyError::missing(Record::Participant))?;
        self.entries.remove(index);
        Ok(())
    }

    /// Returns `true` if `address` is a current participant.
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.iter().any(|p| p.address == *address)
    }

    /// Participant addresses in insertion order.
    pub fn addresses(&self) -> Vec<Address> {
        self.entries.iter().map(|p| p.address).collect()
    }

    /// Registry entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.entries.iter()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the vault has no participants.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
