//! # Custody Ledgers
//!
//! Per-asset-type books of what each vault holds.
//!
//! - [`CustodyLedger`]: one per fungible asset. Maps a vault to a single
//!   merged [`Coin`]. A missing entry means a zero balance, and a withdrawal
//!   that drains the balance exactly removes the entry instead of leaving a
//!   zero coin behind.
//! - [`ObjectCustodyLedger`]: one per object kind. Each vault gets an
//!   indexed collection of slots. Slot ids come from a per-vault counter that
//!   only ever increases, so an id is never reused after a withdrawal.
//!
//! All withdrawals are two-phase: a `check_*` call validates the request
//! against the current state without touching it, and only then does the
//! mutating call run. The engine relies on this to guarantee that a rejected
//! call leaves no trace.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CustodyError, Record, Result};
use crate::storage::Table;
use crate::types::{AssetId, Coin, CustodyObject, ObjectKind, VaultId};

// ---------------------------------------------------------------------------
// CustodyLedger
// ---------------------------------------------------------------------------

/// Fungible balances of one asset type, keyed by vault.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustodyLedger {
    asset: AssetId,
    balances: Table<VaultId, Coin>,
}

impl CustodyLedger {
    /// Creates an empty ledger for `asset`.
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            balances: Table::new(Record::Balance),
        }
    }

    /// The asset this ledger books.
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Merges `coin` into the vault's balance, creating the entry if needed.
    ///
    /// A zero-value coin into an empty vault creates no entry (absence
    /// already means zero). Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::AssetMismatch`] if the coin is of another
    /// asset, or [`CustodyError::Overflow`] if the balance would exceed
    /// `u64::MAX`. The balance is unchanged on error.
    pub fn deposit(&mut self, vault: VaultId, coin: Coin) -> Result<u64> {
        if coin.asset() != &self.asset {
            return Err(CustodyError::AssetMismatch {
                expected: self.asset.clone(),
                found: coin.asset().clone(),
            });
        }

        if self.balances.contains(&vault) {
            let balance = self.balances.borrow_mut(&vault)?;
            balance.merge(coin)?;
            return Ok(balance.value());
        }

        let value = coin.value();
        if value > 0 {
            self.balances.add(vault, coin)?;
        }
        Ok(value)
    }

    /// Current balance of `vault` (zero when no entry exists).
    pub fn balance(&self, vault: &VaultId) -> u64 {
        self.balances.get(vault).map(Coin::value).unwrap_or(0)
    }

    /// Returns `true` if the vault has a ledger entry.
    pub fn has_entry(&self, vault: &VaultId) -> bool {
        self.balances.contains(vault)
    }

    /// Verifies that `vault` can pay out `amount`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InsufficientFunds`] if the vault has no entry
    /// or its balance is below `amount`.
    pub fn check_withdrawal(&self, vault: &VaultId, amount: u64) -> Result<()> {
        let available = match self.balances.get(vault) {
            Some(coin) => coin.value(),
            None => {
                return Err(CustodyError::InsufficientFunds {
                    requested: amount,
                    available: 0,
                })
            }
        };
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Takes exactly `amount` out of the vault.
    ///
    /// When the balance exceeds `amount` the coin is split and the remainder
    /// stays booked under the vault. When it matches exactly, the whole entry
    /// is removed and returned.
    pub fn withdraw(&mut self, vault: &VaultId, amount: u64) -> Result<Coin> {
        self.check_withdrawal(vault, amount)?;

        let available = self.balance(vault);
        if available == amount {
            debug!(vault = %vault, asset = %self.asset, amount, "draining ledger entry");
            return self.balances.remove(vault);
        }

        let balance = self.balances.borrow_mut(vault)?;
        let piece = balance.extract(amount)?;
        debug!(
            vault = %vault,
            asset = %self.asset,
            amount,
            remaining = balance.value(),
            "split ledger entry"
        );
        Ok(piece)
    }

    /// Number of vaults with a non-empty balance.
    pub fn entry_count(&self) -> usize {
        self.balances.len()
    }
}

// ---------------------------------------------------------------------------
// ObjectCustodyLedger
// ---------------------------------------------------------------------------

/// Slots of one vault inside an [`ObjectCustodyLedger`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectVault {
    /// Id the next deposit will receive.
    next_slot_id: u64,
    /// Deposited objects by slot id.
    slots: Table<u64, CustodyObject>,
}

impl ObjectVault {
    fn new() -> Self {
        Self {
            next_slot_id: 0,
            slots: Table::new(Record::Slot),
        }
    }

    /// Id the next deposit will receive.
    pub fn next_slot_id(&self) -> u64 {
        self.next_slot_id
    }
}

/// Discrete objects of one kind, keyed by vault and slot id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectCustodyLedger {
    kind: ObjectKind,
    vaults: Table<VaultId, ObjectVault>,
}

impl ObjectCustodyLedger {
    /// Creates an empty ledger for `kind`.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            vaults: Table::new(Record::Slot),
        }
    }

    /// The object kind this ledger books.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Stores `object` under the vault's next slot id and returns that id.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::Overflow`] once a vault has used every `u64`
    /// slot id.
    pub fn deposit(&mut self, vault: VaultId, object: CustodyObject) -> Result<u64> {
        if !self.vaults.contains(&vault) {
            self.vaults.add(vault, ObjectVault::new())?;
        }
        let entry = self.vaults.borrow_mut(&vault)?;

        let slot_id = entry.next_slot_id;
        let next = slot_id.checked_add(1).ok_or(CustodyError::Overflow)?;
        entry.slots.add(slot_id, object)?;
        entry.next_slot_id = next;

        debug!(vault = %vault, kind = %self.kind, slot_id, "object deposited");
        Ok(slot_id)
    }

    /// Returns the object in `slot_id`, if present.
    pub fn slot(&self, vault: &VaultId, slot_id: u64) -> Option<&CustodyObject> {
        self.vaults.get(vault).and_then(|v| v.slots.get(&slot_id))
    }

    /// All objects held by `vault`, in slot order.
    pub fn objects(&self, vault: &VaultId) -> Vec<(u64, CustodyObject)> {
        self.vaults
            .get(vault)
            .map(|v| v.slots.iter().map(|(id, obj)| (*id, obj.clone())).collect())
            .unwrap_or_default()
    }

    /// Id the vault's next deposit will receive (0 for an unseen vault).
    pub fn next_slot_id(&self, vault: &VaultId) -> u64 {
        self.vaults.get(vault).map(ObjectVault::next_slot_id).unwrap_or(0)
    }

    /// Verifies that every id in `slot_ids` can be removed, in order.
    ///
    /// A repeated id fails like a missing one: its second removal would find
    /// the slot already empty. A vault that never held this kind has no
    /// slots, so only an empty list passes for it.
    pub fn check_slots(&self, vault: &VaultId, slot_ids: &[u64]) -> Result<()> {
        let entry = self.vaults.get(vault);
        for (i, id) in slot_ids.iter().enumerate() {
            let present = entry.map_or(false, |e| e.slots.contains(id));
            if !present || slot_ids[..i].contains(id) {
                return Err(CustodyError::missing(Record::Slot));
            }
        }
        Ok(())
    }

    /// Removes every slot in `slot_ids`, all or nothing, returning the
    /// objects in request order.
    pub fn withdraw(&mut self, vault: &VaultId, slot_ids: &[u64]) -> Result<Vec<CustodyObject>> {
        self.check_slots(vault, slot_ids)?;
        if slot_ids.is_empty() {
            return Ok(Vec::new());
        }
        let entry = self.vaults.borrow_mut(vault)?;
        slot_ids.iter().map(|id| entry.slots.remove(id)).collect()
    }

    /// Puts a withdrawn object back under its original slot id. Only valid
    /// for ids this vault already handed out.
    pub(crate) fn reinstate(&mut self, vault: &VaultId, slot_id: u64, object: CustodyObject) -> Result<()> {
        let entry = self.vaults.borrow_mut(vault)?;
        if slot_id >= entry.next_slot_id {
            return Err(CustodyError::missing(Record::Slot));
        }
        entry.slots.add(slot_id, object)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(value: u64) -> Coin {
        Coin::new(AssetId::new("USD"), value)
    }

    fn deed(key: &str) -> CustodyObject {
        CustodyObject::new(ObjectKind::new("deed"), key, 1)
    }

    #[test]
    fn deposit_creates_then_merges() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let vault = VaultId::new();

        assert_eq!(ledger.deposit(vault, usd(100)).unwrap(), 100);
        assert_eq!(ledger.deposit(vault, usd(50)).unwrap(), 150);
        assert_eq!(ledger.balance(&vault), 150);
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn zero_deposit_creates_no_entry() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let vault = VaultId::new();
        ledger.deposit(vault, usd(0)).unwrap();
        assert!(!ledger.has_entry(&vault));
    }

    #[test]
    fn deposit_of_other_asset_rejected() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let result = ledger.deposit(VaultId::new(), Coin::new(AssetId::new("EUR"), 5));
        assert!(matches!(result, Err(CustodyError::AssetMismatch { .. })));
    }

    #[test]
    fn partial_withdrawal_leaves_remainder() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let vault = VaultId::new();
        ledger.deposit(vault, usd(100)).unwrap();

        let piece = ledger.withdraw(&vault, 30).unwrap();
        assert_eq!(piece.value(), 30);
        assert_eq!(ledger.balance(&vault), 70);
        assert!(ledger.has_entry(&vault));
    }

    #[test]
    fn exact_withdrawal_removes_entry() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let vault = VaultId::new();
        ledger.deposit(vault, usd(100)).unwrap();

        let piece = ledger.withdraw(&vault, 100).unwrap();
        assert_eq!(piece.value(), 100);
        assert!(!ledger.has_entry(&vault));
        assert_eq!(ledger.balance(&vault), 0);
    }

    #[test]
    fn overdraw_rejected_without_change() {
        let mut ledger = CustodyLedger::new(AssetId::new("USD"));
        let vault = VaultId::new();
        ledger.deposit(vault, usd(10)).unwrap();

        let result = ledger.withdraw(&vault, 11);
        assert!(matches!(
            result,
            Err(CustodyError::InsufficientFunds {
                requested: 11,
                available: 10
            })
        ));
        assert_eq!(ledger.balance(&vault), 10);
    }

    #[test]
    fn withdraw_from_empty_vault_is_insufficient_funds() {
        let ledger = CustodyLedger::new(AssetId::new("USD"));
        let result = ledger.check_withdrawal(&VaultId::new(), 1);
        assert!(matches!(
            result,
            Err(CustodyError::InsufficientFunds { available: 0, .. })
        ));
    }

    #[test]
    fn slot_ids_never_reused() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();

        assert_eq!(ledger.deposit(vault, deed("a")).unwrap(), 0);
        assert_eq!(ledger.deposit(vault, deed("b")).unwrap(), 1);
        ledger.withdraw(&vault, &[1]).unwrap();
        assert_eq!(ledger.deposit(vault, deed("c")).unwrap(), 2);
        assert_eq!(ledger.next_slot_id(&vault), 3);
    }

    #[test]
    fn object_withdrawal_is_all_or_nothing() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();
        for key in ["a", "b", "c"] {
            ledger.deposit(vault, deed(key)).unwrap();
        }

        let result = ledger.withdraw(&vault, &[1, 2, 99]);
        assert!(matches!(result, Err(CustodyError::NotFound(Record::Slot))));
        assert!(ledger.slot(&vault, 1).is_some());
        assert!(ledger.slot(&vault, 2).is_some());
    }

    #[test]
    fn repeated_slot_id_rejected() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();
        ledger.deposit(vault, deed("a")).unwrap();

        assert!(ledger.withdraw(&vault, &[0, 0]).is_err());
        assert!(ledger.slot(&vault, 0).is_some());
    }

    #[test]
    fn withdrawal_returns_request_order() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();
        for key in ["a", "b", "c"] {
            ledger.deposit(vault, deed(key)).unwrap();
        }

        let objects = ledger.withdraw(&vault, &[2, 0]).unwrap();
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a"]);
        assert_eq!(ledger.objects(&vault).len(), 1);
    }

    #[test]
    fn reinstate_only_restores_issued_ids() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();
        ledger.deposit(vault, deed("a")).unwrap();
        let object = ledger.withdraw(&vault, &[0]).unwrap().remove(0);

        assert!(ledger.reinstate(&vault, 5, object.clone()).is_err());
        ledger.reinstate(&vault, 0, object).unwrap();
        assert_eq!(ledger.slot(&vault, 0).unwrap().key, "a");
        assert_eq!(ledger.next_slot_id(&vault), 1);
    }

    #[test]
    fn empty_pull_from_unseen_vault() {
        let mut ledger = ObjectCustodyLedger::new(ObjectKind::new("deed"));
        let vault = VaultId::new();

        ledger.check_slots(&vault, &[]).unwrap();
        assert!(ledger.withdraw(&vault, &[]).unwrap().is_empty());
        assert!(matches!(
            ledger.check_slots(&vault, &[0]),
            Err(CustodyError::NotFound(Record::Slot))
        ));
    }
}
