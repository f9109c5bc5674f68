//! # Transfer Primitive
//!
//! The engine never moves value out of custody by itself. Paying a recipient
//! and routing a domain object through an intermediary both go through a
//! [`TransferPrimitive`], injected when the engine is built.
//!
//! [`InMemoryTransfers`] is the in-process implementation: a plain holdings
//! sheet per identity, guarded by a mutex.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CustodyError, Result};
use crate::types::{Address, AssetId, Coin, CustodyObject, ObjectKind};

/// Moves fungible value and domain objects between identities outside the
/// custody ledgers.
pub trait TransferPrimitive: Send + Sync {
    /// Credits `coin` to `recipient`.
    fn deposit(&self, recipient: &Address, coin: Coin) -> Result<()>;

    /// Credits a whole object to `owner`.
    fn deposit_object(&self, owner: &Address, object: CustodyObject) -> Result<()>;

    /// Debits `quantity` units of `(kind, key)` from `owner` and returns
    /// them as an object.
    ///
    /// Fails with [`CustodyError::InsufficientTokens`] if `owner` holds less.
    fn withdraw_object(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        quantity: u64,
    ) -> Result<CustodyObject>;

    /// Units of `(kind, key)` held by `owner`.
    fn balance_of(&self, owner: &Address, kind: &ObjectKind, key: &str) -> u64;

    /// Moves `quantity` units of `(kind, key)` from `owner` to `recipient`.
    fn transfer(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        recipient: &Address,
        quantity: u64,
    ) -> Result<()>;
}

impl<T: TransferPrimitive + ?Sized> TransferPrimitive for Arc<T> {
    fn deposit(&self, recipient: &Address, coin: Coin) -> Result<()> {
        (**self).deposit(recipient, coin)
    }

    fn deposit_object(&self, owner: &Address, object: CustodyObject) -> Result<()> {
        (**self).deposit_object(owner, object)
    }

    fn withdraw_object(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        quantity: u64,
    ) -> Result<CustodyObject> {
        (**self).withdraw_object(owner, kind, key, quantity)
    }

    fn balance_of(&self, owner: &Address, kind: &ObjectKind, key: &str) -> u64 {
        (**self).balance_of(owner, kind, key)
    }

    fn transfer(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        recipient: &Address,
        quantity: u64,
    ) -> Result<()> {
        (**self).transfer(owner, kind, key, recipient, quantity)
    }
}

// ---------------------------------------------------------------------------
// InMemoryTransfers
// ---------------------------------------------------------------------------

type ObjectHolding = (Address, ObjectKind, String);

#[derive(Debug, Default)]
struct Holdings {
    coins: HashMap<(Address, AssetId), u64>,
    objects: HashMap<ObjectHolding, u64>,
}

/// Holdings of every identity outside custody, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransfers {
    holdings: Mutex<Holdings>,
}

impl InMemoryTransfers {
    /// Creates an empty holdings book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fungible balance of `owner` in `asset`.
    pub fn coin_balance(&self, owner: &Address, asset: &AssetId) -> u64 {
        self.holdings
            .lock()
            .coins
            .get(&(*owner, asset.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl TransferPrimitive for InMemoryTransfers {
    fn deposit(&self, recipient: &Address, coin: Coin) -> Result<()> {
        let mut holdings = self.holdings.lock();
        let entry = holdings
            .coins
            .entry((*recipient, coin.asset().clone()))
            .or_insert(0);
        *entry = entry.checked_add(coin.value()).ok_or(CustodyError::Overflow)?;
        Ok(())
    }

    fn deposit_object(&self, owner: &Address, object: CustodyObject) -> Result<()> {
        let mut holdings = self.holdings.lock();
        let entry = holdings
            .objects
            .entry((*owner, object.kind, object.key))
            .or_insert(0);
        *entry = entry.checked_add(object.quantity).ok_or(CustodyError::Overflow)?;
        Ok(())
    }

    fn withdraw_object(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        quantity: u64,
    ) -> Result<CustodyObject> {
        let mut holdings = self.holdings.lock();
        let holding = (*owner, kind.clone(), key.to_string());
        let available = holdings.objects.get(&holding).copied().unwrap_or(0);
        if available < quantity {
            return Err(CustodyError::InsufficientTokens {
                requested: quantity,
                available,
            });
        }

        let remaining = available - quantity;
        if remaining == 0 {
            holdings.objects.remove(&holding);
        } else {
            holdings.objects.insert(holding, remaining);
        }
        Ok(CustodyObject::new(kind.clone(), key, quantity))
    }

    fn balance_of(&self, owner: &Address, kind: &ObjectKind, key: &str) -> u64 {
        self.holdings
            .lock()
            .objects
            .get(&(*owner, kind.clone(), key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &self,
        owner: &Address,
        kind: &ObjectKind,
        key: &str,
        recipient: &Address,
        quantity: u64,
    ) -> Result<()> {
        let mut holdings = self.holdings.lock();
        let from = (*owner, kind.clone(), key.to_string());
        let to = (*recipient, kind.clone(), key.to_string());

        let available = holdings.objects.get(&from).copied().unwrap_or(0);
        if available < quantity {
            return Err(CustodyError::InsufficientTokens {
                requested: quantity,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let received = holdings
            .objects
            .get(&to)
            .copied()
            .unwrap_or(0)
            .checked_add(quantity)
            .ok_or(CustodyError::Overflow)?;

        let remaining = available - quantity;
        if remaining == 0 {
            holdings.objects.remove(&from);
        } else {
            holdings.objects.insert(from, remaining);
        }
        holdings.objects.insert(to, received);
        Ok(())
    }
}
