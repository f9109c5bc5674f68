//! # Asset Registry
//!
//! Records the bootstrap state of the engine (the root identity) and owns
//! one custody ledger per enabled type tag. Enabling an asset type creates
//! its [`CustodyLedger`]; enabling an object kind creates its
//! [`ObjectCustodyLedger`]. Every ledger or withdrawal-request call reaches
//! its ledger through the registry, so an unknown tag fails with
//! `NotFound(AssetRegistration)` before anything else happens.
//!
//! Registration is one-way. There is no call to disable a type once enabled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Denied, Record, Result};
use crate::ledger::{CustodyLedger, ObjectCustodyLedger};
use crate::types::{Address, AssetId, ObjectKind};

/// Bootstrap state and the ledger of every enabled type tag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssetRegistry {
    /// Identity allowed to run bootstrap calls. `None` until initialised.
    root: Option<Address>,
    /// Fungible ledgers by asset type.
    assets: BTreeMap<AssetId, CustodyLedger>,
    /// Object ledgers by object kind.
    object_kinds: BTreeMap<ObjectKind, ObjectCustodyLedger>,
}

impl AssetRegistry {
    /// Creates an uninitialised registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `caller` as the root identity.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::AlreadyInitialized`] on a second call.
    pub fn initialize(&mut self, caller: Address) -> Result<()> {
        if self.root.is_some() {
            return Err(CustodyError::AlreadyInitialized);
        }
        self.root = Some(caller);
        Ok(())
    }

    /// Returns the root identity, if initialised.
    pub fn root(&self) -> Option<Address> {
        self.root
    }

    /// Fails with [`CustodyError::NotInitialized`] before `initialize`.
    pub fn require_initialized(&self) -> Result<()> {
        match self.root {
            Some(_) => Ok(()),
            None => Err(CustodyError::NotInitialized),
        }
    }

    fn require_root(&self, caller: &Address) -> Result<()> {
        match self.root {
            None => Err(CustodyError::NotInitialized),
            Some(root) if root == *caller => Ok(()),
            Some(_) => Err(CustodyError::Unauthorized(Denied::NotRoot)),
        }
    }

    /// Enables custody of a fungible asset type.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::NotInitialized`], [`CustodyError::Unauthorized`]
    /// with [`Denied::NotRoot`], or [`CustodyError::AlreadyInitialized`] if
    /// the asset was already enabled.
    pub fn enable_asset(&mut self, caller: &Address, asset: AssetId) -> Result<()> {
        self.require_root(caller)?;
        if self.assets.contains_key(&asset) {
            return Err(CustodyError::AlreadyInitialized);
        }
        self.assets.insert(asset.clone(), CustodyLedger::new(asset));
        Ok(())
    }

    /// Enables custody of an object kind. Same errors as
    /// [`enable_asset`](Self::enable_asset).
    pub fn enable_object_kind(&mut self, caller: &Address, kind: ObjectKind) -> Result<()> {
        self.require_root(caller)?;
        if self.object_kinds.contains_key(&kind) {
            return Err(CustodyError::AlreadyInitialized);
        }
        self.object_kinds
            .insert(kind.clone(), ObjectCustodyLedger::new(kind));
        Ok(())
    }

    /// The ledger of `asset`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(AssetRegistration)` unless `asset` is enabled.
    pub fn ledger(&self, asset: &AssetId) -> Result<&CustodyLedger> {
        self.assets
            .get(asset)
            .ok_or(CustodyError::missing(Record::AssetRegistration))
    }

    /// Mutable access to the ledger of `asset`.
    pub fn ledger_mut(&mut self, asset: &AssetId) -> Result<&mut CustodyLedger> {
        self.assets
            .get_mut(asset)
            .ok_or(CustodyError::missing(Record::AssetRegistration))
    }

    /// The object ledger of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(AssetRegistration)` unless `kind` is enabled.
    pub fn object_ledger(&self, kind: &ObjectKind) -> Result<&ObjectCustodyLedger> {
        self.object_kinds
            .get(kind)
            .ok_or(CustodyError::missing(Record::AssetRegistration))
    }

    /// Mutable access to the object ledger of `kind`.
    pub fn object_ledger_mut(&mut self, kind: &ObjectKind) -> Result<&mut ObjectCustodyLedger> {
        self.object_kinds
            .get_mut(kind)
            .ok_or(CustodyError::missing(Record::AssetRegistration))
    }

    /// Enabled asset types, in tag order.
    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.assets.keys()
    }

    /// Enabled object kinds, in tag order.
    pub fn object_kinds(&self) -> impl Iterator<Item = &ObjectKind> {
        self.object_kinds.keys()
    }
}
