//! # Custody Engine
//!
//! [`CustodyEngine`] owns the whole custody state and exposes every
//! operation as a method taking `&self`.
//!
//! ## Concurrency
//!
//! All state sits behind a single `parking_lot::RwLock`. Each mutating call
//! holds the write lock for its whole duration and each view holds the read
//! lock, so calls are serializable. Within a call, every precondition is
//! checked before the first write; a rejected call leaves the state exactly
//! as it found it.
//!
//! ## Layout
//!
//! - this module: construction, bootstrap, deposits, views and snapshots
//! - [`governance`]: vaults, proposals, votes, membership changes
//! - [`withdrawals`]: withdrawal requests and their redemption

mod governance;
mod vault;
mod withdrawals;

pub use governance::Authority;
pub use vault::VaultInfo;
pub use withdrawals::ObjectTransferReceipt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{CustodyConfig, SNAPSHOT_FORMAT_VERSION};
use crate::error::{CustodyError, Record, Result};
use crate::proposal::Proposal;
use crate::registry::AssetRegistry;
use crate::storage::Table;
use crate::transfer::{InMemoryTransfers, TransferPrimitive};
use crate::types::{Address, AssetId, Coin, CustodyObject, ObjectKind, ProposalId, VaultId};
use crate::withdrawal::{PendingWithdrawalRequest, RequestKind, WithdrawalRequestRegistry};

use vault::Vault;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the engine persists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct CustodyState {
    pub(crate) registry: AssetRegistry,
    pub(crate) vaults: Table<VaultId, Vault>,
    pub(crate) requests: WithdrawalRequestRegistry,
}

impl Default for CustodyState {
    fn default() -> Self {
        Self {
            registry: AssetRegistry::new(),
            vaults: Table::new(Record::Vault),
            requests: WithdrawalRequestRegistry::new(),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    state: &'a CustodyState,
}

#[derive(Deserialize)]
struct SnapshotOwned {
    version: u32,
    state: CustodyState,
}

// ---------------------------------------------------------------------------
// CustodyEngine
// ---------------------------------------------------------------------------

/// Thread-safe multisignature custody engine.
pub struct CustodyEngine<P: TransferPrimitive = InMemoryTransfers> {
    state: RwLock<CustodyState>,
    transfers: P,
}

impl<P: TransferPrimitive> CustodyEngine<P> {
    /// Creates an uninitialised engine.
    pub fn new(transfers: P) -> Self {
        Self {
            state: RwLock::new(CustodyState::default()),
            transfers,
        }
    }

    /// Creates an engine and runs bootstrap: `root` becomes the root
    /// identity and every asset type and object kind in `config` is enabled.
    pub fn from_config(root: Address, config: &CustodyConfig, transfers: P) -> Result<Self> {
        let engine = Self::new(transfers);
        engine.initialize(root)?;
        for asset in &config.enabled_assets {
            engine.enable_deposits(&root, asset.clone())?;
        }
        for kind in &config.enabled_object_kinds {
            engine.enable_object_deposits(&root, kind.clone())?;
        }
        Ok(engine)
    }

    /// The injected transfer primitive.
    pub fn transfers(&self) -> &P {
        &self.transfers
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Records `caller` as the root identity.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` on a second call.
    pub fn initialize(&self, caller: Address) -> Result<()> {
        self.state.write().registry.initialize(caller)?;
        info!(root = %caller, "custody engine initialized");
        Ok(())
    }

    /// Enables custody of a fungible asset type.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `Unauthorized(NotRoot)`, or `AlreadyInitialized`
    /// when the asset is already enabled.
    pub fn enable_deposits(&self, caller: &Address, asset: AssetId) -> Result<()> {
        let mut state = self.state.write();
        state.registry.enable_asset(caller, asset.clone())?;
        info!(asset = %asset, "asset deposits enabled");
        Ok(())
    }

    /// Enables custody of an object kind. Same errors as
    /// [`enable_deposits`](Self::enable_deposits).
    pub fn enable_object_deposits(&self, caller: &Address, kind: ObjectKind) -> Result<()> {
        let mut state = self.state.write();
        state.registry.enable_object_kind(caller, kind.clone())?;
        info!(kind = %kind, "object deposits enabled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deposits
    // -----------------------------------------------------------------------

    /// Credits `coin` to `vault_id` and returns the new balance.
    ///
    /// The vault id is not checked against existing vaults.
    ///
    /// # Errors
    ///
    /// `NotFound(AssetRegistration)` or `Overflow`.
    pub fn deposit(&self, vault_id: VaultId, coin: Coin) -> Result<u64> {
        let mut state = self.state.write();
        let asset = coin.asset().clone();
        let amount = coin.value();
        let balance = state.registry.ledger_mut(&asset)?.deposit(vault_id, coin)?;
        debug!(vault = %vault_id, asset = %asset, amount, balance, "deposit");
        Ok(balance)
    }

    /// Stores `object` in the vault and returns its slot id.
    ///
    /// # Errors
    ///
    /// `NotFound(AssetRegistration)` or `Overflow`.
    pub fn deposit_object(&self, vault_id: VaultId, object: CustodyObject) -> Result<u64> {
        let mut state = self.state.write();
        let kind = object.kind.clone();
        let slot_id = state.registry.object_ledger_mut(&kind)?.deposit(vault_id, object)?;
        Ok(slot_id)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// The root identity, once initialised.
    pub fn root(&self) -> Option<Address> {
        self.state.read().registry.root()
    }

    /// Ids of every vault, in id order.
    pub fn vault_ids(&self) -> Vec<VaultId> {
        self.state.read().vaults.iter().map(|(id, _)| *id).collect()
    }

    /// Summary of the vault: members, thresholds and proposal count.
    pub fn vault(&self, vault_id: &VaultId) -> Result<VaultInfo> {
        Ok(self.state.read().vaults.borrow(vault_id)?.info())
    }

    /// Current members in insertion order.
    pub fn participants(&self, vault_id: &VaultId) -> Result<Vec<Address>> {
        Ok(self.state.read().vaults.borrow(vault_id)?.participants.addresses())
    }

    /// Whether `address` is currently a member of the vault.
    pub fn is_participant(&self, vault_id: &VaultId, address: &Address) -> Result<bool> {
        Ok(self.state.read().vaults.borrow(vault_id)?.participants.contains(address))
    }

    /// A copy of the proposal.
    pub fn proposal(&self, vault_id: &VaultId, proposal_id: ProposalId) -> Result<Proposal> {
        let state = self.state.read();
        Ok(state.vaults.borrow(vault_id)?.proposal(proposal_id)?.clone())
    }

    /// Number of proposals ever created in the vault.
    pub fn proposal_count(&self, vault_id: &VaultId) -> Result<usize> {
        Ok(self.state.read().vaults.borrow(vault_id)?.proposals.len())
    }

    /// Balance of `vault_id` in `asset`; zero when the vault has no entry.
    pub fn balance(&self, vault_id: &VaultId, asset: &AssetId) -> Result<u64> {
        Ok(self.state.read().registry.ledger(asset)?.balance(vault_id))
    }

    /// Whether the ledger holds an entry for the vault. Drained balances
    /// leave none.
    pub fn has_balance_entry(&self, vault_id: &VaultId, asset: &AssetId) -> Result<bool> {
        Ok(self.state.read().registry.ledger(asset)?.has_entry(vault_id))
    }

    /// Objects of `kind` held by the vault, in slot order.
    pub fn objects(&self, vault_id: &VaultId, kind: &ObjectKind) -> Result<Vec<(u64, CustodyObject)>> {
        Ok(self.state.read().registry.object_ledger(kind)?.objects(vault_id))
    }

    /// The pending request of `kind`, if one is waiting.
    pub fn pending_request(
        &self,
        vault_id: &VaultId,
        proposal_id: ProposalId,
        kind: &RequestKind,
    ) -> Option<PendingWithdrawalRequest> {
        self.state.read().requests.pending(*vault_id, proposal_id, kind)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Encodes the full custody state, prefixed with
    /// [`SNAPSHOT_FORMAT_VERSION`].
    ///
    /// Encoding is deterministic: identical state yields identical bytes.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let state = self.state.read();
        let envelope = SnapshotRef {
            version: SNAPSHOT_FORMAT_VERSION,
            state: &*state,
        };
        bincode::serialize(&envelope).map_err(|e| CustodyError::Snapshot(e.to_string()))
    }

    /// Rebuilds an engine from [`snapshot`](Self::snapshot) bytes.
    ///
    /// Pending requests stay redeemable exactly once and slot ids keep
    /// advancing from where they were.
    pub fn restore(bytes: &[u8], transfers: P) -> Result<Self> {
        let version: u32 =
            bincode::deserialize(bytes).map_err(|e| CustodyError::Snapshot(e.to_string()))?;
        if version != SNAPSHOT_FORMAT_VERSION {
            return Err(CustodyError::Snapshot(format!(
                "unsupported snapshot version {version}, expected {SNAPSHOT_FORMAT_VERSION}"
            )));
        }

        let envelope: SnapshotOwned =
            bincode::deserialize(bytes).map_err(|e| CustodyError::Snapshot(e.to_string()))?;
        info!(
            version = envelope.version,
            vaults = envelope.state.vaults.len(),
            "custody state restored"
        );
        Ok(Self {
            state: RwLock::new(envelope.state),
            transfers,
        })
    }
}

impl Default for CustodyEngine<InMemoryTransfers> {
    fn default() -> Self {
        Self::new(InMemoryTransfers::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Address {
        Address::derive("root")
    }

    fn engine() -> CustodyEngine {
        CustodyEngine::default()
    }

    #[test]
    fn bootstrap_from_config() {
        let config = CustodyConfig {
            enabled_assets: vec![AssetId::new("USD")],
            enabled_object_kinds: vec![ObjectKind::new("deed")],
            ..CustodyConfig::default()
        };
        let engine = CustodyEngine::from_config(root(), &config, InMemoryTransfers::new()).unwrap();
        assert_eq!(engine.root(), Some(root()));
        assert_eq!(engine.balance(&VaultId::new(), &AssetId::new("USD")).unwrap(), 0);
        assert!(engine.objects(&VaultId::new(), &ObjectKind::new("deed")).unwrap().is_empty());
    }

    #[test]
    fn deposit_into_unregistered_asset_rejected() {
        let engine = engine();
        engine.initialize(root()).unwrap();
        let result = engine.deposit(VaultId::new(), Coin::new(AssetId::new("USD"), 5));
        assert!(matches!(
            result,
            Err(CustodyError::NotFound(Record::AssetRegistration))
        ));
    }

    #[test]
    fn deposit_overflow_leaves_balance() {
        let engine = engine();
        engine.initialize(root()).unwrap();
        engine.enable_deposits(&root(), AssetId::new("USD")).unwrap();
        let vault = VaultId::new();

        engine.deposit(vault, Coin::new(AssetId::new("USD"), u64::MAX)).unwrap();
        let result = engine.deposit(vault, Coin::new(AssetId::new("USD"), 1));
        assert!(matches!(result, Err(CustodyError::Overflow)));
        assert_eq!(engine.balance(&vault, &AssetId::new("USD")).unwrap(), u64::MAX);
    }

    #[test]
    fn snapshot_with_wrong_version_rejected() {
        let engine = engine();
        let mut bytes = engine.snapshot().unwrap();
        bytes[0] = bytes[0].wrapping_add(1);
        let result = CustodyEngine::restore(&bytes, InMemoryTransfers::new());
        assert!(matches!(result, Err(CustodyError::Snapshot(_))));
    }

    #[test]
    fn garbage_snapshot_rejected() {
        let result = CustodyEngine::restore(&[1, 2], InMemoryTransfers::new());
        assert!(matches!(result, Err(CustodyError::Snapshot(_))));
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CustodyEngine>();
    }
}
