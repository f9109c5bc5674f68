//! # Core Identifiers and Asset Values
//!
//! Identifiers for participants, vaults, proposals and asset types, plus
//! the two kinds of value a vault can hold:
//!
//! - [`Coin`]: a piece of fungible value of one [`AssetId`]. Coins merge
//!   and split exactly, with no fees and no rounding.
//! - [`CustodyObject`]: a discrete object of one [`ObjectKind`], carrying
//!   a domain key and a quantity (1 for unique objects).
//!
//! Asset types are explicit tags. Which tags are enabled is recorded in the
//! [`AssetRegistry`](crate::registry::AssetRegistry); nothing here consults
//! global state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ADDRESS_DERIVATION_CONTEXT;
use crate::error::{CustodyError, Result};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 32-byte participant or recipient identity.
///
/// The engine never verifies signatures. Callers are authenticated by the
/// hosting environment and the engine only compares addresses for equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Wraps raw identity bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives a deterministic address from a label.
    ///
    /// Uses BLAKE3 in `derive_key` mode under
    /// [`ADDRESS_DERIVATION_CONTEXT`], so a derived address never equals a
    /// plain BLAKE3 hash of the same label. Handy for fixtures and for
    /// well-known service identities such as transfer intermediaries.
    pub fn derive(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(ADDRESS_DERIVATION_CONTEXT);
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Returns the hex-encoded address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded address.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ---------------------------------------------------------------------------
// VaultId / ProposalId
// ---------------------------------------------------------------------------

/// Unique identifier of a vault, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultId(Uuid);

impl VaultId {
    /// Generates a fresh random vault id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VaultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a proposal in its vault's ordered proposal list.
pub type ProposalId = u64;

// ---------------------------------------------------------------------------
// Asset type tags
// ---------------------------------------------------------------------------

/// Type tag of a fungible asset (e.g. `"USD"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    /// Creates an asset tag. Tags are case-sensitive.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type tag of a discrete object collection (e.g. `"deed"`, `"voucher"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKind(String);

impl ObjectKind {
    /// Creates an object kind tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// A piece of fungible value.
///
/// Coins are the asset-transfer primitive of the engine: value is only ever
/// moved by [`merge`](Self::merge) and [`extract`](Self::extract), both of
/// which conserve the total exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    asset: AssetId,
    value: u64,
}

impl Coin {
    /// Mints a coin. Minting is the hosting environment's business; the
    /// engine only receives coins through deposits.
    pub fn new(asset: AssetId, value: u64) -> Self {
        Self { asset, value }
    }

    /// The asset type of this coin.
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// The amount held, in smallest units.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Folds `other` into this coin.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::AssetMismatch`] if the coins are of different
    /// assets, and [`CustodyError::Overflow`] if the sum exceeds `u64::MAX`.
    pub fn merge(&mut self, other: Coin) -> Result<()> {
        if self.asset != other.asset {
            return Err(CustodyError::AssetMismatch {
                expected: self.asset.clone(),
                found: other.asset,
            });
        }
        self.value = self
            .value
            .checked_add(other.value)
            .ok_or(CustodyError::Overflow)?;
        Ok(())
    }

    /// Splits off exactly `amount` into a new coin.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InsufficientFunds`] if `amount` exceeds the
    /// coin's value. The coin is left untouched in that case.
    pub fn extract(&mut self, amount: u64) -> Result<Coin> {
        if amount > self.value {
            return Err(CustodyError::InsufficientFunds {
                requested: amount,
                available: self.value,
            });
        }
        self.value -= amount;
        Ok(Coin {
            asset: self.asset.clone(),
            value: amount,
        })
    }
}

// ---------------------------------------------------------------------------
// CustodyObject
// ---------------------------------------------------------------------------

/// A discrete object held in an object custody ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyObject {
    /// Collection this object belongs to.
    pub kind: ObjectKind,
    /// Domain key identifying the object (or token class) within its kind.
    pub key: String,
    /// Units represented by this instance. Unique objects use 1.
    pub quantity: u64,
}

impl CustodyObject {
    /// Creates an object instance.
    pub fn new(kind: ObjectKind, key: impl Into<String>, quantity: u64) -> Self {
        Self {
            kind,
            key: key.into(),
            quantity,
        }
    }
}
