//! # Key-Value Tables
//!
//! The custody engine stores everything in [`Table`]s: ordered maps with the
//! strict contract of the host's persistent key-value store.
//!
//! | call          | on success           | on failure                       |
//! |---------------|----------------------|----------------------------------|
//! | `add`         | inserts              | `DuplicateKey` if key present    |
//! | `borrow`      | shared reference     | `NotFound` if key absent         |
//! | `borrow_mut`  | mutable reference    | `NotFound` if key absent         |
//! | `remove`      | returns the value    | `NotFound` if key absent         |
//!
//! Nothing is upserted silently. Callers that want "replace" semantics remove
//! first and add second, which keeps every overwrite visible in the code.
//!
//! Keys are kept in a `BTreeMap` so iteration (and therefore snapshots) is
//! deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Record, Result};

/// An ordered key-value table that names the [`Record`] it stores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table<K: Ord, V> {
    record: Record,
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V> Table<K, V> {
    /// Creates an empty table holding records of the given kind.
    pub fn new(record: Record) -> Self {
        Self {
            record,
            entries: BTreeMap::new(),
        }
    }

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::DuplicateKey`] if the key is already present.
    /// The existing value is left untouched.
    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(CustodyError::DuplicateKey(self.record));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Returns `true` if the key is present.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Borrows the value stored under `key`.
    pub fn borrow(&self, key: &K) -> Result<&V> {
        self.entries
            .get(key)
            .ok_or(CustodyError::NotFound(self.record))
    }

    /// Mutably borrows the value stored under `key`.
    pub fn borrow_mut(&mut self, key: &K) -> Result<&mut V> {
        self.entries
            .get_mut(key)
            .ok_or(CustodyError::NotFound(self.record))
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &K) -> Result<V> {
        self.entries
            .remove(key)
            .ok_or(CustodyError::NotFound(self.record))
    }

    /// Like [`borrow`](Self::borrow) but returns `None` for an absent key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
