// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Quorum Custody
//!
//! A multisignature custody engine. A group of participants shares a vault
//! holding fungible balances and discrete objects, and nothing leaves the
//! vault unless enough of them vote for it.
//!
//! ## How a withdrawal happens
//!
//! 1. A participant opens a **proposal** on the vault. It may carry
//!    membership changes and opaque messages.
//! 2. While the proposal is a draft, its creator attaches **withdrawal
//!    requests**.
//! 3. The creator **posts** the proposal. Requests freeze, voting opens, and
//!    an [`AuthToken`] is minted.
//! 4. Participants **vote**. Approval votes reaching the vault's approval
//!    threshold make the proposal executable; cancellation votes reaching the
//!    cancellation threshold block it for good.
//! 5. Requests are **redeemed**: direct transfers by anyone, token pulls by
//!    whoever holds the token. Each request pays out exactly once.
//!
//! ## Modules
//!
//! - **types**: identifiers, [`Coin`] and [`CustodyObject`].
//! - **storage**: the fail-on-duplicate / fail-on-missing key-value table.
//! - **registry**: root identity and enabled asset types.
//! - **participants**: per-vault membership.
//! - **ledger**: per-asset balances and per-kind object slots.
//! - **proposal**: proposal state and vote tallying.
//! - **withdrawal**: requests, auth tokens and the request registry.
//! - **transfer**: the primitive that pays recipients outside custody.
//! - **engine**: [`CustodyEngine`], the entry point for every operation.
//! - **config** / **logging**: constants, file config, tracing setup.
//!
//! ## Example
//!
//! ```
//! use quorum_custody::{
//!     Address, AssetId, Coin, CustodyEngine, InMemoryTransfers, ProposalPayload,
//! };
//!
//! let root = Address::derive("root");
//! let (alice, bob) = (Address::derive("alice"), Address::derive("bob"));
//! let usd = AssetId::new("USD");
//!
//! let engine = CustodyEngine::new(InMemoryTransfers::new());
//! engine.initialize(root).unwrap();
//! engine.enable_deposits(&root, usd.clone()).unwrap();
//!
//! let vault = engine.create_vault(&[alice, bob], 2, 2).unwrap();
//! engine.deposit(vault, Coin::new(usd.clone(), 100)).unwrap();
//!
//! let proposal = engine.create_proposal(&alice, &vault, ProposalPayload::new()).unwrap();
//! engine.request_authed_amount(&alice, &vault, proposal, &usd, 30).unwrap();
//! let token = engine.post_proposal(&alice, &vault, proposal).unwrap();
//!
//! engine.cast_vote(&alice, &vault, proposal, true).unwrap();
//! engine.cast_vote(&bob, &vault, proposal, true).unwrap();
//!
//! let coin = engine.withdraw(token, &usd).unwrap();
//! assert_eq!(coin.value(), 30);
//! assert_eq!(engine.balance(&vault, &usd).unwrap(), 70);
//! assert!(engine.withdraw(token, &usd).is_err());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod participants;
pub mod proposal;
pub mod registry;
pub mod storage;
pub mod transfer;
pub mod types;
pub mod withdrawal;

pub use config::{ConfigError, CustodyConfig};
pub use engine::{Authority, CustodyEngine, ObjectTransferReceipt, VaultInfo};
pub use error::{CustodyError, Denied, Record, Result, StateViolation};
pub use logging::{init_logging, try_init_logging, LogFormat, LoggingError};
pub use proposal::{Proposal, ProposalPayload, ProposalState};
pub use transfer::{InMemoryTransfers, TransferPrimitive};
pub use types::{Address, AssetId, Coin, CustodyObject, ObjectKind, ProposalId, VaultId};
pub use withdrawal::{AuthToken, PendingWithdrawalRequest, RequestKind};
