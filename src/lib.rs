//! Client side ledger for an eon based off-chain payment hub.
//!
//! [`network::Synchronizer`] keeps one websocket to the operator and feeds
//! per (token, wallet) queues, an [`applier::Applier`] folds each queue into
//! a [`wallet::WalletState`], and [`ledger::Ledger`] derives the balance and
//! the active state hash the wallet owner signs.

pub mod applier;
pub mod config;
pub mod eon;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod merkle;
pub mod network;
pub mod operator;
pub mod serde_helpers;
pub mod storage;
pub mod transfer;
pub mod wallet;

pub use error::{LedgerError, OperatorError, SyncError};
pub use network::{ConnectionState, SyncConfig, SyncHandle, Synchronizer};
pub use wallet::WalletState;
