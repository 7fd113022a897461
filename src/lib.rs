//! Custodial margin ledger: per-user, per-asset collateral with verified
//! deposit admission and an auditable withdrawal state machine.
//!
//! The crate owns the balance/lock/withdrawal invariants and nothing else.
//! Storage, on-chain verification, and update fan-out sit behind the
//! `LedgerStore`, `DepositVerifier`, and `NotificationSink` traits, so the
//! surrounding service wires in its own backends.

pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod ledger;
pub mod notify;
pub mod observability;
pub mod store;
pub mod types;
pub mod verifier;
pub mod workflows;

pub use crate::config::LedgerConfig;
pub use crate::error::{Error, Result};
pub use crate::ledger::{BalanceManager, LockRegistry, MarginBalance, MarginLock};
pub use crate::notify::{BroadcastSink, NotificationSink, NullSink};
pub use crate::store::{LedgerStore, memory::MemoryStore};
pub use crate::types::amount::Amount;
pub use crate::types::asset::AssetType;
pub use crate::types::ids::{TradeId, UserId, WithdrawalId};
pub use crate::verifier::{DepositVerifier, VerifyFailure};
pub use crate::workflows::{DepositWorkflow, WithdrawalRecord, WithdrawalStatus, WithdrawalWorkflow};
