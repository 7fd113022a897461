use async_trait::async_trait;

use crate::error::Result;
use crate::journal::JournalEntry;
use crate::ledger::accounts::{MarginBalance, MarginLock};
use crate::types::asset::AssetType;
use crate::types::ids::{TradeId, UserId, WithdrawalId};
use crate::workflows::withdrawal::{WithdrawalRecord, WithdrawalStatus};

pub mod memory;

/// A balance record together with its store version. Versions increase by one
/// on every successful write and are the optimistic-concurrency token.
#[derive(Clone, Debug)]
pub struct VersionedBalance {
    pub balance: MarginBalance,
    pub version: u64,
}

/// Durable record storage for the ledger.
///
/// The contract deliberately avoids multi-record transactions: each method is
/// atomic for a single record, nothing more. Write ordering and rollback for
/// multi-record updates are the callers' problem (see `LockRegistry`).
///
/// `store_balance` is a compare-and-swap: `expected` is the version observed
/// at read time (`None` for a record the reader did not find). A mismatch
/// fails with `Error::StoreConflict` and must leave the record untouched, so
/// at most one writer wins per version and losers retry from a fresh read.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn find_balance(
        &self,
        user: &UserId,
        asset: &AssetType,
    ) -> Result<Option<VersionedBalance>>;

    /// Returns the new version on success, `Error::StoreConflict` if the
    /// stored version differs from `expected`.
    async fn store_balance(&self, balance: MarginBalance, expected: Option<u64>) -> Result<u64>;

    async fn find_lock(
        &self,
        user: &UserId,
        asset: &AssetType,
        trade: &TradeId,
    ) -> Result<Option<MarginLock>>;

    async fn locks_for(&self, user: &UserId, asset: &AssetType) -> Result<Vec<MarginLock>>;

    /// Fails with `Error::StoreConflict` if a lock for the same
    /// (user, asset, trade) tuple already exists.
    async fn insert_lock(&self, lock: MarginLock) -> Result<()>;

    /// Removes and returns the lock, `None` if it was not present. The removal
    /// is atomic: of two concurrent deletes, exactly one observes the lock.
    async fn delete_lock(
        &self,
        user: &UserId,
        asset: &AssetType,
        trade: &TradeId,
    ) -> Result<Option<MarginLock>>;

    async fn insert_withdrawal(&self, record: WithdrawalRecord) -> Result<()>;

    async fn find_withdrawal(&self, id: &WithdrawalId) -> Result<Option<WithdrawalRecord>>;

    async fn withdrawals_for(&self, user: &UserId) -> Result<Vec<WithdrawalRecord>>;

    /// Conditional overwrite: applies only while the stored record still has
    /// status `expected`, otherwise fails with `Error::StoreConflict`. This is
    /// what makes a withdrawal transition winner-take-all.
    async fn update_withdrawal(
        &self,
        record: WithdrawalRecord,
        expected: WithdrawalStatus,
    ) -> Result<()>;

    async fn append_journal(&self, entry: JournalEntry) -> Result<()>;

    async fn journal_for(&self, user: &UserId) -> Result<Vec<JournalEntry>>;
}
