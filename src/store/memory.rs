use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::journal::JournalEntry;
use crate::ledger::accounts::{MarginBalance, MarginLock};
use crate::store::{LedgerStore, VersionedBalance};
use crate::types::asset::AssetType;
use crate::types::ids::{TradeId, UserId, WithdrawalId};
use crate::workflows::withdrawal::{WithdrawalRecord, WithdrawalStatus};

type BalanceKey = (UserId, AssetType);
type LockKey = (UserId, AssetType, TradeId);

/// In-memory `LedgerStore`. The reference implementation for tests and
/// single-process embedders; durable backends implement the same contract.
#[derive(Default)]
pub struct MemoryStore {
    balances: DashMap<BalanceKey, (MarginBalance, u64)>,
    locks: DashMap<LockKey, MarginLock>,
    withdrawals: DashMap<WithdrawalId, WithdrawalRecord>,
    journal: RwLock<Vec<JournalEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_balance(
        &self,
        user: &UserId,
        asset: &AssetType,
    ) -> Result<Option<VersionedBalance>> {
        Ok(self
            .balances
            .get(&(*user, asset.clone()))
            .map(|entry| VersionedBalance {
                balance: entry.value().0.clone(),
                version: entry.value().1,
            }))
    }

    async fn store_balance(&self, balance: MarginBalance, expected: Option<u64>) -> Result<u64> {
        let key = (balance.user_id, balance.asset.clone());
        match self.balances.entry(key) {
            Entry::Vacant(slot) => match expected {
                None => {
                    slot.insert((balance, 1));
                    Ok(1)
                }
                Some(_) => Err(Error::StoreConflict),
            },
            Entry::Occupied(mut slot) => match expected {
                Some(version) if slot.get().1 == version => {
                    slot.insert((balance, version + 1));
                    Ok(version + 1)
                }
                _ => Err(Error::StoreConflict),
            },
        }
    }

    async fn find_lock(
        &self,
        user: &UserId,
        asset: &AssetType,
        trade: &TradeId,
    ) -> Result<Option<MarginLock>> {
        Ok(self
            .locks
            .get(&(*user, asset.clone(), trade.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn locks_for(&self, user: &UserId, asset: &AssetType) -> Result<Vec<MarginLock>> {
        Ok(self
            .locks
            .iter()
            .filter(|entry| entry.key().0 == *user && entry.key().1 == *asset)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_lock(&self, lock: MarginLock) -> Result<()> {
        let key = (lock.user_id, lock.asset.clone(), lock.trade_id.clone());
        match self.locks.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(lock);
                Ok(())
            }
            Entry::Occupied(_) => Err(Error::StoreConflict),
        }
    }

    async fn delete_lock(
        &self,
        user: &UserId,
        asset: &AssetType,
        trade: &TradeId,
    ) -> Result<Option<MarginLock>> {
        Ok(self
            .locks
            .remove(&(*user, asset.clone(), trade.clone()))
            .map(|(_, lock)| lock))
    }

    async fn insert_withdrawal(&self, record: WithdrawalRecord) -> Result<()> {
        match self.withdrawals.entry(record.id) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => Err(Error::StoreConflict),
        }
    }

    async fn find_withdrawal(&self, id: &WithdrawalId) -> Result<Option<WithdrawalRecord>> {
        Ok(self.withdrawals.get(id).map(|entry| entry.value().clone()))
    }

    async fn withdrawals_for(&self, user: &UserId) -> Result<Vec<WithdrawalRecord>> {
        let mut records: Vec<WithdrawalRecord> = self
            .withdrawals
            .iter()
            .filter(|entry| entry.value().user_id == *user)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    async fn update_withdrawal(
        &self,
        record: WithdrawalRecord,
        expected: WithdrawalStatus,
    ) -> Result<()> {
        match self.withdrawals.entry(record.id) {
            Entry::Occupied(mut slot) => {
                if slot.get().status != expected {
                    return Err(Error::StoreConflict);
                }
                slot.insert(record);
                Ok(())
            }
            Entry::Vacant(_) => Err(Error::StoreConflict),
        }
    }

    async fn append_journal(&self, entry: JournalEntry) -> Result<()> {
        self.journal
            .write()
            .map_err(|_| Error::StoreError("journal lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }

    async fn journal_for(&self, user: &UserId) -> Result<Vec<JournalEntry>> {
        Ok(self
            .journal
            .read()
            .map_err(|_| Error::StoreError("journal lock poisoned".to_string()))?
            .iter()
            .filter(|entry| entry.user_id == *user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::amount::Amount;
    use crate::types::timestamp::Timestamp;

    fn balance(user: UserId, available: &str) -> MarginBalance {
        MarginBalance {
            user_id: user,
            asset: AssetType::new("USDC"),
            available: Amount::parse(available).unwrap(),
            locked: Amount::zero(),
            unrealized_pnl: Amount::zero(),
        }
    }

    #[tokio::test]
    async fn balance_cas_rejects_stale_version() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let v1 = store.store_balance(balance(user, "10"), None).await.unwrap();
        assert_eq!(v1, 1);

        // Writing with the current version succeeds and bumps it.
        let v2 = store
            .store_balance(balance(user, "20"), Some(v1))
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // A writer holding the old version must lose.
        let stale = store.store_balance(balance(user, "30"), Some(v1)).await;
        assert!(matches!(stale, Err(Error::StoreConflict)));

        // Blind insert over an existing record must lose too.
        let blind = store.store_balance(balance(user, "40"), None).await;
        assert!(matches!(blind, Err(Error::StoreConflict)));

        let current = store
            .find_balance(&user, &AssetType::new("USDC"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.balance.available, Amount::parse("20").unwrap());
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn duplicate_lock_insert_conflicts() {
        let store = MemoryStore::new();
        let lock = MarginLock {
            user_id: UserId::new(),
            asset: AssetType::new("USDC"),
            trade_id: TradeId::from("trade-1"),
            amount: Amount::parse("5").unwrap(),
            created_at: Timestamp::now(),
        };

        store.insert_lock(lock.clone()).await.unwrap();
        assert!(matches!(
            store.insert_lock(lock.clone()).await,
            Err(Error::StoreConflict)
        ));

        let removed = store
            .delete_lock(&lock.user_id, &lock.asset, &lock.trade_id)
            .await
            .unwrap();
        assert_eq!(removed, Some(lock.clone()));

        // Second delete observes nothing.
        let gone = store
            .delete_lock(&lock.user_id, &lock.asset, &lock.trade_id)
            .await
            .unwrap();
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn withdrawal_update_is_conditional_on_status() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut record = WithdrawalRecord::new(
            user,
            Amount::parse("30").unwrap(),
            AssetType::new("USDC"),
            "dest-addr".to_string(),
        );
        store.insert_withdrawal(record.clone()).await.unwrap();

        record.status = WithdrawalStatus::Completed;
        store
            .update_withdrawal(record.clone(), WithdrawalStatus::Pending)
            .await
            .unwrap();

        // Record is no longer pending, so a second transition loses.
        let again = store
            .update_withdrawal(record.clone(), WithdrawalStatus::Pending)
            .await;
        assert!(matches!(again, Err(Error::StoreConflict)));
    }
}
