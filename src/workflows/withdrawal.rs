use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, info, warn};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::journal::EntryKind;
use crate::ledger::accounts::MarginBalance;
use crate::ledger::balance_manager::{BalanceManager, Mutation};
use crate::notify::NotificationSink;
use crate::observability;
use crate::store::LedgerStore;
use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{UserId, WithdrawalId};
use crate::types::timestamp::Timestamp;

/// Withdrawal lifecycle. Only `Pending` has outgoing transitions;
/// `Processing` is a reservation slot for an operator-driven payout and
/// `Completed`/`Rejected` are terminal and immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: Amount,
    pub asset: AssetType,
    pub destination_address: String,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub processing_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WithdrawalRecord {
    pub fn new(
        user_id: UserId,
        amount: Amount,
        asset: AssetType,
        destination_address: String,
    ) -> Self {
        let now = Timestamp::now();
        WithdrawalRecord {
            id: WithdrawalId::new(),
            user_id,
            amount,
            asset,
            destination_address,
            status: WithdrawalStatus::Pending,
            tx_hash: None,
            processing_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Withdrawal workflow: reserve at request time, settle or refund at the
/// terminal transition. Funds leave the available balance the moment the
/// request is accepted, so a pending withdrawal can never be double-spent by
/// a concurrent lock or second withdrawal.
pub struct WithdrawalWorkflow<S: LedgerStore> {
    store: Arc<S>,
    balances: Arc<BalanceManager<S>>,
    sink: Arc<dyn NotificationSink>,
    config: Arc<LedgerConfig>,
}

impl<S: LedgerStore> WithdrawalWorkflow<S> {
    pub fn new(
        store: Arc<S>,
        balances: Arc<BalanceManager<S>>,
        sink: Arc<dyn NotificationSink>,
        config: Arc<LedgerConfig>,
    ) -> Self {
        WithdrawalWorkflow { store, balances, sink, config }
    }

    pub async fn request_withdrawal(
        &self,
        user: UserId,
        amount: Amount,
        asset: &AssetType,
        destination_address: String,
    ) -> Result<WithdrawalRecord> {
        let span = observability::tracing::withdrawal_span("request", &user);
        self.request_inner(user, amount, asset, destination_address)
            .instrument(span)
            .await
    }

    async fn request_inner(
        &self,
        user: UserId,
        amount: Amount,
        asset: &AssetType,
        destination_address: String,
    ) -> Result<WithdrawalRecord> {
        if !self.config.is_supported(asset) {
            return Err(Error::InvalidAsset(asset.clone()));
        }
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let record = WithdrawalRecord::new(user, amount.clone(), asset.clone(), destination_address);

        // Reserve first: the debit happens at request time, not at approval.
        let mutation = Mutation {
            kind: EntryKind::Withdrawal,
            amount: -&amount,
            reference: record.id.to_string(),
            description: "Withdrawal reserved".to_string(),
        };
        self.balances
            .update(user, asset, mutation, {
                let amount = amount.clone();
                move |current| {
                    if current.available < amount {
                        return Err(Error::InsufficientMargin {
                            required: amount.clone(),
                            available: current.available.clone(),
                        });
                    }
                    Ok(MarginBalance {
                        user_id: current.user_id,
                        asset: current.asset.clone(),
                        available: &current.available - &amount,
                        locked: current.locked.clone(),
                        unrealized_pnl: current.unrealized_pnl.clone(),
                    })
                }
            })
            .await?;

        if let Err(e) = self.store.insert_withdrawal(record.clone()).await {
            // Record never landed; hand the reservation back.
            self.refund(&record, "withdrawal record insert failed").await?;
            return Err(match e {
                Error::StoreConflict => Error::StoreError("withdrawal id collision".to_string()),
                other => other,
            });
        }

        info!(user = %user, id = %record.id, amount = %amount, "withdrawal requested");
        Ok(record)
    }

    /// Marks a pending withdrawal as paid out on-chain. Balances are not
    /// touched: the debit already happened at request time, this only records
    /// that the funds left the system.
    pub async fn process_withdrawal(
        &self,
        id: WithdrawalId,
        tx_hash: String,
    ) -> Result<WithdrawalRecord> {
        let span = observability::tracing::withdrawal_span_for_id("process", &id);
        async {
            let mut record = self.pending(&id).await?;
            record.status = WithdrawalStatus::Completed;
            record.tx_hash = Some(tx_hash);
            record.updated_at = Timestamp::now();

            self.transition(record.clone()).await?;
            self.sink.notify_balance_changed(record.user_id);
            info!(id = %id, user = %record.user_id, "withdrawal completed");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Rejects a pending withdrawal and returns the reserved funds.
    pub async fn reject_withdrawal(&self, id: WithdrawalId, reason: &str) -> Result<WithdrawalRecord> {
        let span = observability::tracing::withdrawal_span_for_id("reject", &id);
        async {
            let mut record = self.pending(&id).await?;
            record.status = WithdrawalStatus::Rejected;
            record.processing_notes = Some(reason.to_string());
            record.updated_at = Timestamp::now();

            // Claim the transition before crediting, so two concurrent rejects
            // cannot both refund.
            self.transition(record.clone()).await?;
            if let Err(refund_err) = self.refund(&record, reason).await {
                // The reserved amount is still debited. Hand the record back
                // to Pending so the reject can be retried once the store
                // recovers.
                let mut revert = record.clone();
                revert.status = WithdrawalStatus::Pending;
                revert.processing_notes = None;
                revert.updated_at = Timestamp::now();
                if let Err(e) = self
                    .store
                    .update_withdrawal(revert, WithdrawalStatus::Rejected)
                    .await
                {
                    warn!(
                        id = %id,
                        user = %record.user_id,
                        amount = %record.amount,
                        error = %e,
                        "refund and revert both failed; reserved amount stranded"
                    );
                }
                return Err(refund_err);
            }
            info!(id = %id, user = %record.user_id, reason, "withdrawal rejected");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    pub async fn withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRecord>> {
        self.store.find_withdrawal(&id).await
    }

    pub async fn withdrawals_for(&self, user: UserId) -> Result<Vec<WithdrawalRecord>> {
        self.store.withdrawals_for(&user).await
    }

    async fn pending(&self, id: &WithdrawalId) -> Result<WithdrawalRecord> {
        let record = self
            .store
            .find_withdrawal(id)
            .await?
            .ok_or(Error::InvalidWithdrawal(*id))?;
        if record.status != WithdrawalStatus::Pending {
            return Err(Error::InvalidWithdrawal(*id));
        }
        Ok(record)
    }

    async fn transition(&self, record: WithdrawalRecord) -> Result<()> {
        let id = record.id;
        self.store
            .update_withdrawal(record, WithdrawalStatus::Pending)
            .await
            .map_err(|e| match e {
                // Lost the race: someone else already transitioned it.
                Error::StoreConflict => Error::InvalidWithdrawal(id),
                other => other,
            })
    }

    async fn refund(&self, record: &WithdrawalRecord, reason: &str) -> Result<()> {
        let amount = record.amount.clone();
        let mutation = Mutation {
            kind: EntryKind::WithdrawalRefund,
            amount: amount.clone(),
            reference: record.id.to_string(),
            description: format!("Withdrawal refund: {}", reason),
        };
        self.balances
            .update(record.user_id, &record.asset, mutation, move |current| {
                Ok(MarginBalance {
                    user_id: current.user_id,
                    asset: current.asset.clone(),
                    available: &current.available + &amount,
                    locked: current.locked.clone(),
                    unrealized_pnl: current.unrealized_pnl.clone(),
                })
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalEntry;
    use crate::ledger::accounts::MarginLock;
    use crate::notify::NullSink;
    use crate::store::memory::MemoryStore;
    use crate::store::VersionedBalance;
    use crate::types::ids::TradeId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// MemoryStore wrapper whose balance writes can be switched off, to drive
    /// the workflow's failure paths.
    struct FlakyStore {
        inner: MemoryStore,
        fail_balance_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            FlakyStore {
                inner: MemoryStore::new(),
                fail_balance_writes: AtomicBool::new(false),
            }
        }

        fn fail_balance_writes(&self, fail: bool) {
            self.fail_balance_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn find_balance(
            &self,
            user: &UserId,
            asset: &AssetType,
        ) -> Result<Option<VersionedBalance>> {
            self.inner.find_balance(user, asset).await
        }

        async fn store_balance(
            &self,
            balance: MarginBalance,
            expected: Option<u64>,
        ) -> Result<u64> {
            if self.fail_balance_writes.load(Ordering::SeqCst) {
                return Err(Error::StoreConflict);
            }
            self.inner.store_balance(balance, expected).await
        }

        async fn find_lock(
            &self,
            user: &UserId,
            asset: &AssetType,
            trade: &TradeId,
        ) -> Result<Option<MarginLock>> {
            self.inner.find_lock(user, asset, trade).await
        }

        async fn locks_for(&self, user: &UserId, asset: &AssetType) -> Result<Vec<MarginLock>> {
            self.inner.locks_for(user, asset).await
        }

        async fn insert_lock(&self, lock: MarginLock) -> Result<()> {
            self.inner.insert_lock(lock).await
        }

        async fn delete_lock(
            &self,
            user: &UserId,
            asset: &AssetType,
            trade: &TradeId,
        ) -> Result<Option<MarginLock>> {
            self.inner.delete_lock(user, asset, trade).await
        }

        async fn insert_withdrawal(&self, record: WithdrawalRecord) -> Result<()> {
            self.inner.insert_withdrawal(record).await
        }

        async fn find_withdrawal(&self, id: &WithdrawalId) -> Result<Option<WithdrawalRecord>> {
            self.inner.find_withdrawal(id).await
        }

        async fn withdrawals_for(&self, user: &UserId) -> Result<Vec<WithdrawalRecord>> {
            self.inner.withdrawals_for(user).await
        }

        async fn update_withdrawal(
            &self,
            record: WithdrawalRecord,
            expected: WithdrawalStatus,
        ) -> Result<()> {
            self.inner.update_withdrawal(record, expected).await
        }

        async fn append_journal(&self, entry: JournalEntry) -> Result<()> {
            self.inner.append_journal(entry).await
        }

        async fn journal_for(&self, user: &UserId) -> Result<Vec<JournalEntry>> {
            self.inner.journal_for(user).await
        }
    }

    fn workflow() -> (
        Arc<BalanceManager<MemoryStore>>,
        WithdrawalWorkflow<MemoryStore>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(LedgerConfig::default());
        let sink: Arc<dyn NotificationSink> = Arc::new(NullSink);
        let balances = Arc::new(BalanceManager::new(store.clone(), sink.clone(), config.clone()));
        let workflow = WithdrawalWorkflow::new(store, balances.clone(), sink, config);
        (balances, workflow)
    }

    fn usdc() -> AssetType {
        AssetType::new("USDC")
    }

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    async fn fund(balances: &BalanceManager<MemoryStore>, user: UserId, available: &str) {
        balances
            .set_balance(user, &usdc(), amt(available), Amount::zero(), Amount::zero())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn request_reserves_funds_immediately() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let record = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await
            .unwrap();
        assert_eq!(record.status, WithdrawalStatus::Pending);

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("70"));
    }

    #[tokio::test]
    async fn reject_restores_the_reserved_amount_exactly() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let record = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await
            .unwrap();
        let rejected = workflow
            .reject_withdrawal(record.id, "bad address")
            .await
            .unwrap();

        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(rejected.processing_notes.as_deref(), Some("bad address"));

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("100"));
    }

    #[tokio::test]
    async fn process_completes_without_touching_balances() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let record = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await
            .unwrap();
        let completed = workflow
            .process_withdrawal(record.id, "0xdeadbeef".to_string())
            .await
            .unwrap();

        assert_eq!(completed.status, WithdrawalStatus::Completed);
        assert_eq!(completed.tx_hash.as_deref(), Some("0xdeadbeef"));

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("70"));
    }

    #[tokio::test]
    async fn unsupported_asset_is_rejected() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let result = workflow
            .request_withdrawal(user, amt("1"), &AssetType::new("DOGE"), "addr".to_string())
            .await;
        assert!(matches!(result, Err(Error::InvalidAsset(_))));
    }

    #[tokio::test]
    async fn insufficient_available_is_rejected() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "10").await;

        let result = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await;
        assert!(matches!(result, Err(Error::InsufficientMargin { .. })));

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("10"));
    }

    #[tokio::test]
    async fn terminal_records_cannot_transition_again() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let record = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await
            .unwrap();
        workflow
            .process_withdrawal(record.id, "0xabc".to_string())
            .await
            .unwrap();

        // Double-process and reject-after-process both fail and leave the
        // balance alone.
        let again = workflow.process_withdrawal(record.id, "0xdef".to_string()).await;
        assert!(matches!(again, Err(Error::InvalidWithdrawal(_))));
        let reject = workflow.reject_withdrawal(record.id, "late").await;
        assert!(matches!(reject, Err(Error::InvalidWithdrawal(_))));

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("70"));

        let stored = workflow.withdrawal(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Completed);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn unknown_id_is_invalid() {
        let (_, workflow) = workflow();
        let result = workflow
            .process_withdrawal(WithdrawalId::new(), "0x".to_string())
            .await;
        assert!(matches!(result, Err(Error::InvalidWithdrawal(_))));
    }

    #[tokio::test]
    async fn listing_returns_user_requests_in_order() {
        let (balances, workflow) = workflow();
        let user = UserId::new();
        fund(&balances, user, "100").await;

        let first = workflow
            .request_withdrawal(user, amt("10"), &usdc(), "a".to_string())
            .await
            .unwrap();
        let second = workflow
            .request_withdrawal(user, amt("20"), &usdc(), "b".to_string())
            .await
            .unwrap();

        let listed = workflow.withdrawals_for(user).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn failed_refund_reverts_to_pending_so_reject_can_retry() {
        let store = Arc::new(FlakyStore::new());
        let config = Arc::new(LedgerConfig::default());
        let sink: Arc<dyn NotificationSink> = Arc::new(NullSink);
        let balances = Arc::new(BalanceManager::new(store.clone(), sink.clone(), config.clone()));
        let workflow = WithdrawalWorkflow::new(store.clone(), balances.clone(), sink, config);

        let user = UserId::new();
        balances
            .set_balance(user, &usdc(), amt("100"), Amount::zero(), Amount::zero())
            .await
            .unwrap();
        let record = workflow
            .request_withdrawal(user, amt("30"), &usdc(), "addr".to_string())
            .await
            .unwrap();

        // Refund cannot land while balance writes fail. The reject must not
        // leave the record terminally Rejected with the debit still applied.
        store.fail_balance_writes(true);
        let result = workflow.reject_withdrawal(record.id, "bad address").await;
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));

        let stored = workflow.withdrawal(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Pending);

        // Once the store recovers, the same reject succeeds and restores the
        // reserved amount.
        store.fail_balance_writes(false);
        let rejected = workflow
            .reject_withdrawal(record.id, "bad address")
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);

        let balance = balances.balance(user, &usdc()).await.unwrap();
        assert_eq!(balance.available, amt("100"));
    }
}
