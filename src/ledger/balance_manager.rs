use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::journal::{EntryKind, JournalEntry};
use crate::ledger::accounts::MarginBalance;
use crate::notify::NotificationSink;
use crate::store::LedgerStore;
use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{EntryId, UserId};
use crate::types::timestamp::Timestamp;

/// Journal context attached to a balance mutation.
pub(crate) struct Mutation {
    pub kind: EntryKind,
    pub amount: Amount,  // Signed: positive credits the account, negative debits it
    pub reference: String,
    pub description: String,
}

/// Sole owner of `MarginBalance` mutation. Every higher-level operation
/// computes a full new (available, locked, pnl) triple from a fresh read and
/// writes it through here; no field-level partial update exists, so no
/// concurrent dimension can be silently dropped.
///
/// Concurrency: optimistic versioned writes. The closure is re-applied to a
/// fresh snapshot on every `StoreConflict`, up to the configured bound, so at
/// most one writer wins per version and losers never overwrite blindly.
pub struct BalanceManager<S: LedgerStore> {
    store: Arc<S>,
    sink: Arc<dyn NotificationSink>,
    config: Arc<LedgerConfig>,
}

impl<S: LedgerStore> BalanceManager<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn NotificationSink>, config: Arc<LedgerConfig>) -> Self {
        BalanceManager { store, sink, config }
    }

    /// Returns the stored record, or an implicit zero-valued one. Never fails
    /// on a missing record: balances exist lazily.
    pub async fn balance(&self, user: UserId, asset: &AssetType) -> Result<MarginBalance> {
        Ok(self
            .store
            .find_balance(&user, asset)
            .await?
            .map(|versioned| versioned.balance)
            .unwrap_or_else(|| MarginBalance::empty(user, asset.clone())))
    }

    /// Unconditional overwrite of the full triple, creating the record if
    /// absent. Rejects negative available or locked outright.
    pub async fn set_balance(
        &self,
        user: UserId,
        asset: &AssetType,
        available: Amount,
        locked: Amount,
        unrealized_pnl: Amount,
    ) -> Result<MarginBalance> {
        if available.is_negative() || locked.is_negative() {
            return Err(Error::InvalidAmount(format!(
                "negative balance: available={}, locked={}",
                available, locked
            )));
        }

        let mutation = Mutation {
            kind: EntryKind::Adjustment,
            amount: Amount::zero(),
            reference: "adjustment".to_string(),
            description: "Balance overwrite".to_string(),
        };
        self.update(user, asset, mutation, move |current| {
            Ok(MarginBalance {
                user_id: current.user_id,
                asset: current.asset.clone(),
                available: available.clone(),
                locked: locked.clone(),
                unrealized_pnl: unrealized_pnl.clone(),
            })
        })
        .await
    }

    /// Audit trail for one user, in append order.
    pub async fn journal(&self, user: UserId) -> Result<Vec<JournalEntry>> {
        self.store.journal_for(&user).await
    }

    /// Read-compute-write with bounded optimistic retry. On success the
    /// journal entry and the balance-changed notification are emitted, in
    /// that order, only after the store acknowledged the write.
    pub(crate) async fn update<F>(
        &self,
        user: UserId,
        asset: &AssetType,
        mutation: Mutation,
        apply: F,
    ) -> Result<MarginBalance>
    where
        F: Fn(&MarginBalance) -> Result<MarginBalance>,
    {
        let attempts = self.config.max_store_retries.max(1);
        for attempt in 0..attempts {
            let (snapshot, expected) = match self.store.find_balance(&user, asset).await? {
                Some(versioned) => (versioned.balance, Some(versioned.version)),
                None => (MarginBalance::empty(user, asset.clone()), None),
            };

            let next = apply(&snapshot)?;
            debug_assert!(!next.available.is_negative());
            debug_assert!(!next.locked.is_negative());

            match self.store.store_balance(next.clone(), expected).await {
                Ok(_) => {
                    self.record_entry(&mutation, &next).await?;
                    self.sink.notify_balance_changed(user);
                    return Ok(next);
                }
                Err(Error::StoreConflict) => {
                    debug!(user = %user, asset = %asset, attempt, "balance write conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(user = %user, asset = %asset, attempts, "balance update lost every retry");
        Err(Error::RetriesExhausted { attempts })
    }

    async fn record_entry(&self, mutation: &Mutation, after: &MarginBalance) -> Result<()> {
        self.store
            .append_journal(JournalEntry {
                entry_id: EntryId::new(),
                timestamp: Timestamp::now(),
                kind: mutation.kind,
                user_id: after.user_id,
                asset: after.asset.clone(),
                amount: mutation.amount.clone(),
                available_after: after.available.clone(),
                locked_after: after.locked.clone(),
                reference: mutation.reference.clone(),
                description: mutation.description.clone(),
            })
            .await
    }
}
