use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::journal::EntryKind;
use crate::ledger::accounts::{MarginBalance, MarginLock};
use crate::ledger::balance_manager::{BalanceManager, Mutation};
use crate::store::LedgerStore;
use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{TradeId, UserId};
use crate::types::timestamp::Timestamp;

/// Owner of the open-lock set. Creates and deletes `MarginLock` rows, but the
/// matching balance shift always goes through the `BalanceManager`, so the
/// sum of a user's open locks tracks that balance's `locked`.
///
/// The store has no multi-record transactions, so the lock row doubles as the
/// claim on its (user, asset, trade) tuple: `lock` inserts the row before the
/// balance shift and undoes it if the shift fails; `release` removes the row
/// first and reinstates it if the shift fails.
pub struct LockRegistry<S: LedgerStore> {
    store: Arc<S>,
    balances: Arc<BalanceManager<S>>,
}

impl<S: LedgerStore> LockRegistry<S> {
    pub fn new(store: Arc<S>, balances: Arc<BalanceManager<S>>) -> Self {
        LockRegistry { store, balances }
    }

    /// Pins `amount` of the user's available balance to `trade`. Fails with
    /// `InsufficientMargin` if the available balance cannot cover it, and
    /// with `LockExists` if the trade already holds an open lock.
    pub async fn lock(
        &self,
        user: UserId,
        asset: &AssetType,
        amount: Amount,
        trade: TradeId,
    ) -> Result<MarginBalance> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let row = MarginLock {
            user_id: user,
            asset: asset.clone(),
            trade_id: trade.clone(),
            amount: amount.clone(),
            created_at: Timestamp::now(),
        };
        self.store.insert_lock(row).await.map_err(|e| match e {
            Error::StoreConflict => Error::LockExists(trade.clone()),
            other => other,
        })?;

        let mutation = Mutation {
            kind: EntryKind::Lock,
            amount: -&amount,
            reference: trade.to_string(),
            description: "Margin locked".to_string(),
        };
        let result = self
            .balances
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
                        locked: &current.locked + &amount,
                        unrealized_pnl: current.unrealized_pnl.clone(),
                    })
                }
            })
            .await;

        if result.is_err() {
            if let Err(e) = self.store.delete_lock(&user, asset, &trade).await {
                warn!(
                    user = %user,
                    asset = %asset,
                    trade = %trade,
                    error = %e,
                    "could not remove lock row after aborted lock; row is orphaned"
                );
            }
        } else {
            info!(user = %user, asset = %asset, trade = %trade, amount = %amount, "margin locked");
        }
        result
    }

    /// Closes the lock for `trade` and settles it back to available balance.
    ///
    /// The credit is principal + pnl; the locked reduction is the principal
    /// alone. The asymmetry is deliberate: losses are charged against what
    /// the lock returns, never against the locked figure, so a loss deeper
    /// than the principal eats into available balance. A loss the account
    /// cannot absorb at all is rejected and leaves the lock open.
    pub async fn release(
        &self,
        user: UserId,
        asset: &AssetType,
        trade: &TradeId,
        pnl: Amount,
    ) -> Result<MarginBalance> {
        let Some(row) = self.store.delete_lock(&user, asset, trade).await? else {
            return Err(Error::LockNotFound(trade.clone()));
        };

        let principal = row.amount.clone();
        let return_amount = &principal + &pnl;
        let mutation = Mutation {
            kind: EntryKind::Release,
            amount: return_amount.clone(),
            reference: trade.to_string(),
            description: format!("Lock released, pnl {}", pnl),
        };
        let result = self
            .balances
            .update(user, asset, mutation, {
                let principal = principal.clone();
                let return_amount = return_amount.clone();
                move |current| {
                    let available = &current.available + &return_amount;
                    if available.is_negative() {
                        return Err(Error::InsufficientMargin {
                            required: -&return_amount,
                            available: current.available.clone(),
                        });
                    }
                    let locked = &current.locked - &principal;
                    if locked.is_negative() {
                        return Err(Error::InsufficientMargin {
                            required: principal.clone(),
                            available: current.locked.clone(),
                        });
                    }
                    Ok(MarginBalance {
                        user_id: current.user_id,
                        asset: current.asset.clone(),
                        available,
                        locked,
                        unrealized_pnl: current.unrealized_pnl.clone(),
                    })
                }
            })
            .await;

        if result.is_err() {
            // The release did not settle; the lock is still open.
            if let Err(e) = self.store.insert_lock(row).await {
                warn!(
                    user = %user,
                    asset = %asset,
                    trade = %trade,
                    error = %e,
                    "could not reinstate lock row after aborted release; open locks and locked balance disagree"
                );
            }
        } else {
            info!(user = %user, asset = %asset, trade = %trade, pnl = %pnl, "margin released");
        }
        result
    }

    /// Charges `amount` against the locked balance without touching available
    /// funds. Used for periodic fees (funding, borrow) held against a lock.
    pub async fn reduce_locked(
        &self,
        user: UserId,
        asset: &AssetType,
        amount: Amount,
    ) -> Result<MarginBalance> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let mutation = Mutation {
            kind: EntryKind::Fee,
            amount: -&amount,
            reference: "locked-charge".to_string(),
            description: "Charge against locked balance".to_string(),
        };
        self.balances
            .update(user, asset, mutation, move |current| {
                if current.locked < amount {
                    return Err(Error::InsufficientMargin {
                        required: amount.clone(),
                        available: current.locked.clone(),
                    });
                }
                Ok(MarginBalance {
                    user_id: current.user_id,
                    asset: current.asset.clone(),
                    available: current.available.clone(),
                    locked: &current.locked - &amount,
                    unrealized_pnl: current.unrealized_pnl.clone(),
                })
            })
            .await
    }

    /// Refunds `amount` to the locked balance without touching available
    /// funds. The inverse of `reduce_locked`.
    pub async fn add_locked(
        &self,
        user: UserId,
        asset: &AssetType,
        amount: Amount,
    ) -> Result<MarginBalance> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let mutation = Mutation {
            kind: EntryKind::Fee,
            amount: amount.clone(),
            reference: "locked-refund".to_string(),
            description: "Refund to locked balance".to_string(),
        };
        self.balances
            .update(user, asset, mutation, move |current| {
                Ok(MarginBalance {
                    user_id: current.user_id,
                    asset: current.asset.clone(),
                    available: current.available.clone(),
                    locked: &current.locked + &amount,
                    unrealized_pnl: current.unrealized_pnl.clone(),
                })
            })
            .await
    }

    /// Deducts a fee from the available balance, for charges not tied to any
    /// open lock.
    pub async fn deduct(
        &self,
        user: UserId,
        asset: &AssetType,
        amount: Amount,
    ) -> Result<MarginBalance> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let mutation = Mutation {
            kind: EntryKind::Fee,
            amount: -&amount,
            reference: "fee".to_string(),
            description: "Fee deducted".to_string(),
        };
        self.balances
            .update(user, asset, mutation, move |current| {
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
            })
            .await
    }

    pub async fn open_lock(
        &self,
        user: UserId,
        asset: &AssetType,
        trade: &TradeId,
    ) -> Result<Option<MarginLock>> {
        self.store.find_lock(&user, asset, trade).await
    }

    pub async fn open_locks(&self, user: UserId, asset: &AssetType) -> Result<Vec<MarginLock>> {
        self.store.locks_for(&user, asset).await
    }
}
