use std::sync::Arc;
use tokio::time::timeout;
use tracing::{Instrument, info, warn};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::journal::EntryKind;
use crate::ledger::accounts::MarginBalance;
use crate::ledger::balance_manager::{BalanceManager, Mutation};
use crate::observability;
use crate::store::LedgerStore;
use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::UserId;
use crate::verifier::{DepositVerifier, VerifyFailure};

/// Deposit admission: credit collateral only after the on-chain transfer is
/// independently confirmed. The verifier call is awaited under a configured
/// timeout and holds no balance scope; the account is touched only after a
/// positive verdict.
pub struct DepositWorkflow<S: LedgerStore, V: DepositVerifier> {
    balances: Arc<BalanceManager<S>>,
    verifier: Arc<V>,
    config: Arc<LedgerConfig>,
}

impl<S: LedgerStore, V: DepositVerifier> DepositWorkflow<S, V> {
    pub fn new(balances: Arc<BalanceManager<S>>, verifier: Arc<V>, config: Arc<LedgerConfig>) -> Self {
        DepositWorkflow { balances, verifier, config }
    }

    pub async fn deposit_margin(
        &self,
        user: UserId,
        sender_address: &str,
        amount: Amount,
        asset: &AssetType,
        tx_hash: &str,
    ) -> Result<MarginBalance> {
        let span = observability::tracing::deposit_span(&user, tx_hash);
        self.deposit_inner(user, sender_address, amount, asset, tx_hash)
            .instrument(span)
            .await
    }

    async fn deposit_inner(
        &self,
        user: UserId,
        sender_address: &str,
        amount: Amount,
        asset: &AssetType,
        tx_hash: &str,
    ) -> Result<MarginBalance> {
        if !self.config.is_supported(asset) {
            return Err(Error::InvalidAsset(asset.clone()));
        }
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }

        let verdict = timeout(
            self.config.verify_timeout(),
            self.verifier.verify(sender_address, tx_hash, &amount, asset),
        )
        .await;
        match verdict {
            Err(_elapsed) => {
                // Un-applied and safely retryable with the same tx hash.
                warn!(user = %user, tx_hash, "deposit verification timed out");
                return Err(Error::DepositVerificationFailed(VerifyFailure::Timeout));
            }
            Ok(Err(reason)) => {
                warn!(user = %user, tx_hash, %reason, "deposit verification failed");
                return Err(Error::DepositVerificationFailed(reason));
            }
            Ok(Ok(())) => {}
        }

        let mutation = Mutation {
            kind: EntryKind::Deposit,
            amount: amount.clone(),
            reference: tx_hash.to_string(),
            description: "On-chain deposit".to_string(),
        };
        let balance = self
            .balances
            .update(user, asset, mutation, move |current| {
                Ok(MarginBalance {
                    user_id: current.user_id,
                    asset: current.asset.clone(),
                    available: &current.available + &amount,
                    locked: current.locked.clone(),
                    unrealized_pnl: current.unrealized_pnl.clone(),
                })
            })
            .await?;

        info!(user = %user, tx_hash, "deposit credited");
        Ok(balance)
    }
}
