use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::amount::Amount;
use crate::types::asset::AssetType;

/// Why a claimed deposit did not check out. Each reason is reported
/// distinctly; callers and operators need to tell a typo'd amount from a
/// transaction that never landed.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyFailure {
    #[error("transaction not found")]
    NotFound,

    #[error("transaction failed on-chain")]
    Failed,

    #[error("sender does not match the depositor address")]
    SenderMismatch,

    #[error("recipient is not the protocol wallet")]
    RecipientMismatch,

    #[error("amount or asset does not match the claim")]
    AmountOrAssetMismatch,

    #[error("verification timed out")]
    Timeout,
}

/// Confirms that `sender_address` sent exactly `amount` of `asset` to the
/// protocol wallet in transaction `tx_hash`, successfully.
///
/// Treated as a slow, fallible oracle: calls are awaited under a configured
/// timeout and never hold any balance scope. The transaction hash is the
/// idempotency key: implementations must answer `Ok` at most once per hash
/// (consume-on-success), so a resubmitted hash cannot credit twice. Retrying
/// after a failure or timeout with the same hash is always safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositVerifier: Send + Sync {
    async fn verify(
        &self,
        sender_address: &str,
        tx_hash: &str,
        amount: &Amount,
        asset: &AssetType,
    ) -> Result<(), VerifyFailure>;
}
