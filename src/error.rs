use thiserror::Error;
use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{TradeId, WithdrawalId};
use crate::verifier::VerifyFailure;

#[derive(Error, Debug)]
pub enum Error {
    // Client errors
    #[error("Unsupported asset: {0}")]
    InvalidAsset(AssetType),

    #[error("Insufficient margin: required={required}, available={available}")]
    InsufficientMargin {
        required: Amount,
        available: Amount,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(TradeId),

    #[error("Lock already exists: {0}")]
    LockExists(TradeId),

    #[error("Invalid withdrawal: {0}")]
    InvalidWithdrawal(WithdrawalId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Deposit admission
    #[error("Deposit verification failed: {0}")]
    DepositVerificationFailed(VerifyFailure),

    // Store errors. StoreConflict is internal: the balance manager retries it
    // and surfaces RetriesExhausted once the bound is hit.
    #[error("Store write conflict")]
    StoreConflict,

    #[error("Store retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Store error: {0}")]
    StoreError(String),

    // System errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Client errors are caller mistakes: retrying with the same input cannot
    /// succeed. Everything else is transient or an operational fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidAsset(_)
                | Error::InsufficientMargin { .. }
                | Error::LockNotFound(_)
                | Error::LockExists(_)
                | Error::InvalidWithdrawal(_)
                | Error::InvalidAmount(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
