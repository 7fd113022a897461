use tracing::Span;

use crate::types::ids::{UserId, WithdrawalId};

pub fn deposit_span(user: &UserId, tx_hash: &str) -> Span {
    tracing::info_span!(
        "deposit",
        user = %user,
        tx_hash,
    )
}

pub fn withdrawal_span(op: &'static str, user: &UserId) -> Span {
    tracing::info_span!(
        "withdrawal",
        op,
        user = %user,
    )
}

pub fn withdrawal_span_for_id(op: &'static str, id: &WithdrawalId) -> Span {
    tracing::info_span!(
        "withdrawal",
        op,
        id = %id,
    )
}

/// Installs a fmt subscriber honoring `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
