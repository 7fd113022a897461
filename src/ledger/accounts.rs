use serde::{Deserialize, Serialize};

use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{TradeId, UserId};
use crate::types::timestamp::Timestamp;

/// Per-user, per-asset collateral record. `available` and `locked` are both
/// non-negative at all times; a negative value here is a programming error,
/// never a valid state. Created lazily at zero, never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarginBalance {
    pub user_id: UserId,
    pub asset: AssetType,
    pub available: Amount,
    pub locked: Amount,
    pub unrealized_pnl: Amount,
}

impl MarginBalance {
    pub fn empty(user_id: UserId, asset: AssetType) -> Self {
        MarginBalance {
            user_id,
            asset,
            available: Amount::zero(),
            locked: Amount::zero(),
            unrealized_pnl: Amount::zero(),
        }
    }

    pub fn total(&self) -> Amount {
        &self.available + &self.locked
    }
}

/// One open margin lock, pinning `amount` of a user's collateral to a trade.
/// At most one open lock exists per (user, asset, trade) tuple; the sum of a
/// user's open locks for an asset always equals that balance's `locked`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarginLock {
    pub user_id: UserId,
    pub asset: AssetType,
    pub trade_id: TradeId,
    pub amount: Amount,
    pub created_at: Timestamp,
}
