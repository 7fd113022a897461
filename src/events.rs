use serde::{Deserialize, Serialize};

use crate::types::ids::{EventId, UserId};
use crate::types::timestamp::Timestamp;

/// Emitted after every acknowledged balance mutation for a user. Carries no
/// amounts: subscribers re-read the balances they care about, so a dropped
/// event costs a refresh, never correctness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub event_id: EventId,
    pub user_id: UserId,
    pub timestamp: Timestamp,
}

impl BalanceChanged {
    pub fn new(user_id: UserId) -> Self {
        BalanceChanged {
            event_id: EventId::new(),
            user_id,
            timestamp: Timestamp::now(),
        }
    }
}
