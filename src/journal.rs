//! Append-only audit journal. Every balance mutation records one entry with
//! the post-mutation balances, so an operator can reconstruct any account's
//! history from the journal alone.

use serde::{Deserialize, Serialize};

use crate::types::amount::Amount;
use crate::types::asset::AssetType;
use crate::types::ids::{EntryId, UserId};
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: EntryId,
    pub timestamp: Timestamp,
    pub kind: EntryKind,
    pub user_id: UserId,
    pub asset: AssetType,
    pub amount: Amount,  // Signed: positive credits the account, negative debits it
    pub available_after: Amount,
    pub locked_after: Amount,
    pub reference: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    WithdrawalRefund,
    Lock,
    Release,
    Fee,
    Adjustment,
}
