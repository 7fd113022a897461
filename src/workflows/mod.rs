pub mod deposit;
pub mod withdrawal;

pub use deposit::DepositWorkflow;
pub use withdrawal::{WithdrawalRecord, WithdrawalStatus, WithdrawalWorkflow};
