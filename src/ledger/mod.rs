pub mod accounts;
pub mod balance_manager;
pub mod locks;

pub use accounts::{MarginBalance, MarginLock};
pub use balance_manager::BalanceManager;
pub use locks::LockRegistry;
