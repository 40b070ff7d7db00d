pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

pub use lock_manager::LockManager;
pub use transaction::{IsolationLevel, LockMode, Transaction, TransactionState};
pub use transaction_manager::TransactionManager;
