use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{Result, StratumError, TxnId};

use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState};

/// TransactionManager creates and tracks transactions and owns the
/// commit/abort paths. Releasing a transaction's locks on either path is
/// what ultimately clears its requests out of the lock manager's queues.
pub struct TransactionManager {
    /// Next transaction ID to assign
    next_txn_id: AtomicU32,
    /// Active transactions
    transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a new transaction in the GROWING state.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let txn = Arc::new(Transaction::new(id, isolation_level));
        self.transactions.lock().insert(id, Arc::clone(&txn));
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.transactions.lock().get(&txn_id).cloned()
    }

    /// Commits: releases every held lock (rows before their tables) and
    /// transitions to COMMITTED.
    pub fn commit(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) -> Result<()> {
        if txn.state() == TransactionState::Aborted {
            return Err(StratumError::TransactionAborted(txn.id()));
        }
        self.release_all_locks(txn, lock_manager)?;
        txn.set_state(TransactionState::Committed);
        self.transactions.lock().remove(&txn.id());
        Ok(())
    }

    /// Aborts: the rollback path. Undoing tuple changes is the
    /// executor's business; here we release every held lock, which also
    /// wakes anything queued behind the dead transaction.
    pub fn abort(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) -> Result<()> {
        debug!("rolling back {}", txn.id());
        txn.set_state(TransactionState::Aborted);
        self.release_all_locks(txn, lock_manager)?;
        self.transactions.lock().remove(&txn.id());
        Ok(())
    }

    fn release_all_locks(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) -> Result<()> {
        for (oid, rid, _mode) in txn.held_row_locks() {
            lock_manager.unlock_row(txn, oid, rid)?;
        }
        for (oid, _mode) in txn.held_table_locks() {
            lock_manager.unlock_table(txn, oid)?;
        }
        Ok(())
    }
}
