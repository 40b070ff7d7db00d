use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::common::{RecordId, TableOid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

/// Hierarchical lock modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// Compatibility matrix: may `requested` be granted while `self` is
    /// held on the same object?
    pub fn is_compatible_with(self, requested: LockMode) -> bool {
        use LockMode::*;
        match (self, requested) {
            (IntentionShared, Exclusive) => false,
            (IntentionShared, _) => true,
            (IntentionExclusive, IntentionShared | IntentionExclusive) => true,
            (IntentionExclusive, _) => false,
            (Shared, IntentionShared | Shared) => true,
            (Shared, _) => false,
            (SharedIntentionExclusive, IntentionShared) => true,
            (SharedIntentionExclusive, _) => false,
            (Exclusive, _) => false,
        }
    }

    /// Upgrade matrix: IS -> {S, X, IX, SIX}, S -> {X, SIX},
    /// IX -> {X, SIX}, SIX -> {X}. X never upgrades.
    pub fn can_upgrade_to(self, target: LockMode) -> bool {
        use LockMode::*;
        match (self, target) {
            (IntentionShared, Shared | Exclusive | IntentionExclusive | SharedIntentionExclusive) => true,
            (Shared, Exclusive | SharedIntentionExclusive) => true,
            (IntentionExclusive, Exclusive | SharedIntentionExclusive) => true,
            (SharedIntentionExclusive, Exclusive) => true,
            _ => false,
        }
    }
}

/// Held-lock bookkeeping, mutated by the lock manager on grant/release.
#[derive(Default)]
struct HeldLocks {
    shared_tables: HashSet<TableOid>,
    exclusive_tables: HashSet<TableOid>,
    intention_shared_tables: HashSet<TableOid>,
    intention_exclusive_tables: HashSet<TableOid>,
    shared_intention_exclusive_tables: HashSet<TableOid>,
    shared_rows: HashMap<TableOid, HashSet<RecordId>>,
    exclusive_rows: HashMap<TableOid, HashSet<RecordId>>,
}

impl HeldLocks {
    fn table_set(&mut self, mode: LockMode) -> &mut HashSet<TableOid> {
        match mode {
            LockMode::Shared => &mut self.shared_tables,
            LockMode::Exclusive => &mut self.exclusive_tables,
            LockMode::IntentionShared => &mut self.intention_shared_tables,
            LockMode::IntentionExclusive => &mut self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut self.shared_intention_exclusive_tables,
        }
    }

    fn row_map(&mut self, mode: LockMode) -> &mut HashMap<TableOid, HashSet<RecordId>> {
        match mode {
            LockMode::Shared => &mut self.shared_rows,
            LockMode::Exclusive => &mut self.exclusive_rows,
            _ => unreachable!("row locks are S or X only"),
        }
    }
}

/// One transaction's identity, 2PL phase, and held locks. The state cell
/// is atomic because the deadlock detector flips it to ABORTED without
/// taking any lock; blocked waiters re-read it after every wakeup.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: AtomicU8,
    locks: Mutex<HeldLocks>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: AtomicU8::new(TransactionState::Growing as u8),
            locks: Mutex::new(HeldLocks::default()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Records a granted table lock.
    pub(crate) fn add_table_lock(&self, oid: TableOid, mode: LockMode) {
        self.locks.lock().table_set(mode).insert(oid);
    }

    /// Forgets a table lock (release or upgrade-in-progress).
    pub(crate) fn remove_table_lock(&self, oid: TableOid, mode: LockMode) {
        self.locks.lock().table_set(mode).remove(&oid);
    }

    /// Records a granted row lock.
    pub(crate) fn add_row_lock(&self, oid: TableOid, rid: RecordId, mode: LockMode) {
        self.locks.lock().row_map(mode).entry(oid).or_default().insert(rid);
    }

    /// Forgets a row lock.
    pub(crate) fn remove_row_lock(&self, oid: TableOid, rid: RecordId, mode: LockMode) {
        let mut locks = self.locks.lock();
        if let Some(rows) = locks.row_map(mode).get_mut(&oid) {
            rows.remove(&rid);
            if rows.is_empty() {
                locks.row_map(mode).remove(&oid);
            }
        }
    }

    /// Does this transaction hold the table lock in the given mode?
    pub fn is_table_locked(&self, oid: TableOid, mode: LockMode) -> bool {
        self.locks.lock().table_set_ref(mode).contains(&oid)
    }

    /// True if any row lock on `oid` is still held; tables must not be
    /// unlocked underneath their rows.
    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        let locks = self.locks.lock();
        locks.shared_rows.get(&oid).is_some_and(|s| !s.is_empty())
            || locks.exclusive_rows.get(&oid).is_some_and(|s| !s.is_empty())
    }

    /// True if the txn may take an X row lock under this table: it holds
    /// X, IX, or SIX on the table.
    pub fn can_lock_row_exclusive(&self, oid: TableOid) -> bool {
        let locks = self.locks.lock();
        locks.exclusive_tables.contains(&oid)
            || locks.intention_exclusive_tables.contains(&oid)
            || locks.shared_intention_exclusive_tables.contains(&oid)
    }

    /// Snapshot of all held table locks, for rollback.
    pub fn held_table_locks(&self) -> Vec<(TableOid, LockMode)> {
        let locks = self.locks.lock();
        let mut held = Vec::new();
        for (&oid, mode) in locks
            .shared_tables
            .iter()
            .map(|o| (o, LockMode::Shared))
            .chain(locks.exclusive_tables.iter().map(|o| (o, LockMode::Exclusive)))
            .chain(
                locks
                    .intention_shared_tables
                    .iter()
                    .map(|o| (o, LockMode::IntentionShared)),
            )
            .chain(
                locks
                    .intention_exclusive_tables
                    .iter()
                    .map(|o| (o, LockMode::IntentionExclusive)),
            )
            .chain(
                locks
                    .shared_intention_exclusive_tables
                    .iter()
                    .map(|o| (o, LockMode::SharedIntentionExclusive)),
            )
        {
            held.push((oid, mode));
        }
        held
    }

    /// Snapshot of all held row locks, for rollback.
    pub fn held_row_locks(&self) -> Vec<(TableOid, RecordId, LockMode)> {
        let locks = self.locks.lock();
        let mut held = Vec::new();
        for (&oid, rows) in &locks.shared_rows {
            for &rid in rows {
                held.push((oid, rid, LockMode::Shared));
            }
        }
        for (&oid, rows) in &locks.exclusive_rows {
            for &rid in rows {
                held.push((oid, rid, LockMode::Exclusive));
            }
        }
        held
    }
}

impl HeldLocks {
    fn table_set_ref(&self, mode: LockMode) -> &HashSet<TableOid> {
        match mode {
            LockMode::Shared => &self.shared_tables,
            LockMode::Exclusive => &self.exclusive_tables,
            LockMode::IntentionShared => &self.intention_shared_tables,
            LockMode::IntentionExclusive => &self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &self.shared_intention_exclusive_tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        let modes = [IntentionShared, IntentionExclusive, Shared, SharedIntentionExclusive, Exclusive];
        // Rows: held; columns: requested
        let expected = [
            [true, true, true, true, false],   // IS
            [true, true, false, false, false], // IX
            [true, false, true, false, false], // S
            [true, false, false, false, false],// SIX
            [false, false, false, false, false],// X
        ];
        for (i, &held) in modes.iter().enumerate() {
            for (j, &requested) in modes.iter().enumerate() {
                assert_eq!(
                    held.is_compatible_with(requested),
                    expected[i][j],
                    "held {held:?}, requested {requested:?}"
                );
            }
        }
    }

    #[test]
    fn test_upgrade_matrix() {
        use LockMode::*;
        assert!(IntentionShared.can_upgrade_to(Shared));
        assert!(IntentionShared.can_upgrade_to(Exclusive));
        assert!(IntentionShared.can_upgrade_to(IntentionExclusive));
        assert!(IntentionShared.can_upgrade_to(SharedIntentionExclusive));
        assert!(Shared.can_upgrade_to(Exclusive));
        assert!(Shared.can_upgrade_to(SharedIntentionExclusive));
        assert!(!Shared.can_upgrade_to(IntentionShared));
        assert!(IntentionExclusive.can_upgrade_to(Exclusive));
        assert!(SharedIntentionExclusive.can_upgrade_to(Exclusive));
        assert!(!Exclusive.can_upgrade_to(Shared));
        assert!(!Exclusive.can_upgrade_to(SharedIntentionExclusive));
    }

    #[test]
    fn test_transaction_state_transitions() {
        let txn = Transaction::new(TxnId::new(1), IsolationLevel::RepeatableRead);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert!(!txn.state().is_terminal());

        txn.set_state(TransactionState::Shrinking);
        assert_eq!(txn.state(), TransactionState::Shrinking);

        txn.set_state(TransactionState::Aborted);
        assert!(txn.state().is_terminal());
    }

    #[test]
    fn test_transaction_lock_bookkeeping() {
        let txn = Transaction::new(TxnId::new(1), IsolationLevel::RepeatableRead);
        let rid = RecordId::new(PageId::new(3), SlotId::new(4));

        txn.add_table_lock(7, LockMode::IntentionExclusive);
        assert!(txn.is_table_locked(7, LockMode::IntentionExclusive));
        assert!(txn.can_lock_row_exclusive(7));
        assert!(!txn.can_lock_row_exclusive(8));

        txn.add_row_lock(7, rid, LockMode::Exclusive);
        assert!(txn.holds_row_locks_on(7));

        txn.remove_row_lock(7, rid, LockMode::Exclusive);
        assert!(!txn.holds_row_locks_on(7));

        txn.remove_table_lock(7, LockMode::IntentionExclusive);
        assert!(!txn.is_table_locked(7, LockMode::IntentionExclusive));
        assert!(txn.held_table_locks().is_empty());
    }
}
