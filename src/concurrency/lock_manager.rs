use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::{AbortReason, RecordId, Result, StratumError, TableOid, TxnId};

use super::transaction::{IsolationLevel, LockMode, Transaction, TransactionState};

/// One entry in a lock request queue. Holding the transaction Arc lets
/// the deadlock detector abort victims it finds in the queues.
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    oid: TableOid,
    rid: Option<RecordId>,
    granted: bool,
    txn: Arc<Transaction>,
}

struct QueueInner {
    /// FIFO request list; granted and pending requests interleave
    requests: Vec<LockRequest>,
    /// Transaction currently performing a lock upgrade, if any
    upgrading: Option<TxnId>,
}

/// Per-object queue: mutex-protected request list plus the condition
/// variable waiters park on.
struct LockRequestQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                requests: Vec::new(),
                upgrading: None,
            }),
            cv: Condvar::new(),
        }
    }
}

/// Hierarchical two-phase lock manager over tables and rows, with a
/// background deadlock detector that aborts the youngest transaction on
/// every cycle it finds.
///
/// Latch order: waits_for -> table map -> row map -> queue. Map latches
/// are released once the target queue is in hand; queues are never
/// removed from the maps.
pub struct LockManager {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<RecordId, Arc<LockRequestQueue>>>,
    /// Wait-for graph, rebuilt from scratch on every detection pass
    waits_for: Mutex<HashMap<TxnId, Vec<TxnId>>>,
    enable_cycle_detection: Arc<AtomicBool>,
    detector_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    /// Creates the lock manager and starts its deadlock detection worker,
    /// which wakes every `cycle_detection_interval`.
    pub fn new(cycle_detection_interval: Duration) -> Arc<Self> {
        let lock_manager = Arc::new(Self {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(HashMap::new()),
            enable_cycle_detection: Arc::new(AtomicBool::new(true)),
            detector_handle: Mutex::new(None),
        });

        let weak = Arc::downgrade(&lock_manager);
        let enable = Arc::clone(&lock_manager.enable_cycle_detection);
        let handle = thread::Builder::new()
            .name("deadlock-detector".into())
            .spawn(move || {
                while enable.load(Ordering::Relaxed) {
                    thread::sleep(cycle_detection_interval);
                    if !enable.load(Ordering::Relaxed) {
                        break;
                    }
                    let Some(lock_manager) = weak.upgrade() else {
                        break;
                    };
                    lock_manager.run_detection_pass();
                }
            })
            .expect("failed to spawn deadlock detector");
        *lock_manager.detector_handle.lock() = Some(handle);

        lock_manager
    }

    /// Acquires (or upgrades to) `mode` on a table, blocking until the
    /// request is grantable.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is already committed or aborted; that is
    /// a caller bug, not a protocol violation.
    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<()> {
        self.validate_table_request(txn, mode)?;

        let queue = {
            let mut map = self.table_lock_map.lock();
            Arc::clone(map.entry(oid).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };

        self.acquire(txn, &queue, mode, oid, None)
    }

    /// Releases this transaction's table lock, waking queued waiters and
    /// applying the two-phase transition for its isolation level.
    pub fn unlock_table(&self, txn: &Arc<Transaction>, oid: TableOid) -> Result<()> {
        if txn.holds_row_locks_on(oid) {
            return Err(self.abort_txn(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let queue = self.table_lock_map.lock().get(&oid).cloned();
        let Some(queue) = queue else {
            return Err(self.abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let mut inner = queue.inner.lock();
        let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn.id()) else {
            drop(inner);
            return Err(self.abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let request = inner.requests.remove(pos);
        if request.granted {
            self.maybe_shrink(txn, request.mode);
            txn.remove_table_lock(oid, request.mode);
        }
        queue.cv.notify_all();
        Ok(())
    }

    /// Acquires (or upgrades to) an S or X lock on a row. X requires the
    /// transaction to hold X, IX, or SIX on the owning table.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: RecordId,
    ) -> Result<()> {
        self.validate_row_request(txn, mode, oid)?;

        let queue = {
            let mut map = self.row_lock_map.lock();
            Arc::clone(map.entry(rid).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };

        self.acquire(txn, &queue, mode, oid, Some(rid))
    }

    /// Releases this transaction's row lock.
    pub fn unlock_row(&self, txn: &Arc<Transaction>, oid: TableOid, rid: RecordId) -> Result<()> {
        let queue = self.row_lock_map.lock().get(&rid).cloned();
        let Some(queue) = queue else {
            return Err(self.abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let mut inner = queue.inner.lock();
        let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn.id()) else {
            drop(inner);
            return Err(self.abort_txn(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let request = inner.requests.remove(pos);
        if request.granted {
            self.maybe_shrink(txn, request.mode);
            txn.remove_row_lock(oid, rid, request.mode);
        }
        queue.cv.notify_all();
        Ok(())
    }

    /// Queue-side acquisition shared by table and row locks: handle
    /// re-requests and upgrades, append a pending request, then park on
    /// the condvar until grantable or aborted.
    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        queue: &Arc<LockRequestQueue>,
        mode: LockMode,
        oid: TableOid,
        rid: Option<RecordId>,
    ) -> Result<()> {
        let mut inner = queue.inner.lock();

        if let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn.id()) {
            let existing = &inner.requests[pos];
            if !existing.granted {
                drop(inner);
                return Err(self.abort_txn(txn, AbortReason::IncompatibleUpgrade));
            }
            if existing.mode == mode {
                return Ok(());
            }
            if inner.upgrading.is_some() {
                drop(inner);
                return Err(self.abort_txn(txn, AbortReason::UpgradeConflict));
            }
            if !existing.mode.can_upgrade_to(mode) {
                drop(inner);
                return Err(self.abort_txn(txn, AbortReason::IncompatibleUpgrade));
            }

            // Retract the old request; the upgrader gets priority until
            // its new request is granted.
            let old = inner.requests.remove(pos);
            match old.rid {
                Some(old_rid) => txn.remove_row_lock(old.oid, old_rid, old.mode),
                None => txn.remove_table_lock(old.oid, old.mode),
            }
            inner.upgrading = Some(txn.id());
        }

        inner.requests.push(LockRequest {
            txn_id: txn.id(),
            mode,
            oid,
            rid,
            granted: false,
            txn: Arc::clone(txn),
        });

        loop {
            if txn.state() == TransactionState::Aborted {
                // The deadlock detector picked us. Retract the pending
                // request so it cannot wedge the FIFO check for others;
                // granted locks stay until rollback releases them.
                if let Some(pos) = inner
                    .requests
                    .iter()
                    .position(|r| r.txn_id == txn.id() && !r.granted)
                {
                    inner.requests.remove(pos);
                }
                if inner.upgrading == Some(txn.id()) {
                    inner.upgrading = None;
                }
                queue.cv.notify_all();
                return Err(StratumError::TransactionAborted(txn.id()));
            }
            if Self::try_grant(&mut inner, txn.id()) {
                break;
            }
            queue.cv.wait(&mut inner);
        }
        drop(inner);

        match rid {
            Some(rid) => txn.add_row_lock(oid, rid, mode),
            None => txn.add_table_lock(oid, mode),
        }
        Ok(())
    }

    /// A pending request is grantable when every granted request is
    /// compatible with it, and it is either the designated upgrader or no
    /// upgrade is in flight and no earlier pending request conflicts.
    fn try_grant(inner: &mut QueueInner, txn_id: TxnId) -> bool {
        let Some(me) = inner
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && !r.granted)
        else {
            return false;
        };
        let mode = inner.requests[me].mode;

        for request in &inner.requests {
            if request.granted && !request.mode.is_compatible_with(mode) {
                return false;
            }
        }

        if inner.upgrading == Some(txn_id) {
            inner.upgrading = None;
            inner.requests[me].granted = true;
            return true;
        }
        if inner.upgrading.is_some() {
            return false;
        }

        for request in inner.requests.iter().take(me) {
            if !request.granted && !request.mode.is_compatible_with(mode) {
                return false;
            }
        }

        inner.requests[me].granted = true;
        true
    }

    fn validate_table_request(&self, txn: &Arc<Transaction>, mode: LockMode) -> Result<()> {
        let state = txn.state();
        assert!(
            !state.is_terminal(),
            "lock_table called on terminal transaction {}",
            txn.id()
        );

        match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                if state == TransactionState::Shrinking {
                    return Err(self.abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if state == TransactionState::Shrinking
                    && !matches!(mode, LockMode::Shared | LockMode::IntentionShared)
                {
                    return Err(self.abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadUncommitted => {
                if matches!(
                    mode,
                    LockMode::Shared | LockMode::IntentionShared | LockMode::SharedIntentionExclusive
                ) {
                    return Err(self.abort_txn(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if state == TransactionState::Shrinking {
                    return Err(self.abort_txn(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    fn validate_row_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<()> {
        let state = txn.state();
        assert!(
            !state.is_terminal(),
            "lock_row called on terminal transaction {}",
            txn.id()
        );

        if !matches!(mode, LockMode::Shared | LockMode::Exclusive) {
            return Err(self.abort_txn(txn, AbortReason::AttemptedIntentionLockOnRow));
        }
        if mode == LockMode::Shared
            && txn.isolation_level() == IsolationLevel::ReadUncommitted
        {
            return Err(self.abort_txn(txn, AbortReason::LockSharedOnReadUncommitted));
        }
        if mode == LockMode::Exclusive && !txn.can_lock_row_exclusive(oid) {
            return Err(self.abort_txn(txn, AbortReason::TableLockNotPresent));
        }
        if state == TransactionState::Shrinking {
            let allowed = txn.isolation_level() == IsolationLevel::ReadCommitted
                && mode == LockMode::Shared;
            if !allowed {
                return Err(self.abort_txn(txn, AbortReason::LockOnShrinking));
            }
        }
        Ok(())
    }

    /// GROWING -> SHRINKING on release: repeatable-read shrinks on any S
    /// or X release; read-committed and read-uncommitted only on X.
    fn maybe_shrink(&self, txn: &Arc<Transaction>, released: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        let shrink = match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                matches!(released, LockMode::Shared | LockMode::Exclusive)
            }
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                released == LockMode::Exclusive
            }
        };
        if shrink {
            debug!("{} enters shrinking phase", txn.id());
            txn.set_state(TransactionState::Shrinking);
        }
    }

    fn abort_txn(&self, txn: &Arc<Transaction>, reason: AbortReason) -> StratumError {
        warn!("aborting {}: {}", txn.id(), reason);
        txn.set_state(TransactionState::Aborted);
        StratumError::LockProtocol {
            txn_id: txn.id(),
            reason,
        }
    }

    /// Adds edge `from -> to` (from waits on to). Test hook; detection
    /// passes build the graph themselves.
    pub fn add_edge(&self, from: TxnId, to: TxnId) {
        let mut graph = self.waits_for.lock();
        let edges = graph.entry(from).or_default();
        if !edges.contains(&to) {
            edges.push(to);
        }
    }

    /// Removes edge `from -> to` if present.
    pub fn remove_edge(&self, from: TxnId, to: TxnId) {
        let mut graph = self.waits_for.lock();
        if let Some(edges) = graph.get_mut(&from) {
            edges.retain(|&t| t != to);
            if edges.is_empty() {
                graph.remove(&from);
            }
        }
    }

    /// Snapshot of the wait-for edges, for inspection in tests.
    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        let graph = self.waits_for.lock();
        let mut edges: Vec<(TxnId, TxnId)> = graph
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// One deadlock detection cycle: rebuild the wait-for graph from the
    /// queues, then abort the youngest transaction of every cycle found,
    /// waking all waiters each time. The graph is discarded at the end.
    pub fn run_detection_pass(&self) {
        let mut graph = self.waits_for.lock();
        let table_map = self.table_lock_map.lock();
        let row_map = self.row_lock_map.lock();

        graph.clear();
        let mut txns: HashMap<TxnId, Arc<Transaction>> = HashMap::new();

        for queue in table_map.values().chain(row_map.values()) {
            let inner = queue.inner.lock();
            for waiting in inner.requests.iter().filter(|r| !r.granted) {
                txns.entry(waiting.txn_id)
                    .or_insert_with(|| Arc::clone(&waiting.txn));
                for granted in inner.requests.iter().filter(|r| r.granted) {
                    if granted.txn_id != waiting.txn_id
                        && !granted.mode.is_compatible_with(waiting.mode)
                    {
                        let edges = graph.entry(waiting.txn_id).or_default();
                        if !edges.contains(&granted.txn_id) {
                            edges.push(granted.txn_id);
                        }
                    }
                }
            }
        }

        for edges in graph.values_mut() {
            edges.sort_unstable();
        }

        while let Some(victim) = find_cycle_victim(&graph) {
            info!("deadlock detected, aborting victim {victim}");
            if let Some(txn) = txns.get(&victim) {
                txn.set_state(TransactionState::Aborted);
            }

            // Wake every queue so the victim's blocked acquisitions can
            // observe the abort. Holding the queue latch while notifying
            // closes the window between a waiter's re-check and its wait.
            for queue in table_map.values().chain(row_map.values()) {
                let _inner = queue.inner.lock();
                queue.cv.notify_all();
            }

            graph.remove(&victim);
            for edges in graph.values_mut() {
                edges.retain(|&t| t != victim);
            }
            graph.retain(|_, edges| !edges.is_empty());
        }

        graph.clear();
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.enable_cycle_detection.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector_handle.get_mut().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Iterative DFS over the graph, smallest vertex first. On the first
/// back-edge the cycle is the stacked suffix; the victim is its largest
/// (youngest) transaction id.
fn find_cycle_victim(graph: &HashMap<TxnId, Vec<TxnId>>) -> Option<TxnId> {
    let mut starts: Vec<TxnId> = graph.keys().copied().collect();
    starts.sort_unstable();
    let mut visited: HashSet<TxnId> = HashSet::new();

    for &start in &starts {
        if visited.contains(&start) {
            continue;
        }
        visited.insert(start);
        let mut stack: Vec<(TxnId, usize)> = vec![(start, 0)];
        let mut on_stack: Vec<TxnId> = vec![start];

        while !stack.is_empty() {
            let (node, idx) = {
                let frame = stack.last_mut().unwrap();
                let current = (frame.0, frame.1);
                frame.1 += 1;
                current
            };
            let neighbors = graph.get(&node).map(Vec::as_slice).unwrap_or(&[]);

            if idx < neighbors.len() {
                let next = neighbors[idx];
                if let Some(pos) = on_stack.iter().position(|&t| t == next) {
                    return on_stack[pos..].iter().copied().max();
                }
                if !visited.contains(&next) {
                    visited.insert(next);
                    stack.push((next, 0));
                    on_stack.push(next);
                }
            } else {
                stack.pop();
                on_stack.pop();
            }
        }
    }
    None
}
