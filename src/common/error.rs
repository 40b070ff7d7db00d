use thiserror::Error;

use super::types::{FrameId, PageId, TxnId};

/// Reasons the lock manager aborts a transaction. Surfaced to the
/// transaction manager, which owns the actual rollback.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested in shrinking phase")]
    LockOnShrinking,

    #[error("shared lock requested at read-uncommitted isolation")]
    LockSharedOnReadUncommitted,

    #[error("another transaction is already upgrading on this resource")]
    UpgradeConflict,

    #[error("requested lock mode is not a legal upgrade")]
    IncompatibleUpgrade,

    #[error("unlock requested but no lock is held")]
    AttemptedUnlockButNoLockHeld,

    #[error("intention lock requested on a row")]
    AttemptedIntentionLockOnRow,

    #[error("row lock requested without an appropriate table lock")]
    TableLockNotPresent,

    #[error("table unlocked before its row locks were released")]
    TableUnlockedBeforeUnlockingRows,
}

/// Database error types
#[derive(Error, Debug)]
pub enum StratumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Frame {0} not found")]
    FrameNotFound(FrameId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Header page is full")]
    HeaderPageFull,

    #[error("Index {0} not found in header page")]
    IndexNotFound(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    /// A protocol violation aborted the transaction; the offending txn
    /// has already been transitioned to the ABORTED state.
    #[error("{txn_id} aborted: {reason}")]
    LockProtocol { txn_id: TxnId, reason: AbortReason },

    /// A blocked lock acquisition woke up to find its transaction
    /// aborted (by the deadlock detector or a parallel failure).
    #[error("{0} was aborted while waiting for a lock")]
    TransactionAborted(TxnId),

    #[error("{0} is not registered with the transaction manager")]
    TransactionNotFound(TxnId),
}

pub type Result<T> = std::result::Result<T, StratumError>;
