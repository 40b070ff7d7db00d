use std::sync::Arc;

use stratum::buffer::BufferPoolManager;
use stratum::common::{PageId, RecordId, SlotId, DEFAULT_CYCLE_DETECTION_INTERVAL};
use stratum::concurrency::{IsolationLevel, LockManager, LockMode, TransactionManager};
use stratum::index::BTreeIndex;
use stratum::storage::disk::DiskManager;

fn main() {
    println!("Stratum - disk-oriented storage engine core");
    println!("===========================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to create disk manager"));
    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool with 16 frames (LRU-2)");

    // Build an index and run a few operations through it
    let index = BTreeIndex::new("demo_idx", Arc::clone(&bpm), 8, 8).expect("failed to create index");
    for key in [5u32, 3, 9, 1, 7, 4, 8, 2, 6] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        index.insert(key, rid).expect("insert failed");
    }
    println!("Inserted 9 keys, root = {}", index.root_page_id());

    print!("Forward scan:");
    for entry in index.iter().expect("iterator failed") {
        let (key, _rid) = entry.expect("scan failed");
        print!(" {key}");
    }
    println!();

    index.remove(5).expect("remove failed");
    assert!(index.get(5).expect("lookup failed").is_none());
    println!("Removed key 5");

    bpm.flush_all_pages().expect("flush failed");
    println!("Flushed all pages\n");

    // Two transactions through the lock manager
    let lock_manager = LockManager::new(DEFAULT_CYCLE_DETECTION_INTERVAL);
    let txn_manager = TransactionManager::new();

    let t0 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let t1 = txn_manager.begin(IsolationLevel::RepeatableRead);

    lock_manager
        .lock_table(&t0, LockMode::IntentionShared, 1)
        .expect("t0 IS lock failed");
    lock_manager
        .lock_table(&t1, LockMode::IntentionExclusive, 1)
        .expect("t1 IX lock failed");
    println!("{} holds IS and {} holds IX on table 1", t0.id(), t1.id());

    txn_manager.commit(&t0, &lock_manager).expect("t0 commit failed");
    txn_manager.commit(&t1, &lock_manager).expect("t1 commit failed");
    println!("Both transactions committed");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
