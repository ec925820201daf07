#![allow(dead_code)]

use std::fs;

use ledger_core::{genesis_payload, Block, Miner, Payload};
use ledger_storage::SledStore;
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// A valid chain of `len` blocks (genesis included) mined at difficulty 1.
pub fn mine_chain(len: usize) -> Vec<Block> {
    let miner = Miner::default();
    let mut blocks = vec![miner
        .mine_genesis(genesis_payload(), 1)
        .expect("genesis mines")];
    for i in 1..len {
        let payload = Payload::new(json!({
            "type": "calorie_logged",
            "user_id": format!("user-{i}"),
            "calories": 100 + i,
        }));
        let next = miner
            .mine(blocks.last().unwrap(), payload, 1)
            .expect("block mines");
        blocks.push(next);
    }
    blocks
}
