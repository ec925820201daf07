//! Append-only, tamper-evident event ledger.
//!
//! Every appended payload is sealed into a [`Block`] whose SHA-256 hash
//! commits to the block's own fields and to its predecessor's hash. A block
//! is only accepted once a proof-of-work search finds a nonce giving the
//! hash at least `difficulty` leading zero hex digits.

pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod mine;
pub mod store;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{validate_blocks, ChainValidation, Ledger};
pub use config::LedgerConfig;
pub use error::{BlockFault, ChainFault, LedgerError, MiningError, Result};
pub use events::{
    pump, Annotated, Annotating, ContentGenerator, EventSource, LedgerEvent, NoContent,
};
pub use mine::{CancelFlag, Miner, MiningBudget};
pub use store::{ChainStore, MemoryStore};

use constants::{GENESIS_MESSAGE, GENESIS_PREVIOUS_HASH, HASH_HEX_SIZE, MAX_DIFFICULTY};

pub type Hash = [u8; 32];

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Opaque, caller-defined block content.
///
/// The ledger never looks inside a payload; it only needs a canonical byte
/// encoding for hashing. Objects are backed by serde_json's ordered map, so
/// two logically equal payloads always encode to the same bytes regardless
/// of the key order they were built or parsed with.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(serde_json::Value);

impl Payload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Compact JSON with sorted object keys. Floats print as their shortest
    /// round-trip form and are parsed back exactly (`float_roundtrip`), so
    /// a payload reloaded from its text hashes to the same bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a block hash commits to except the nonce, pre-absorbed into a
/// SHA-256 state so each mining attempt only hashes the 8 nonce bytes.
///
/// Layout: `index` LE ‖ `timestamp` LE ‖ payload length LE ‖ payload bytes ‖
/// previous-hash length LE ‖ previous-hash bytes ‖ `nonce` LE.
#[derive(Clone)]
pub struct HashInput {
    state: Sha256,
}

impl HashInput {
    pub fn new(index: u64, timestamp: u64, payload: &Payload, previous_hash: &str) -> Self {
        let body = payload.canonical_bytes();
        let mut state = Sha256::new();
        state.update(index.to_le_bytes());
        state.update(timestamp.to_le_bytes());
        state.update((body.len() as u64).to_le_bytes());
        state.update(&body);
        state.update((previous_hash.len() as u64).to_le_bytes());
        state.update(previous_hash.as_bytes());
        Self { state }
    }

    pub fn digest(&self, nonce: u64) -> Hash {
        let mut hasher = self.state.clone();
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }
}

impl fmt::Debug for HashInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashInput").finish_non_exhaustive()
    }
}

/// The ledger's hash function: lowercase hex SHA-256 of the block tuple.
pub fn block_hash(
    index: u64,
    timestamp: u64,
    payload: &Payload,
    previous_hash: &str,
    nonce: u64,
) -> String {
    hex::encode(HashInput::new(index, timestamp, payload, previous_hash).digest(nonce))
}

/// A sealed ledger entry. Fields are read-only once the block exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: u64,
    payload: Payload,
    previous_hash: String,
    hash: String,
    nonce: u64,
    difficulty: u32,
}

impl Block {
    /// Reassemble a block from stored fields. Nothing is checked here; run
    /// [`Block::verify`] before trusting the result.
    pub fn from_parts(
        index: u64,
        timestamp: u64,
        payload: Payload,
        previous_hash: String,
        hash: String,
        nonce: u64,
        difficulty: u32,
    ) -> Self {
        Self {
            index,
            timestamp,
            payload,
            previous_hash,
            hash,
            nonce,
            difficulty,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Recompute the hash from the stored fields and check it against the
    /// stored hash and the block's difficulty.
    pub fn verify(&self) -> std::result::Result<(), BlockFault> {
        if !pow::is_well_formed(&self.hash) {
            return Err(BlockFault::MalformedHash);
        }
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(BlockFault::InvalidDifficulty(self.difficulty));
        }
        let expected = block_hash(
            self.index,
            self.timestamp,
            &self.payload,
            &self.previous_hash,
            self.nonce,
        );
        if expected != self.hash {
            return Err(BlockFault::HashMismatch {
                expected,
                found: self.hash.clone(),
            });
        }
        let leading_zeros = pow::leading_zero_hex_digits(&self.hash);
        if leading_zeros < self.difficulty {
            return Err(BlockFault::InsufficientWork {
                difficulty: self.difficulty,
                leading_zeros,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

/// Fixed content of every ledger's first block.
pub fn genesis_payload() -> Payload {
    Payload(serde_json::json!({ "message": GENESIS_MESSAGE }))
}

pub mod pow {
    use super::{Hash, HASH_HEX_SIZE};

    /// Number of leading zero nibbles (hex digits) in a raw digest.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn leading_zero_hex_digits(hex: &str) -> u32 {
        hex.bytes().take_while(|c| *c == b'0').count() as u32
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_nibbles(hash) >= difficulty
    }

    /// 64 lowercase hex characters.
    pub fn is_well_formed(hex: &str) -> bool {
        hex.len() == HASH_HEX_SIZE && hex.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Mean number of attempts a search at `difficulty` needs.
    pub fn expected_attempts(difficulty: u32) -> f64 {
        16f64.powi(difficulty as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block() -> Block {
        let payload = Payload::new(json!({ "event": "test" }));
        // nonce 12 is the first to give a leading zero for this tuple
        let hash = block_hash(1, 1_600_000_000_000, &payload, GENESIS_PREVIOUS_HASH, 12);
        Block::from_parts(
            1,
            1_600_000_000_000,
            payload,
            GENESIS_PREVIOUS_HASH.to_string(),
            hash,
            12,
            1,
        )
    }

    #[test]
    fn leading_zero_nibbles_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::count_leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 1);
        h[0] = 0xF0;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 0);
        h = [0u8; 32];
        h[1] = 0x80;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 2);
        h[1] = 0x01;
        assert_eq!(pow::count_leading_zero_nibbles(&h), 3);
    }

    #[test]
    fn hex_and_nibble_counts_agree() {
        let mut h = [0u8; 32];
        h[2] = 0x03;
        assert_eq!(
            pow::count_leading_zero_nibbles(&h),
            pow::leading_zero_hex_digits(&hex::encode(h))
        );
    }

    #[test]
    fn block_hash_example() {
        let payload = Payload::new(json!({ "event": "test" }));
        let hash = block_hash(1, 1_600_000_000_000, &payload, "0", 42);
        let expected_hex = "4f2cd9cd107c12be7cfeb3582bfa3bced3e5b7fd25c6ca4396c8826880a05165";
        assert_eq!(hash, expected_hex);
    }

    #[test]
    fn block_hash_is_lowercase_fixed_width() {
        let hash = block_hash(3, 0, &Payload::default(), "abc", 0);
        assert!(pow::is_well_formed(&hash));
        assert_eq!(hash.len(), HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_consistency() {
        let payload = Payload::new(json!({ "calories": 250, "user_id": "u-1" }));
        let hash1 = block_hash(5, 1_600_000_000_000, &payload, "ff", 9);
        let hash2 = block_hash(5, 1_600_000_000_000, &payload, "ff", 9);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn block_hash_changes_with_each_field() {
        let payload = Payload::new(json!({ "event": "test" }));
        let base = block_hash(1, 10, &payload, "0", 0);
        assert_ne!(base, block_hash(2, 10, &payload, "0", 0));
        assert_ne!(base, block_hash(1, 11, &payload, "0", 0));
        assert_ne!(base, block_hash(1, 10, &Payload::new(json!({ "event": "other" })), "0", 0));
        assert_ne!(base, block_hash(1, 10, &payload, "1", 0));
        assert_ne!(base, block_hash(1, 10, &payload, "0", 1));
    }

    #[test]
    fn payload_key_order_does_not_change_hash() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        let (a, b) = (Payload::new(a), Payload::new(b));
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(block_hash(1, 1, &a, "0", 1), block_hash(1, 1, &b, "0", 1));
    }

    #[test]
    fn payload_survives_json_round_trip() {
        let payload = Payload::new(json!({ "z": [1, 2, 3], "a": "x", "m": { "k": null } }));
        let text = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&text).unwrap();
        assert_eq!(payload.canonical_bytes(), back.canonical_bytes());
    }

    #[test]
    fn sample_block_verifies() {
        let block = sample_block();
        assert_eq!(
            block.hash(),
            "039daf825269c5d0938181b26108c013df30f8d3ef878b199148c34ffaa1163c"
        );
        assert_eq!(block.verify(), Ok(()));
        assert!(block.is_valid());
    }

    #[test]
    fn verify_detects_hash_mismatch() {
        let block = sample_block();
        let mut tampered = block.clone();
        tampered.nonce += 1;
        match tampered.verify() {
            Err(BlockFault::HashMismatch { found, .. }) => assert_eq!(found, block.hash),
            other => panic!("unexpected verify result: {other:?}"),
        }
    }

    #[test]
    fn verify_detects_insufficient_work() {
        let mut block = sample_block();
        let zeros = pow::leading_zero_hex_digits(&block.hash);
        block.difficulty = zeros + 1;
        assert_eq!(
            block.verify(),
            Err(BlockFault::InsufficientWork {
                difficulty: zeros + 1,
                leading_zeros: zeros,
            })
        );
    }

    #[test]
    fn verify_rejects_malformed_and_out_of_range() {
        let mut block = sample_block();
        block.hash = block.hash.to_uppercase().replace('0', "A");
        assert_eq!(block.verify(), Err(BlockFault::MalformedHash));

        let mut block = sample_block();
        block.difficulty = 0;
        assert_eq!(block.verify(), Err(BlockFault::InvalidDifficulty(0)));
    }

    #[test]
    fn block_serialization_uses_snake_case_fields() {
        let block = sample_block();
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["previous_hash"], "0");
        assert_eq!(json["payload"]["event"], "test");
        assert_eq!(json["nonce"], 12);
        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn expected_attempts_grows_by_sixteen() {
        assert_eq!(pow::expected_attempts(0), 1.0);
        assert_eq!(pow::expected_attempts(2), 256.0);
    }
}
