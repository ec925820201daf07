use std::time::Duration;

use thiserror::Error;

use crate::constants::{HASH_HEX_SIZE, MAX_DIFFICULTY};

/// Errors surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger not initialized: no genesis block")]
    NotInitialized,

    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("payload serialization failed: {0}")]
    PayloadSerialization(#[from] serde_json::Error),

    #[error("invalid difficulty {0}: expected 1..={}", MAX_DIFFICULTY)]
    InvalidDifficulty(u32),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("chain store error: {0:#}")]
    Store(anyhow::Error),

    #[error("stored chain is corrupt at block {index}: {reason}")]
    CorruptStore { index: u64, reason: String },
}

/// Outcomes of a proof-of-work search that did not produce a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("mining timed out after {attempts} attempts ({elapsed:?})")]
    Timeout { attempts: u64, elapsed: Duration },

    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

/// Why a single block failed self-verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockFault {
    #[error("stored hash is not a {}-character lowercase hex digest", HASH_HEX_SIZE)]
    MalformedHash,

    #[error("difficulty {0} out of range")]
    InvalidDifficulty(u32),

    #[error("hash mismatch: recomputed {expected}, stored {found}")]
    HashMismatch { expected: String, found: String },

    #[error("insufficient work: {leading_zeros} leading zero digits, difficulty {difficulty}")]
    InsufficientWork { difficulty: u32, leading_zeros: u32 },
}

/// Why a chain failed validation at a given position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("expected index {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("genesis block must reference the sentinel predecessor hash")]
    BadGenesis,

    #[error("previous hash {found} does not match predecessor hash {expected}")]
    BrokenLink { expected: String, found: String },

    #[error(transparent)]
    Block(#[from] BlockFault),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
