use crate::{
    config::LedgerConfig,
    constants::{GENESIS_DIFFICULTY, GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY},
    genesis_payload, Block, ChainFault, ChainStore, LedgerError, Miner, Payload, Result,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of walking a chain from genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip)]
    pub fault: Option<ChainFault>,
}

impl ChainValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            first_invalid_index: None,
            reason: None,
            fault: None,
        }
    }

    fn invalid(index: u64, fault: ChainFault) -> Self {
        Self {
            valid: false,
            first_invalid_index: Some(index),
            reason: Some(fault.to_string()),
            fault: Some(fault),
        }
    }
}

/// Check every block and every link, genesis first. Reports the first
/// violation; an empty sequence is valid.
pub fn validate_blocks(blocks: &[Block]) -> ChainValidation {
    let mut previous: Option<&Block> = None;
    for (position, block) in blocks.iter().enumerate() {
        let position = position as u64;
        if let Some(fault) = check_block(position, block, previous) {
            return ChainValidation::invalid(position, fault);
        }
        previous = Some(block);
    }
    ChainValidation::ok()
}

fn check_block(position: u64, block: &Block, previous: Option<&Block>) -> Option<ChainFault> {
    if block.index() != position {
        return Some(ChainFault::IndexMismatch {
            expected: position,
            found: block.index(),
        });
    }
    if let Err(fault) = block.verify() {
        return Some(fault.into());
    }
    match previous {
        None if block.previous_hash() != GENESIS_PREVIOUS_HASH => Some(ChainFault::BadGenesis),
        Some(prev) if block.previous_hash() != prev.hash() => Some(ChainFault::BrokenLink {
            expected: prev.hash().to_string(),
            found: block.previous_hash().to_string(),
        }),
        _ => None,
    }
}

fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(LedgerError::InvalidDifficulty(difficulty));
    }
    Ok(())
}

/// The owned, append-only block sequence.
///
/// Appends are serialized by `append_lock`, so at most one search ever
/// extends the tail. The block vector is write-locked only for the final
/// push; readers get cloned snapshots and never see a half-built block.
pub struct Ledger {
    config: LedgerConfig,
    miner: Miner,
    blocks: RwLock<Vec<Block>>,
    append_lock: Mutex<()>,
    store: Option<Arc<dyn ChainStore>>,
}

impl Ledger {
    /// An empty, in-memory ledger. Call [`Ledger::initialize`] before use.
    pub fn new(config: LedgerConfig) -> Self {
        let miner = Miner::from_config(&config);
        Self {
            config,
            miner,
            blocks: RwLock::new(Vec::new()),
            append_lock: Mutex::new(()),
            store: None,
        }
    }

    /// A ledger backed by `store`, resuming whatever chain it holds.
    pub fn with_store(config: LedgerConfig, store: Arc<dyn ChainStore>) -> Result<Self> {
        let blocks = store.load_chain().map_err(LedgerError::Store)?;
        let validation = validate_blocks(&blocks);
        if let Some(index) = validation.first_invalid_index {
            let reason = validation.reason.unwrap_or_default();
            warn!(index, %reason, "refusing corrupt stored chain");
            return Err(LedgerError::CorruptStore { index, reason });
        }
        info!(blocks = blocks.len(), "loaded chain from store");
        let mut ledger = Self::new(config);
        ledger.blocks = RwLock::new(blocks);
        ledger.store = Some(store);
        Ok(ledger)
    }

    /// Swap the miner, e.g. to share a cancel flag with a shutdown handler.
    pub fn with_miner(mut self, miner: Miner) -> Self {
        self.miner = miner;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Mine and store the genesis block. Fails with `AlreadyInitialized`
    /// when any block exists.
    pub fn initialize(&self) -> Result<Block> {
        let _guard = self.append_lock.lock();
        if !self.blocks.read().is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }
        let genesis = self
            .miner
            .mine_genesis(genesis_payload(), GENESIS_DIFFICULTY)?;
        info!(hash = %genesis.hash(), "genesis block created");
        self.commit(genesis)
    }

    pub fn is_initialized(&self) -> bool {
        !self.blocks.read().is_empty()
    }

    /// Seal `payload` into a new tail block mined at `difficulty`.
    ///
    /// The payload is serialized before any work starts, so a payload that
    /// cannot be encoded costs no proof-of-work.
    pub fn append<T: Serialize + ?Sized>(&self, payload: &T, difficulty: u32) -> Result<Block> {
        let payload = Payload::from_serialize(payload)?;
        check_difficulty(difficulty)?;

        let _guard = self.append_lock.lock();
        let tail = self.tail()?;
        debug!(tail = tail.index(), difficulty, "appending");
        let block = self.miner.mine(&tail, payload, difficulty)?;
        self.commit(block)
    }

    /// [`Ledger::append`] at the configured default difficulty.
    pub fn append_default<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Block> {
        self.append(payload, self.config.default_difficulty)
    }

    fn commit(&self, block: Block) -> Result<Block> {
        if let Some(store) = &self.store {
            store.put_block(&block).map_err(LedgerError::Store)?;
        }
        self.blocks.write().push(block.clone());
        Ok(block)
    }

    pub fn tail(&self) -> Result<Block> {
        self.blocks
            .read()
            .last()
            .cloned()
            .ok_or(LedgerError::NotInitialized)
    }

    /// The last `n` blocks, oldest first.
    pub fn slice(&self, n: usize) -> Result<Vec<Block>> {
        let blocks = self.blocks.read();
        if blocks.is_empty() {
            return Err(LedgerError::NotInitialized);
        }
        let start = blocks.len().saturating_sub(n);
        Ok(blocks[start..].to_vec())
    }

    /// The whole chain, or only its last `limit` blocks.
    pub fn chain(&self, limit: Option<usize>) -> Result<Vec<Block>> {
        match limit {
            Some(n) => self.slice(n),
            None => self.slice(usize::MAX),
        }
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.blocks.read().get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn validate_chain(&self) -> ChainValidation {
        validate_blocks(&self.blocks.read())
    }

    /// Flush the backing store, if any. Call once no more appends will run.
    pub fn close(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.close().map_err(LedgerError::Store),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn tamper_with(&self, index: usize, f: impl FnOnce(&mut Block)) {
        let mut blocks = self.blocks.write();
        f(&mut blocks[index]);
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
