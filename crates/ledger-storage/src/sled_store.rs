use anyhow::{Context, Result};
use ledger_core::{Block, ChainStore, Payload};
use serde::{Deserialize, Serialize};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";

/// On-disk form of a block. bincode cannot encode self-describing JSON,
/// so the payload is kept as its canonical JSON text.
#[derive(Serialize, Deserialize)]
struct StoredBlock {
  index: u64,
  timestamp: u64,
  payload: String,
  previous_hash: String,
  hash: String,
  nonce: u64,
  difficulty: u32,
}

impl StoredBlock {
  fn from_block(block: &Block) -> Self {
    Self {
      index: block.index(),
      timestamp: block.timestamp(),
      payload: block.payload().to_string(),
      previous_hash: block.previous_hash().to_string(),
      hash: block.hash().to_string(),
      nonce: block.nonce(),
      difficulty: block.difficulty(),
    }
  }

  fn into_block(self) -> Result<Block> {
    let payload: Payload = serde_json::from_str(&self.payload)
      .with_context(|| format!("payload of block {} is not valid JSON", self.index))?;
    Ok(Block::from_parts(
      self.index,
      self.timestamp,
      payload,
      self.previous_hash,
      self.hash,
      self.nonce,
      self.difficulty,
    ))
  }
}

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled db at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(path = %path.display(), blocks = blocks.len(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drop every stored block.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.flush()?;
    Ok(())
  }
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index().to_be_bytes();
    let bytes = bincode::serialize(&StoredBlock::from_block(block))?;
    self.blocks.insert(key, bytes)?;

    // update tip
    let tip = self.tip_height()?;
    if tip.map_or(true, |t| block.index() >= t) {
      self.db.insert(KEY_TIP_HEIGHT, &key)?;
    }

    self.db.flush()?;
    debug!(index = block.index(), "block stored");
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    let key = index.to_be_bytes();
    match self.blocks.get(key)? {
      Some(ivec) => {
        let stored: StoredBlock = bincode::deserialize(&ivec)
          .with_context(|| format!("decoding stored block {index}"))?;
        stored.into_block().map(Some)
      }
      None => Ok(None),
    }
  }

  fn tip_height(&self) -> Result<Option<u64>> {
    self
      .db
      .get(KEY_TIP_HEIGHT)?
      .map(|v: IVec| -> Result<u64> {
        let arr: [u8; 8] = v
          .as_ref()
          .try_into()
          .context("tip height is not 8 bytes")?;
        Ok(u64::from_be_bytes(arr))
      })
      .transpose()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
