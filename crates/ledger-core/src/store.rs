use crate::Block;
use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;

/// Persistence collaborator for a [`crate::Ledger`].
///
/// This lives in `ledger-core` so storage backends can depend on the core
/// without a cycle. Blocks are written in chain order, one at a time.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, index: u64) -> Result<Option<Block>>;
    /// Index of the highest stored block, `None` when empty.
    fn tip_height(&self) -> Result<Option<u64>>;

    /// All stored blocks, genesis first.
    fn load_chain(&self) -> Result<Vec<Block>> {
        let Some(tip) = self.tip_height()? else {
            return Ok(Vec::new());
        };
        let mut blocks = Vec::with_capacity(tip as usize + 1);
        for index in 0..=tip {
            let block = self
                .get_block(index)?
                .ok_or_else(|| anyhow!("block {index} missing below tip {tip}"))?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl ChainStore for MemoryStore {
    fn put_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write();
        if block.index() != blocks.len() as u64 {
            bail!(
                "out-of-order block {}, expected index {}",
                block.index(),
                blocks.len()
            );
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn get_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.blocks.read().get(index as usize).cloned())
    }

    fn tip_height(&self) -> Result<Option<u64>> {
        Ok(self.blocks.read().len().checked_sub(1).map(|i| i as u64))
    }
}
