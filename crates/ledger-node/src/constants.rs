pub(crate) const BLOCKS_PER_BATCH: usize = 25;
pub(crate) const MAX_BLOCKS_PER_REQUEST: usize = BLOCKS_PER_BATCH * 10;
/// Blocks listed by `GET /chain` when no limit is given.
pub(crate) const DEFAULT_CHAIN_LIMIT: usize = 10;
