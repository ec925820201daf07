pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// One hex digit per nibble, so a digest can demand at most this many zeros.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_DIFFICULTY: u32 = 4;

pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_DIFFICULTY: u32 = 1;
pub const GENESIS_MESSAGE: &str = "genesis";

/// Attempts between deadline / cancellation checks in the nonce search.
pub const POLL_INTERVAL: u64 = 1024;
pub const DEFAULT_MINING_TIMEOUT_MS: u64 = 30_000;
