use crate::{
    config::LedgerConfig, constants::POLL_INTERVAL, now_millis, pow::{self, meets_difficulty}, Block,
    Hash, HashInput, MiningError, Payload,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared stop signal for an in-flight search.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bounds on a single nonce search. `None` leaves that axis open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MiningBudget {
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
}

impl MiningBudget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            timeout: None,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self {
            max_attempts: None,
            timeout: Some(timeout),
        }
    }
}

/// Proof-of-work search for the next block.
#[derive(Clone, Debug)]
pub struct Miner {
    budget: MiningBudget,
    cancel: CancelFlag,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(MiningBudget::default())
    }
}

impl Miner {
    pub fn new(budget: MiningBudget) -> Self {
        Self {
            budget,
            cancel: CancelFlag::new(),
            pool: None,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.budget()).with_threads(config.threads)
    }

    /// Search the nonce space on `threads` workers. One thread (or a pool
    /// that fails to build) keeps the plain sequential loop.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.pool = None;
        if threads > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("miner-{i}"))
                .build()
            {
                Ok(pool) => self.pool = Some(Arc::new(pool)),
                Err(e) => warn!(threads, error = %e, "falling back to sequential mining"),
            }
        }
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn budget(&self) -> MiningBudget {
        self.budget
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Mine the successor of `previous` carrying `payload`.
    ///
    /// The timestamp is taken once, before the search, and the first nonce
    /// (counting up from zero) whose hash has `difficulty` leading zero hex
    /// digits wins.
    pub fn mine(
        &self,
        previous: &Block,
        payload: Payload,
        difficulty: u32,
    ) -> Result<Block, MiningError> {
        self.mine_at(previous.index() + 1, previous.hash(), payload, difficulty)
    }

    pub fn mine_genesis(&self, payload: Payload, difficulty: u32) -> Result<Block, MiningError> {
        self.mine_at(0, crate::constants::GENESIS_PREVIOUS_HASH, payload, difficulty)
    }

    fn mine_at(
        &self,
        index: u64,
        previous_hash: &str,
        payload: Payload,
        difficulty: u32,
    ) -> Result<Block, MiningError> {
        let timestamp = now_millis();
        let input = HashInput::new(index, timestamp, &payload, previous_hash);
        debug!(
            index,
            difficulty,
            expected_attempts = pow::expected_attempts(difficulty),
            threads = self.threads(),
            "mining started"
        );

        let started = Instant::now();
        let (nonce, hash) = self.search(&input, difficulty)?;

        info!(
            index,
            nonce,
            difficulty,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mined block"
        );

        Ok(Block::from_parts(
            index,
            timestamp,
            payload,
            previous_hash.to_string(),
            hex::encode(hash),
            nonce,
            difficulty,
        ))
    }

    /// Find the smallest nonce meeting `difficulty` for a fixed input.
    pub fn search(&self, input: &HashInput, difficulty: u32) -> Result<(u64, Hash), MiningError> {
        let started = Instant::now();
        let limit = self.budget.max_attempts.unwrap_or(u64::MAX);
        let result = match &self.pool {
            Some(pool) => pool.install(|| self.search_parallel(input, difficulty, limit, started)),
            None => self.search_sequential(input, difficulty, limit, started),
        };
        if let Err(e) = &result {
            warn!(difficulty, error = %e, "mining stopped");
        }
        result
    }

    fn search_sequential(
        &self,
        input: &HashInput,
        difficulty: u32,
        limit: u64,
        started: Instant,
    ) -> Result<(u64, Hash), MiningError> {
        let mut nonce = 0u64;
        while nonce < limit {
            if nonce % POLL_INTERVAL == 0 {
                self.check_interrupt(nonce, started)?;
            }
            let hash = input.digest(nonce);
            if meets_difficulty(&hash, difficulty) {
                return Ok((nonce, hash));
            }
            nonce += 1;
        }
        Err(MiningError::Timeout {
            attempts: nonce,
            elapsed: started.elapsed(),
        })
    }

    // `find_map_first` keeps the sequential answer: the lowest winning nonce.
    fn search_parallel(
        &self,
        input: &HashInput,
        difficulty: u32,
        limit: u64,
        started: Instant,
    ) -> Result<(u64, Hash), MiningError> {
        let found = (0..limit).into_par_iter().find_map_first(|nonce| {
            if nonce % POLL_INTERVAL == 0 {
                if let Err(e) = self.check_interrupt(nonce, started) {
                    return Some(Err(e));
                }
            }
            let hash = input.digest(nonce);
            meets_difficulty(&hash, difficulty).then_some(Ok((nonce, hash)))
        });
        found.unwrap_or_else(|| {
            Err(MiningError::Timeout {
                attempts: limit,
                elapsed: started.elapsed(),
            })
        })
    }

    fn check_interrupt(&self, attempts: u64, started: Instant) -> Result<(), MiningError> {
        if self.cancel.is_cancelled() {
            return Err(MiningError::Cancelled { attempts });
        }
        if let Some(timeout) = self.budget.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(MiningError::Timeout { attempts, elapsed });
            }
        }
        Ok(())
    }
}
