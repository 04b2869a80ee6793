use log::{debug, info, warn};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::block::Block;
use super::hash::{self, HashError};

/// How many nonces are tried between checks of the cancel signal
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Errors that end a proof of work search early
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Mining was cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("No valid nonce found within {limit} attempts")]
    IterationLimit { limit: u64 },

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// Shared flag used to ask a running search to stop
///
/// Once triggered the signal stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lazily yields nonce candidates, starting at 0
#[derive(Debug, Clone)]
pub struct NonceCandidates {
    next: Option<u64>,
}

impl NonceCandidates {
    pub fn new() -> Self {
        NonceCandidates { next: Some(0) }
    }
}

impl Iterator for NonceCandidates {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next?;
        self.next = current.checked_add(1);
        Some(current)
    }
}

/// A nonce that satisfies the difficulty, with search statistics
#[derive(Debug, Clone)]
pub struct Proof {
    pub nonce: u64,
    pub hash: String,
    /// Number of hash attempts
    pub attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// Proof of work search for candidate blocks
#[derive(Debug, Clone)]
pub struct Miner {
    /// Required leading zero bits
    pub difficulty: u32,

    /// Optional hard ceiling on attempts
    pub max_iterations: Option<u64>,
}

impl Miner {
    pub fn new(difficulty: u32) -> Self {
        Miner {
            difficulty,
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, limit: u64) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    /// Finds the smallest nonce whose block hash meets the difficulty
    ///
    /// The draft's own `nonce` and `hash` are ignored. The same content and
    /// difficulty always give the same proof.
    pub fn mine(&self, draft: &Block, cancel: &CancelSignal) -> Result<Proof, MiningError> {
        let start = Instant::now();
        let mut attempts = 0;

        info!(
            "Mining block {} with difficulty {} ({} transactions)...",
            draft.index,
            self.difficulty,
            draft.transactions.len()
        );

        let header = draft.header_template()?;

        for nonce in NonceCandidates::new() {
            if let Some(limit) = self.max_iterations {
                if attempts >= limit {
                    warn!("Gave up mining block {} after {} attempts", draft.index, limit);
                    return Err(MiningError::IterationLimit { limit });
                }
            }

            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                warn!("Mining block {} cancelled after {} attempts", draft.index, attempts);
                return Err(MiningError::Cancelled { attempts });
            }

            attempts += 1;
            let hash = header.hash_with_nonce(nonce)?;

            if hash::meets_difficulty(&hash, self.difficulty) {
                let elapsed = start.elapsed().as_millis();
                let hash_rate = if elapsed > 0 {
                    (attempts as f64) / (elapsed as f64 / 1000.0)
                } else {
                    attempts as f64
                };

                info!(
                    "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
                    draft.index, elapsed, attempts, hash_rate
                );
                debug!("Block {} hash {} nonce {}", draft.index, hash, nonce);

                return Ok(Proof {
                    nonce,
                    hash,
                    attempts,
                    time_ms: elapsed,
                    hash_rate,
                });
            }
        }

        // Every u64 nonce failed
        Err(MiningError::IterationLimit { limit: attempts })
    }

    /// Mines a draft in place and returns the attempt count
    pub fn seal(&self, block: &mut Block, cancel: &CancelSignal) -> Result<u64, MiningError> {
        let proof = self.mine(block, cancel)?;
        block.seal(proof.nonce, proof.hash);
        Ok(proof.attempts)
    }
}
