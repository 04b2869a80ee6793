use clap::Parser;
use std::path::PathBuf;

use signed_ledger::config::{ChainConfig, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};

/// Single-node ledger with signed transactions and proof of work.
#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Signed proof-of-work ledger node", version)]
pub struct Cli {
    /// Address to bind the HTTP API to.
    #[arg(long, env = "LEDGER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the HTTP API.
    #[arg(long, short = 'p', env = "LEDGER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory for the block database. The chain is kept in memory when omitted.
    #[arg(long, short = 'd', env = "LEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Required leading zero bits of every block hash.
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Coinbase amount paid to the miner of a block (0 disables it).
    #[arg(long, env = "LEDGER_MINING_REWARD", default_value_t = DEFAULT_MINING_REWARD)]
    pub mining_reward: f64,

    /// Mine blocks even when no transactions are pending.
    #[arg(long, env = "LEDGER_ALLOW_EMPTY_BLOCKS")]
    pub allow_empty_blocks: bool,

    /// Give up on a block after this many nonce attempts.
    #[arg(long, env = "LEDGER_MAX_MINING_ITERATIONS")]
    pub max_mining_iterations: Option<u64>,
}

impl Cli {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            allow_empty_blocks: self.allow_empty_blocks,
            max_mining_iterations: self.max_mining_iterations,
        }
    }
}
