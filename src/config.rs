//! Chain parameters.

/// Default difficulty in leading zero bits (four zero hex digits)
pub const DEFAULT_DIFFICULTY: u32 = 16;

/// Default coinbase amount credited to the miner of a block
pub const DEFAULT_MINING_REWARD: f64 = 50.0;

/// Parameters fixed for the lifetime of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    /// Required leading zero bits of every block hash after genesis
    pub difficulty: u32,

    /// Coinbase amount; zero disables the reward transaction
    pub mining_reward: f64,

    /// Whether mining an empty pool produces a block
    pub allow_empty_blocks: bool,

    /// Optional ceiling on nonce attempts per block
    pub max_mining_iterations: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            allow_empty_blocks: false,
            max_mining_iterations: None,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        ChainConfig {
            difficulty,
            ..Default::default()
        }
    }
}
