//! A single-node ledger of signed transactions, linked by SHA-256 and secured
//! by proof of work, with full-chain tamper detection.

pub mod api;
pub mod blockchain;
pub mod config;

pub use blockchain::{Block, Blockchain, BlockchainError, Transaction};
pub use config::ChainConfig;
