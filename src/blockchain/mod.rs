// Blockchain module
//
// This module contains the ledger core:
// - Content hashing and difficulty checks
// - Keys and signatures
// - Transaction and Block structures
// - Proof of work search
// - The chain itself, with validation and optional storage

pub mod block;
pub mod chain;
pub mod crypto;
pub mod hash;
pub mod miner;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError, ChainTampered, TamperKind, ValidationReport};
pub use crypto::{Address, DigitalSignature, KeyPair, Wallet};
pub use miner::{CancelSignal, Miner};
pub use transaction::Transaction;
