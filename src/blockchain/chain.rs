use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::path::Path;
use std::sync::Arc;

use super::block::Block;
use super::crypto::Address;
use super::hash::HashError;
use super::miner::{CancelSignal, Miner, MiningError};
use super::storage::{BlockStore, BlockchainStorage, StorageError};
use super::transaction::{Transaction, TransactionError};
use crate::config::ChainConfig;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Invalid transaction: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("The \"system\" sender is reserved for mining rewards")]
    ReservedSender,

    #[error("No pending transactions to mine")]
    EmptyPool,

    #[error("Chain tip moved while mining block {0}")]
    StaleTip(u64),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// What validation found wrong with a block
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TamperKind {
    #[error("chain has no genesis block")]
    MissingGenesis,

    #[error("genesis block was altered")]
    GenesisAltered,

    #[error("expected index {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("stored hash does not match block contents")]
    HashMismatch,

    #[error("hash does not meet difficulty {0}")]
    InsufficientWork(u32),

    #[error("previous hash does not match the preceding block")]
    BrokenLink,

    #[error("timestamp is earlier than the preceding block")]
    TimestampRegression,

    #[error("transaction {position} is invalid: {reason}")]
    InvalidTransaction { position: usize, reason: String },

    #[error("block cannot be hashed: {0}")]
    Unhashable(String),
}

/// The first integrity failure found in a chain
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Chain tampered at block {index}: {kind}")]
pub struct ChainTampered {
    pub index: u64,
    pub kind: TamperKind,
}

pub type ValidationResult = Result<(), ChainTampered>;

/// Serializable outcome of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationReport {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_index: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ValidationResult> for ValidationReport {
    fn from(result: &ValidationResult) -> Self {
        match result {
            Ok(()) => ValidationReport {
                valid: true,
                first_invalid_index: None,
                reason: None,
            },
            Err(tampered) => ValidationReport {
                valid: false,
                first_invalid_index: Some(tampered.index),
                reason: Some(tampered.kind.to_string()),
            },
        }
    }
}

/// Walks a sequence of blocks and reports the first integrity failure
pub fn validate_blocks(blocks: &[Block], difficulty: u32) -> ValidationResult {
    let tampered = |index: u64, kind: TamperKind| -> ValidationResult {
        Err(ChainTampered { index, kind })
    };

    let genesis = match blocks.first() {
        Some(genesis) => genesis,
        None => return tampered(0, TamperKind::MissingGenesis),
    };

    let expected_genesis = match Block::genesis() {
        Ok(expected) => expected,
        Err(err) => return tampered(0, TamperKind::Unhashable(err.to_string())),
    };

    // Content only; an overwritten genesis hash shows up as block 1's broken link
    let genesis_content = Block {
        hash: expected_genesis.hash.clone(),
        ..genesis.clone()
    };
    if genesis_content != expected_genesis {
        return tampered(0, TamperKind::GenesisAltered);
    }

    for (position, pair) in blocks.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let expected = position as u64 + 1;

        if current.index != expected {
            return tampered(
                expected,
                TamperKind::IndexMismatch {
                    expected,
                    found: current.index,
                },
            );
        }

        match current.compute_hash() {
            Ok(hash) if hash == current.hash => {}
            Ok(_) => return tampered(expected, TamperKind::HashMismatch),
            Err(err) => return tampered(expected, TamperKind::Unhashable(err.to_string())),
        }

        if !current.meets_difficulty(difficulty) {
            return tampered(expected, TamperKind::InsufficientWork(difficulty));
        }

        if current.previous_hash != previous.hash {
            return tampered(expected, TamperKind::BrokenLink);
        }

        if current.timestamp < previous.timestamp {
            return tampered(expected, TamperKind::TimestampRegression);
        }

        for (position, transaction) in current.transactions.iter().enumerate() {
            if let Err(err) = transaction.verify() {
                return tampered(
                    expected,
                    TamperKind::InvalidTransaction {
                        position,
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    // Nothing links to it, or the whole chain was relinked onto it
    if genesis.hash != expected_genesis.hash {
        return tampered(0, TamperKind::HashMismatch);
    }

    Ok(())
}

#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

impl ChainState {
    fn tip(&self) -> &Block {
        // Never empty: every constructor installs a genesis block
        &self.blocks[self.blocks.len() - 1]
    }
}

/// A block under construction and how many pool entries it consumes
#[derive(Debug)]
struct Candidate {
    block: Block,
    included: usize,
}

/// Represents the blockchain
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// Blocks and pending pool, behind one lock
    state: Arc<RwLock<ChainState>>,

    /// Serializes mining so only one append is in flight
    mining: Arc<Mutex<()>>,

    config: ChainConfig,

    /// Stops in-flight searches on shutdown
    shutdown: CancelSignal,

    storage: Option<Arc<dyn BlockStore>>,
}

impl Blockchain {
    /// Creates a new in-memory blockchain with a genesis block
    pub fn new(config: ChainConfig) -> Result<Self, BlockchainError> {
        Ok(Self::from_blocks(vec![Block::genesis()?], config, None))
    }

    /// Opens a blockchain backed by the database at `storage_path`
    ///
    /// An existing chain is loaded as stored. If it fails validation the
    /// failure is logged and the chain is kept as is; nothing is repaired.
    pub fn with_storage<P: AsRef<Path>>(
        storage_path: P,
        config: ChainConfig,
    ) -> Result<Self, BlockchainError> {
        let storage = BlockchainStorage::new(storage_path)?;
        Self::with_store(Arc::new(storage), config)
    }

    /// Opens a blockchain on top of any block store
    pub fn with_store(
        store: Arc<dyn BlockStore>,
        config: ChainConfig,
    ) -> Result<Self, BlockchainError> {
        let mut blocks = store.load_blocks()?;

        if blocks.is_empty() {
            info!("No existing blockchain found in storage, creating genesis block");
            let genesis = Block::genesis()?;
            store.append_block(&genesis)?;
            blocks.push(genesis);
        } else {
            info!("Loaded {} blocks from storage", blocks.len());
            if let Err(tampered) = validate_blocks(&blocks, config.difficulty) {
                error!("Stored chain failed validation: {}", tampered);
            }
        }

        Ok(Self::from_blocks(blocks, config, Some(store)))
    }

    fn from_blocks(
        blocks: Vec<Block>,
        config: ChainConfig,
        storage: Option<Arc<dyn BlockStore>>,
    ) -> Self {
        Blockchain {
            state: Arc::new(RwLock::new(ChainState {
                blocks,
                pending_transactions: Vec::new(),
            })),
            mining: Arc::new(Mutex::new(())),
            config,
            shutdown: CancelSignal::new(),
            storage,
        }
    }

    /// Adds a verified transaction to the pending pool
    ///
    /// # Returns
    ///
    /// The index of the next block to be mined
    pub fn add_transaction(&self, transaction: Transaction) -> Result<u64, BlockchainError> {
        if transaction.is_coinbase() {
            warn!("Rejected client transaction using the reserved system sender");
            return Err(BlockchainError::ReservedSender);
        }

        if let Err(err) = transaction.verify() {
            warn!(
                "Rejected transaction from {}: {}",
                transaction.sender_public_key, err
            );
            return Err(err.into());
        }

        let mut state = self.state.write();
        info!(
            "Accepted transaction {} -> {} ({})",
            transaction.sender_public_key, transaction.recipient, transaction.amount
        );
        state.pending_transactions.push(transaction);

        Ok(state.blocks.len() as u64)
    }

    /// Mines the pending pool into a new block
    ///
    /// A coinbase paying the configured reward to `miner_address` is appended
    /// after the pool transactions.
    pub fn mine_pending(&self, miner_address: Option<&Address>) -> Result<Block, BlockchainError> {
        self.mine_pending_with(miner_address, &self.shutdown)
    }

    /// Like [`Blockchain::mine_pending`], stopping early when `cancel` fires
    pub fn mine_pending_with(
        &self,
        miner_address: Option<&Address>,
        cancel: &CancelSignal,
    ) -> Result<Block, BlockchainError> {
        let _mining = self.mining.lock();

        let mut candidate = self.prepare_candidate(miner_address)?;

        let mut miner = Miner::new(self.config.difficulty);
        if let Some(limit) = self.config.max_mining_iterations {
            miner = miner.with_max_iterations(limit);
        }
        miner.seal(&mut candidate.block, cancel)?;

        self.commit(candidate)
    }

    /// Snapshots the pool into an unsealed block on top of the current tip
    fn prepare_candidate(&self, miner_address: Option<&Address>) -> Result<Candidate, BlockchainError> {
        let state = self.state.read();

        if state.pending_transactions.is_empty() && !self.config.allow_empty_blocks {
            return Err(BlockchainError::EmptyPool);
        }

        let mut transactions = state.pending_transactions.clone();
        let included = transactions.len();

        if let Some(miner_address) = miner_address {
            if self.config.mining_reward > 0.0 {
                transactions.push(Transaction::new_coinbase(
                    miner_address.clone(),
                    self.config.mining_reward,
                ));
            }
        }

        let tip = state.tip();
        let mut block = Block::draft(tip.index + 1, tip.hash.clone(), transactions);
        if block.timestamp < tip.timestamp {
            block.timestamp = tip.timestamp;
        }

        Ok(Candidate { block, included })
    }

    /// Appends a sealed candidate and drops the transactions it consumed
    ///
    /// The block is persisted first; if that fails the chain and the pool
    /// are left as they were. Only blocks appended here move the tip, and
    /// callers hold the mining lock.
    fn commit(&self, candidate: Candidate) -> Result<Block, BlockchainError> {
        let Candidate { block, included } = candidate;

        {
            let state = self.state.read();
            let tip = state.tip();

            if block.index != tip.index + 1 || block.previous_hash != tip.hash {
                return Err(BlockchainError::StaleTip(block.index));
            }
        }

        if let Some(storage) = &self.storage {
            if let Err(err) = storage.append_block(&block) {
                error!("Failed to store block {}: {}", block.index, err);
                return Err(err.into());
            }
            info!("Saved block {} to storage", block.index);
        }

        let mut state = self.state.write();
        state.blocks.push(block.clone());
        // Transactions submitted while mining sit behind the included ones
        state.pending_transactions.drain(..included);

        Ok(block)
    }

    /// Asks any in-flight mining started through [`Blockchain::mine_pending`] to stop
    ///
    /// The signal stays set, so later calls to `mine_pending` fail as cancelled.
    pub fn cancel_mining(&self) {
        self.shutdown.cancel();
    }

    /// Validates the whole chain against a snapshot of its blocks
    pub fn validate(&self) -> ValidationResult {
        let blocks = self.snapshot();
        let result = validate_blocks(&blocks, self.config.difficulty);

        if let Err(tampered) = &result {
            warn!("{}", tampered);
        }

        result
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Gets a block by index
    pub fn query(&self, index: u64) -> Result<Block, BlockchainError> {
        let state = self.state.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.blocks.get(i))
            .cloned()
            .ok_or(BlockchainError::BlockNotFound(index))
    }

    /// Gets the entire blockchain
    pub fn snapshot(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    pub fn last_block(&self) -> Block {
        self.state.read().tip().clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().pending_transactions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::GENESIS_PREVIOUS_HASH;
    use crate::blockchain::crypto::Wallet;

    const TEST_DIFFICULTY: u32 = 6;

    fn test_chain() -> Blockchain {
        Blockchain::new(ChainConfig::with_difficulty(TEST_DIFFICULTY)).unwrap()
    }

    fn transfer(from: &Wallet, to: &Address, amount: f64) -> Transaction {
        Transaction::signed(from, to.clone(), amount).unwrap()
    }

    /// A chain with three mined blocks after genesis
    fn mined_chain() -> Blockchain {
        let blockchain = test_chain();
        let alice = Wallet::new();
        let bob = Wallet::new();
        let miner = Address::from("miner");

        for amount in [1.0, 2.0, 3.0] {
            blockchain
                .add_transaction(transfer(&alice, bob.address(), amount))
                .unwrap();
            blockchain.mine_pending(Some(&miner)).unwrap();
        }

        assert_eq!(blockchain.len(), 4);
        blockchain
    }

    fn reseal(block: &mut Block) {
        Miner::new(TEST_DIFFICULTY)
            .seal(block, &CancelSignal::new())
            .unwrap();
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = test_chain();
        let chain = blockchain.snapshot();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 0);
        assert_eq!(chain[0].previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_add_transaction() {
        let blockchain = test_chain();
        let sender = Wallet::new();

        let block_index = blockchain
            .add_transaction(transfer(&sender, &Address::from("bob"), 10.0))
            .unwrap();

        assert_eq!(block_index, 1);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let blockchain = test_chain();
        let sender = Wallet::new();

        let result = blockchain.add_transaction(transfer(&sender, &Address::from("bob"), -1.0));

        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::InvalidAmount(_)))
        ));
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.len(), 1);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let blockchain = test_chain();
        let sender = Wallet::new();

        let mut transaction = transfer(&sender, &Address::from("bob"), 1.0);
        transaction.amount = 2.0;

        assert!(matches!(
            blockchain.add_transaction(transaction),
            Err(BlockchainError::TransactionError(TransactionError::InvalidSignature))
        ));

        let unsigned = Transaction::new(sender.address().clone(), Address::from("bob"), 1.0, None);
        assert!(matches!(
            blockchain.add_transaction(unsigned),
            Err(BlockchainError::TransactionError(TransactionError::NotSigned))
        ));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_client_coinbase_is_rejected() {
        let blockchain = test_chain();
        let coinbase = Transaction::new_coinbase(Address::from("me"), 1_000_000.0);

        assert!(matches!(
            blockchain.add_transaction(coinbase),
            Err(BlockchainError::ReservedSender)
        ));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_mine_block_keeps_submission_order() {
        let blockchain = test_chain();
        let a = Wallet::new();
        let b = Wallet::new();
        let c = Wallet::new();
        let miner = Address::from("miner");

        let first = transfer(&a, b.address(), 5.0);
        let second = transfer(&b, c.address(), 3.0);
        blockchain.add_transaction(first.clone()).unwrap();
        blockchain.add_transaction(second.clone()).unwrap();

        let block = blockchain.mine_pending(Some(&miner)).unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(block.transactions[0], first);
        assert_eq!(block.transactions[1], second);
        assert!(block.transactions[2].is_coinbase());
        assert_eq!(block.transactions[2].recipient, miner);
        assert_eq!(block.transactions[2].amount, 50.0);
        assert_eq!(block.previous_hash, blockchain.query(0).unwrap().hash);

        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.last_block(), block);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_mine_without_miner_address_has_no_coinbase() {
        let blockchain = test_chain();
        blockchain
            .add_transaction(transfer(&Wallet::new(), &Address::from("bob"), 1.0))
            .unwrap();

        let block = blockchain.mine_pending(None).unwrap();

        assert_eq!(block.transactions.len(), 1);
        assert!(!block.transactions[0].is_coinbase());
    }

    #[test]
    fn test_empty_pool() {
        let blockchain = test_chain();

        assert!(matches!(
            blockchain.mine_pending(Some(&Address::from("miner"))),
            Err(BlockchainError::EmptyPool)
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_empty_blocks_when_allowed() {
        let config = ChainConfig {
            allow_empty_blocks: true,
            ..ChainConfig::with_difficulty(TEST_DIFFICULTY)
        };
        let blockchain = Blockchain::new(config).unwrap();

        let reward_only = blockchain.mine_pending(Some(&Address::from("miner"))).unwrap();
        assert_eq!(reward_only.transactions.len(), 1);
        assert!(reward_only.transactions[0].is_coinbase());

        let empty = blockchain.mine_pending(None).unwrap();
        assert!(empty.transactions.is_empty());

        assert_eq!(blockchain.len(), 3);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_mined_blocks_meet_difficulty() {
        let blockchain = mined_chain();

        for block in blockchain.snapshot().iter().skip(1) {
            assert!(block.meets_difficulty(TEST_DIFFICULTY));
            for nonce in 0..block.nonce {
                let hash = block.hash_with_nonce(nonce).unwrap();
                assert!(!crate::blockchain::hash::meets_difficulty(&hash, TEST_DIFFICULTY));
            }
        }
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_transactions_submitted_while_mining_stay_pending() {
        let blockchain = test_chain();
        let sender = Wallet::new();
        let bob = Address::from("bob");

        blockchain.add_transaction(transfer(&sender, &bob, 1.0)).unwrap();
        blockchain.add_transaction(transfer(&sender, &bob, 2.0)).unwrap();

        let mut candidate = blockchain.prepare_candidate(None).unwrap();
        reseal(&mut candidate.block);

        let late = transfer(&sender, &bob, 3.0);
        blockchain.add_transaction(late.clone()).unwrap();

        let block = blockchain.commit(candidate).unwrap();

        assert_eq!(block.transactions.len(), 2);
        assert_eq!(blockchain.pending_transactions(), vec![late]);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_stale_candidate_is_refused() {
        let blockchain = test_chain();
        let sender = Wallet::new();
        blockchain
            .add_transaction(transfer(&sender, &Address::from("bob"), 1.0))
            .unwrap();

        let mut stale = blockchain.prepare_candidate(None).unwrap();
        reseal(&mut stale.block);

        blockchain.mine_pending(None).unwrap();

        assert!(matches!(
            blockchain.commit(stale),
            Err(BlockchainError::StaleTip(1))
        ));
        assert_eq!(blockchain.len(), 2);
    }

    #[test]
    fn test_concurrent_submissions() {
        let blockchain = test_chain();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let blockchain = blockchain.clone();
                std::thread::spawn(move || {
                    let wallet = Wallet::new();
                    for amount in 0..5 {
                        blockchain
                            .add_transaction(transfer(&wallet, &Address::from("bob"), amount as f64))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let block = blockchain.mine_pending(None).unwrap();
        assert_eq!(block.transactions.len(), 20);
        assert!(blockchain.pending_transactions().is_empty());
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_cancel_mining() {
        let blockchain = Blockchain::new(ChainConfig::with_difficulty(200)).unwrap();
        blockchain
            .add_transaction(transfer(&Wallet::new(), &Address::from("bob"), 1.0))
            .unwrap();

        blockchain.cancel_mining();

        assert!(matches!(
            blockchain.mine_pending(None),
            Err(BlockchainError::MiningError(MiningError::Cancelled { .. }))
        ));
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_iteration_ceiling() {
        let config = ChainConfig {
            max_mining_iterations: Some(10),
            ..ChainConfig::with_difficulty(200)
        };
        let blockchain = Blockchain::new(config).unwrap();
        blockchain
            .add_transaction(transfer(&Wallet::new(), &Address::from("bob"), 1.0))
            .unwrap();

        assert!(matches!(
            blockchain.mine_pending(None),
            Err(BlockchainError::MiningError(MiningError::IterationLimit { limit: 10 }))
        ));
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_query() {
        let blockchain = mined_chain();

        assert_eq!(blockchain.query(2).unwrap().index, 2);
        assert!(matches!(
            blockchain.query(4),
            Err(BlockchainError::BlockNotFound(4))
        ));
        assert!(matches!(
            blockchain.query(u64::MAX),
            Err(BlockchainError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_tampered_amount_is_detected_at_its_block() {
        let blockchain = mined_chain();

        blockchain.state.write().blocks[2].transactions[0].amount = 1000.0;

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 2);
        assert_eq!(tampered.kind, TamperKind::HashMismatch);

        let report = ValidationReport::from(&blockchain.validate());
        assert!(!report.valid);
        assert_eq!(report.first_invalid_index, Some(2));
    }

    #[test]
    fn test_resealed_block_breaks_next_link() {
        let blockchain = mined_chain();

        {
            let mut state = blockchain.state.write();
            let block = &mut state.blocks[1];
            block.transactions.remove(0);
            reseal(block);
        }

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 2);
        assert_eq!(tampered.kind, TamperKind::BrokenLink);
    }

    #[test]
    fn test_overwritten_hash_is_detected() {
        let blockchain = mined_chain();

        blockchain.state.write().blocks[1].hash = "0".repeat(64);

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 1);
        assert_eq!(tampered.kind, TamperKind::HashMismatch);
    }

    #[test]
    fn test_tampered_nonce_is_detected() {
        let blockchain = mined_chain();

        blockchain.state.write().blocks[3].nonce += 1;

        assert_eq!(blockchain.validate().unwrap_err().index, 3);
    }

    #[test]
    fn test_forged_signature_is_detected() {
        let blockchain = mined_chain();

        {
            let mut state = blockchain.state.write();
            let block = &mut state.blocks[1];
            // Signatures are not hashed into the block, so this needs no reseal
            block.transactions[0].signature = Some(Wallet::new().sign(b"forged"));
        }

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 1);
        assert!(matches!(
            tampered.kind,
            TamperKind::InvalidTransaction { position: 0, .. }
        ));
    }

    #[test]
    fn test_insufficient_work_is_detected() {
        let blockchain = mined_chain();
        let strict = validate_blocks(&blockchain.snapshot(), 64).unwrap_err();

        assert_eq!(strict.index, 1);
        assert_eq!(strict.kind, TamperKind::InsufficientWork(64));
    }

    #[test]
    fn test_genesis_tampering_is_detected() {
        let blockchain = mined_chain();

        blockchain.state.write().blocks[0].nonce = 42;

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 0);
        assert_eq!(tampered.kind, TamperKind::GenesisAltered);
        assert_eq!(validate_blocks(&[], 0).unwrap_err().kind, TamperKind::MissingGenesis);
    }

    #[test]
    fn test_overwritten_genesis_hash_breaks_first_link() {
        let blockchain = mined_chain();

        blockchain.state.write().blocks[0].hash = "f".repeat(64);

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 1);
        assert_eq!(tampered.kind, TamperKind::BrokenLink);
    }

    #[test]
    fn test_lone_genesis_with_overwritten_hash() {
        let blockchain = test_chain();

        blockchain.state.write().blocks[0].hash = "f".repeat(64);

        let tampered = blockchain.validate().unwrap_err();
        assert_eq!(tampered.index, 0);
        assert_eq!(tampered.kind, TamperKind::HashMismatch);
    }

    #[test]
    fn test_replayed_transfer_is_accepted() {
        let blockchain = test_chain();
        let transaction = transfer(&Wallet::new(), &Address::from("bob"), 1.0);

        blockchain.add_transaction(transaction.clone()).unwrap();
        blockchain.add_transaction(transaction.clone()).unwrap();
        let first = blockchain.mine_pending(None).unwrap();

        blockchain.add_transaction(transaction.clone()).unwrap();
        let second = blockchain.mine_pending(None).unwrap();

        assert_eq!(first.transactions, vec![transaction.clone(), transaction.clone()]);
        assert_eq!(second.transactions, vec![transaction]);
        assert!(blockchain.validate().is_ok());
    }

    #[test]
    fn test_validate_does_not_repair() {
        let blockchain = mined_chain();
        blockchain.state.write().blocks[2].transactions[0].amount = 1000.0;

        let before = blockchain.snapshot();
        assert!(blockchain.validate().is_err());
        assert!(blockchain.validate().is_err());
        assert_eq!(blockchain.snapshot(), before);
    }

    #[test]
    fn test_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig::with_difficulty(TEST_DIFFICULTY);

        let expected = {
            let blockchain = Blockchain::with_storage(dir.path(), config.clone()).unwrap();
            blockchain
                .add_transaction(transfer(&Wallet::new(), &Address::from("bob"), 0.1))
                .unwrap();
            blockchain.mine_pending(Some(&Address::from("miner"))).unwrap();
            blockchain.snapshot()
        };

        let reopened = Blockchain::with_storage(dir.path(), config).unwrap();
        assert_eq!(reopened.snapshot(), expected);
        assert!(reopened.validate().is_ok());
    }

    /// In-memory store whose writes can be made to fail
    #[derive(Debug, Default)]
    struct FlakyStore {
        blocks: Mutex<Vec<Block>>,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn set_failing(&self, failing: bool) {
            self.failing
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl BlockStore for FlakyStore {
        fn load_blocks(&self) -> Result<Vec<Block>, StorageError> {
            Ok(self.blocks.lock().clone())
        }

        fn append_block(&self, block: &Block) -> Result<(), StorageError> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StorageError::DatabaseError(sled::Error::Io(
                    std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                )));
            }
            self.blocks.lock().push(block.clone());
            Ok(())
        }
    }

    #[test]
    fn test_failed_store_write_leaves_chain_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let blockchain = Blockchain::with_store(
            store.clone(),
            ChainConfig::with_difficulty(TEST_DIFFICULTY),
        )
        .unwrap();
        let transaction = transfer(&Wallet::new(), &Address::from("bob"), 1.0);
        blockchain.add_transaction(transaction.clone()).unwrap();

        store.set_failing(true);
        assert!(matches!(
            blockchain.mine_pending(None),
            Err(BlockchainError::StorageError(_))
        ));
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.pending_transactions(), vec![transaction]);

        store.set_failing(false);
        let block = blockchain.mine_pending(None).unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(store.load_blocks().unwrap(), blockchain.snapshot());
        assert!(validate_blocks(&store.load_blocks().unwrap(), TEST_DIFFICULTY).is_ok());
    }
}
