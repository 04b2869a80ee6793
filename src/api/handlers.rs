use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::chain::ValidationReport;
use crate::blockchain::crypto::{self, KeyPair};
use crate::blockchain::miner::MiningError;
use crate::blockchain::transaction::{self, TransactionError};
use crate::blockchain::{Address, Block, Blockchain, BlockchainError, DigitalSignature, Transaction};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Request for the sign endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignRequest {
    /// The sender's private key (hex)
    pub private_key: String,

    pub recipient: String,

    pub amount: f64,

    /// The sender's public key; derived from the private key when omitted
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Response for the sign endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignResponse {
    pub sender_public_key: String,
    pub signature: String,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    pub sender_public_key: String,
    pub recipient: String,
    pub amount: f64,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema, Default)]
pub struct MineRequest {
    /// Address credited with the mining reward
    #[serde(default)]
    pub miner_address: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Maps a chain error to a status code and a JSON body
///
/// The `kind` field lets callers tell cryptographic, policy and integrity
/// failures apart without parsing the message.
fn error_response(err: &BlockchainError) -> HttpResponse {
    let (status, kind) = match err {
        BlockchainError::TransactionError(TransactionError::CryptoError(_)) => {
            (StatusCode::BAD_REQUEST, "invalid_key")
        }
        BlockchainError::TransactionError(_) => (StatusCode::BAD_REQUEST, "invalid_transaction"),
        BlockchainError::ReservedSender => (StatusCode::BAD_REQUEST, "reserved_sender"),
        BlockchainError::EmptyPool => (StatusCode::CONFLICT, "empty_pool"),
        BlockchainError::StaleTip(_) => (StatusCode::CONFLICT, "stale_tip"),
        BlockchainError::BlockNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        BlockchainError::MiningError(MiningError::Cancelled { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "mining_cancelled")
        }
        BlockchainError::MiningError(MiningError::IterationLimit { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "mining_limit")
        }
        BlockchainError::MiningError(_)
        | BlockchainError::StorageError(_)
        | BlockchainError::HashError(_) => {
            error!("Internal error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    HttpResponse::build(status).json(serde_json::json!({
        "error": err.to_string(),
        "kind": kind,
    }))
}

/// Generate a keypair
///
/// The private key is returned to the caller and not kept by the node
#[utoipa::path(
    get,
    path = "/api/v1/keys/new",
    responses(
        (status = 200, description = "Keypair generated", body = KeyPair)
    )
)]
pub async fn generate_keys() -> impl Responder {
    HttpResponse::Ok().json(crypto::generate_keypair())
}

/// Sign a transfer
///
/// Produces the signature expected by the transaction endpoint
#[utoipa::path(
    post,
    path = "/api/v1/sign",
    request_body = SignRequest,
    responses(
        (status = 200, description = "Transfer signed", body = SignResponse),
        (status = 400, description = "Invalid key material")
    )
)]
pub async fn sign(sign_req: web::Json<SignRequest>) -> impl Responder {
    let result = transaction::sign_transfer(
        &sign_req.private_key,
        &sign_req.recipient,
        sign_req.amount,
        sign_req.public_key.as_deref(),
    );

    match result {
        Ok((sender_public_key, signature)) => HttpResponse::Ok().json(SignResponse {
            sender_public_key: sender_public_key.0,
            signature: signature.0,
        }),
        Err(err) => error_response(&BlockchainError::from(err)),
    }
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.snapshot();
    let is_valid = blockchain.is_valid();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Get a single block
#[utoipa::path(
    get,
    path = "/api/v1/chain/{index}",
    params(
        ("index" = u64, Path, description = "Block index")
    ),
    responses(
        (status = 200, description = "Block found", body = Block),
        (status = 404, description = "No block at this index")
    )
)]
pub async fn get_block(blockchain: BlockchainData, index: web::Path<u64>) -> impl Responder {
    match blockchain.query(index.into_inner()) {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(err) => error_response(&err),
    }
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.pending_transactions())
}

/// Submit a signed transaction
///
/// Adds a new transaction to the pending transactions
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Invalid transaction")
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let transaction_req = transaction_req.into_inner();
    let transaction = Transaction::new(
        Address(transaction_req.sender_public_key),
        Address(transaction_req.recipient),
        transaction_req.amount,
        transaction_req.signature.map(DigitalSignature),
    );

    match blockchain.add_transaction(transaction) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
        }),
        Err(err) => error_response(&err),
    }
}

/// Mine a new block
///
/// Runs the proof of work on a worker thread so submissions are not blocked
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "Nothing to mine"),
        (status = 503, description = "Mining was stopped")
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    mine_req: Option<web::Json<MineRequest>>,
) -> impl Responder {
    let miner_address = mine_req
        .map(|req| req.into_inner())
        .unwrap_or_default()
        .miner_address
        .map(Address);
    let chain = blockchain.get_ref().clone();

    match web::block(move || chain.mine_pending(miner_address.as_ref())).await {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: format!("Block {} mined", block.index),
            block,
        }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => {
            error!("Mining worker failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Mining worker failed: {}", err),
                "kind": "internal",
            }))
        }
    }
}

/// Check if the blockchain is valid
///
/// Reports the first block that fails validation, if any
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationReport)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(ValidationReport::from(&blockchain.validate()))
}
