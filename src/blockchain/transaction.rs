use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{self, Address, CryptoError, DigitalSignature, Wallet};
use super::hash::HashError;

/// Sender value reserved for coinbase (mining reward) transactions
pub const SYSTEM_SENDER: &str = "system";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Hash error: {0}")]
    HashError(#[from] HashError),
}

/// A transfer record, optionally signed by the sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's public key, or `"system"` for a coinbase
    pub sender_public_key: Address,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Signature over the canonical payload
    pub signature: Option<DigitalSignature>,
}

/// The fields covered by a transaction signature, in their fixed order
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    sender_public_key: &'a str,
    recipient: &'a str,
    amount: f64,
}

impl<'a> CanonicalPayload<'a> {
    fn to_json(&self) -> Result<String, HashError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Transaction {
    /// Creates a transaction without checking it
    ///
    /// Verification is a separate step, see [`Transaction::verify`].
    pub fn new(
        sender_public_key: Address,
        recipient: Address,
        amount: f64,
        signature: Option<DigitalSignature>,
    ) -> Self {
        Transaction {
            sender_public_key,
            recipient,
            amount,
            signature,
        }
    }

    /// Creates a coinbase transaction (mining reward)
    pub fn new_coinbase(recipient: Address, amount: f64) -> Self {
        Transaction {
            sender_public_key: Address(SYSTEM_SENDER.to_string()),
            recipient,
            amount,
            signature: None,
        }
    }

    /// Creates and signs a transfer from the wallet's address
    pub fn signed(wallet: &Wallet, recipient: Address, amount: f64) -> Result<Self, TransactionError> {
        let mut transaction = Transaction::new(wallet.address().clone(), recipient, amount, None);
        transaction.signature = Some(wallet.sign(&transaction.canonical_payload()?));
        Ok(transaction)
    }

    /// The canonical JSON of the signed fields
    pub fn canonical_json(&self) -> Result<String, HashError> {
        CanonicalPayload {
            sender_public_key: &self.sender_public_key.0,
            recipient: &self.recipient.0,
            amount: self.amount,
        }
        .to_json()
    }

    /// The exact bytes that are signed and verified
    pub fn canonical_payload(&self) -> Result<Vec<u8>, HashError> {
        Ok(self.canonical_json()?.into_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender_public_key.0 == SYSTEM_SENDER
    }

    /// Checks the transaction and reports why it is invalid
    pub fn verify(&self) -> Result<(), TransactionError> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must be a non-negative number: {}",
                self.amount
            )));
        }

        if self.is_coinbase() {
            return Ok(());
        }

        let signature = self.signature.as_ref().ok_or(TransactionError::NotSigned)?;

        if crypto::verify(&self.sender_public_key, &self.canonical_payload()?, signature)? {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

/// Signs a transfer on behalf of the holder of `private_key`
///
/// When `public_key` is omitted it is derived from the private key. A supplied
/// public key that does not belong to the private key is rejected, since the
/// resulting signature could never verify.
pub fn sign_transfer(
    private_key: &str,
    recipient: &str,
    amount: f64,
    public_key: Option<&str>,
) -> Result<(Address, DigitalSignature), TransactionError> {
    let wallet = Wallet::from_private_key(private_key)?;

    if let Some(public_key) = public_key {
        if public_key != wallet.address().0 {
            return Err(TransactionError::InvalidSender(
                "Public key does not belong to the private key".to_string(),
            ));
        }
    }

    let transaction = Transaction::signed(&wallet, Address::from(recipient), amount)?;
    let signature = transaction.signature.ok_or(TransactionError::NotSigned)?;

    Ok((transaction.sender_public_key, signature))
}
