use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::hash;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// An opaque public key or recipient identifier (base58 for real keys)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    /// Interprets the address as an Ed25519 public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::InvalidKey(format!("public key is not base58: {}", e)))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey("public key must be 32 bytes".to_string())
        })?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// A base58 encoded Ed25519 signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    /// Decodes the signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("signature must be 64 bytes".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An encoded keypair as handed out to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyPair {
    /// Hex encoded 32 byte secret key
    pub private_key: String,

    /// Base58 encoded public key
    pub public_key: String,
}

/// Holds a signing key together with its derived address
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    /// Restores a wallet from a hex encoded secret key
    pub fn from_private_key(private_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(private_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("private key is not hex: {}", e)))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey("private key must be 32 bytes".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());
        Wallet {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs the SHA-256 digest of `message`
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature = self.signing_key.sign(&hash::digest(message));
        DigitalSignature::from_signature(&signature)
    }

    pub fn export_private_key(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn keypair(&self) -> KeyPair {
        KeyPair {
            private_key: self.export_private_key(),
            public_key: self.address.0.clone(),
        }
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a fresh keypair from the operating system's CSPRNG
pub fn generate_keypair() -> KeyPair {
    Wallet::new().keypair()
}

/// Derives the encoded public key belonging to a private key
pub fn public_key_of(private_key: &str) -> Result<Address, CryptoError> {
    Ok(Wallet::from_private_key(private_key)?.address().clone())
}

/// Signs `payload` with a hex encoded private key
pub fn sign(private_key: &str, payload: &[u8]) -> Result<DigitalSignature, CryptoError> {
    Ok(Wallet::from_private_key(private_key)?.sign(payload))
}

/// Verifies a signature over `payload`
///
/// A signature that does not match, or that cannot even be decoded, yields
/// `Ok(false)`. Only a malformed public key is an error.
pub fn verify(
    public_key: &Address,
    payload: &[u8],
    signature: &DigitalSignature,
) -> Result<bool, CryptoError> {
    let public_key = public_key.to_public_key()?;

    let signature = match signature.to_signature() {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };

    Ok(public_key.verify(&hash::digest(payload), &signature).is_ok())
}
