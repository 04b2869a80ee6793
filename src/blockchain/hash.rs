use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur while hashing structured data
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Computes the SHA-256 digest of raw bytes
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes a typed record
///
/// The record is serialized to JSON first. Struct fields are emitted in
/// declaration order, so two logically identical values always produce the
/// same digest.
///
/// # Returns
///
/// The SHA-256 hash as a 64 character lowercase hexadecimal string
pub fn hash<T: Serialize + ?Sized>(data: &T) -> Result<String, HashError> {
    let bytes = serde_json::to_vec(data)?;
    Ok(hex::encode(digest(&bytes)))
}

/// Counts the leading zero bits of a hex encoded digest
///
/// Returns `None` if the digest is not valid hex.
pub fn leading_zero_bits(hex_digest: &str) -> Option<u32> {
    let bytes = hex::decode(hex_digest).ok()?;
    let mut zeros = 0;

    for byte in bytes {
        if byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }

    Some(zeros)
}

/// Checks if a hex encoded digest has at least `difficulty` leading zero bits
pub fn meets_difficulty(hex_digest: &str, difficulty: u32) -> bool {
    match leading_zero_bits(hex_digest) {
        Some(zeros) => zeros >= difficulty,
        None => false,
    }
}
