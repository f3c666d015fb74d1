//! Cryptographic Primitives Module
//!
//! This module provides the primitives the bounty protocol is built from:
//! - secp256k1 key agreement between poster and solver
//! - fixed-width limb encoding of large integers
//! - the Poseidon permutation over the BN254 scalar field
//! - the Poseidon stream cipher used to transmit the factors
//! - the canonical public-commitment binder

use sha2::Digest;

pub mod limbs;
pub mod key_agreement;
pub mod poseidon;
pub mod cipher;
pub mod commitments;

// Re-export main types
pub use limbs::*;
pub use key_agreement::*;
pub use poseidon::*;
pub use cipher::*;
pub use commitments::*;

/// Cryptographic error types
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Limb encoding failed: {0}")]
    LimbEncoding(String),

    #[error("Nonce rejected: {0}")]
    InvalidNonce(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Domain constants for cryptographic operations
pub mod domains {
    /// Domain separator for relation shape digests
    pub const DOMAIN_SHAPE: &[u8] = b"info-bounty-relation-shape";
}

/// Cryptographic utilities
pub struct CryptoUtils;

impl CryptoUtils {
    /// Hash data with SHA-256
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        sha2::Sha256::digest(data).into()
    }

    /// Double SHA-256, as used for transaction digests
    pub fn sha256d(data: &[u8]) -> [u8; 32] {
        Self::sha256(&Self::sha256(data))
    }

    /// RIPEMD-160 of SHA-256, the ledger's public key hash
    pub fn hash160(data: &[u8]) -> [u8; 20] {
        ripemd::Ripemd160::digest(Self::sha256(data)).into()
    }

    /// Hash data with BLAKE2s-256
    pub fn blake2s256(data: &[u8]) -> [u8; 32] {
        blake2::Blake2s256::digest(data).into()
    }

    /// Constant-time comparison of byte arrays
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        a.ct_eq(b).into()
    }

    /// Convert bytes to hex string
    pub fn to_hex(bytes: &[u8]) -> String {
        hex::encode(bytes)
    }

    /// Convert hex string to bytes
    pub fn from_hex(hex: &str) -> CryptoResult<Vec<u8>> {
        hex::decode(hex).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_utils() {
        let hash = CryptoUtils::sha256(b"test data");
        let hex = CryptoUtils::to_hex(&hash);
        let decoded = CryptoUtils::from_hex(&hex).unwrap();
        assert_eq!(hash.to_vec(), decoded);
        assert!(CryptoUtils::from_hex("zz").is_err());
    }

    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            CryptoUtils::to_hex(&CryptoUtils::sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash160_width() {
        let a = CryptoUtils::hash160(b"key");
        let b = CryptoUtils::hash160(b"key2");
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_time_comparison() {
        let a = [1u8, 2u8, 3u8];
        let b = [1u8, 2u8, 3u8];
        let c = [1u8, 2u8, 4u8];

        assert!(CryptoUtils::constant_time_eq(&a, &b));
        assert!(!CryptoUtils::constant_time_eq(&a, &c));
    }
}
