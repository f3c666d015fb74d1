//! Public Commitment Binder
//!
//! Binds every public protocol parameter into one SHA-256 digest so the
//! proof's public inputs cannot be swapped after the fact. The byte layout is
//! a wire contract shared by the prover, the settlement contract and anyone
//! reading the claim's data output:
//!
//! | field           | bytes                                   |
//! |-----------------|-----------------------------------------|
//! | sender point    | 64 (`x ‖ y`, 32 bytes big-endian each)  |
//! | receiver point  | 64                                      |
//! | nonce           | 32 big-endian                           |
//! | ciphertext      | 32 big-endian per element               |
//! | modulus         | 32 big-endian per limb, limb 0 first    |
//!
//! The digest is split into `Hpub0` (bytes 0..16) and `Hpub1` (bytes 16..32),
//! each read as a big-endian integer.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{Serialize, Deserialize};
use serde_with::{serde_as, Bytes};
use crate::crypto::key_agreement::CurvePoint;
use crate::crypto::limbs::field_to_be_bytes;
use crate::crypto::CryptoUtils;

/// Bytes per serialized word
pub const WORD_BYTES: usize = 32;

/// Bytes per digest half
pub const HALF_DIGEST_BYTES: usize = 16;

/// Commitment digest with its two field-sized halves
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCommitment {
    /// SHA-256 digest of the canonical payload
    #[serde_as(as = "Bytes")]
    pub digest: [u8; 32],
}

impl PublicCommitment {
    /// Wrap a digest
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self { digest }
    }

    /// `(Hpub0, Hpub1)`
    pub fn halves(&self) -> (Fr, Fr) {
        (
            Fr::from_be_bytes_mod_order(&self.digest[..HALF_DIGEST_BYTES]),
            Fr::from_be_bytes_mod_order(&self.digest[HALF_DIGEST_BYTES..]),
        )
    }

    /// Digest as lowercase hex
    pub fn to_hex(&self) -> String {
        CryptoUtils::to_hex(&self.digest)
    }
}

/// Canonical serialization and hashing of the public parameters
pub struct CommitmentBinder;

impl CommitmentBinder {
    /// Canonical payload bytes
    pub fn payload(
        sender: &CurvePoint,
        receiver: &CurvePoint,
        nonce: &Fr,
        ciphertext: &[Fr],
        modulus_limbs: &[u64],
    ) -> Vec<u8> {
        let mut payload = Vec::with_capacity(
            2 * 64 + WORD_BYTES * (1 + ciphertext.len() + modulus_limbs.len()),
        );
        payload.extend_from_slice(&sender.to_xy_bytes());
        payload.extend_from_slice(&receiver.to_xy_bytes());
        payload.extend_from_slice(&field_to_be_bytes(nonce));
        for element in ciphertext {
            payload.extend_from_slice(&field_to_be_bytes(element));
        }
        for limb in modulus_limbs {
            let mut word = [0u8; WORD_BYTES];
            word[WORD_BYTES - 8..].copy_from_slice(&limb.to_be_bytes());
            payload.extend_from_slice(&word);
        }
        payload
    }

    /// Canonical payload as lowercase hex, the form published on the ledger
    pub fn payload_hex(
        sender: &CurvePoint,
        receiver: &CurvePoint,
        nonce: &Fr,
        ciphertext: &[Fr],
        modulus_limbs: &[u64],
    ) -> String {
        CryptoUtils::to_hex(&Self::payload(sender, receiver, nonce, ciphertext, modulus_limbs))
    }

    /// Hash the public parameters into a commitment
    pub fn bind(
        sender: &CurvePoint,
        receiver: &CurvePoint,
        nonce: &Fr,
        ciphertext: &[Fr],
        modulus_limbs: &[u64],
    ) -> PublicCommitment {
        Self::bind_payload(&Self::payload(sender, receiver, nonce, ciphertext, modulus_limbs))
    }

    /// Hash an already serialized payload
    pub fn bind_payload(payload: &[u8]) -> PublicCommitment {
        PublicCommitment::from_digest(CryptoUtils::sha256(payload))
    }

    /// Recompute and compare in constant time
    pub fn verify(
        commitment: &PublicCommitment,
        sender: &CurvePoint,
        receiver: &CurvePoint,
        nonce: &Fr,
        ciphertext: &[Fr],
        modulus_limbs: &[u64],
    ) -> bool {
        let expected = Self::bind(sender, receiver, nonce, ciphertext, modulus_limbs);
        CryptoUtils::constant_time_eq(&expected.digest, &commitment.digest)
    }
}
