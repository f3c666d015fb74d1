//! Poseidon Stream Cipher
//!
//! Encrypts a sequence of field elements under a key derived from the shared
//! point. The permutation state starts as `[0, k0, k1, nonce + L·2^128]`; each
//! block of three plaintext elements is added to the rate part of the permuted
//! state, and one final permutation yields an authentication element.
//!
//! Key convention: with the shared x coordinate as little-endian 64-bit limbs
//! `x0..x3`, `k0 = x0 + x1·2^64` and `k1 = x2 + x3·2^64`.

use std::collections::HashMap;

use ark_bn254::Fr;
use ark_ff::{Field, Zero};
use crate::crypto::key_agreement::SharedPoint;
use crate::crypto::limbs::{be_bytes_to_limbs, field_to_be_bytes, field_to_biguint, COORD_LIMBS};
use crate::crypto::poseidon::{PoseidonPermutation, PoseidonState, POSEIDON_RATE};
use crate::crypto::{CryptoResult, CryptoError, CryptoUtils};

/// Nonces must stay below `2^NONCE_BITS`
pub const NONCE_BITS: u64 = 128;

/// `2^exp` as a field element
pub fn pow2(exp: u64) -> Fr {
    Fr::from(2u64).pow([exp])
}

/// Symmetric key in the cipher's native format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherKey(pub [Fr; 2]);

impl CipherKey {
    /// Derive the key from the shared point's x coordinate
    pub fn from_shared_point(shared: &SharedPoint) -> Self {
        Self::from_x_limbs(&be_bytes_to_limbs(&shared.x_bytes()))
    }

    /// Pack x coordinate limbs into two 128-bit key elements
    pub fn from_x_limbs(x: &[u64; COORD_LIMBS]) -> Self {
        let shift = pow2(64);
        Self([
            Fr::from(x[0]) + Fr::from(x[1]) * shift,
            Fr::from(x[2]) + Fr::from(x[3]) * shift,
        ])
    }
}

/// Check that a nonce fits the 128-bit domain separator slot
pub fn validate_nonce(nonce: &Fr) -> CryptoResult<()> {
    if field_to_biguint(nonce).bits() > NONCE_BITS {
        return Err(CryptoError::InvalidNonce(format!(
            "nonce must be below 2^{}",
            NONCE_BITS
        )));
    }
    Ok(())
}

/// Poseidon-based stream cipher over field elements
#[derive(Debug, Clone, Copy)]
pub struct FieldCipher<'a> {
    permutation: &'a PoseidonPermutation,
}

impl Default for FieldCipher<'static> {
    fn default() -> Self {
        Self::new(PoseidonPermutation::standard())
    }
}

impl<'a> FieldCipher<'a> {
    /// Create a cipher over the given permutation
    pub fn new(permutation: &'a PoseidonPermutation) -> Self {
        Self { permutation }
    }

    /// Permutation driving the cipher
    pub fn permutation(&self) -> &'a PoseidonPermutation {
        self.permutation
    }

    /// Ciphertext length for a plaintext of `plaintext_len` elements
    pub fn ciphertext_len(plaintext_len: usize) -> usize {
        Self::padded_len(plaintext_len) + 1
    }

    /// Plaintext length rounded up to the rate
    pub fn padded_len(plaintext_len: usize) -> usize {
        plaintext_len.div_ceil(POSEIDON_RATE) * POSEIDON_RATE
    }

    /// State before the first permutation
    pub fn initial_state(key: &CipherKey, nonce: &Fr, plaintext_len: usize) -> CryptoResult<PoseidonState> {
        validate_nonce(nonce)?;
        if plaintext_len == 0 {
            return Err(CryptoError::InvalidInput("plaintext must not be empty".to_string()));
        }
        Ok([
            Fr::zero(),
            key.0[0],
            key.0[1],
            *nonce + Fr::from(plaintext_len as u64) * pow2(NONCE_BITS),
        ])
    }

    /// Encrypt `plaintext` under `(key, nonce)`
    pub fn encrypt(&self, plaintext: &[Fr], key: &CipherKey, nonce: &Fr) -> CryptoResult<Vec<Fr>> {
        let mut state = Self::initial_state(key, nonce, plaintext.len())?;

        let mut padded = plaintext.to_vec();
        padded.resize(Self::padded_len(plaintext.len()), Fr::zero());

        let mut ciphertext = Vec::with_capacity(padded.len() + 1);
        for block in padded.chunks(POSEIDON_RATE) {
            state = self.permutation.permute(&state);
            for (j, element) in block.iter().enumerate() {
                state[j + 1] += element;
                ciphertext.push(state[j + 1]);
            }
        }

        state = self.permutation.permute(&state);
        ciphertext.push(state[1]);

        Ok(ciphertext)
    }

    /// Decrypt `ciphertext` back to `plaintext_len` elements
    pub fn decrypt(
        &self,
        ciphertext: &[Fr],
        key: &CipherKey,
        nonce: &Fr,
        plaintext_len: usize,
    ) -> CryptoResult<Vec<Fr>> {
        let mut state = Self::initial_state(key, nonce, plaintext_len)?;

        if ciphertext.len() != Self::ciphertext_len(plaintext_len) {
            return Err(CryptoError::Decryption(format!(
                "ciphertext has {} elements, expected {}",
                ciphertext.len(),
                Self::ciphertext_len(plaintext_len)
            )));
        }

        let (body, tag) = ciphertext.split_at(ciphertext.len() - 1);
        let mut plaintext = Vec::with_capacity(body.len());
        for block in body.chunks(POSEIDON_RATE) {
            state = self.permutation.permute(&state);
            for (j, element) in block.iter().enumerate() {
                plaintext.push(*element - state[j + 1]);
                state[j + 1] = *element;
            }
        }

        if plaintext[plaintext_len..].iter().any(|element| !element.is_zero()) {
            return Err(CryptoError::Decryption("non-zero padding".to_string()));
        }

        state = self.permutation.permute(&state);
        if state[1] != tag[0] {
            return Err(CryptoError::Decryption("authentication element mismatch".to_string()));
        }

        plaintext.truncate(plaintext_len);
        Ok(plaintext)
    }
}

/// Refuses to encrypt two different plaintexts under the same key and nonce
#[derive(Debug, Default)]
pub struct NonceGuard {
    used: HashMap<(CipherKey, [u8; 32]), [u8; 32]>,
}

impl NonceGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(key, nonce)` for `plaintext`, failing on reuse with other data
    pub fn check_and_record(&mut self, key: &CipherKey, nonce: &Fr, plaintext: &[Fr]) -> CryptoResult<()> {
        let mut encoded = Vec::with_capacity(plaintext.len() * 32);
        for element in plaintext {
            encoded.extend_from_slice(&field_to_be_bytes(element));
        }
        let digest = CryptoUtils::sha256(&encoded);

        let slot = (*key, field_to_be_bytes(nonce));
        match self.used.get(&slot) {
            Some(previous) if *previous != digest => Err(CryptoError::InvalidNonce(
                "nonce already used with this key for a different plaintext".to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.used.insert(slot, digest);
                Ok(())
            }
        }
    }

    /// Number of recorded `(key, nonce)` pairs
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_agreement::{KeyAgreement, PrivateScalar};

    fn shared_key() -> CipherKey {
        let da = PrivateScalar::from_decimal("88549154299169935420064281163296845505587953610183896504176354567359434168161").unwrap();
        let db = PrivateScalar::from_decimal("90388020393783788847120091912026443124559466591761394939671630294477859800601").unwrap();
        let shared = KeyAgreement::derive_shared(&da, &db.public_point()).unwrap();
        CipherKey::from_shared_point(&shared)
    }

    fn message(values: &[u64]) -> Vec<Fr> {
        values.iter().map(|v| Fr::from(*v)).collect()
    }

    #[test]
    fn test_roundtrip_various_lengths() {
        let cipher = FieldCipher::default();
        let key = shared_key();
        let nonce = Fr::from(1234u64);

        for len in [1usize, 2, 3, 4, 7, 32] {
            let plaintext = message(&(0..len as u64).map(|i| i * 31 + 7).collect::<Vec<_>>());
            let ciphertext = cipher.encrypt(&plaintext, &key, &nonce).unwrap();
            assert_eq!(ciphertext.len(), FieldCipher::ciphertext_len(len));
            let decrypted = cipher.decrypt(&ciphertext, &key, &nonce, len).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_wrong_key_or_nonce_fails() {
        let cipher = FieldCipher::default();
        let key = shared_key();
        let nonce = Fr::from(1234u64);
        let plaintext = message(&[7, 13]);
        let ciphertext = cipher.encrypt(&plaintext, &key, &nonce).unwrap();

        let wrong_key = CipherKey([key.0[0] + Fr::from(1u64), key.0[1]]);
        assert!(cipher.decrypt(&ciphertext, &wrong_key, &nonce, 2).is_err());
        assert!(cipher.decrypt(&ciphertext, &key, &Fr::from(1235u64), 2).is_err());
        assert!(cipher.decrypt(&ciphertext, &key, &nonce, 3).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = FieldCipher::default();
        let key = shared_key();
        let nonce = Fr::from(1234u64);
        let mut ciphertext = cipher.encrypt(&message(&[7, 13, 17, 19]), &key, &nonce).unwrap();
        ciphertext[1] += Fr::from(1u64);
        assert!(cipher.decrypt(&ciphertext, &key, &nonce, 4).is_err());
    }

    #[test]
    fn test_nonce_changes_ciphertext() {
        let cipher = FieldCipher::default();
        let key = shared_key();
        let plaintext = message(&[7, 13]);
        let a = cipher.encrypt(&plaintext, &key, &Fr::from(1u64)).unwrap();
        let b = cipher.encrypt(&plaintext, &key, &Fr::from(2u64)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, cipher.encrypt(&plaintext, &key, &Fr::from(1u64)).unwrap());
    }

    #[test]
    fn test_nonce_bound() {
        let cipher = FieldCipher::default();
        let key = shared_key();
        let too_big = pow2(NONCE_BITS);
        assert!(cipher.encrypt(&message(&[1]), &key, &too_big).is_err());
        assert!(cipher.encrypt(&message(&[1]), &key, &(too_big - Fr::from(1u64))).is_ok());
        assert!(cipher.encrypt(&[], &key, &Fr::from(1u64)).is_err());
    }

    #[test]
    fn test_key_packing() {
        let key = CipherKey::from_x_limbs(&[1, 2, 3, 4]);
        assert_eq!(key.0[0], Fr::from(1u64) + Fr::from(2u64) * pow2(64));
        assert_eq!(key.0[1], Fr::from(3u64) + Fr::from(4u64) * pow2(64));
    }

    #[test]
    fn test_nonce_guard() {
        let key = shared_key();
        let nonce = Fr::from(9u64);
        let mut guard = NonceGuard::new();

        guard.check_and_record(&key, &nonce, &message(&[7, 13])).unwrap();
        // Re-encrypting the same plaintext is harmless
        guard.check_and_record(&key, &nonce, &message(&[7, 13])).unwrap();
        assert!(guard.check_and_record(&key, &nonce, &message(&[7, 17])).is_err());
        guard.check_and_record(&key, &Fr::from(10u64), &message(&[7, 17])).unwrap();
        assert_eq!(guard.len(), 2);
    }
}
