//! Fixed-width limb encoding
//!
//! Large integers (factors, modulus, curve coordinates, scalars) are carried
//! through the protocol as little-endian sequences of 64-bit limbs, limb 0
//! being the least significant. Each limb embeds into one BN254 scalar field
//! element.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use crate::crypto::{CryptoResult, CryptoError};

/// Width of one limb in bits
pub const LIMB_BITS: u32 = 64;

/// Limb count of a secp256k1 coordinate or scalar
pub const COORD_LIMBS: usize = 4;

/// Split `value` into exactly `count` little-endian limbs.
pub fn to_limbs(value: &BigUint, count: usize) -> CryptoResult<Vec<u64>> {
    let mut digits = value.to_u64_digits();
    if digits.len() > count {
        return Err(CryptoError::LimbEncoding(format!(
            "value needs {} limbs, only {} available",
            digits.len(),
            count
        )));
    }
    digits.resize(count, 0);
    Ok(digits)
}

/// Reassemble an integer from little-endian limbs.
pub fn from_limbs(limbs: &[u64]) -> BigUint {
    limbs
        .iter()
        .rev()
        .fold(BigUint::default(), |acc, limb| (acc << LIMB_BITS) + BigUint::from(*limb))
}

/// Split a 32-byte big-endian integer into four little-endian limbs.
pub fn be_bytes_to_limbs(bytes: &[u8; 32]) -> [u64; COORD_LIMBS] {
    let mut limbs = [0u64; COORD_LIMBS];
    for (i, chunk) in bytes.chunks_exact(8).rev().enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        limbs[i] = u64::from_be_bytes(word);
    }
    limbs
}

/// Inverse of [`be_bytes_to_limbs`].
pub fn limbs_to_be_bytes(limbs: &[u64; COORD_LIMBS]) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, limb) in limbs.iter().enumerate() {
        let start = 32 - (i + 1) * 8;
        bytes[start..start + 8].copy_from_slice(&limb.to_be_bytes());
    }
    bytes
}

/// Embed limbs as field elements.
pub fn limbs_to_fields(limbs: &[u64]) -> Vec<Fr> {
    limbs.iter().map(|limb| Fr::from(*limb)).collect()
}

/// Read a field element back as a limb, failing if it exceeds 64 bits.
pub fn field_to_limb(value: &Fr) -> CryptoResult<u64> {
    let repr = value.into_bigint();
    if repr.0[1..].iter().any(|word| *word != 0) {
        return Err(CryptoError::LimbEncoding(
            "field element does not fit in a 64-bit limb".to_string(),
        ));
    }
    Ok(repr.0[0])
}

/// Read a vector of field elements back as limbs.
pub fn fields_to_limbs(values: &[Fr]) -> CryptoResult<Vec<u64>> {
    values.iter().map(field_to_limb).collect()
}

/// Canonical 32-byte big-endian encoding of a field element.
pub fn field_to_be_bytes(value: &Fr) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&value.into_bigint().to_bytes_be());
    bytes
}

/// Parse a 32-byte big-endian field element, rejecting non-canonical values.
pub fn field_from_be_bytes(bytes: &[u8]) -> CryptoResult<Fr> {
    if bytes.len() != 32 {
        return Err(CryptoError::SerializationError(format!(
            "field element must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let modulus: BigUint = Fr::MODULUS.into();
    if BigUint::from_bytes_be(bytes) >= modulus {
        return Err(CryptoError::SerializationError(
            "field element is not reduced".to_string(),
        ));
    }
    Ok(Fr::from_be_bytes_mod_order(bytes))
}

/// Convert an arbitrary integer below the field modulus into a field element.
pub fn biguint_to_field(value: &BigUint) -> CryptoResult<Fr> {
    let modulus: BigUint = Fr::MODULUS.into();
    if *value >= modulus {
        return Err(CryptoError::InvalidInput(
            "integer exceeds the field modulus".to_string(),
        ));
    }
    Ok(Fr::from_be_bytes_mod_order(&value.to_bytes_be()))
}

/// Field element as an integer.
pub fn field_to_biguint(value: &Fr) -> BigUint {
    value.into_bigint().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limb_roundtrip_and_order() {
        let value = (BigUint::from(7u64) << 64) + BigUint::from(3u64);
        let limbs = to_limbs(&value, 4).unwrap();
        assert_eq!(limbs, vec![3, 7, 0, 0]);
        assert_eq!(from_limbs(&limbs), value);
    }

    #[test]
    fn test_limb_overflow_rejected() {
        let value = BigUint::from(1u64) << 128;
        assert!(to_limbs(&value, 2).is_err());
        assert!(to_limbs(&value, 3).is_ok());
    }

    #[test]
    fn test_be_bytes_limbs() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        bytes[0] = 0x80;
        let limbs = be_bytes_to_limbs(&bytes);
        assert_eq!(limbs[0], 1);
        assert_eq!(limbs[3], 0x8000_0000_0000_0000);
        assert_eq!(limbs_to_be_bytes(&limbs), bytes);
    }

    #[test]
    fn test_field_limb_bounds() {
        assert_eq!(field_to_limb(&Fr::from(u64::MAX)).unwrap(), u64::MAX);
        let wide = Fr::from(u64::MAX) + Fr::from(1u64);
        assert!(field_to_limb(&wide).is_err());
    }

    #[test]
    fn test_field_bytes_canonical() {
        let value = Fr::from(1234u64);
        let bytes = field_to_be_bytes(&value);
        assert_eq!(bytes[30..], [0x04, 0xd2]);
        assert_eq!(field_from_be_bytes(&bytes).unwrap(), value);
        assert!(field_from_be_bytes(&[0xffu8; 32]).is_err());
    }
}
