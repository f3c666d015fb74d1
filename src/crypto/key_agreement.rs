//! secp256k1 key agreement
//!
//! Both parties hold a private scalar and publish `scalar·G`. The shared point
//! is the other party's point multiplied by one's own scalar; it is only ever
//! used to derive the cipher key and is never transmitted.

use std::fmt;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, NonZeroScalar, PublicKey, Scalar, SecretKey};
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use crate::crypto::limbs::{be_bytes_to_limbs, limbs_to_be_bytes, COORD_LIMBS};
use crate::crypto::{CryptoResult, CryptoError, CryptoUtils};

/// A private scalar in the secp256k1 scalar field (never zero)
#[derive(Clone)]
pub struct PrivateScalar(NonZeroScalar);

impl PrivateScalar {
    /// Sample a fresh scalar
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(NonZeroScalar::random(rng))
    }

    /// Parse from 32 big-endian bytes
    pub fn from_be_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        let scalar = NonZeroScalar::from_repr(FieldBytes::clone_from_slice(bytes));
        Option::<NonZeroScalar>::from(scalar)
            .map(Self)
            .ok_or_else(|| CryptoError::InvalidPrivateKey("scalar is zero or exceeds the group order".to_string()))
    }

    /// Parse from an integer
    pub fn from_biguint(value: &BigUint) -> CryptoResult<Self> {
        let raw = value.to_bytes_be();
        if raw.len() > 32 {
            return Err(CryptoError::InvalidPrivateKey("scalar wider than 256 bits".to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Self::from_be_bytes(&bytes)
    }

    /// Parse from a decimal string
    pub fn from_decimal(value: &str) -> CryptoResult<Self> {
        let parsed = BigUint::parse_bytes(value.as_bytes(), 10)
            .ok_or_else(|| CryptoError::InvalidPrivateKey(format!("not a decimal integer: {}", value)))?;
        Self::from_biguint(&parsed)
    }

    /// Big-endian bytes of the scalar
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let scalar: Scalar = *self.0;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(scalar.to_repr().as_slice());
        bytes
    }

    /// Scalar as four little-endian limbs
    pub fn to_limbs(&self) -> [u64; COORD_LIMBS] {
        be_bytes_to_limbs(&self.to_be_bytes())
    }

    /// The matching public point `scalar·G`
    pub fn public_point(&self) -> CurvePoint {
        CurvePoint(SecretKey::from(self.0).public_key())
    }

    /// Signing key for ledger signatures made with this scalar
    pub fn signing_key(&self) -> k256::ecdsa::SigningKey {
        k256::ecdsa::SigningKey::from(self.0)
    }
}

impl fmt::Debug for PrivateScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateScalar(..)")
    }
}

/// A validated, non-identity secp256k1 point
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint(PublicKey);

/// Point shared between the two parties after key agreement
pub type SharedPoint = CurvePoint;

impl CurvePoint {
    /// Parse from 64 bytes `x ‖ y` (uncompressed SEC1 without the 0x04 tag)
    pub fn from_xy_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 64 {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected 64 coordinate bytes, got {}",
                bytes.len()
            )));
        }
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(bytes);
        Self::from_sec1_bytes(&sec1)
    }

    /// Parse any SEC1 encoding
    pub fn from_sec1_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("point not on curve: {:?}", e)))
    }

    /// Rebuild a point from coordinate limbs
    pub fn from_limbs(x: &[u64; COORD_LIMBS], y: &[u64; COORD_LIMBS]) -> CryptoResult<Self> {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&limbs_to_be_bytes(x));
        bytes[32..].copy_from_slice(&limbs_to_be_bytes(y));
        Self::from_xy_bytes(&bytes)
    }

    /// Affine x coordinate, 32 big-endian bytes
    pub fn x_bytes(&self) -> [u8; 32] {
        self.coordinates().0
    }

    /// Affine y coordinate, 32 big-endian bytes
    pub fn y_bytes(&self) -> [u8; 32] {
        self.coordinates().1
    }

    /// 64 bytes `x ‖ y`
    pub fn to_xy_bytes(&self) -> [u8; 64] {
        let (x, y) = self.coordinates();
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&x);
        bytes[32..].copy_from_slice(&y);
        bytes
    }

    /// Uncompressed SEC1 encoding (`0x04 ‖ x ‖ y`)
    pub fn to_uncompressed(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0] = 0x04;
        bytes[1..].copy_from_slice(&self.to_xy_bytes());
        bytes
    }

    /// Coordinates as little-endian limbs `(x, y)`
    pub fn to_limbs(&self) -> ([u64; COORD_LIMBS], [u64; COORD_LIMBS]) {
        let (x, y) = self.coordinates();
        (be_bytes_to_limbs(&x), be_bytes_to_limbs(&y))
    }

    /// Public key hash used for pay-to-public-key-hash outputs
    pub fn hash160(&self) -> [u8; 20] {
        CryptoUtils::hash160(&self.to_uncompressed())
    }

    /// Verifying key for ledger signatures
    pub fn verifying_key(&self) -> k256::ecdsa::VerifyingKey {
        k256::ecdsa::VerifyingKey::from(&self.0)
    }

    /// `scalar·base`, or `scalar·G` when no base is given. The scalar is
    /// taken as raw limbs and must be a valid non-zero group scalar.
    pub fn mul_limbs(scalar: &[u64; COORD_LIMBS], base: Option<&CurvePoint>) -> CryptoResult<Self> {
        let scalar = PrivateScalar::from_be_bytes(&limbs_to_be_bytes(scalar))?;
        Ok(match base {
            Some(point) => KeyAgreement::derive_shared(&scalar, point)?,
            None => scalar.public_point(),
        })
    }

    fn coordinates(&self) -> ([u8; 32], [u8; 32]) {
        let encoded = self.0.to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        // Both coordinates are present for a validated uncompressed point.
        if let (Some(ex), Some(ey)) = (encoded.x(), encoded.y()) {
            x.copy_from_slice(ex);
            y.copy_from_slice(ey);
        }
        (x, y)
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint({})", hex::encode(self.to_xy_bytes()))
    }
}

impl Serialize for CurvePoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_xy_bytes()))
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        Self::from_xy_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Diffie–Hellman over secp256k1
pub struct KeyAgreement;

impl KeyAgreement {
    /// Multiply the other party's point by our own scalar.
    pub fn derive_shared(own: &PrivateScalar, other: &CurvePoint) -> CryptoResult<SharedPoint> {
        let shared = (other.0.to_projective() * *own.0).to_affine();
        PublicKey::from_affine(shared)
            .map(CurvePoint)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("degenerate shared point: {:?}", e)))
    }

    /// Generate a key pair
    pub fn generate_keypair<R: RngCore + CryptoRng>(rng: &mut R) -> (PrivateScalar, CurvePoint) {
        let scalar = PrivateScalar::random(rng);
        let point = scalar.public_point();
        (scalar, point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DA: &str = "88549154299169935420064281163296845505587953610183896504176354567359434168161";
    const DB: &str = "90388020393783788847120091912026443124559466591761394939671630294477859800601";

    #[test]
    fn test_shared_point_commutes() {
        let da = PrivateScalar::from_decimal(DA).unwrap();
        let db = PrivateScalar::from_decimal(DB).unwrap();
        let qa = da.public_point();
        let qb = db.public_point();

        let shared_a = KeyAgreement::derive_shared(&da, &qb).unwrap();
        let shared_b = KeyAgreement::derive_shared(&db, &qa).unwrap();
        assert_eq!(shared_a, shared_b);
        assert_ne!(shared_a, qa);
    }

    #[test]
    fn test_random_keypairs_commute() {
        let mut rng = rand::thread_rng();
        let (da, qa) = KeyAgreement::generate_keypair(&mut rng);
        let (db, qb) = KeyAgreement::generate_keypair(&mut rng);
        assert_eq!(
            KeyAgreement::derive_shared(&da, &qb).unwrap(),
            KeyAgreement::derive_shared(&db, &qa).unwrap()
        );
    }

    #[test]
    fn test_point_encodings_roundtrip() {
        let point = PrivateScalar::from_decimal(DA).unwrap().public_point();
        let bytes = point.to_xy_bytes();
        assert_eq!(CurvePoint::from_xy_bytes(&bytes).unwrap(), point);

        let (x, y) = point.to_limbs();
        assert_eq!(CurvePoint::from_limbs(&x, &y).unwrap(), point);

        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(serde_json::from_str::<CurvePoint>(&json).unwrap(), point);
    }

    #[test]
    fn test_off_curve_point_rejected() {
        let mut bytes = PrivateScalar::from_decimal(DA).unwrap().public_point().to_xy_bytes();
        bytes[63] ^= 1;
        assert!(CurvePoint::from_xy_bytes(&bytes).is_err());
        assert!(CurvePoint::from_xy_bytes(&bytes[..63]).is_err());
    }

    #[test]
    fn test_scalar_validation() {
        assert!(PrivateScalar::from_decimal("0").is_err());
        assert!(PrivateScalar::from_decimal("not a number").is_err());
        // secp256k1 group order
        let order = "115792089237316195423570985008687907852837564279074904382605163141518161494337";
        assert!(PrivateScalar::from_decimal(order).is_err());
    }

    #[test]
    fn test_mul_limbs_matches_key_agreement() {
        let da = PrivateScalar::from_decimal(DA).unwrap();
        let db = PrivateScalar::from_decimal(DB).unwrap();
        let qa = da.public_point();

        assert_eq!(CurvePoint::mul_limbs(&db.to_limbs(), None).unwrap(), db.public_point());
        assert_eq!(
            CurvePoint::mul_limbs(&db.to_limbs(), Some(&qa)).unwrap(),
            KeyAgreement::derive_shared(&db, &qa).unwrap()
        );
        assert_eq!(
            CurvePoint::mul_limbs(&[1, 0, 0, 0], None).unwrap(),
            PrivateScalar::from_decimal("1").unwrap().public_point()
        );
    }
}
