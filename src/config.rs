//! Protocol configuration

use std::path::Path;

use anyhow::Context;
use serde::{Serialize, Deserialize};
use crate::circuit::RelationParams;
use crate::crypto::cipher::NONCE_BITS;
use crate::crypto::limbs::LIMB_BITS;
use crate::crypto::poseidon::{PoseidonParameters, PoseidonPermutation, DEFAULT_FULL_ROUNDS, DEFAULT_PARTIAL_ROUNDS};
use crate::crypto::CryptoResult;
use crate::error::{BountyError, BountyResult};

/// Tunable protocol constants, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub limb_bits: u32,
    pub factor_limbs: usize,
    pub modulus_limbs: usize,
    pub nonce_bits: u64,
    pub full_rounds: usize,
    pub partial_rounds: usize,
    /// Reward in satoshis
    pub reward_sats: u64,
    pub expiry_height: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let relation = RelationParams::default();
        Self {
            limb_bits: LIMB_BITS,
            factor_limbs: relation.factor_limbs,
            modulus_limbs: relation.modulus_limbs,
            nonce_bits: NONCE_BITS,
            full_rounds: DEFAULT_FULL_ROUNDS,
            partial_rounds: DEFAULT_PARTIAL_ROUNDS,
            reward_sats: 10_000,
            expiry_height: 761_406,
        }
    }
}

impl ProtocolConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> BountyResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("Loaded protocol config from {}", path.display());
        Ok(config)
    }

    /// Reject values the relation and cipher cannot honour
    pub fn validate(&self) -> BountyResult<()> {
        if self.limb_bits != LIMB_BITS {
            return Err(BountyError::Config(format!("limb_bits must be {}", LIMB_BITS)));
        }
        if self.nonce_bits != NONCE_BITS {
            return Err(BountyError::Config(format!("nonce_bits must be {}", NONCE_BITS)));
        }
        if self.full_rounds == 0 || self.partial_rounds == 0 {
            return Err(BountyError::Config("Poseidon round numbers must be non-zero".to_string()));
        }
        if self.reward_sats == 0 {
            return Err(BountyError::Config("reward must be positive".to_string()));
        }
        self.relation_params()
            .validate()
            .map_err(|e| BountyError::Config(e.to_string()))
    }

    /// Relation dimensions
    pub fn relation_params(&self) -> RelationParams {
        RelationParams {
            factor_limbs: self.factor_limbs,
            modulus_limbs: self.modulus_limbs,
        }
    }

    /// Poseidon permutation for the configured round numbers
    pub fn permutation(&self) -> CryptoResult<PoseidonPermutation> {
        Ok(PoseidonPermutation::new(PoseidonParameters::generate(
            self.full_rounds,
            self.partial_rounds,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relation_params(), RelationParams::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProtocolConfig::from_json_str(r#"{"factor_limbs": 1, "modulus_limbs": 2}"#).unwrap();
        assert_eq!(config.factor_limbs, 1);
        assert_eq!(config.reward_sats, 10_000);
        assert_eq!(config.relation_params().ciphertext_len(), 4);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(matches!(
            ProtocolConfig::from_json_str(r#"{"factor_limbs": 16, "modulus_limbs": 30}"#),
            Err(BountyError::Config(_))
        ));
        assert!(matches!(
            ProtocolConfig::from_json_str(r#"{"limb_bits": 32}"#),
            Err(BountyError::Config(_))
        ));
        assert!(matches!(
            ProtocolConfig::from_json_str(r#"{"partial_rounds": 0}"#),
            Err(BountyError::Config(_))
        ));
        assert!(matches!(
            ProtocolConfig::from_json_str("not json"),
            Err(BountyError::Serialization(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reward_sats": 25000, "expiry_height": 800000}}"#).unwrap();

        let config = ProtocolConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.reward_sats, 25_000);
        assert_eq!(config.expiry_height, 800_000);

        assert!(ProtocolConfig::from_json_file("/nonexistent/bounty.json").is_err());
    }
}
