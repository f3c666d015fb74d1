//! Poseidon Permutation
//!
//! Width-4 Poseidon permutation over the BN254 scalar field (x^5 S-box,
//! 8 full rounds and 56 partial rounds). Round constants and the MDS matrix
//! come from the Grain LFSR procedure of the Poseidon paper, so they are
//! reproducible from the round numbers alone.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::find_poseidon_ark_and_mds;
use ark_ff::{Field, PrimeField, Zero};
use crate::crypto::{CryptoResult, CryptoError};

/// State width of the permutation
pub const POSEIDON_WIDTH: usize = 4;

/// Elements absorbed per permutation call
pub const POSEIDON_RATE: usize = POSEIDON_WIDTH - 1;

/// Default number of full rounds
pub const DEFAULT_FULL_ROUNDS: usize = 8;

/// Default number of partial rounds for width 4
pub const DEFAULT_PARTIAL_ROUNDS: usize = 56;

/// Permutation state
pub type PoseidonState = [Fr; POSEIDON_WIDTH];

/// Poseidon parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PoseidonParameters {
    /// Round constants, one row of `POSEIDON_WIDTH` per round
    pub round_constants: Vec<Vec<Fr>>,
    /// MDS matrix
    pub mds_matrix: Vec<Vec<Fr>>,
    /// Full rounds (split evenly before and after the partial rounds)
    pub full_rounds: usize,
    /// Partial rounds
    pub partial_rounds: usize,
}

impl PoseidonParameters {
    /// Generate parameters for the given round numbers
    pub fn generate(full_rounds: usize, partial_rounds: usize) -> CryptoResult<Self> {
        if full_rounds == 0 || full_rounds % 2 != 0 {
            return Err(CryptoError::InvalidInput(format!(
                "full rounds must be even and non-zero, got {}",
                full_rounds
            )));
        }

        let (round_constants, mds_matrix) = find_poseidon_ark_and_mds::<Fr>(
            Fr::MODULUS_BIT_SIZE as u64,
            POSEIDON_RATE,
            full_rounds as u64,
            partial_rounds as u64,
            0,
        );

        Ok(Self {
            round_constants,
            mds_matrix,
            full_rounds,
            partial_rounds,
        })
    }

    /// Total number of rounds
    pub fn num_rounds(&self) -> usize {
        self.full_rounds + self.partial_rounds
    }
}

/// Poseidon permutation
#[derive(Debug, Clone)]
pub struct PoseidonPermutation {
    params: PoseidonParameters,
}

impl PoseidonPermutation {
    /// Create a permutation from explicit parameters
    pub fn new(params: PoseidonParameters) -> Self {
        Self { params }
    }

    /// Shared instance with the default round numbers
    pub fn standard() -> &'static PoseidonPermutation {
        static STANDARD: OnceLock<PoseidonPermutation> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let (round_constants, mds_matrix) = find_poseidon_ark_and_mds::<Fr>(
                Fr::MODULUS_BIT_SIZE as u64,
                POSEIDON_RATE,
                DEFAULT_FULL_ROUNDS as u64,
                DEFAULT_PARTIAL_ROUNDS as u64,
                0,
            );
            PoseidonPermutation::new(PoseidonParameters {
                round_constants,
                mds_matrix,
                full_rounds: DEFAULT_FULL_ROUNDS,
                partial_rounds: DEFAULT_PARTIAL_ROUNDS,
            })
        })
    }

    /// Parameters in use
    pub fn params(&self) -> &PoseidonParameters {
        &self.params
    }

    /// Apply the permutation
    pub fn permute(&self, input: &PoseidonState) -> PoseidonState {
        let mut state = *input;
        let half_full = self.params.full_rounds / 2;
        let partial_end = half_full + self.params.partial_rounds;

        for round in 0..self.params.num_rounds() {
            // Add round constants
            for (i, element) in state.iter_mut().enumerate() {
                *element += self.params.round_constants[round][i];
            }

            // S-box on the whole state in full rounds, first element only in partial rounds
            if round < half_full || round >= partial_end {
                for element in state.iter_mut() {
                    *element = Self::s_box(*element);
                }
            } else {
                state[0] = Self::s_box(state[0]);
            }

            state = self.apply_mds_matrix(&state);
        }

        state
    }

    /// S-box function
    fn s_box(x: Fr) -> Fr {
        let x2 = x.square();
        x2.square() * x
    }

    /// Apply MDS matrix
    fn apply_mds_matrix(&self, state: &PoseidonState) -> PoseidonState {
        let mut result = [Fr::zero(); POSEIDON_WIDTH];
        for (i, row) in self.params.mds_matrix.iter().enumerate() {
            for (j, coefficient) in row.iter().enumerate() {
                result[i] += *coefficient * state[j];
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_shape() {
        let params = PoseidonPermutation::standard().params();
        assert_eq!(params.round_constants.len(), DEFAULT_FULL_ROUNDS + DEFAULT_PARTIAL_ROUNDS);
        assert!(params.round_constants.iter().all(|row| row.len() == POSEIDON_WIDTH));
        assert_eq!(params.mds_matrix.len(), POSEIDON_WIDTH);
        assert!(params.mds_matrix.iter().all(|row| row.len() == POSEIDON_WIDTH));
    }

    #[test]
    fn test_generated_parameters_match_standard() {
        let generated = PoseidonParameters::generate(DEFAULT_FULL_ROUNDS, DEFAULT_PARTIAL_ROUNDS).unwrap();
        assert_eq!(&generated, PoseidonPermutation::standard().params());
        assert!(PoseidonParameters::generate(7, 56).is_err());
    }

    #[test]
    fn test_matches_circomlib_poseidon() {
        // circomlib poseidon([1, 2, 3]): capacity element zero, then the inputs
        let expected = crate::crypto::limbs::field_from_be_bytes(
            &hex::decode("0e7732d89e6939c0ff03d5e58dab6302f3230e269dc5b968f725df34ab36d732").unwrap(),
        )
        .unwrap();
        let input = [Fr::from(0u64), Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        assert_eq!(PoseidonPermutation::standard().permute(&input)[0], expected);
    }

    #[test]
    fn test_permutation_deterministic() {
        let perm = PoseidonPermutation::standard();
        let input = [Fr::from(0u64), Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];

        let out1 = perm.permute(&input);
        let out2 = perm.permute(&input);
        assert_eq!(out1, out2);
        assert_ne!(out1, input);

        // Should be different for different inputs
        let mut other = input;
        other[3] += Fr::from(1u64);
        let out3 = perm.permute(&other);
        for i in 0..POSEIDON_WIDTH {
            assert_ne!(out1[i], out3[i]);
        }
    }
}
