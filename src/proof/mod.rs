//! Proof System
//!
//! `ProofSystem` is the seam between the bounty relation and whatever proving
//! backend settles claims. A backend is bound to one relation shape at setup
//! time; proving fails closed on any unsatisfied constraint and verification
//! never errors, it only answers yes or no.
//!
//! [`CheckingBackend`] is the reference backend. Its keys are public: the
//! relation's shape digest, dimensions and Poseidon round numbers. A proof is
//! the checked private assignment, and the verifier re-synthesizes the
//! relation, fills in the public inputs and that assignment, and checks every
//! constraint. It is sound but not zero-knowledge: the proof reveals the
//! witness, so it suits simulation and tests only.

use ark_bn254::Fr;
use rand_core::{CryptoRng, RngCore};
use serde::{Serialize, Deserialize};
use serde_with::{serde_as, Bytes};
use crate::circuit::{BountyRelation, BountyWitness, CircuitError, ConstraintSystem, PublicInputs, RelationParams};
use crate::crypto::limbs::{field_from_be_bytes, field_to_be_bytes};
use crate::crypto::poseidon::{PoseidonParameters, PoseidonPermutation, DEFAULT_FULL_ROUNDS, DEFAULT_PARTIAL_ROUNDS};

/// Proof error types
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("Witness does not satisfy the relation: {0}")]
    Unsatisfied(#[from] CircuitError),

    #[error("Key does not match the relation: {0}")]
    KeyMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for proof operations
pub type ProofResult<T> = Result<T, ProofError>;

/// A proving backend for the bounty relation
pub trait ProofSystem {
    type ProvingKey;
    type VerifyingKey;
    type Proof;

    /// Generate keys for the relation's shape
    fn setup<R: RngCore + CryptoRng>(
        &self,
        relation: &BountyRelation<'_>,
        rng: &mut R,
    ) -> ProofResult<(Self::ProvingKey, Self::VerifyingKey)>;

    /// Prove that `witness` satisfies the relation for `public`
    fn prove(
        &self,
        pk: &Self::ProvingKey,
        relation: &BountyRelation<'_>,
        public: &PublicInputs,
        witness: &BountyWitness,
    ) -> ProofResult<Self::Proof>;

    /// Check `proof` against the public input vector
    fn verify(&self, vk: &Self::VerifyingKey, public_inputs: &[Fr], proof: &Self::Proof) -> bool;
}

/// Public key material of the checking backend. Holds no secret.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendKey {
    /// Shape digest of the relation the key was generated for
    #[serde_as(as = "Bytes")]
    pub shape: [u8; 32],
    /// Relation dimensions
    pub params: RelationParams,
    pub full_rounds: usize,
    pub partial_rounds: usize,
}

impl BackendKey {
    /// Encode with bincode
    pub fn to_bytes(&self) -> ProofResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Decode from bincode
    pub fn from_bytes(bytes: &[u8]) -> ProofResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Shape-only system for the relation this key describes
    fn shape_system(&self) -> ProofResult<ConstraintSystem> {
        let cs = if self.full_rounds == DEFAULT_FULL_ROUNDS && self.partial_rounds == DEFAULT_PARTIAL_ROUNDS {
            BountyRelation::new(self.params, PoseidonPermutation::standard()).setup_system()?
        } else {
            let permutation = PoseidonParameters::generate(self.full_rounds, self.partial_rounds)
                .map(PoseidonPermutation::new)
                .map_err(|e| ProofError::KeyMismatch(e.to_string()))?;
            BountyRelation::new(self.params, &permutation).setup_system()?
        };
        if cs.shape_digest() != self.shape {
            return Err(ProofError::KeyMismatch("relation shape differs from key".to_string()));
        }
        Ok(cs)
    }
}

/// Proving key of the checking backend
pub type CheckingProvingKey = BackendKey;

/// Verifying key of the checking backend
pub type CheckingVerifyingKey = BackendKey;

/// Proof produced by the checking backend
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde_as(as = "Bytes")]
    pub shape: [u8; 32],
    /// Private assignment, one big-endian field element per variable
    #[serde_as(as = "Vec<Bytes>")]
    pub assignment: Vec<[u8; 32]>,
}

impl Proof {
    /// Encode with bincode
    pub fn to_bytes(&self) -> ProofResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    /// Decode from bincode
    pub fn from_bytes(bytes: &[u8]) -> ProofResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProofError::Serialization(e.to_string()))
    }

    fn private_assignment(&self) -> ProofResult<Vec<Fr>> {
        self.assignment
            .iter()
            .map(|bytes| field_from_be_bytes(bytes).map_err(|e| ProofError::Serialization(e.to_string())))
            .collect()
    }
}

/// Reference backend that checks the full constraint system on both sides
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckingBackend;

impl CheckingBackend {
    pub fn new() -> Self {
        Self
    }

    fn check(vk: &BackendKey, public_inputs: &[Fr], proof: &Proof) -> ProofResult<()> {
        if public_inputs.len() != vk.params.public_input_len() {
            return Err(ProofError::KeyMismatch(format!(
                "{} public inputs, expected {}",
                public_inputs.len(),
                vk.params.public_input_len()
            )));
        }
        if proof.shape != vk.shape {
            return Err(ProofError::KeyMismatch("shape digest mismatch".to_string()));
        }
        let private = proof.private_assignment()?;
        let mut cs = vk.shape_system()?;
        cs.assign(public_inputs, &private)?;
        cs.check()?;
        Ok(())
    }
}

impl ProofSystem for CheckingBackend {
    type ProvingKey = CheckingProvingKey;
    type VerifyingKey = CheckingVerifyingKey;
    type Proof = Proof;

    fn setup<R: RngCore + CryptoRng>(
        &self,
        relation: &BountyRelation<'_>,
        _rng: &mut R,
    ) -> ProofResult<(Self::ProvingKey, Self::VerifyingKey)> {
        let shape = relation.setup_system()?.shape_digest();
        let permutation = relation.permutation().params();
        let key = BackendKey {
            shape,
            params: *relation.params(),
            full_rounds: permutation.full_rounds,
            partial_rounds: permutation.partial_rounds,
        };
        log::info!("Generated proof keys for relation shape {}", hex::encode(&shape[..8]));
        Ok((key.clone(), key))
    }

    fn prove(
        &self,
        pk: &Self::ProvingKey,
        relation: &BountyRelation<'_>,
        public: &PublicInputs,
        witness: &BountyWitness,
    ) -> ProofResult<Self::Proof> {
        if pk.params != *relation.params() {
            return Err(ProofError::KeyMismatch(format!(
                "key is for {:?}, relation is {:?}",
                pk.params,
                relation.params()
            )));
        }

        let cs = relation.generate_witness(public, witness)?;
        if cs.shape_digest() != pk.shape {
            return Err(ProofError::KeyMismatch("relation shape differs from key".to_string()));
        }

        log::debug!(
            "Proved relation: {} variables, {} constraints, {} public inputs",
            cs.num_variables(),
            cs.constraints().len(),
            cs.num_public()
        );
        Ok(Proof {
            shape: pk.shape,
            assignment: cs.private_assignment().iter().map(field_to_be_bytes).collect(),
        })
    }

    fn verify(&self, vk: &Self::VerifyingKey, public_inputs: &[Fr], proof: &Self::Proof) -> bool {
        match Self::check(vk, public_inputs, proof) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Rejecting proof: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;
    use num_bigint::BigUint;
    use rand::rngs::OsRng;
    use crate::crypto::cipher::{CipherKey, FieldCipher};
    use crate::crypto::commitments::CommitmentBinder;
    use crate::crypto::key_agreement::PrivateScalar;
    use crate::crypto::limbs::{limbs_to_fields, to_limbs};
    use crate::crypto::poseidon::PoseidonPermutation;

    fn relation() -> BountyRelation<'static> {
        BountyRelation::new(RelationParams::for_factor_limbs(1), PoseidonPermutation::standard())
    }

    fn instance(p: u64, q: u64, n: u64) -> (PublicInputs, BountyWitness) {
        let params = RelationParams::for_factor_limbs(1);
        let da = PrivateScalar::from_decimal("1111").unwrap();
        let db = PrivateScalar::from_decimal("2222").unwrap();
        let sender = da.public_point();
        let receiver = db.public_point();
        let witness = BountyWitness::new(BigUint::from(p), BigUint::from(q), db, &sender).unwrap();
        let nonce = Fr::from(1234u64);
        let plaintext = limbs_to_fields(&witness.plaintext_limbs(&params).unwrap());
        let key = CipherKey::from_shared_point(&witness.shared_point);
        let ciphertext = FieldCipher::default().encrypt(&plaintext, &key, &nonce).unwrap();
        let modulus_limbs = to_limbs(&BigUint::from(n), params.modulus_limbs).unwrap();
        let commitment = CommitmentBinder::bind(&sender, &receiver, &nonce, &ciphertext, &modulus_limbs);
        (PublicInputs { sender, receiver, nonce, ciphertext, modulus_limbs, commitment }, witness)
    }

    #[test]
    fn test_prove_and_verify() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, vk) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 91);

        let proof = backend.prove(&pk, &relation, &public, &witness).unwrap();
        assert!(backend.verify(&vk, &public.to_field_elements(), &proof));

        let decoded = Proof::from_bytes(&proof.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, proof);
        let vk = BackendKey::from_bytes(&vk.to_bytes().unwrap()).unwrap();
        assert!(backend.verify(&vk, &public.to_field_elements(), &decoded));
    }

    #[test]
    fn test_unsatisfied_witness_fails_closed() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, _) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 92);
        assert!(matches!(
            backend.prove(&pk, &relation, &public, &witness),
            Err(ProofError::Unsatisfied(CircuitError::Unsatisfied { .. }))
        ));
    }

    #[test]
    fn test_any_public_input_change_rejected() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, vk) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 91);
        let proof = backend.prove(&pk, &relation, &public, &witness).unwrap();
        let inputs = public.to_field_elements();

        for i in [0, 8, 16, 17, inputs.len() - 3, inputs.len() - 1] {
            let mut tampered = inputs.clone();
            tampered[i] += Fr::one();
            assert!(!backend.verify(&vk, &tampered, &proof), "input {} accepted", i);
        }
        assert!(!backend.verify(&vk, &inputs[1..], &proof));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, _) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 91);
        let proof = backend.prove(&pk, &relation, &public, &witness).unwrap();

        let wide = BountyRelation::new(RelationParams::for_factor_limbs(2), PoseidonPermutation::standard());
        let (_, wide_vk) = backend.setup(&wide, &mut OsRng).unwrap();
        assert!(!backend.verify(&wide_vk, &public.to_field_elements(), &proof));
        assert!(matches!(
            backend.prove(&pk, &wide, &public, &witness),
            Err(ProofError::KeyMismatch(_))
        ));

        let mut resplit = pk.clone();
        resplit.full_rounds = 6;
        resplit.partial_rounds = 58;
        assert!(!backend.verify(&resplit, &public.to_field_elements(), &proof));
    }

    #[test]
    fn test_keys_carry_no_secret() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, vk) = backend.setup(&relation, &mut OsRng).unwrap();
        let (again, _) = backend.setup(&relation, &mut OsRng).unwrap();
        assert_eq!(pk, vk);
        assert_eq!(pk, again);
    }

    #[test]
    fn test_proof_for_another_instance_rejected() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, vk) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 91);
        let proof = backend.prove(&pk, &relation, &public, &witness).unwrap();

        // Same key holder, different public instance with no known factors
        let (other, _) = instance(7, 13, 92);
        assert!(!backend.verify(&vk, &other.to_field_elements(), &proof));

        let zeros = Proof { shape: pk.shape, assignment: vec![[0u8; 32]; proof.assignment.len()] };
        assert!(!backend.verify(&vk, &other.to_field_elements(), &zeros));
    }

    #[test]
    fn test_malformed_proof_rejected() {
        let backend = CheckingBackend::new();
        let relation = relation();
        let (pk, vk) = backend.setup(&relation, &mut OsRng).unwrap();
        let (public, witness) = instance(7, 13, 91);
        let proof = backend.prove(&pk, &relation, &public, &witness).unwrap();
        let inputs = public.to_field_elements();

        let mut truncated = proof.clone();
        truncated.assignment.pop();
        assert!(!backend.verify(&vk, &inputs, &truncated));

        let mut unreduced = proof.clone();
        unreduced.assignment[0] = [0xff; 32];
        assert!(!backend.verify(&vk, &inputs, &unreduced));

        let mut reshaped = proof;
        reshaped.shape[0] ^= 1;
        assert!(!backend.verify(&vk, &inputs, &reshaped));

        assert!(Proof::from_bytes(&[1, 2, 3]).is_err());
    }
}
