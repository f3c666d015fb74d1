//! Poster and solver flows
//!
//! The poster escrows a reward for the factorization of `n`. A solver who
//! knows `p` and `q` encrypts them to the poster, binds every public value
//! into the commitment, proves the relation and builds the claim
//! transaction. Its data output carries the canonical payload, which is all
//! the poster needs to recover the factors.

use ark_bn254::Fr;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::Signature;
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use crate::circuit::{BountyRelation, BountyWitness, PublicInputs};
use crate::crypto::cipher::{CipherKey, FieldCipher, NonceGuard};
use crate::crypto::commitments::{CommitmentBinder, WORD_BYTES};
use crate::crypto::key_agreement::{CurvePoint, KeyAgreement, PrivateScalar};
use crate::crypto::limbs::{field_from_be_bytes, fields_to_limbs, from_limbs, limbs_to_fields, to_limbs};
use crate::error::{BountyError, BountyResult};
use crate::proof::ProofSystem;
use crate::settlement::{data_script, data_script_payload, p2pkh_script, BountyParams, ClaimMessage, OutPoint, TransactionContext, TxOutput};

const POINT_BYTES: usize = 64;

/// Public values published in the claim's data output
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimPayload {
    pub sender: CurvePoint,
    pub receiver: CurvePoint,
    pub nonce: Fr,
    pub ciphertext: Vec<Fr>,
    pub modulus_limbs: Vec<u64>,
}

impl ClaimPayload {
    /// Canonical bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        CommitmentBinder::payload(&self.sender, &self.receiver, &self.nonce, &self.ciphertext, &self.modulus_limbs)
    }

    /// Parse canonical bytes with `ciphertext_len` elements and
    /// `modulus_limbs` limbs
    pub fn parse(bytes: &[u8], ciphertext_len: usize, modulus_limbs: usize) -> BountyResult<Self> {
        let expected = 2 * POINT_BYTES + WORD_BYTES * (1 + ciphertext_len + modulus_limbs);
        if bytes.len() != expected {
            return Err(BountyError::InputValidation(format!(
                "payload has {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }

        let (points, words) = bytes.split_at(2 * POINT_BYTES);
        let sender = CurvePoint::from_xy_bytes(&points[..POINT_BYTES])
            .map_err(|e| BountyError::InputValidation(format!("sender point: {}", e)))?;
        let receiver = CurvePoint::from_xy_bytes(&points[POINT_BYTES..])
            .map_err(|e| BountyError::InputValidation(format!("receiver point: {}", e)))?;

        let mut words = words.chunks_exact(WORD_BYTES);
        let mut next_word = || {
            words
                .next()
                .ok_or_else(|| BountyError::InputValidation("payload truncated".to_string()))
        };

        let nonce = field_from_be_bytes(next_word()?)?;
        let ciphertext = (0..ciphertext_len)
            .map(|_| Ok(field_from_be_bytes(next_word()?)?))
            .collect::<BountyResult<Vec<_>>>()?;
        let modulus_limbs = (0..modulus_limbs)
            .map(|_| {
                let word = next_word()?;
                let (high, low) = word.split_at(WORD_BYTES - 8);
                if high.iter().any(|b| *b != 0) {
                    return Err(BountyError::InputValidation("modulus limb exceeds 64 bits".to_string()));
                }
                let mut limb = [0u8; 8];
                limb.copy_from_slice(low);
                Ok(u64::from_be_bytes(limb))
            })
            .collect::<BountyResult<Vec<_>>>()?;

        Ok(Self {
            sender,
            receiver,
            nonce,
            ciphertext,
            modulus_limbs,
        })
    }

    /// Parse the payload out of an `OP_FALSE OP_RETURN` script
    pub fn from_script(script: &[u8], ciphertext_len: usize, modulus_limbs: usize) -> BountyResult<Self> {
        let payload = data_script_payload(script)
            .ok_or_else(|| BountyError::InputValidation("not a data output script".to_string()))?;
        Self::parse(payload, ciphertext_len, modulus_limbs)
    }
}

/// The party offering the bounty
pub struct Poster {
    scalar: PrivateScalar,
    point: CurvePoint,
    modulus: BigUint,
}

impl Poster {
    pub fn new(scalar: PrivateScalar, modulus: BigUint) -> Self {
        let point = scalar.public_point();
        Self { scalar, point, modulus }
    }

    pub fn point(&self) -> &CurvePoint {
        &self.point
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Fix the bounty's parameters for `relation`
    pub fn create_bounty<V>(
        &self,
        relation: &BountyRelation<'_>,
        verifying_key: V,
        reward: u64,
        expiry_height: u32,
    ) -> BountyResult<BountyParams<V>> {
        let params = *relation.params();
        params.validate()?;
        let modulus_limbs = to_limbs(&self.modulus, params.modulus_limbs)?;
        if reward == 0 {
            return Err(BountyError::InputValidation("reward must be positive".to_string()));
        }

        log::info!(
            "Posting bounty: {}-bit modulus, reward {} sats, expiry height {}",
            self.modulus.bits(),
            reward,
            expiry_height
        );
        Ok(BountyParams {
            sender: self.point,
            modulus_limbs,
            verifying_key,
            reward,
            expiry_height,
            relation: params,
        })
    }

    /// Sign a refund transaction
    pub fn sign_refund(&self, context: &TransactionContext) -> Signature {
        self.scalar.signing_key().sign(&context.sighash())
    }

    /// Recover `(p, q)` from a claim's data output script
    pub fn recover_factors(&self, relation: &BountyRelation<'_>, script: &[u8]) -> BountyResult<(BigUint, BigUint)> {
        let params = relation.params();
        let payload = ClaimPayload::from_script(script, params.ciphertext_len(), params.modulus_limbs)?;
        if payload.sender != self.point {
            return Err(BountyError::InputValidation("payload is addressed to another poster".to_string()));
        }
        if from_limbs(&payload.modulus_limbs) != self.modulus {
            return Err(BountyError::InputValidation("payload is for another modulus".to_string()));
        }

        let shared = KeyAgreement::derive_shared(&self.scalar, &payload.receiver)?;
        let key = CipherKey::from_shared_point(&shared);
        let plaintext = FieldCipher::new(relation.permutation()).decrypt(
            &payload.ciphertext,
            &key,
            &payload.nonce,
            params.witness_limbs(),
        )?;
        let limbs = fields_to_limbs(&plaintext)?;
        let (p_limbs, q_limbs) = limbs.split_at(params.factor_limbs);
        let p = from_limbs(p_limbs);
        let q = from_limbs(q_limbs);

        let one = BigUint::from(1u8);
        if p <= one || q <= one || &p * &q != self.modulus {
            return Err(BountyError::RelationViolation("decrypted values do not factor the modulus".to_string()));
        }
        log::info!("Recovered factorization from claim payload");
        Ok((p, q))
    }
}

/// A claim ready to broadcast
#[derive(Debug, Clone)]
pub struct PreparedClaim<P> {
    pub message: ClaimMessage<P>,
    pub outputs: Vec<TxOutput>,
}

impl<P> PreparedClaim<P> {
    /// Claim transaction spending the escrow at `outpoint`
    pub fn transaction(&self, outpoint: OutPoint) -> TransactionContext {
        TransactionContext::new(outpoint, self.outputs.clone())
    }
}

/// The party claiming the bounty
pub struct Solver {
    scalar: PrivateScalar,
    point: CurvePoint,
    nonces: NonceGuard,
}

impl Solver {
    pub fn new(scalar: PrivateScalar) -> Self {
        let point = scalar.public_point();
        Self {
            scalar,
            point,
            nonces: NonceGuard::new(),
        }
    }

    /// Solver with a fresh key
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(PrivateScalar::random(rng))
    }

    pub fn point(&self) -> &CurvePoint {
        &self.point
    }

    /// Encrypt the factors to the poster, prove the relation and build the
    /// claim outputs
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_claim<S: ProofSystem>(
        &mut self,
        backend: &S,
        proving_key: &S::ProvingKey,
        relation: &BountyRelation<'_>,
        bounty: &BountyParams<S::VerifyingKey>,
        p: &BigUint,
        q: &BigUint,
        nonce: Fr,
    ) -> BountyResult<PreparedClaim<S::Proof>> {
        let params = *relation.params();
        if params != bounty.relation {
            return Err(BountyError::InputValidation("relation does not match the bounty".to_string()));
        }

        let witness = BountyWitness::new(p.clone(), q.clone(), self.scalar.clone(), &bounty.sender)?;
        let plaintext = limbs_to_fields(&witness.plaintext_limbs(&params)?);
        let key = CipherKey::from_shared_point(&witness.shared_point);
        self.nonces
            .check_and_record(&key, &nonce, &plaintext)
            .map_err(|e| BountyError::InputValidation(e.to_string()))?;
        let ciphertext = FieldCipher::new(relation.permutation()).encrypt(&plaintext, &key, &nonce)?;

        let commitment = CommitmentBinder::bind(&bounty.sender, &self.point, &nonce, &ciphertext, &bounty.modulus_limbs);
        let public = PublicInputs {
            sender: bounty.sender,
            receiver: self.point,
            nonce,
            ciphertext,
            modulus_limbs: bounty.modulus_limbs.clone(),
            commitment,
        };

        let proof = backend.prove(proving_key, relation, &public, &witness)?;
        log::info!("Generated claim proof, commitment {}", commitment.to_hex());

        let payload = CommitmentBinder::payload(
            &public.sender,
            &public.receiver,
            &public.nonce,
            &public.ciphertext,
            &public.modulus_limbs,
        );
        let outputs = vec![
            TxOutput {
                value: bounty.reward,
                script_pubkey: p2pkh_script(&self.point.hash160()),
            },
            TxOutput {
                value: 0,
                script_pubkey: data_script(&payload),
            },
        ];

        Ok(PreparedClaim {
            message: ClaimMessage {
                receiver: public.receiver,
                ciphertext: public.ciphertext,
                commitment,
                nonce,
                proof,
            },
            outputs,
        })
    }
}
