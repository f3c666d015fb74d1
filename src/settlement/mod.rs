//! Settlement Contract
//!
//! Value-release rules for an escrowed bounty. The parameters are fixed when
//! the bounty is posted and passed explicitly to [`claim`] and [`refund`];
//! [`Escrow`] layers the ledger's single-spend guarantee on top.

pub mod transaction;

use ark_bn254::Fr;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::Signature;
use serde::{Serialize, Deserialize};
use crate::circuit::{PublicInputs, RelationParams};
use crate::crypto::cipher::validate_nonce;
use crate::crypto::commitments::{CommitmentBinder, PublicCommitment};
use crate::crypto::key_agreement::CurvePoint;
use crate::error::BountyError;
use crate::proof::{CheckingVerifyingKey, Proof, ProofSystem};

pub use transaction::{data_script, data_script_payload, p2pkh_script, OutPoint, TransactionContext, TxOutput, SEQUENCE_FINAL};

/// Immutable bounty parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyParams<V = CheckingVerifyingKey> {
    /// Poster's public point `Qa`
    pub sender: CurvePoint,
    /// Modulus limbs, least significant first
    pub modulus_limbs: Vec<u64>,
    pub verifying_key: V,
    /// Reward in satoshis
    pub reward: u64,
    /// Earliest refund height
    pub expiry_height: u32,
    pub relation: RelationParams,
}

/// Where the escrowed value went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

/// Escrow lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BountyState {
    Open,
    Claimed { payout: Payout },
    Refunded { payout: Payout },
}

impl BountyState {
    pub fn is_open(&self) -> bool {
        matches!(self, BountyState::Open)
    }
}

/// Everything the solver submits with a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimMessage<P = Proof> {
    pub receiver: CurvePoint,
    #[serde(with = "field_vec")]
    pub ciphertext: Vec<Fr>,
    pub commitment: PublicCommitment,
    #[serde(with = "field_elem")]
    pub nonce: Fr,
    pub proof: P,
}

/// Reason class of a rejected transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    InputValidation,
    VerificationFailure,
    TimingViolation,
    AlreadySettled,
}

/// A rejected transition; state is unchanged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {reason}")]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}

impl Rejection {
    fn new(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self { kind, reason: reason.into() }
    }
}

impl From<Rejection> for BountyError {
    fn from(r: Rejection) -> Self {
        match r.kind {
            RejectionKind::VerificationFailure => BountyError::VerificationFailure(r.reason),
            RejectionKind::TimingViolation => BountyError::TimingViolation(r.reason),
            RejectionKind::InputValidation | RejectionKind::AlreadySettled => {
                BountyError::InputValidation(r.reason)
            }
        }
    }
}

/// Result type for settlement transitions
pub type SettlementResult = Result<Payout, Rejection>;

/// Decide a claim against `params`. Checks, in order: open state, message
/// shape, commitment, reward output, data output, proof.
pub fn claim<S: ProofSystem>(
    params: &BountyParams<S::VerifyingKey>,
    state: &BountyState,
    backend: &S,
    message: ClaimMessage<S::Proof>,
    context: &TransactionContext,
) -> SettlementResult {
    let result = decide_claim(params, state, backend, message, context);
    match &result {
        Ok(payout) => log::info!("Claim accepted: {} sats released", payout.amount),
        Err(rejection) => log::warn!("Claim rejected: {}", rejection),
    }
    result
}

fn decide_claim<S: ProofSystem>(
    params: &BountyParams<S::VerifyingKey>,
    state: &BountyState,
    backend: &S,
    message: ClaimMessage<S::Proof>,
    context: &TransactionContext,
) -> SettlementResult {
    use RejectionKind::*;

    if !state.is_open() {
        return Err(Rejection::new(AlreadySettled, "bounty is no longer open"));
    }
    if message.ciphertext.len() != params.relation.ciphertext_len() {
        return Err(Rejection::new(
            InputValidation,
            format!(
                "ciphertext has {} elements, expected {}",
                message.ciphertext.len(),
                params.relation.ciphertext_len()
            ),
        ));
    }
    if params.modulus_limbs.len() != params.relation.modulus_limbs {
        return Err(Rejection::new(InputValidation, "modulus does not match relation dimensions"));
    }
    validate_nonce(&message.nonce).map_err(|e| Rejection::new(InputValidation, e.to_string()))?;

    if !CommitmentBinder::verify(
        &message.commitment,
        &params.sender,
        &message.receiver,
        &message.nonce,
        &message.ciphertext,
        &params.modulus_limbs,
    ) {
        return Err(Rejection::new(VerificationFailure, "public commitment mismatch"));
    }

    let receiver_script = p2pkh_script(&message.receiver.hash160());
    match context.outputs.first() {
        Some(out) if out.value == params.reward && out.script_pubkey == receiver_script => {}
        Some(_) => {
            return Err(Rejection::new(
                VerificationFailure,
                "first output must pay the reward to the receiver's P2PKH script",
            ))
        }
        None => return Err(Rejection::new(InputValidation, "claim transaction has no outputs")),
    }

    let payload = CommitmentBinder::payload(
        &params.sender,
        &message.receiver,
        &message.nonce,
        &message.ciphertext,
        &params.modulus_limbs,
    );
    match context.outputs.get(1) {
        Some(out) if out.script_pubkey == data_script(&payload) => {}
        _ => {
            return Err(Rejection::new(
                VerificationFailure,
                "second output must carry the public parameter payload",
            ))
        }
    }

    let public = PublicInputs {
        sender: params.sender,
        receiver: message.receiver,
        nonce: message.nonce,
        ciphertext: message.ciphertext,
        modulus_limbs: params.modulus_limbs.clone(),
        commitment: message.commitment,
    };
    if !backend.verify(&params.verifying_key, &public.to_field_elements(), &message.proof) {
        return Err(Rejection::new(VerificationFailure, "proof rejected"));
    }

    Ok(Payout {
        amount: params.reward,
        script_pubkey: receiver_script,
    })
}

/// Decide a refund against `params`. The lock time must be enabled and at
/// or past expiry, and the poster must have signed the transaction sighash.
/// The payout is the first output, which may not exceed the escrowed reward.
pub fn refund<V>(
    params: &BountyParams<V>,
    state: &BountyState,
    signature: &Signature,
    context: &TransactionContext,
) -> SettlementResult {
    let result = decide_refund(params, state, signature, context);
    match &result {
        Ok(payout) => log::info!("Refund accepted at lock time {}: {} sats", context.lock_time, payout.amount),
        Err(rejection) => log::warn!("Refund rejected: {}", rejection),
    }
    result
}

fn decide_refund<V>(
    params: &BountyParams<V>,
    state: &BountyState,
    signature: &Signature,
    context: &TransactionContext,
) -> SettlementResult {
    use RejectionKind::*;

    if !state.is_open() {
        return Err(Rejection::new(AlreadySettled, "bounty is no longer open"));
    }
    if !context.lock_time_enabled() {
        return Err(Rejection::new(TimingViolation, "input sequence disables the lock time"));
    }
    if context.lock_time < params.expiry_height {
        return Err(Rejection::new(
            TimingViolation,
            format!("lock time {} is before expiry {}", context.lock_time, params.expiry_height),
        ));
    }
    if params.sender.verifying_key().verify(&context.sighash(), signature).is_err() {
        return Err(Rejection::new(VerificationFailure, "invalid poster signature"));
    }

    let output = context
        .outputs
        .first()
        .ok_or_else(|| Rejection::new(InputValidation, "refund transaction has no outputs"))?;
    if output.value > params.reward {
        return Err(Rejection::new(
            InputValidation,
            format!("refund pays {} sats from an escrow of {}", output.value, params.reward),
        ));
    }
    Ok(Payout {
        amount: output.value,
        script_pubkey: output.script_pubkey.clone(),
    })
}

/// A single escrowed output. The first successful transition spends it.
#[derive(Debug, Clone)]
pub struct Escrow<V = CheckingVerifyingKey> {
    params: BountyParams<V>,
    state: BountyState,
}

impl<V> Escrow<V> {
    pub fn new(params: BountyParams<V>) -> Self {
        log::info!(
            "Escrow opened: reward {} sats, expiry height {}",
            params.reward,
            params.expiry_height
        );
        Self {
            params,
            state: BountyState::Open,
        }
    }

    pub fn params(&self) -> &BountyParams<V> {
        &self.params
    }

    pub fn state(&self) -> &BountyState {
        &self.state
    }

    /// Attempt to claim the bounty
    pub fn claim<S>(
        &mut self,
        backend: &S,
        message: ClaimMessage<S::Proof>,
        context: &TransactionContext,
    ) -> SettlementResult
    where
        S: ProofSystem<VerifyingKey = V>,
    {
        let payout = claim(&self.params, &self.state, backend, message, context)?;
        self.state = BountyState::Claimed { payout: payout.clone() };
        Ok(payout)
    }

    /// Attempt to reclaim the reward after expiry
    pub fn refund(&mut self, signature: &Signature, context: &TransactionContext) -> SettlementResult {
        let payout = refund(&self.params, &self.state, signature, context)?;
        self.state = BountyState::Refunded { payout: payout.clone() };
        Ok(payout)
    }
}

/// Serde adapters for BN254 field elements as 32-byte big-endian hex
pub(crate) mod field_elem {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};
    use crate::crypto::limbs::{field_from_be_bytes, field_to_be_bytes};

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(field_to_be_bytes(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        field_from_be_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod field_vec {
    use ark_bn254::Fr;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;
    use crate::crypto::limbs::{field_from_be_bytes, field_to_be_bytes};

    pub fn serialize<S: Serializer>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&hex::encode(field_to_be_bytes(value)))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fr>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|item| {
                let bytes = hex::decode(item).map_err(serde::de::Error::custom)?;
                field_from_be_bytes(&bytes).map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
