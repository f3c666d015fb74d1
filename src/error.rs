//! Protocol-level error types

use crate::circuit::CircuitError;
use crate::crypto::CryptoError;
use crate::proof::ProofError;

/// Errors surfaced by the protocol flows
#[derive(Debug, thiserror::Error)]
pub enum BountyError {
    #[error("Input validation failed: {0}")]
    InputValidation(String),

    #[error("Relation violated: {0}")]
    RelationViolation(String),

    #[error("Verification failed: {0}")]
    VerificationFailure(String),

    #[error("Timing violation: {0}")]
    TimingViolation(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Circuit error: {0}")]
    Circuit(CircuitError),

    #[error("Proof error: {0}")]
    Proof(ProofError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CircuitError> for BountyError {
    fn from(e: CircuitError) -> Self {
        match e {
            CircuitError::Unsatisfied { .. } => BountyError::RelationViolation(e.to_string()),
            other => BountyError::Circuit(other),
        }
    }
}

impl From<ProofError> for BountyError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::Unsatisfied(inner) => inner.into(),
            other => BountyError::Proof(other),
        }
    }
}

impl From<serde_json::Error> for BountyError {
    fn from(e: serde_json::Error) -> Self {
        BountyError::Serialization(e.to_string())
    }
}

/// Result type for protocol operations
pub type BountyResult<T> = Result<T, BountyError>;
