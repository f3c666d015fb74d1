// Core modules
pub mod crypto;
pub mod circuit;
pub mod proof;
pub mod settlement;

// Flows and glue
pub mod protocol;
pub mod config;
pub mod error;


// Re-export main types for easy access
pub use crypto::{CipherKey, CommitmentBinder, CryptoError, CryptoUtils, CurvePoint, FieldCipher, KeyAgreement, NonceGuard, PoseidonPermutation, PrivateScalar, PublicCommitment, SharedPoint};
pub use circuit::{BountyRelation, BountyWitness, CircuitError, ConstraintSystem, PublicInputs, RelationParams};
pub use proof::{CheckingBackend, Proof, ProofError, ProofSystem};
pub use settlement::{claim, refund, BountyParams, BountyState, ClaimMessage, Escrow, OutPoint, Payout, Rejection, RejectionKind, TransactionContext, TxOutput};
pub use protocol::{ClaimPayload, Poster, PreparedClaim, Solver};
pub use config::ProtocolConfig;
pub use error::{BountyError, BountyResult};
