//! Relation Module
//!
//! A backend-agnostic constraint builder and the bounty relation expressed on
//! top of it. Proof backends consume the resulting [`ConstraintSystem`].

pub mod constraint_system;
pub mod relation;

pub use constraint_system::{Base, Constraint, ConstraintSystem, LabeledConstraint, PointVars, Var, Word};
pub use relation::{BountyRelation, BountyWitness, PublicInputs, RelationParams};

/// Relation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError {
    #[error("Assignment missing for {0}")]
    AssignmentMissing(String),

    #[error("Public variable {0} allocated after private variables")]
    PublicAfterPrivate(String),

    #[error("Constraint {index} ({label}) unsatisfied: {reason}")]
    Unsatisfied {
        index: usize,
        label: String,
        reason: String,
    },

    #[error("Invalid relation input: {0}")]
    InvalidInput(String),
}

/// Result type for relation operations
pub type CircuitResult<T> = Result<T, CircuitError>;
