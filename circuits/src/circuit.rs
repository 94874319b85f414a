use std::fmt::Debug;

use ark_bls12_381::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merkle_verify::MerkleProofInput;
use crate::p256_verify::P256Input;

/// Domain input accepted by [`Circuit::prepare_input`], one variant per
/// circuit family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "circuit", content = "input", rename_all = "snake_case")]
pub enum CircuitInput {
    /// The preimage to commit to.
    HashCommit(u64),
    MerkleVerify(MerkleProofInput),
    P256Verify(P256Input),
}

impl CircuitInput {
    /// Name of the variant, as used in its serialized tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            CircuitInput::HashCommit(_) => "hash_commit",
            CircuitInput::MerkleVerify(_) => "merkle_verify",
            CircuitInput::P256Verify(_) => "p256_verify",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("circuit {circuit} expects {expected} input, got {found}")]
    UnexpectedInput {
        circuit: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("circuit {circuit} requires the {field} field")]
    MissingField {
        circuit: &'static str,
        field: &'static str,
    },
    #[error("at most {max} siblings are supported, got {found}")]
    TooManySiblings { max: usize, found: usize },
    #[error("signature must be {expected} bytes, got {found}")]
    InvalidSignatureLength { expected: usize, found: usize },
    #[error("{field} is not a canonical scalar field element")]
    OutOfField { field: &'static str },
}

impl InputError {
    pub(crate) fn unexpected(circuit: &'static str, input: &CircuitInput) -> Self {
        InputError::UnexpectedInput {
            circuit,
            expected: circuit,
            found: input.kind(),
        }
    }
}

/// A fully populated circuit instance, plus outputs the caller should learn
/// alongside the proof.
#[derive(Debug)]
pub struct Assignment {
    pub circuit: Box<dyn Circuit>,
    pub public_outputs: Vec<String>,
}

/// A reusable arithmetic circuit.
///
/// A freshly constructed circuit holds no values; that empty descriptor is
/// what key generation synthesizes against. [`Circuit::prepare_input`] yields
/// a populated instance of the same shape.
pub trait Circuit: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Version of the constraint definition. Bump it whenever [`Circuit::define`]
    /// changes so that previously generated keys are rebuilt.
    fn version(&self) -> u32 {
        1
    }

    /// Allocates the circuit's variables in `cs` and enforces its
    /// constraints.
    ///
    /// Values are only read when `cs` needs them, so an empty descriptor can
    /// be synthesized in setup mode.
    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError>;

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError>;

    /// A known-good input, used for self-tests.
    fn example_input(&self) -> CircuitInput;

    fn example_assignment(&self) -> Result<Assignment, InputError> {
        self.prepare_input(&self.example_input())
    }
}

/// Adapts a [`Circuit`] to arkworks' synthesis entry point.
#[derive(Clone, Copy, Debug)]
pub struct Synthesizer<'a>(pub &'a dyn Circuit);

impl ConstraintSynthesizer<Fr> for Synthesizer<'_> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        self.0.define(cs)
    }
}

/// Closure for variable allocation that surfaces a missing value lazily.
pub(crate) fn assigned<T: Copy>(value: Option<T>) -> impl FnOnce() -> Result<T, SynthesisError> {
    move || value.ok_or(SynthesisError::AssignmentMissing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_round_trips_through_json() {
        let input = CircuitInput::HashCommit(42);
        let json = serde_json::to_string(&input).unwrap();
        assert_eq!(json, r#"{"circuit":"hash_commit","input":42}"#);
        assert_eq!(serde_json::from_str::<CircuitInput>(&json).unwrap(), input);
    }

    #[test]
    fn unexpected_input_names_both_sides() {
        let err = InputError::unexpected("merkle_verify", &CircuitInput::HashCommit(1));
        assert_eq!(
            err.to_string(),
            "circuit merkle_verify expects merkle_verify input, got hash_commit"
        );
    }
}
