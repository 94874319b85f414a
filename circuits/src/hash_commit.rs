//! Knowledge of a preimage behind a public commitment.

use ark_bls12_381::Fr;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::circuit::{assigned, Assignment, Circuit, CircuitInput, InputError};
use crate::commitment::{commitment_field, field_to_decimal, CommitValue};
use crate::gadgets::poseidon::hash_vars;

pub const NAME: &str = "hash_commit";

/// Preimage used by the self-test proof.
pub const EXAMPLE_PREIMAGE: u64 = 42;

#[derive(Clone, Debug, Default)]
pub struct HashCommitCircuit {
    /// Private.
    pub hidden_input: Option<u64>,
    /// Public. Must equal the commitment to `hidden_input`.
    pub input_commitment: Option<Fr>,
}

impl Circuit for HashCommitCircuit {
    fn name(&self) -> &'static str {
        NAME
    }

    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let hidden_input =
            FpVar::new_witness(cs.clone(), assigned(self.hidden_input.map(Fr::from)))?;
        let input_commitment = FpVar::new_input(cs.clone(), assigned(self.input_commitment))?;

        let digest = hash_vars(cs, &[hidden_input])?;
        input_commitment.enforce_equal(&digest)
    }

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError> {
        let &CircuitInput::HashCommit(preimage) = input else {
            return Err(InputError::unexpected(NAME, input));
        };

        let commitment = commitment_field(&[CommitValue::U64(preimage)]);
        Ok(Assignment {
            circuit: Box::new(HashCommitCircuit {
                hidden_input: Some(preimage),
                input_commitment: Some(commitment),
            }),
            public_outputs: vec![field_to_decimal(commitment)],
        })
    }

    fn example_input(&self) -> CircuitInput {
        CircuitInput::HashCommit(EXAMPLE_PREIMAGE)
    }
}
