use ark_bls12_381::Fr;
use ark_relations::r1cs::{ConstraintSystem, OptimizationGoal, SynthesisError};
use zk_circuits::Circuit;

use crate::prover::ProverError;

/// A full assignment to a circuit's variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    /// Instance assignment, starting with the constant one.
    pub instance: Vec<Fr>,
    pub witness: Vec<Fr>,
}

impl Witness {
    /// The values a verifier sees.
    pub fn public_inputs(&self) -> &[Fr] {
        &self.instance[1..]
    }

    pub fn num_variables(&self) -> usize {
        self.instance.len() + self.witness.len()
    }
}

/// Synthesizes a populated circuit and checks that it satisfies its own
/// constraints.
pub fn build_witness(assignment: &dyn Circuit) -> Result<Witness, ProverError> {
    let synthesis_error = |source: SynthesisError| ProverError::Witness {
        circuit: assignment.name().to_string(),
        source,
    };

    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    assignment.define(cs.clone()).map_err(synthesis_error)?;
    cs.finalize();

    if let Some(constraint) = cs.which_is_unsatisfied().map_err(synthesis_error)? {
        return Err(ProverError::Unsatisfied {
            circuit: assignment.name().to_string(),
            constraint,
        });
    }

    let cs = cs.borrow().ok_or(SynthesisError::MissingCS).map_err(synthesis_error)?;
    Ok(Witness {
        instance: cs.instance_assignment.clone(),
        witness: cs.witness_assignment.clone(),
    })
}
