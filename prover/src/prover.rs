use std::time::Instant;

use ark_bls12_381::{Bls12_381, Fr};
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_relations::r1cs::SynthesisError;
use ark_snark::SNARK;
use ark_std::UniformRand;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, info};
use zk_circuits::merkle_verify::MerkleProofInput;
use zk_circuits::p256_verify::P256Input;
use zk_circuits::{hash_commit, merkle_verify, p256_verify};
use zk_circuits::{Assignment, CircuitInput, InputError};

use crate::artifacts::{ArtifactError, ArtifactManager, Artifacts};
use crate::proof_types::{ProofBundle, ProofFile, Verification, VerifyProofArgs};
use crate::setup::SetupError;
use crate::witness::build_witness;

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("circuit not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("no usable artifacts for circuit {circuit} ({reason}); run `zk build` first")]
    MissingArtifacts { circuit: String, reason: String },
    #[error("failed to compile circuit {circuit}: {source}")]
    Compile {
        circuit: String,
        #[source]
        source: SynthesisError,
    },
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("failed to synthesize the witness of circuit {circuit}: {source}")]
    Witness {
        circuit: String,
        #[source]
        source: SynthesisError,
    },
    #[error("assignment does not satisfy circuit {circuit} (first failing constraint: {constraint})")]
    Unsatisfied { circuit: String, constraint: String },
    #[error("stored artifacts of circuit {circuit} do not match its constraints ({reason}); bump the circuit version or rebuild")]
    StaleArtifacts { circuit: String, reason: String },
    #[error("{0}")]
    Proving(String),
    #[error("failed to encode verification arguments: {0}")]
    VerifyArgs(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("proof file carries a verifying key that differs from the stored key of circuit {circuit}")]
    ForeignVerifyingKey { circuit: String },
}

/// Produces proofs for the circuits known to an [`ArtifactManager`].
pub struct Prover<'r> {
    artifacts: ArtifactManager<'r>,
}

impl<'r> Prover<'r> {
    pub fn new(artifacts: ArtifactManager<'r>) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &ArtifactManager<'r> {
        &self.artifacts
    }

    /// Proves that `input` satisfies the circuit registered under `name`.
    ///
    /// Artifacts are built on first use and reused afterwards.
    pub fn generate_proof(
        &self,
        name: &str,
        input: &CircuitInput,
    ) -> Result<ProofBundle, ProverError> {
        let circuit = self
            .artifacts
            .registry()
            .get(name)
            .ok_or_else(|| ProverError::NotFound(name.to_string()))?;
        let assignment = circuit.prepare_input(input)?;
        let obtained = self.artifacts.obtain_artifacts(name, false)?;

        prove_with(&obtained.artifacts, assignment)
    }

    /// Obtains the artifacts of `name` and checks them with a proof of the
    /// circuit's example input.
    pub fn build(&self, name: &str, rebuild: bool) -> Result<ProofBundle, ProverError> {
        let obtained = self.artifacts.obtain_artifacts(name, rebuild)?;
        let assignment = obtained.circuit.example_assignment()?;
        let bundle = prove_with(&obtained.artifacts, assignment)?;

        let verification = verify_proof(
            &bundle.proof,
            &bundle.verifying_key,
            &bundle.public_witness,
        )?;
        if !verification.is_verified() {
            return Err(ProverError::Verification(format!(
                "self-test proof of circuit {name} was rejected"
            )));
        }
        info!("self-test proof of circuit {name} verified");

        Ok(bundle)
    }

    /// Verifies a proof file against the stored verifying key of the circuit
    /// it names.
    ///
    /// The key embedded in the file is only compared with the stored one,
    /// never trusted on its own.
    pub fn verify_file(&self, file: ProofFile) -> Result<Verification, ProverError> {
        let circuit = file.circuit.clone();
        let stored = self.artifacts.load_artifacts(&circuit)?;
        let (proof, verifying_key, public_witness) = file
            .into_parts()
            .map_err(|err| ProverError::Verification(format!("undecodable proof file: {err}")))?;

        if verifying_key != stored.verifying_key {
            return Err(ProverError::ForeignVerifyingKey { circuit });
        }
        verify_proof(&proof, &stored.verifying_key, &public_witness)
    }

    pub fn hash_commit_proof(&self, preimage: u64) -> Result<ProofBundle, ProverError> {
        self.generate_proof(hash_commit::NAME, &CircuitInput::HashCommit(preimage))
    }

    pub fn merkle_proof(&self, input: MerkleProofInput) -> Result<ProofBundle, ProverError> {
        self.generate_proof(merkle_verify::NAME, &CircuitInput::MerkleVerify(input))
    }

    pub fn p256_proof(&self, input: P256Input) -> Result<ProofBundle, ProverError> {
        self.generate_proof(p256_verify::NAME, &CircuitInput::P256Verify(input))
    }
}

fn prove_with(artifacts: &Artifacts, assignment: Assignment) -> Result<ProofBundle, ProverError> {
    let Assignment {
        circuit,
        public_outputs,
    } = assignment;
    let name = circuit.name();
    let witness = build_witness(circuit.as_ref())?;

    let expected_inputs = artifacts.verifying_key.gamma_abc_g1.len().saturating_sub(1);
    if witness.public_inputs().len() != expected_inputs {
        return Err(ProverError::StaleArtifacts {
            circuit: name.to_string(),
            reason: format!(
                "the verifying key takes {expected_inputs} public inputs, the assignment has {}",
                witness.public_inputs().len()
            ),
        });
    }
    if artifacts.proving_key.a_query.len() != witness.num_variables() {
        return Err(ProverError::StaleArtifacts {
            circuit: name.to_string(),
            reason: format!(
                "the proving key covers {} variables, the assignment has {}",
                artifacts.proving_key.a_query.len(),
                witness.num_variables()
            ),
        });
    }
    let compiled = &artifacts.constraint_system;
    if compiled.num_instance_variables as usize != witness.instance.len()
        || compiled.num_witness_variables as usize != witness.witness.len()
    {
        return Err(ProverError::StaleArtifacts {
            circuit: name.to_string(),
            reason: format!(
                "the stored constraint system has {} instance and {} witness variables, the assignment has {} and {}",
                compiled.num_instance_variables,
                compiled.num_witness_variables,
                witness.instance.len(),
                witness.witness.len()
            ),
        });
    }

    // The stored matrices stand in for a second synthesis of the circuit.
    let start = Instant::now();
    let matrices = compiled.to_matrices();
    let full_assignment = [witness.instance.as_slice(), witness.witness.as_slice()].concat();
    let proof = Groth16::<Bls12_381>::create_proof_with_reduction_and_matrices(
        &artifacts.proving_key,
        Fr::rand(&mut OsRng),
        Fr::rand(&mut OsRng),
        &matrices,
        witness.instance.len(),
        matrices.num_constraints,
        &full_assignment,
    )
    .map_err(|err| ProverError::Proving(format!("proof generation failed: {err}")))?;
    info!("generated proof for circuit {name} in {:?}", start.elapsed());

    let public_witness = witness.public_inputs().to_vec();
    let verify_args = VerifyProofArgs::new(&proof, &public_witness)
        .map_err(|err| ProverError::VerifyArgs(err.to_string()))?;
    debug!(?verify_args, "verification arguments for circuit {name}");

    Ok(ProofBundle {
        verify_args,
        proof,
        verifying_key: artifacts.verifying_key.clone(),
        public_witness,
        public_outputs,
    })
}

/// Checks `proof` against `verifying_key` and the public inputs.
///
/// A well-formed proof that does not verify is `Ok(Rejected)`; an error means
/// verification could not be attempted.
pub fn verify_proof(
    proof: &Proof<Bls12_381>,
    verifying_key: &VerifyingKey<Bls12_381>,
    public_witness: &[Fr],
) -> Result<Verification, ProverError> {
    let expected = verifying_key.gamma_abc_g1.len().saturating_sub(1);
    if public_witness.len() != expected {
        return Err(ProverError::Verification(format!(
            "expected {expected} public inputs, got {}",
            public_witness.len()
        )));
    }

    Groth16::<Bls12_381>::verify(verifying_key, public_witness, proof)
        .map(Verification::from)
        .map_err(|err| ProverError::Verification(err.to_string()))
}
