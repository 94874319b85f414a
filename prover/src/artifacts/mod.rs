//! Load-or-build management of per-circuit Groth16 artifacts.

use std::sync::Arc;

use ark_bls12_381::{Bls12_381, Fr};
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_relations::r1cs::{
    ConstraintMatrices, ConstraintSynthesizer, ConstraintSystem, OptimizationGoal,
    SynthesisError, SynthesisMode,
};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use hashbrown::HashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zk_circuits::{Circuit, CircuitRegistry, Synthesizer};

use crate::prover::ProverError;
use crate::setup::KeyGenerator;

pub mod cli;
pub mod persistence;

pub use persistence::{default_cache_dir, ArtifactError, ArtifactStore, Manifest};

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct MatrixEntry {
    pub coeff: Fr,
    /// Instance variables first (index 0 is the constant one), then witness
    /// variables.
    pub index: u64,
}

/// The finalized R1CS of a circuit, as produced by setup-mode synthesis.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CompiledCircuit {
    /// Includes the constant one.
    pub num_instance_variables: u64,
    pub num_witness_variables: u64,
    pub num_constraints: u64,
    pub a: Vec<Vec<MatrixEntry>>,
    pub b: Vec<Vec<MatrixEntry>>,
    pub c: Vec<Vec<MatrixEntry>>,
}

impl CompiledCircuit {
    /// Number of public inputs a verifier has to supply.
    pub fn num_public_inputs(&self) -> u64 {
        self.num_instance_variables - 1
    }

    /// Size the QAP evaluation domain has to cover: one row per constraint
    /// plus one per instance variable.
    pub fn domain_size(&self) -> usize {
        (self.num_constraints + self.num_instance_variables) as usize
    }

    /// Hex SHA-256 of the compressed encoding.
    pub fn digest(&self) -> Result<String, SerializationError> {
        let mut bytes = Vec::with_capacity(self.compressed_size());
        self.serialize_compressed(&mut bytes)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// The arkworks form the prover's QAP reduction consumes.
    pub fn to_matrices(&self) -> ConstraintMatrices<Fr> {
        let restore = |matrix: &[Vec<MatrixEntry>]| -> Vec<Vec<(Fr, usize)>> {
            matrix
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|entry| (entry.coeff, entry.index as usize))
                        .collect()
                })
                .collect()
        };
        let non_zero = |matrix: &[Vec<MatrixEntry>]| matrix.iter().map(Vec::len).sum();

        ConstraintMatrices {
            num_instance_variables: self.num_instance_variables as usize,
            num_witness_variables: self.num_witness_variables as usize,
            num_constraints: self.num_constraints as usize,
            a_num_non_zero: non_zero(&self.a),
            b_num_non_zero: non_zero(&self.b),
            c_num_non_zero: non_zero(&self.c),
            a: restore(&self.a),
            b: restore(&self.b),
            c: restore(&self.c),
        }
    }
}

fn convert_matrix(matrix: Vec<Vec<(Fr, usize)>>) -> Vec<Vec<MatrixEntry>> {
    matrix
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(coeff, index)| MatrixEntry {
                    coeff,
                    index: index as u64,
                })
                .collect()
        })
        .collect()
}

impl From<ConstraintMatrices<Fr>> for CompiledCircuit {
    fn from(matrices: ConstraintMatrices<Fr>) -> Self {
        Self {
            num_instance_variables: matrices.num_instance_variables as u64,
            num_witness_variables: matrices.num_witness_variables as u64,
            num_constraints: matrices.num_constraints as u64,
            a: convert_matrix(matrices.a),
            b: convert_matrix(matrices.b),
            c: convert_matrix(matrices.c),
        }
    }
}

/// Synthesizes the empty descriptor of `circuit` in setup mode.
///
/// Uses the same optimization goal as the Groth16 prover so that variable
/// layouts agree between setup and proving.
pub fn compile_circuit(circuit: &dyn Circuit) -> Result<CompiledCircuit, SynthesisError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    cs.set_mode(SynthesisMode::Setup);

    Synthesizer(circuit).generate_constraints(cs.clone())?;
    cs.finalize();

    let matrices = cs.to_matrices().ok_or(SynthesisError::MissingCS)?;
    Ok(matrices.into())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Artifacts {
    pub constraint_system: CompiledCircuit,
    pub proving_key: ProvingKey<Bls12_381>,
    pub verifying_key: VerifyingKey<Bls12_381>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Compiled and keyed in this call.
    Built,
    Loaded,
}

#[derive(Debug)]
pub struct ObtainedArtifacts {
    pub circuit: Box<dyn Circuit>,
    pub artifacts: Artifacts,
    pub source: ArtifactSource,
}

/// Hands out the artifacts of registered circuits, building and persisting
/// them the first time a circuit is requested.
pub struct ArtifactManager<'r> {
    registry: &'r CircuitRegistry,
    store: ArtifactStore,
    key_generator: Box<dyn KeyGenerator>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<'r> ArtifactManager<'r> {
    pub fn new(
        registry: &'r CircuitRegistry,
        store: ArtifactStore,
        key_generator: impl KeyGenerator + 'static,
    ) -> Self {
        Self {
            registry,
            store,
            key_generator: Box::new(key_generator),
            locks: Mutex::default(),
        }
    }

    pub fn registry(&self) -> &'r CircuitRegistry {
        self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Returns the artifacts of the circuit registered under `name`.
    ///
    /// They are rebuilt when `force_rebuild` is set, when nothing is stored
    /// for `name` yet, or when the stored set was generated for a different
    /// version of the circuit. At most one build per name runs at a time.
    pub fn obtain_artifacts(
        &self,
        name: &str,
        force_rebuild: bool,
    ) -> Result<ObtainedArtifacts, ProverError> {
        let circuit = self
            .registry
            .get(name)
            .ok_or_else(|| ProverError::NotFound(name.to_string()))?;

        let lock = self.lock_for(name);
        let _guard = lock.lock();

        if force_rebuild {
            info!("rebuilding artifacts for circuit {name}");
        } else {
            match self.store.manifest(name)? {
                Some(manifest) if manifest.circuit_version == circuit.version() => {
                    info!(
                        "loading artifacts for circuit {name} from {}",
                        self.store.slot(name).display()
                    );
                    let artifacts = self.store.load(name, &manifest)?;
                    return Ok(ObtainedArtifacts {
                        circuit,
                        artifacts,
                        source: ArtifactSource::Loaded,
                    });
                }
                Some(manifest) => info!(
                    "stored artifacts for circuit {name} are for version {}, current is {}; rebuilding",
                    manifest.circuit_version,
                    circuit.version()
                ),
                None => info!("no stored artifacts for circuit {name}; building"),
            }
        }

        let artifacts = self.build(circuit.as_ref())?;
        let manifest = self.store.persist(name, circuit.version(), &artifacts)?;
        debug!(?manifest, "persisted artifacts for circuit {name}");

        Ok(ObtainedArtifacts {
            circuit,
            artifacts,
            source: ArtifactSource::Built,
        })
    }

    /// Returns the stored artifacts of `name` without ever building them.
    ///
    /// Fails with [`ProverError::MissingArtifacts`] when nothing usable is
    /// stored for the circuit's current version.
    pub fn load_artifacts(&self, name: &str) -> Result<Artifacts, ProverError> {
        let circuit = self
            .registry
            .get(name)
            .ok_or_else(|| ProverError::NotFound(name.to_string()))?;

        let lock = self.lock_for(name);
        let _guard = lock.lock();

        match self.store.manifest(name)? {
            Some(manifest) if manifest.circuit_version == circuit.version() => {
                Ok(self.store.load(name, &manifest)?)
            }
            Some(manifest) => Err(ProverError::MissingArtifacts {
                circuit: name.to_string(),
                reason: format!(
                    "stored artifacts are for version {}, current is {}",
                    manifest.circuit_version,
                    circuit.version()
                ),
            }),
            None => Err(ProverError::MissingArtifacts {
                circuit: name.to_string(),
                reason: "nothing is stored".to_string(),
            }),
        }
    }

    fn build(&self, circuit: &dyn Circuit) -> Result<Artifacts, ProverError> {
        let constraint_system =
            compile_circuit(circuit).map_err(|source| ProverError::Compile {
                circuit: circuit.name().to_string(),
                source,
            })?;
        info!(
            "compiled circuit {}: {} constraints, {} public inputs, {} witness variables",
            circuit.name(),
            constraint_system.num_constraints,
            constraint_system.num_public_inputs(),
            constraint_system.num_witness_variables
        );

        let (proving_key, verifying_key) =
            self.key_generator.generate(circuit, &constraint_system)?;

        Ok(Artifacts {
            constraint_system,
            proving_key,
            verifying_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use zk_circuits::hash_commit::{self, HashCommitCircuit};
    use zk_circuits::merkle_verify::{MerkleVerifyCircuit, MAX_PROOF_ELEMENTS};

    use super::*;
    use crate::setup::{LocalSetup, MockKeyGenerator};

    #[test]
    fn compiling_needs_no_values() {
        let compiled = compile_circuit(&MerkleVerifyCircuit::default()).unwrap();

        assert_eq!(
            compiled.num_public_inputs(),
            MAX_PROOF_ELEMENTS as u64 + 2
        );
        assert_eq!(compiled.a.len() as u64, compiled.num_constraints);
        assert!(compiled.num_constraints > 0);
    }

    #[test]
    fn digest_tracks_the_constraints() {
        let first = compile_circuit(&HashCommitCircuit::default()).unwrap();
        let second = compile_circuit(&HashCommitCircuit::default()).unwrap();
        let other = compile_circuit(&MerkleVerifyCircuit::default()).unwrap();

        assert_eq!(first.digest().unwrap(), second.digest().unwrap());
        assert_ne!(first.digest().unwrap(), other.digest().unwrap());
    }

    #[test]
    fn compiled_circuit_survives_serialization() {
        let compiled = compile_circuit(&HashCommitCircuit::default()).unwrap();
        let mut bytes = Vec::new();
        compiled.serialize_compressed(&mut bytes).unwrap();

        let decoded = CompiledCircuit::deserialize_compressed(&bytes[..]).unwrap();
        assert_eq!(decoded, compiled);
    }

    #[test]
    fn matrices_come_back_unchanged() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        cs.set_optimization_goal(OptimizationGoal::Constraints);
        cs.set_mode(SynthesisMode::Setup);
        Synthesizer(&HashCommitCircuit::default())
            .generate_constraints(cs.clone())
            .unwrap();
        cs.finalize();
        let synthesized = cs.to_matrices().unwrap();

        let restored = CompiledCircuit::from(synthesized.clone()).to_matrices();
        assert_eq!(restored.a, synthesized.a);
        assert_eq!(restored.b, synthesized.b);
        assert_eq!(restored.c, synthesized.c);
        assert_eq!(restored.a_num_non_zero, synthesized.a_num_non_zero);
        assert_eq!(restored.b_num_non_zero, synthesized.b_num_non_zero);
        assert_eq!(restored.c_num_non_zero, synthesized.c_num_non_zero);
        assert_eq!(restored.num_constraints, synthesized.num_constraints);
    }

    #[test]
    fn loading_never_builds() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CircuitRegistry::with_default_circuits();
        let mut key_generator = MockKeyGenerator::new();
        key_generator.expect_generate().never();
        let manager = ArtifactManager::new(&registry, ArtifactStore::new(dir.path()), key_generator);

        let err = manager.load_artifacts(hash_commit::NAME).unwrap_err();
        assert!(matches!(err, ProverError::MissingArtifacts { .. }));
        assert!(matches!(
            manager.load_artifacts("sudoku").unwrap_err(),
            ProverError::NotFound(_)
        ));
        assert!(!dir.path().join(hash_commit::NAME).exists());
    }

    #[test]
    fn loading_returns_what_was_built() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CircuitRegistry::with_default_circuits();
        let mut key_generator = MockKeyGenerator::new();
        key_generator
            .expect_generate()
            .times(1)
            .returning(|circuit, compiled| LocalSetup.generate(circuit, compiled));
        let manager = ArtifactManager::new(&registry, ArtifactStore::new(dir.path()), key_generator);

        let built = manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
        let loaded = manager.load_artifacts(hash_commit::NAME).unwrap();
        assert_eq!(loaded, built.artifacts);
    }
}
