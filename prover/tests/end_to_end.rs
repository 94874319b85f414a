use std::fs;
use std::thread;

use ark_bls12_381::{Bls12_381, Fr};
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use ark_serialize::Compress;
use mockall::mock;
use zk_circuits::commitment::{compute_commitment, field_to_biguint, hash_fields};
use zk_circuits::hash_commit::{self, HashCommitCircuit};
use zk_circuits::merkle_verify::{self, MerkleProofInput, EXAMPLE_ACCOUNTS};
use zk_circuits::{Assignment, Circuit, CircuitInput, CircuitRegistry, InputError};
use zk_prover::artifacts::{
    ArtifactError, ArtifactManager, ArtifactSource, ArtifactStore, CompiledCircuit,
};
use zk_prover::proof_types::{ProofFile, Verification};
use zk_prover::prover::{verify_proof, Prover, ProverError};
use zk_prover::setup::ceremony::PowersOfTau;
use zk_prover::setup::{CeremonySetup, KeyGenerator, KeySetup, LocalSetup, SetupError};

mock! {
    Setup {}

    impl KeyGenerator for Setup {
        fn generate(
            &self,
            circuit: &dyn Circuit,
            compiled: &CompiledCircuit,
        ) -> Result<(ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>), SetupError>;
    }
}

/// Local setup that has to run exactly `times` times before it is dropped.
fn local_setup_running(times: usize) -> MockSetup {
    let mut setup = MockSetup::new();
    setup
        .expect_generate()
        .times(times)
        .returning(|circuit, compiled| LocalSetup.generate(circuit, compiled));
    setup
}

/// `hash_commit` under an explicit version number.
#[derive(Debug, Default)]
struct VersionedHashCommit<const V: u32>(HashCommitCircuit);

impl<const V: u32> Circuit for VersionedHashCommit<V> {
    fn name(&self) -> &'static str {
        hash_commit::NAME
    }

    fn version(&self) -> u32 {
        V
    }

    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        self.0.define(cs)
    }

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError> {
        self.0.prepare_input(input)
    }

    fn example_input(&self) -> CircuitInput {
        self.0.example_input()
    }
}

/// One public input and no constraints: any value can be "proved".
#[derive(Debug, Default)]
struct Unconstrained(Option<u64>);

impl Circuit for Unconstrained {
    fn name(&self) -> &'static str {
        "forgery"
    }

    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        cs.new_input_variable(|| {
            self.0
                .map(Fr::from)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        Ok(())
    }

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError> {
        let &CircuitInput::HashCommit(value) = input else {
            return Err(InputError::UnexpectedInput {
                circuit: "forgery",
                expected: "hash_commit",
                found: input.kind(),
            });
        };
        Ok(Assignment {
            circuit: Box::new(Unconstrained(Some(value))),
            public_outputs: vec![value.to_string()],
        })
    }

    fn example_input(&self) -> CircuitInput {
        CircuitInput::HashCommit(1)
    }
}

fn hash_commit_registry() -> CircuitRegistry {
    let mut registry = CircuitRegistry::new();
    registry.register(hash_commit::NAME, || {
        Box::new(HashCommitCircuit::default()) as Box<dyn Circuit>
    });
    registry
}

#[test]
fn hash_commit_proof_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let registry = CircuitRegistry::with_default_circuits();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let first = prover.hash_commit_proof(42).unwrap();
    assert_eq!(first.public_outputs, vec![compute_commitment(&[42u64.into()])]);
    assert_eq!(
        verify_proof(&first.proof, &first.verifying_key, &first.public_witness).unwrap(),
        Verification::Verified
    );

    let second = prover
        .generate_proof(hash_commit::NAME, &CircuitInput::HashCommit(42))
        .unwrap();
    assert_ne!(first.proof, second.proof);
    assert_eq!(first.public_witness, second.public_witness);
    assert!(verify_proof(&second.proof, &second.verifying_key, &second.public_witness)
        .unwrap()
        .is_verified());
}

#[test]
fn artifacts_are_generated_once() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        local_setup_running(1),
    );

    let built = manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    let loaded = manager.obtain_artifacts(hash_commit::NAME, false).unwrap();

    assert_eq!(built.source, ArtifactSource::Built);
    assert_eq!(loaded.source, ArtifactSource::Loaded);
    assert_eq!(built.artifacts, loaded.artifacts);

    // Proofs from the reloaded keys verify under the first verifying key.
    let prover = Prover::new(manager);
    let bundle = prover.hash_commit_proof(7).unwrap();
    assert!(
        verify_proof(&bundle.proof, &built.artifacts.verifying_key, &bundle.public_witness)
            .unwrap()
            .is_verified()
    );
}

#[test]
fn forced_rebuild_runs_setup_again() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        local_setup_running(2),
    );

    manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    let rebuilt = manager.obtain_artifacts(hash_commit::NAME, true).unwrap();

    assert_eq!(rebuilt.source, ArtifactSource::Built);
}

#[test]
fn concurrent_requests_share_one_build() {
    const THREADS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        local_setup_running(1),
    );

    let obtained: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| manager.obtain_artifacts(hash_commit::NAME, false)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });

    let built = obtained
        .iter()
        .filter(|o| o.source == ArtifactSource::Built)
        .count();
    assert_eq!(built, 1);
    assert!(obtained.iter().all(|o| o.artifacts == obtained[0].artifacts));
}

#[test]
fn unknown_circuit_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(&registry, ArtifactStore::new(dir.path()), LocalSetup);

    let err = manager.obtain_artifacts("sudoku", false).unwrap_err();
    assert!(matches!(err, ProverError::NotFound(name) if name == "sudoku"));
    assert!(!dir.path().join("sudoku").exists());
}

#[test]
fn version_bump_triggers_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();

    let mut v1 = CircuitRegistry::new();
    v1.register(hash_commit::NAME, || {
        Box::new(VersionedHashCommit::<1>::default()) as Box<dyn Circuit>
    });
    let mut v2 = CircuitRegistry::new();
    v2.register(hash_commit::NAME, || {
        Box::new(VersionedHashCommit::<2>::default()) as Box<dyn Circuit>
    });

    let manager = ArtifactManager::new(
        &v1,
        ArtifactStore::new(dir.path()),
        local_setup_running(1),
    );
    manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    drop(manager);

    let manager = ArtifactManager::new(
        &v2,
        ArtifactStore::new(dir.path()),
        local_setup_running(1),
    );
    let bumped = manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    assert_eq!(bumped.source, ArtifactSource::Built);

    let again = manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    assert_eq!(again.source, ArtifactSource::Loaded);
    let manifest = manager.store().manifest(hash_commit::NAME).unwrap().unwrap();
    assert_eq!(manifest.circuit_version, 2);
}

#[test]
fn truncated_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(&registry, ArtifactStore::new(dir.path()), LocalSetup);
    manager.obtain_artifacts(hash_commit::NAME, false).unwrap();

    let key_path = dir.path().join(hash_commit::NAME).join("proving_key.bin");
    let bytes = fs::read(&key_path).unwrap();
    fs::write(&key_path, &bytes[..bytes.len() / 2]).unwrap();

    let err = manager.obtain_artifacts(hash_commit::NAME, false).unwrap_err();
    assert!(matches!(err, ProverError::Artifact(ArtifactError::Serialization(_))));
}

#[test]
fn foreign_constraint_system_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let registry = CircuitRegistry::with_default_circuits();
    let manager = ArtifactManager::new(&registry, ArtifactStore::new(dir.path()), LocalSetup);
    manager.obtain_artifacts(hash_commit::NAME, false).unwrap();
    manager.obtain_artifacts(merkle_verify::NAME, false).unwrap();

    fs::copy(
        dir.path().join(merkle_verify::NAME).join("r1cs.bin"),
        dir.path().join(hash_commit::NAME).join("r1cs.bin"),
    )
    .unwrap();

    let err = manager.obtain_artifacts(hash_commit::NAME, false).unwrap_err();
    assert!(matches!(err, ProverError::Artifact(ArtifactError::Corrupt { .. })));
}

#[test]
fn merkle_inclusion_proof_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let registry = CircuitRegistry::with_default_circuits();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let [leaf0, leaf1] = EXAMPLE_ACCOUNTS.map(|account| account.leaf_hash());
    let root = hash_fields(&[leaf0, leaf1]);
    let bundle = prover
        .merkle_proof(MerkleProofInput::new(
            field_to_biguint(leaf0),
            vec![field_to_biguint(leaf1)],
            field_to_biguint(root),
        ))
        .unwrap();
    assert!(verify_proof(&bundle.proof, &bundle.verifying_key, &bundle.public_witness)
        .unwrap()
        .is_verified());

    // A wrong root fails witness generation, before any proving.
    let err = prover
        .merkle_proof(MerkleProofInput::new(
            field_to_biguint(leaf0),
            vec![field_to_biguint(leaf1)],
            field_to_biguint(leaf1),
        ))
        .unwrap_err();
    assert!(matches!(err, ProverError::Unsatisfied { .. }));
}

#[test]
fn mismatched_input_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = CircuitRegistry::with_default_circuits();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let err = prover
        .generate_proof(merkle_verify::NAME, &CircuitInput::HashCommit(1))
        .unwrap_err();
    assert!(matches!(
        err,
        ProverError::Input(InputError::UnexpectedInput { .. })
    ));
    assert!(!dir.path().join(merkle_verify::NAME).exists());
}

#[test]
fn self_test_build_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let bundle = prover.build(hash_commit::NAME, false).unwrap();
    assert_eq!(
        bundle.public_outputs,
        vec![compute_commitment(&[hash_commit::EXAMPLE_PREIMAGE.into()])]
    );
}

#[test]
fn proof_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));
    let bundle = prover.hash_commit_proof(42).unwrap();

    let file = ProofFile::from_bundle(hash_commit::NAME, &bundle).unwrap();
    let json = serde_json::to_string(&file).unwrap();
    let decoded: ProofFile = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, file);

    let (proof, verifying_key, public_witness) = decoded.into_parts().unwrap();
    assert_eq!(proof, bundle.proof);
    assert_eq!(public_witness, bundle.public_witness);
    assert!(verify_proof(&proof, &verifying_key, &public_witness)
        .unwrap()
        .is_verified());
}

#[test]
fn ceremony_keys_are_cached_and_prove() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("response");
    PowersOfTau::from_secrets(9, Fr::from(31337u64), Fr::from(5u64), Fr::from(7u64))
        .unwrap()
        .to_file(&transcript, Compress::Yes)
        .unwrap();

    let registry = hash_commit_registry();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path().join("cache")),
        KeySetup::Ceremony(CeremonySetup::new(&transcript, 9)),
    ));

    let bundle = prover.hash_commit_proof(42).unwrap();
    assert!(verify_proof(&bundle.proof, &bundle.verifying_key, &bundle.public_witness)
        .unwrap()
        .is_verified());

    let loaded = prover
        .artifacts()
        .obtain_artifacts(hash_commit::NAME, false)
        .unwrap();
    assert_eq!(loaded.source, ArtifactSource::Loaded);
}

#[test]
fn undersized_ceremony_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("response");
    PowersOfTau::from_secrets(4, Fr::from(31337u64), Fr::from(5u64), Fr::from(7u64))
        .unwrap()
        .to_file(&transcript, Compress::No)
        .unwrap();

    let registry = hash_commit_registry();
    let manager = ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path().join("cache")),
        KeySetup::Ceremony(CeremonySetup::new(&transcript, 4)),
    );

    let err = manager.obtain_artifacts(hash_commit::NAME, false).unwrap_err();
    assert!(matches!(
        err,
        ProverError::Setup(SetupError::CeremonyTooSmall { available: 16, .. })
    ));
    assert!(manager.store().manifest(hash_commit::NAME).unwrap().is_none());
}

#[test]
#[ignore = "emulated P-256 arithmetic takes minutes to set up and prove"]
fn p256_signature_proof_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let registry = CircuitRegistry::with_default_circuits();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let bundle = prover.build(zk_circuits::p256_verify::NAME, false).unwrap();
    assert_eq!(bundle.public_witness.len(), bundle.verifying_key.gamma_abc_g1.len() - 1);
}

#[test]
fn proof_file_is_checked_against_the_stored_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = hash_commit_registry();
    registry.register("forgery", || Box::new(Unconstrained::default()) as Box<dyn Circuit>);
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ));

    let honest = prover.hash_commit_proof(42).unwrap();
    let honest_file = ProofFile::from_bundle(hash_commit::NAME, &honest).unwrap();
    assert_eq!(
        prover.verify_file(honest_file.clone()).unwrap(),
        Verification::Verified
    );

    // A proof for a constraint-free circuit, relabelled as hash_commit. It is
    // consistent with the key it carries.
    let forged = prover
        .generate_proof("forgery", &CircuitInput::HashCommit(1))
        .unwrap();
    let forged_file = ProofFile::from_bundle(hash_commit::NAME, &forged).unwrap();
    let (proof, verifying_key, public_witness) = forged_file.clone().into_parts().unwrap();
    assert!(verify_proof(&proof, &verifying_key, &public_witness)
        .unwrap()
        .is_verified());

    let err = prover.verify_file(forged_file.clone()).unwrap_err();
    assert!(matches!(
        err,
        ProverError::ForeignVerifyingKey { circuit } if circuit == hash_commit::NAME
    ));

    // Carrying the genuine key does not help the forged proof.
    let relabelled = ProofFile {
        verifying_key: honest_file.verifying_key,
        ..forged_file
    };
    assert_eq!(
        prover.verify_file(relabelled).unwrap(),
        Verification::Rejected
    );
}

#[test]
fn proof_file_needs_stored_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let registry = hash_commit_registry();
    let bundle = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(dir.path()),
        LocalSetup,
    ))
    .hash_commit_proof(42)
    .unwrap();
    let file = ProofFile::from_bundle(hash_commit::NAME, &bundle).unwrap();

    let empty = tempfile::tempdir().unwrap();
    let prover = Prover::new(ArtifactManager::new(
        &registry,
        ArtifactStore::new(empty.path()),
        local_setup_running(0),
    ));
    let err = prover.verify_file(file.clone()).unwrap_err();
    assert!(matches!(err, ProverError::MissingArtifacts { .. }));

    let unknown = ProofFile {
        circuit: "sudoku".to_string(),
        ..file
    };
    assert!(matches!(
        prover.verify_file(unknown).unwrap_err(),
        ProverError::NotFound(name) if name == "sudoku"
    ));
}
