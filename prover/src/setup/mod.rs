//! Groth16 key generation for compiled circuits.

use std::path::PathBuf;

use ark_bls12_381::Bls12_381;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::r1cs::SynthesisError;
use ark_serialize::SerializationError;
use ark_snark::SNARK;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::info;
use zk_circuits::{Circuit, Synthesizer};

use crate::artifacts::CompiledCircuit;

pub mod ceremony;

pub use ceremony::{CeremonySetup, DEFAULT_CONTRIBUTIONS, MAX_POWER};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("constraint synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("Groth16 setup failed: {0}")]
    Groth16(#[source] SynthesisError),
    #[error("unreadable ceremony transcript {path}: {reason}")]
    Transcript { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
    #[error("circuit needs a domain of {required} points but the ceremony only covers {available}")]
    CeremonyTooSmall { required: usize, available: usize },
    #[error("ceremony power {power} is not supported (at most {max})")]
    InvalidPower { power: u32, max: u32 },
}

/// Produces the proving and verifying key of a compiled circuit.
#[cfg_attr(test, mockall::automock)]
pub trait KeyGenerator: Send + Sync {
    fn generate(
        &self,
        circuit: &dyn Circuit,
        compiled: &CompiledCircuit,
    ) -> Result<(ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>), SetupError>;
}

/// Circuit-specific setup with trapdoors drawn from OS randomness by this
/// process alone.
///
/// Fast, but whoever runs it could forge proofs; use a ceremony for anything
/// that others must trust.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSetup;

impl KeyGenerator for LocalSetup {
    fn generate(
        &self,
        circuit: &dyn Circuit,
        _compiled: &CompiledCircuit,
    ) -> Result<(ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>), SetupError> {
        info!("running local Groth16 setup for circuit {}", circuit.name());
        Groth16::<Bls12_381>::circuit_specific_setup(Synthesizer(circuit), &mut OsRng)
            .map_err(SetupError::Groth16)
    }
}

/// Selects how keys are generated.
#[derive(Clone, Debug, Default)]
pub enum KeySetup {
    #[default]
    Local,
    Ceremony(CeremonySetup),
}

impl KeyGenerator for KeySetup {
    fn generate(
        &self,
        circuit: &dyn Circuit,
        compiled: &CompiledCircuit,
    ) -> Result<(ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>), SetupError> {
        match self {
            KeySetup::Local => LocalSetup.generate(circuit, compiled),
            KeySetup::Ceremony(ceremony) => ceremony.generate(circuit, compiled),
        }
    }
}
