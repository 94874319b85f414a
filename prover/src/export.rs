//! Verifier descriptors: the verifying key and a sample call, written as JSON
//! for whatever generates the on-chain verifier.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ark_bls12_381::Bls12_381;
use ark_groth16::VerifyingKey;
use ark_serialize::SerializationError;
use serde::{Deserialize, Serialize};

use crate::proof_types::{to_compressed_bytes, VerifyProofArgs};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierDescriptor {
    pub circuit: String,
    #[serde(with = "zk_circuits::serde_hex")]
    pub alpha_g1: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub beta_g2: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub gamma_g2: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub delta_g2: Vec<u8>,
    /// One point per public input, preceded by the constant term.
    #[serde(with = "zk_circuits::serde_hex::vec")]
    pub ic: Vec<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sample_args: Option<VerifyProofArgs>,
}

impl VerifierDescriptor {
    pub fn new(
        circuit: impl Into<String>,
        verifying_key: &VerifyingKey<Bls12_381>,
        sample_args: Option<VerifyProofArgs>,
    ) -> Result<Self, SerializationError> {
        Ok(Self {
            circuit: circuit.into(),
            alpha_g1: to_compressed_bytes(&verifying_key.alpha_g1)?,
            beta_g2: to_compressed_bytes(&verifying_key.beta_g2)?,
            gamma_g2: to_compressed_bytes(&verifying_key.gamma_g2)?,
            delta_g2: to_compressed_bytes(&verifying_key.delta_g2)?,
            ic: verifying_key
                .gamma_abc_g1
                .iter()
                .map(to_compressed_bytes)
                .collect::<Result<_, _>>()?,
            sample_args,
        })
    }
}

pub fn verifier_file_name(output_dir: &Path, circuit: &str) -> PathBuf {
    output_dir.join(format!("{circuit}-verifier.json"))
}

/// Write the descriptor to the `output_dir` directory, creating it if needed.
pub fn write_verifier(output_dir: &Path, descriptor: &VerifierDescriptor) -> anyhow::Result<PathBuf> {
    if !output_dir.exists() {
        tracing::info!("Created output directory {:?}", output_dir.display());
        fs::create_dir_all(output_dir)?;
    }

    let path = verifier_file_name(output_dir, &descriptor.circuit);
    let serialized = serde_json::to_vec_pretty(descriptor)?;
    fs::write(&path, serialized)
        .with_context(|| format!("Failed to write verifier descriptor to {}", path.display()))?;

    tracing::info!("Successfully wrote verifier descriptor {}", path.display());
    Ok(path)
}
