//! This module defines the proof and verification data exchanged between the
//! prover, the verifier and the CLI.

use std::fmt;

use ark_bls12_381::{Bls12_381, Fr};
use ark_groth16::{Proof, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use serde::{Deserialize, Serialize};

/// Encodes `value` with its compressed canonical serialization.
pub(crate) fn to_compressed_bytes<T: CanonicalSerialize>(
    value: &T,
) -> Result<Vec<u8>, SerializationError> {
    let mut bytes = Vec::with_capacity(value.compressed_size());
    value.serialize_compressed(&mut bytes)?;
    Ok(bytes)
}

/// Arguments of an on-chain `verifyProof(a, b, c, input)` call.
///
/// Curve points are compressed, and each public input is a 32-byte
/// little-endian scalar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyProofArgs {
    #[serde(with = "zk_circuits::serde_hex")]
    pub a: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub b: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub c: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex::vec")]
    pub public_witnesses: Vec<Vec<u8>>,
}

impl VerifyProofArgs {
    pub fn new(proof: &Proof<Bls12_381>, public_inputs: &[Fr]) -> Result<Self, SerializationError> {
        Ok(Self {
            a: to_compressed_bytes(&proof.a)?,
            b: to_compressed_bytes(&proof.b)?,
            c: to_compressed_bytes(&proof.c)?,
            public_witnesses: public_inputs
                .iter()
                .map(to_compressed_bytes)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Everything a caller needs to check, or forward, one proof.
#[derive(Clone, Debug, PartialEq)]
pub struct ProofBundle {
    pub verify_args: VerifyProofArgs,
    pub proof: Proof<Bls12_381>,
    pub verifying_key: VerifyingKey<Bls12_381>,
    pub public_witness: Vec<Fr>,
    /// Outputs computed while preparing the input, such as a commitment.
    pub public_outputs: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected,
}

impl Verification {
    pub const fn is_verified(self) -> bool {
        matches!(self, Verification::Verified)
    }
}

impl From<bool> for Verification {
    fn from(valid: bool) -> Self {
        if valid {
            Verification::Verified
        } else {
            Verification::Rejected
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Verified => f.write_str("verified"),
            Verification::Rejected => f.write_str("rejected"),
        }
    }
}

/// JSON form of a [`ProofBundle`], as written by `zk prove --output`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFile {
    pub circuit: String,
    #[serde(with = "zk_circuits::serde_hex")]
    pub proof: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex")]
    pub verifying_key: Vec<u8>,
    #[serde(with = "zk_circuits::serde_hex::vec")]
    pub public_witness: Vec<Vec<u8>>,
    pub public_outputs: Vec<String>,
    pub verify_args: VerifyProofArgs,
}

impl ProofFile {
    pub fn from_bundle(
        circuit: impl Into<String>,
        bundle: &ProofBundle,
    ) -> Result<Self, SerializationError> {
        Ok(Self {
            circuit: circuit.into(),
            proof: to_compressed_bytes(&bundle.proof)?,
            verifying_key: to_compressed_bytes(&bundle.verifying_key)?,
            public_witness: bundle
                .public_witness
                .iter()
                .map(to_compressed_bytes)
                .collect::<Result<_, _>>()?,
            public_outputs: bundle.public_outputs.clone(),
            verify_args: bundle.verify_args.clone(),
        })
    }

    /// Decodes the proof, the verifying key and the public witness.
    pub fn into_parts(
        self,
    ) -> Result<(Proof<Bls12_381>, VerifyingKey<Bls12_381>, Vec<Fr>), SerializationError> {
        let proof = Proof::deserialize_compressed(&self.proof[..])?;
        let verifying_key = VerifyingKey::deserialize_compressed(&self.verifying_key[..])?;
        let public_witness = self
            .public_witness
            .iter()
            .map(|bytes| Fr::deserialize_compressed(&bytes[..]))
            .collect::<Result<_, _>>()?;
        Ok((proof, verifying_key, public_witness))
    }
}
