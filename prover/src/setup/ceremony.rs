//! Circuit-specific (phase-2) setup on top of a Powers-of-Tau (phase-1)
//! ceremony.
//!
//! A phase-1 accumulator holds, after the 64-byte hash of the previous
//! contribution, `2n - 1` powers of τ in G1, `n` powers of τ in G2, `n`
//! α·τ powers and `n` β·τ powers in G1, and finally β in G2, with
//! `n = 2^power`. Points use the zcash BLS12-381 encoding (big-endian with
//! flag bits), compressed in response files and uncompressed in challenge
//! files; the flag of the first point decides which.
//!
//! Phase 2 moves those powers into the Lagrange basis of the circuit's
//! evaluation domain, lays out the Groth16 query vectors with γ = δ = 1, and
//! then folds in sequential δ contributions.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ark_bls12_381::{Bls12_381, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{FftField, Field, One, Zero};
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_poly::{EvaluationDomain, GeneralEvaluationDomain};
use ark_relations::r1cs::SynthesisError;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, Compress, Validate};
use ark_std::UniformRand;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};
use zk_circuits::Circuit;

use super::{KeyGenerator, SetupError};
use crate::artifacts::CompiledCircuit;

pub const DEFAULT_CONTRIBUTIONS: usize = 3;

/// Length of the BLAKE2b hash that prefixes a phase-1 response.
const PREVIOUS_HASH_LEN: usize = 64;

/// Largest supported ceremony, bounded by the two-adicity of the scalar
/// field.
pub const MAX_POWER: u32 = Fr::TWO_ADICITY;

/// Set on the first byte of a compressed point.
const COMPRESSION_FLAG: u8 = 1 << 7;

/// `n = 2^power`, for powers the scalar field and the platform can address.
fn powers_len(power: u32) -> Result<usize, SetupError> {
    if power > MAX_POWER || power >= usize::BITS - 1 {
        return Err(SetupError::InvalidPower {
            power,
            max: MAX_POWER.min(usize::BITS - 2),
        });
    }
    Ok(1usize << power)
}

/// Phase-1 output for `n = 2^power`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowersOfTau {
    /// `[τ^i]₁` for `i < 2n - 1`.
    pub tau_g1: Vec<G1Affine>,
    /// `[τ^i]₂` for `i < n`.
    pub tau_g2: Vec<G2Affine>,
    /// `[α·τ^i]₁` for `i < n`.
    pub alpha_tau_g1: Vec<G1Affine>,
    /// `[β·τ^i]₁` for `i < n`.
    pub beta_tau_g1: Vec<G1Affine>,
    pub beta_g2: G2Affine,
}

fn read_points<P: CanonicalDeserialize, R: Read>(
    reader: &mut R,
    count: usize,
    compress: Compress,
) -> Result<Vec<P>, SetupError> {
    (0..count)
        .map(|_| Ok(P::deserialize_with_mode(&mut *reader, compress, Validate::Yes)?))
        .collect()
}

fn write_points<P: CanonicalSerialize, W: Write>(
    writer: &mut W,
    points: &[P],
    compress: Compress,
) -> Result<(), SetupError> {
    for point in points {
        point.serialize_with_mode(&mut *writer, compress)?;
    }
    Ok(())
}

impl PowersOfTau {
    /// Number of G2 powers, `n`.
    pub fn size(&self) -> usize {
        self.tau_g2.len()
    }

    pub fn read<R: Read>(mut reader: R, power: u32) -> Result<Self, SetupError> {
        let n = powers_len(power)?;

        let mut previous_hash = [0u8; PREVIOUS_HASH_LEN];
        reader.read_exact(&mut previous_hash)?;

        let mut first = [0u8; 1];
        reader.read_exact(&mut first)?;
        let compress = if first[0] & COMPRESSION_FLAG != 0 {
            Compress::Yes
        } else {
            Compress::No
        };
        let mut reader = (&first[..]).chain(reader);

        Ok(Self {
            tau_g1: read_points(&mut reader, 2 * n - 1, compress)?,
            tau_g2: read_points(&mut reader, n, compress)?,
            alpha_tau_g1: read_points(&mut reader, n, compress)?,
            beta_tau_g1: read_points(&mut reader, n, compress)?,
            beta_g2: G2Affine::deserialize_with_mode(&mut reader, compress, Validate::Yes)?,
        })
    }

    pub fn from_file(path: &Path, power: u32) -> Result<Self, SetupError> {
        powers_len(power)?;
        let file = File::open(path).map_err(|e| SetupError::Transcript {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::read(BufReader::new(file), power).map_err(|e| SetupError::Transcript {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Writes the accumulator layout with an all-zero previous hash.
    /// `Compress::Yes` gives a response file, `Compress::No` a challenge.
    pub fn write<W: Write>(&self, mut writer: W, compress: Compress) -> Result<(), SetupError> {
        writer.write_all(&[0u8; PREVIOUS_HASH_LEN])?;
        write_points(&mut writer, &self.tau_g1, compress)?;
        write_points(&mut writer, &self.tau_g2, compress)?;
        write_points(&mut writer, &self.alpha_tau_g1, compress)?;
        write_points(&mut writer, &self.beta_tau_g1, compress)?;
        self.beta_g2.serialize_with_mode(&mut writer, compress)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_file(&self, path: &Path, compress: Compress) -> Result<(), SetupError> {
        self.write(BufWriter::new(File::create(path)?), compress)
    }

    /// Phase-1 output for known trapdoors. Only meant for development and
    /// tests: whoever knows `tau` can forge proofs.
    pub fn from_secrets(power: u32, tau: Fr, alpha: Fr, beta: Fr) -> Result<Self, SetupError> {
        let n = powers_len(power)?;
        let powers = std::iter::successors(Some(Fr::one()), |p| Some(*p * tau))
            .take(2 * n - 1)
            .collect::<Vec<_>>();

        let g1 = G1Projective::generator();
        let g2 = G2Projective::generator();
        let in_g1 = |scale: Fr, count: usize| {
            G1Projective::normalize_batch(
                &powers[..count].iter().map(|p| g1 * (*p * scale)).collect::<Vec<_>>(),
            )
        };

        Ok(Self {
            tau_g1: in_g1(Fr::one(), 2 * n - 1),
            tau_g2: G2Projective::normalize_batch(
                &powers[..n].iter().map(|p| g2 * p).collect::<Vec<_>>(),
            ),
            alpha_tau_g1: in_g1(alpha, n),
            beta_tau_g1: in_g1(beta, n),
            beta_g2: (g2 * beta).into_affine(),
        })
    }
}

/// A circuit-specific setup in progress.
#[derive(Clone, Debug)]
pub struct Phase2 {
    proving_key: ProvingKey<Bls12_381>,
}

fn to_projective<P: AffineRepr>(points: &[P]) -> Vec<P::Group> {
    points.iter().map(|p| p.into_group()).collect()
}

fn scale(points: &[G1Affine], factor: Fr) -> Vec<G1Affine> {
    G1Projective::normalize_batch(&points.iter().map(|p| *p * factor).collect::<Vec<_>>())
}

impl Phase2 {
    /// Lays out the keys of `compiled` with γ = δ = 1.
    pub fn initialize(powers: &PowersOfTau, compiled: &CompiledCircuit) -> Result<Self, SetupError> {
        let domain = GeneralEvaluationDomain::<Fr>::new(compiled.domain_size())
            .ok_or(SynthesisError::PolynomialDegreeTooLarge)?;
        let m = domain.size();
        if m > powers.size() {
            return Err(SetupError::CeremonyTooSmall {
                required: m,
                available: powers.size(),
            });
        }
        debug!("phase-2 domain of {m} points from {} powers", powers.size());

        // [L_i(τ)], [α·L_i(τ)], [β·L_i(τ)] over the domain.
        let lagrange_g1 = domain.ifft(&to_projective(&powers.tau_g1[..m]));
        let lagrange_g2 = domain.ifft(&to_projective(&powers.tau_g2[..m]));
        let lagrange_alpha_g1 = domain.ifft(&to_projective(&powers.alpha_tau_g1[..m]));
        let lagrange_beta_g1 = domain.ifft(&to_projective(&powers.beta_tau_g1[..m]));

        let num_instance = compiled.num_instance_variables as usize;
        let num_variables = num_instance + compiled.num_witness_variables as usize;
        let num_constraints = compiled.num_constraints as usize;

        let mut a_g1 = vec![G1Projective::zero(); num_variables];
        let mut b_g1 = vec![G1Projective::zero(); num_variables];
        let mut b_g2 = vec![G2Projective::zero(); num_variables];
        // β·u_j(τ) + α·v_j(τ) + w_j(τ)
        let mut abc_g1 = vec![G1Projective::zero(); num_variables];

        // Each instance variable also gets its own A row after the
        // constraints, which keeps the instance polynomials independent.
        for i in 0..num_instance {
            let row = num_constraints + i;
            a_g1[i] += lagrange_g1[row];
            abc_g1[i] += lagrange_beta_g1[row];
        }
        for (row, ((a, b), c)) in compiled
            .a
            .iter()
            .zip(&compiled.b)
            .zip(&compiled.c)
            .enumerate()
        {
            for entry in a {
                let j = entry.index as usize;
                a_g1[j] += lagrange_g1[row] * entry.coeff;
                abc_g1[j] += lagrange_beta_g1[row] * entry.coeff;
            }
            for entry in b {
                let j = entry.index as usize;
                b_g1[j] += lagrange_g1[row] * entry.coeff;
                b_g2[j] += lagrange_g2[row] * entry.coeff;
                abc_g1[j] += lagrange_alpha_g1[row] * entry.coeff;
            }
            for entry in c {
                abc_g1[entry.index as usize] += lagrange_g1[row] * entry.coeff;
            }
        }

        // [τ^i·t(τ)] with t(x) = x^m - 1.
        let h_g1 = (0..m - 1)
            .map(|i| powers.tau_g1[i + m].into_group() - powers.tau_g1[i])
            .collect::<Vec<_>>();

        let abc = G1Projective::normalize_batch(&abc_g1);
        let (gamma_abc_g1, l_query) = abc.split_at(num_instance);

        let vk = VerifyingKey {
            alpha_g1: powers.alpha_tau_g1[0],
            beta_g2: powers.beta_g2,
            gamma_g2: G2Affine::generator(),
            delta_g2: G2Affine::generator(),
            gamma_abc_g1: gamma_abc_g1.to_vec(),
        };
        Ok(Self {
            proving_key: ProvingKey {
                vk,
                beta_g1: powers.beta_tau_g1[0],
                delta_g1: G1Affine::generator(),
                a_query: G1Projective::normalize_batch(&a_g1),
                b_g1_query: G1Projective::normalize_batch(&b_g1),
                b_g2_query: G2Projective::normalize_batch(&b_g2),
                h_query: G1Projective::normalize_batch(&h_g1),
                l_query: l_query.to_vec(),
            },
        })
    }

    /// Folds a fresh random δ into the keys. The contribution is safe as long
    /// as its randomness is discarded afterwards.
    pub fn contribute<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        let (delta, delta_inv) = loop {
            let delta = Fr::rand(rng);
            if let Some(inv) = delta.inverse() {
                break (delta, inv);
            }
        };

        let pk = &mut self.proving_key;
        pk.delta_g1 = (pk.delta_g1 * delta).into_affine();
        pk.vk.delta_g2 = (pk.vk.delta_g2 * delta).into_affine();
        pk.h_query = scale(&pk.h_query, delta_inv);
        pk.l_query = scale(&pk.l_query, delta_inv);
    }

    pub fn into_keys(self) -> (ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>) {
        let vk = self.proving_key.vk.clone();
        (self.proving_key, vk)
    }
}

/// Key generation from a phase-1 transcript followed by `contributions`
/// phase-2 contributions drawn from OS randomness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CeremonySetup {
    pub transcript: PathBuf,
    pub power: u32,
    pub contributions: usize,
}

impl CeremonySetup {
    pub fn new(transcript: impl Into<PathBuf>, power: u32) -> Self {
        Self {
            transcript: transcript.into(),
            power,
            contributions: DEFAULT_CONTRIBUTIONS,
        }
    }
}

impl KeyGenerator for CeremonySetup {
    fn generate(
        &self,
        circuit: &dyn Circuit,
        compiled: &CompiledCircuit,
    ) -> Result<(ProvingKey<Bls12_381>, VerifyingKey<Bls12_381>), SetupError> {
        info!(
            "running ceremony setup for circuit {} from {} (2^{} powers)",
            circuit.name(),
            self.transcript.display(),
            self.power
        );
        let powers = PowersOfTau::from_file(&self.transcript, self.power)?;
        let mut phase2 = Phase2::initialize(&powers, compiled)?;

        for i in 0..self.contributions {
            phase2.contribute(&mut OsRng);
            info!("applied contribution {}/{}", i + 1, self.contributions);
        }

        Ok(phase2.into_keys())
    }
}
