//! Out-of-circuit commitments and the numeric encodings that feed circuit
//! inputs.
//!
//! Every commitment produced here is numerically equal to what
//! [`crate::gadgets::poseidon::hash_vars`] computes inside a constraint system
//! for the same values absorbed in the same order.

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::poseidon::{
    find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge,
};
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use thiserror::Error;

const POSEIDON_RATE: usize = 2;
const POSEIDON_CAPACITY: usize = 1;
const POSEIDON_ALPHA: u64 = 5;
const POSEIDON_FULL_ROUNDS: usize = 8;
const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon parameters shared by the native sponge and the sponge gadget.
///
/// Round constants and the MDS matrix come from the Grain LFSR, so they are
/// fully determined by the field and the round counts above.
pub static POSEIDON_CONFIG: Lazy<PoseidonConfig<Fr>> = Lazy::new(|| {
    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        Fr::MODULUS_BIT_SIZE as u64,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );
    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("unsupported base {0}, expected a base between 2 and 36")]
    InvalidBase(u32),
    #[error("malformed integer {input:?} in base {base}")]
    Malformed { input: String, base: u32 },
    #[error("integer {0} does not fit in 64 bits")]
    Overflow(BigUint),
    #[error("integer {0} is not a canonical scalar field element")]
    OutOfField(BigUint),
}

/// A value accepted by [`compute_commitment`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitValue {
    U64(u64),
    /// Reduced modulo the scalar field order before hashing.
    Big(BigUint),
}

impl CommitValue {
    pub fn to_field(&self) -> Fr {
        match self {
            CommitValue::U64(v) => Fr::from(*v),
            CommitValue::Big(v) => Fr::from_le_bytes_mod_order(&v.to_bytes_le()),
        }
    }
}

impl From<u64> for CommitValue {
    fn from(v: u64) -> Self {
        CommitValue::U64(v)
    }
}

impl From<BigUint> for CommitValue {
    fn from(v: BigUint) -> Self {
        CommitValue::Big(v)
    }
}

/// Absorbs each element as its own step and squeezes a single element.
pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(&*POSEIDON_CONFIG);
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}

/// The commitment to `values` as a field element.
pub fn commitment_field(values: &[CommitValue]) -> Fr {
    let elements = values.iter().map(CommitValue::to_field).collect::<Vec<_>>();
    hash_fields(&elements)
}

/// The commitment to `values`, rendered in base 10.
pub fn compute_commitment(values: &[CommitValue]) -> String {
    field_to_decimal(commitment_field(values))
}

pub fn field_to_biguint(value: Fr) -> BigUint {
    value.into_bigint().into()
}

/// Base-10 rendering of a field element's canonical representative.
pub fn field_to_decimal(value: Fr) -> String {
    field_to_biguint(value).to_str_radix(10)
}

/// Maps `value` into the scalar field, refusing anything at or above the
/// modulus rather than silently reducing it.
pub fn biguint_to_field(value: &BigUint) -> Result<Fr, CommitmentError> {
    if *value >= BigUint::from(Fr::MODULUS) {
        return Err(CommitmentError::OutOfField(value.clone()));
    }
    Ok(Fr::from_le_bytes_mod_order(&value.to_bytes_le()))
}

/// Parses `s` as an unsigned integer in `base` (2 to 36).
///
/// Unlike a lenient parser this never maps bad input to zero.
pub fn parse_big_int(s: &str, base: u32) -> Result<BigUint, CommitmentError> {
    if !(2..=36).contains(&base) {
        return Err(CommitmentError::InvalidBase(base));
    }
    BigUint::parse_bytes(s.as_bytes(), base).ok_or_else(|| CommitmentError::Malformed {
        input: s.to_string(),
        base,
    })
}

pub fn parse_u64(s: &str, base: u32) -> Result<u64, CommitmentError> {
    let value = parse_big_int(s, base)?;
    value.to_u64().ok_or(CommitmentError::Overflow(value))
}
