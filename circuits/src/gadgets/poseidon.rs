use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::commitment::POSEIDON_CONFIG;

/// In-circuit counterpart of [`crate::commitment::hash_fields`].
pub fn hash_vars(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::<Fr>::new(cs, &*POSEIDON_CONFIG);
    for input in inputs {
        sponge.absorb(input)?;
    }
    let mut squeezed = sponge.squeeze_field_elements(1)?;
    Ok(squeezed.swap_remove(0))
}
