//! ECDSA verification over P-256 in emulated arithmetic.
//!
//! Points are kept in projective coordinates and combined with the complete
//! addition law for short Weierstrass curves with `a = -3` (Renes, Costello,
//! Batina 2015, algorithm 4), so the identity and doublings need no special
//! casing inside the circuit.

use ark_bls12_381::Fr;
use ark_ec::short_weierstrass::SWCurveConfig;
use ark_ec::AffineRepr;
use ark_r1cs_std::boolean::Boolean;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::nonnative::NonNativeFieldVar;
use ark_r1cs_std::fields::FieldVar;
use ark_r1cs_std::select::CondSelectGadget;
use ark_r1cs_std::ToBitsGadget;
use ark_relations::r1cs::SynthesisError;
use ark_secp256r1::{Affine, Config, Fq, Fr as ScalarField};

/// An element of the P-256 base field, emulated over the BLS12-381 scalar
/// field.
pub type BaseFieldVar = NonNativeFieldVar<Fq, Fr>;
/// An element of the P-256 scalar field, emulated over the BLS12-381 scalar
/// field.
pub type ScalarFieldVar = NonNativeFieldVar<ScalarField, Fr>;

#[derive(Clone, Debug)]
pub struct PublicKeyVar {
    pub x: BaseFieldVar,
    pub y: BaseFieldVar,
}

#[derive(Clone, Debug)]
pub struct SignatureVar {
    pub r: ScalarFieldVar,
    pub s: ScalarFieldVar,
}

#[derive(Clone, Debug)]
struct ProjectivePointVar {
    x: BaseFieldVar,
    y: BaseFieldVar,
    z: BaseFieldVar,
}

impl ProjectivePointVar {
    fn identity() -> Self {
        Self {
            x: BaseFieldVar::zero(),
            y: BaseFieldVar::one(),
            z: BaseFieldVar::zero(),
        }
    }

    fn constant(point: Affine) -> Self {
        Self {
            x: BaseFieldVar::constant(point.x),
            y: BaseFieldVar::constant(point.y),
            z: BaseFieldVar::one(),
        }
    }

    fn from_affine(x: BaseFieldVar, y: BaseFieldVar) -> Self {
        Self {
            x,
            y,
            z: BaseFieldVar::one(),
        }
    }

    fn add(&self, other: &Self) -> Result<Self, SynthesisError> {
        let b = Config::COEFF_B;

        let xx = &self.x * &other.x;
        let yy = &self.y * &other.y;
        let zz = &self.z * &other.z;
        let xy_pairs = (&self.x + &self.y) * (&other.x + &other.y) - (&xx + &yy);
        let yz_pairs = (&self.y + &self.z) * (&other.y + &other.z) - (&yy + &zz);
        let xz_pairs = (&self.x + &self.z) * (&other.x + &other.z) - (&xx + &zz);

        let bzz_part = &xz_pairs - &zz * b;
        let bzz3_part = &bzz_part + bzz_part.double()?;
        let yy_m_bzz3 = &yy - &bzz3_part;
        let yy_p_bzz3 = &yy + &bzz3_part;

        let zz3 = &zz + zz.double()?;
        let bxz_part = &xz_pairs * b - (&zz3 + &xx);
        let bxz3_part = &bxz_part + bxz_part.double()?;
        let xx3_m_zz3 = &xx + xx.double()? - &zz3;

        Ok(Self {
            x: &yy_p_bzz3 * &xy_pairs - &yz_pairs * &bxz3_part,
            y: &yy_p_bzz3 * &yy_m_bzz3 + &xx3_m_zz3 * &bxz3_part,
            z: &yy_m_bzz3 * &yz_pairs + &xy_pairs * &xx3_m_zz3,
        })
    }

    fn select(cond: &Boolean<Fr>, when_true: &Self, when_false: &Self) -> Result<Self, SynthesisError> {
        Ok(Self {
            x: BaseFieldVar::conditionally_select(cond, &when_true.x, &when_false.x)?,
            y: BaseFieldVar::conditionally_select(cond, &when_true.y, &when_false.y)?,
            z: BaseFieldVar::conditionally_select(cond, &when_true.z, &when_false.z)?,
        })
    }
}

/// Enforces that `public_key` lies on P-256.
pub fn enforce_on_curve(public_key: &PublicKeyVar) -> Result<(), SynthesisError> {
    let x = &public_key.x;
    // y^2 = x^3 - 3x + b
    let rhs = x.square()? * x - (x.double()? + x) + Config::COEFF_B;
    public_key.y.square()?.enforce_equal(&rhs)
}

/// Enforces that `signature` is a valid ECDSA signature by `public_key` over
/// the (already reduced) digest `message_hash`.
pub fn enforce_valid_signature(
    public_key: &PublicKeyVar,
    message_hash: &ScalarFieldVar,
    signature: &SignatureVar,
) -> Result<(), SynthesisError> {
    enforce_on_curve(public_key)?;

    // Both inversions also pin r and s to be non-zero.
    let _r_inv = signature.r.inverse()?;
    let s_inv = signature.s.inverse()?;
    let u1 = message_hash * &s_inv;
    let u2 = &signature.r * &s_inv;

    let g = ProjectivePointVar::constant(Affine::generator());
    let q = ProjectivePointVar::from_affine(public_key.x.clone(), public_key.y.clone());
    let g_plus_q = g.add(&q)?;
    let identity = ProjectivePointVar::identity();

    // Joint double-and-add over u1 * G + u2 * Q, most significant bit first.
    let u1_bits = u1.to_bits_le()?;
    let u2_bits = u2.to_bits_le()?;
    let mut acc = ProjectivePointVar::identity();
    for (b1, b2) in u1_bits.iter().rev().zip(u2_bits.iter().rev()) {
        acc = acc.add(&acc)?;
        let without_q = ProjectivePointVar::select(b1, &g, &identity)?;
        let with_q = ProjectivePointVar::select(b1, &g_plus_q, &q)?;
        let addend = ProjectivePointVar::select(b2, &with_q, &without_q)?;
        acc = acc.add(&addend)?;
    }

    // Inverting z rules out the point at infinity.
    let z_inv = acc.z.inverse()?;
    let x_affine = &acc.x * &z_inv;

    // Reinterpret x(R) as an integer and reduce it into the scalar field.
    let mut x_mod_n = ScalarFieldVar::zero();
    for bit in x_affine.to_bits_le()?.iter().rev() {
        x_mod_n = x_mod_n.double()? + ScalarFieldVar::from(bit.clone());
    }
    x_mod_n.enforce_equal(&signature.r)
}
