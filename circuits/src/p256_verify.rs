//! ECDSA P-256 signature verification, the curve behind WebAuthn and most
//! hardware keys.

use ark_bls12_381::Fr;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, Field, PrimeField, Zero};
use ark_r1cs_std::alloc::AllocVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use ark_secp256r1::{Affine, Fq, Fr as ScalarField};
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::circuit::{assigned, Assignment, Circuit, CircuitInput, InputError};
use crate::gadgets::ecdsa::{
    enforce_valid_signature, BaseFieldVar, PublicKeyVar, ScalarFieldVar, SignatureVar,
};

pub const NAME: &str = "p256_verify";

/// Length of an `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// Digest bytes that enter the signature equation; the rest of a longer
/// digest is ignored.
pub const DIGEST_LEN: usize = 32;

/// Message signed by the self-test input.
pub const EXAMPLE_MESSAGE: &[u8] = b"hello world";

/// Big-endian affine coordinates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P256PublicKey {
    #[serde(with = "crate::serde_hex")]
    pub x: Vec<u8>,
    #[serde(with = "crate::serde_hex")]
    pub y: Vec<u8>,
}

impl From<Affine> for P256PublicKey {
    fn from(point: Affine) -> Self {
        Self {
            x: point.x.into_bigint().to_bytes_be(),
            y: point.y.into_bigint().to_bytes_be(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P256Input {
    pub public_key: P256PublicKey,
    /// Big-endian digest of the signed message.
    #[serde(with = "crate::serde_hex")]
    pub message_hash: Vec<u8>,
    /// Big-endian `r || s`.
    #[serde(with = "crate::serde_hex")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
pub struct PublicKeyValue {
    pub x: Fq,
    pub y: Fq,
}

#[derive(Clone, Copy, Debug)]
pub struct SignatureValue {
    pub r: ScalarField,
    pub s: ScalarField,
}

#[derive(Clone, Debug, Default)]
pub struct P256VerifyCircuit {
    /// Public.
    pub public_key: Option<PublicKeyValue>,
    /// Public.
    pub signature: Option<SignatureValue>,
    /// Public.
    pub message_hash: Option<ScalarField>,
}

impl Circuit for P256VerifyCircuit {
    fn name(&self) -> &'static str {
        NAME
    }

    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let public_key = PublicKeyVar {
            x: BaseFieldVar::new_input(cs.clone(), assigned(self.public_key.map(|pk| pk.x)))?,
            y: BaseFieldVar::new_input(cs.clone(), assigned(self.public_key.map(|pk| pk.y)))?,
        };
        let signature = SignatureVar {
            r: ScalarFieldVar::new_input(cs.clone(), assigned(self.signature.map(|sig| sig.r)))?,
            s: ScalarFieldVar::new_input(cs.clone(), assigned(self.signature.map(|sig| sig.s)))?,
        };
        let message_hash = ScalarFieldVar::new_input(cs, assigned(self.message_hash))?;

        enforce_valid_signature(&public_key, &message_hash, &signature)
    }

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError> {
        let CircuitInput::P256Verify(p256) = input else {
            return Err(InputError::unexpected(NAME, input));
        };

        for (field, bytes) in [
            ("public_key.x", &p256.public_key.x),
            ("public_key.y", &p256.public_key.y),
            ("message_hash", &p256.message_hash),
            ("signature", &p256.signature),
        ] {
            if bytes.is_empty() {
                return Err(InputError::MissingField {
                    circuit: NAME,
                    field,
                });
            }
        }
        if p256.signature.len() != SIGNATURE_LEN {
            return Err(InputError::InvalidSignatureLength {
                expected: SIGNATURE_LEN,
                found: p256.signature.len(),
            });
        }
        let (r, s) = p256.signature.split_at(SIGNATURE_LEN / 2);

        Ok(Assignment {
            circuit: Box::new(P256VerifyCircuit {
                public_key: Some(PublicKeyValue {
                    x: Fq::from_be_bytes_mod_order(&p256.public_key.x),
                    y: Fq::from_be_bytes_mod_order(&p256.public_key.y),
                }),
                signature: Some(SignatureValue {
                    r: ScalarField::from_be_bytes_mod_order(r),
                    s: ScalarField::from_be_bytes_mod_order(s),
                }),
                message_hash: Some(digest_scalar(&p256.message_hash)),
            }),
            public_outputs: vec![],
        })
    }

    /// A fresh key signing [`EXAMPLE_MESSAGE`].
    fn example_input(&self) -> CircuitInput {
        let mut rng = rand::rngs::OsRng;
        let secret = loop {
            let candidate = ScalarField::rand(&mut rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        let message_hash: [u8; 32] = Sha256::digest(EXAMPLE_MESSAGE).into();

        CircuitInput::P256Verify(P256Input {
            public_key: public_key(&secret).into(),
            message_hash: message_hash.to_vec(),
            signature: sign_prehash(&secret, &message_hash, &mut rng).to_vec(),
        })
    }
}

pub fn public_key(secret: &ScalarField) -> Affine {
    (Affine::generator() * secret).into_affine()
}

/// ECDSA digest conversion: only the leftmost 256 bits of a longer digest
/// count, as the group order is 256 bits wide.
fn digest_scalar(digest: &[u8]) -> ScalarField {
    ScalarField::from_be_bytes_mod_order(&digest[..digest.len().min(DIGEST_LEN)])
}

fn scalar_from_x(point: &Affine) -> ScalarField {
    ScalarField::from_be_bytes_mod_order(&point.x.into_bigint().to_bytes_be())
}

/// Signs an already hashed message, returning big-endian `r || s`.
pub fn sign_prehash<R: RngCore + CryptoRng>(
    secret: &ScalarField,
    digest: &[u8],
    rng: &mut R,
) -> [u8; SIGNATURE_LEN] {
    let z = digest_scalar(digest);
    loop {
        let k = ScalarField::rand(rng);
        let Some(k_inv) = k.inverse() else {
            continue;
        };
        let r = scalar_from_x(&(Affine::generator() * k).into_affine());
        let s = k_inv * (z + r * secret);
        if r.is_zero() || s.is_zero() {
            continue;
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..SIGNATURE_LEN / 2].copy_from_slice(&r.into_bigint().to_bytes_be());
        signature[SIGNATURE_LEN / 2..].copy_from_slice(&s.into_bigint().to_bytes_be());
        return signature;
    }
}

/// Out-of-circuit counterpart of the constraints, for callers that want to
/// reject bad signatures before proving.
pub fn verify_prehash(public_key: &Affine, digest: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }
    let (r, s) = signature.split_at(SIGNATURE_LEN / 2);
    let r = ScalarField::from_be_bytes_mod_order(r);
    let Some(s_inv) = ScalarField::from_be_bytes_mod_order(s).inverse() else {
        return false;
    };
    if r.is_zero() {
        return false;
    }

    let z = digest_scalar(digest);
    let point = (Affine::generator() * (z * s_inv) + *public_key * (r * s_inv)).into_affine();
    !point.infinity && scalar_from_x(&point) == r
}

#[cfg(test)]
mod tests {
    use ark_relations::r1cs::ConstraintSystem;

    use super::*;

    fn example() -> P256Input {
        match P256VerifyCircuit::default().example_input() {
            CircuitInput::P256Verify(input) => input,
            other => panic!("unexpected example input {other:?}"),
        }
    }

    fn is_satisfied(input: &P256Input) -> bool {
        let assignment = P256VerifyCircuit::default()
            .prepare_input(&CircuitInput::P256Verify(input.clone()))
            .unwrap();
        let cs = ConstraintSystem::<Fr>::new_ref();
        assignment.circuit.define(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn native_signatures_verify() {
        let input = example();
        let secret = ScalarField::from(7u64);
        let key = public_key(&secret);
        let signature = sign_prehash(&secret, &input.message_hash, &mut rand::rngs::OsRng);

        assert!(verify_prehash(&key, &input.message_hash, &signature));

        let mut tampered = signature;
        tampered[63] ^= 1;
        assert!(!verify_prehash(&key, &input.message_hash, &tampered));
    }

    #[test]
    fn long_digests_are_truncated_not_reduced() {
        let secret = ScalarField::from(7u64);
        let key = public_key(&secret);
        let digest = Sha256::digest(EXAMPLE_MESSAGE).to_vec();
        let signature = sign_prehash(&secret, &digest, &mut rand::rngs::OsRng);

        let mut long_digest = digest.clone();
        long_digest.extend_from_slice(&[0xff; 32]);
        assert!(verify_prehash(&key, &long_digest, &signature));
        assert_ne!(
            ScalarField::from_be_bytes_mod_order(&long_digest),
            digest_scalar(&long_digest)
        );
        assert_eq!(digest_scalar(&long_digest), digest_scalar(&digest));

        // A short digest is taken as is.
        assert_eq!(digest_scalar(&[1]), ScalarField::from(1u64));
    }

    #[test]
    fn example_is_well_formed() {
        let input = example();
        assert_eq!(input.signature.len(), SIGNATURE_LEN);
        assert_eq!(input.public_key.x.len(), 32);
        assert_eq!(input.message_hash, Sha256::digest(EXAMPLE_MESSAGE).to_vec());
    }

    #[test]
    fn empty_components_are_refused() {
        let mut input = example();
        input.message_hash.clear();
        let err = P256VerifyCircuit::default()
            .prepare_input(&CircuitInput::P256Verify(input))
            .unwrap_err();
        assert_eq!(
            err,
            InputError::MissingField {
                circuit: NAME,
                field: "message_hash"
            }
        );
    }

    #[test]
    fn short_signature_is_refused() {
        let mut input = example();
        input.signature.truncate(63);
        let err = P256VerifyCircuit::default()
            .prepare_input(&CircuitInput::P256Verify(input))
            .unwrap_err();
        assert_eq!(
            err,
            InputError::InvalidSignatureLength {
                expected: 64,
                found: 63
            }
        );
    }

    #[test]
    fn input_uses_prefixed_hex() {
        let input = P256Input {
            public_key: P256PublicKey {
                x: vec![0xab],
                y: vec![0xcd],
            },
            message_hash: vec![0x01, 0x02],
            signature: vec![0xff],
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["public_key"]["x"], "0xab");
        assert_eq!(json["message_hash"], "0x0102");
        assert_eq!(serde_json::from_value::<P256Input>(json).unwrap(), input);
    }

    #[test]
    #[ignore = "emulated P-256 arithmetic takes minutes to synthesize"]
    fn valid_signature_satisfies() {
        assert!(is_satisfied(&example()));
    }

    #[test]
    #[ignore = "emulated P-256 arithmetic takes minutes to synthesize"]
    fn tampered_signature_does_not_satisfy() {
        let mut input = example();
        input.signature[63] ^= 1;
        assert!(!is_satisfied(&input));
    }
}
