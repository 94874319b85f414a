//! Inclusion of a leaf in a Merkle tree of depth at most
//! [`MAX_PROOF_ELEMENTS`].
//!
//! The circuit always has [`MAX_PROOF_ELEMENTS`] sibling slots. Shallower
//! proofs are padded with zero, and a zero sibling leaves the running hash
//! untouched. A genuine sibling whose hash is zero is therefore
//! indistinguishable from padding.

use ark_bls12_381::Fr;
use ark_ff::Zero;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::fields::FieldVar;
use ark_r1cs_std::select::CondSelectGadget;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::circuit::{assigned, Assignment, Circuit, CircuitInput, InputError};
use crate::commitment::{biguint_to_field, commitment_field, field_to_biguint, hash_fields};
use crate::gadgets::poseidon::hash_vars;

pub const NAME: &str = "merkle_verify";

pub const MAX_PROOF_ELEMENTS: usize = 4;

/// A Merkle inclusion claim. Values are decimal strings on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofInput {
    #[serde(default, with = "crate::decimal::option")]
    pub leaf_hash: Option<BigUint>,
    /// Siblings from the leaf up to the root.
    #[serde(default, with = "crate::decimal::option_vec")]
    pub siblings: Option<Vec<BigUint>>,
    #[serde(default, with = "crate::decimal::option")]
    pub root: Option<BigUint>,
}

impl MerkleProofInput {
    pub fn new(leaf_hash: BigUint, siblings: Vec<BigUint>, root: BigUint) -> Self {
        Self {
            leaf_hash: Some(leaf_hash),
            siblings: Some(siblings),
            root: Some(root),
        }
    }
}

/// Leaf contents of the example tree.
#[derive(Clone, Copy, Debug)]
pub struct Account {
    pub sender_key: u64,
    pub balance: u64,
    pub nonce: u64,
}

impl Account {
    pub fn leaf_hash(&self) -> Fr {
        commitment_field(&[
            self.sender_key.into(),
            self.balance.into(),
            self.nonce.into(),
        ])
    }
}

pub const EXAMPLE_ACCOUNTS: [Account; 2] = [
    Account {
        sender_key: 1337,
        balance: 9001,
        nonce: 5,
    },
    Account {
        sender_key: 420,
        balance: 20,
        nonce: 13,
    },
];

#[derive(Clone, Debug, Default)]
pub struct MerkleVerifyCircuit {
    /// Public.
    pub leaf_hash: Option<Fr>,
    /// Public. Zero marks an unused slot.
    pub proof_elements: [Option<Fr>; MAX_PROOF_ELEMENTS],
    /// Public.
    pub root: Option<Fr>,
}

/// Folds `leaf` up through `siblings` the way the circuit does, treating a
/// zero sibling as padding.
pub fn fold_path(leaf: Fr, siblings: &[Fr]) -> Fr {
    siblings.iter().fold(leaf, |current, sibling| {
        if sibling.is_zero() {
            current
        } else {
            hash_fields(&[current, *sibling])
        }
    })
}

/// Enforces that folding `leaf` through `proof_elements` ends at `root`.
pub fn enforce_path(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    proof_elements: &[FpVar<Fr>],
    root: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    let mut current = leaf.clone();
    for element in proof_elements {
        let candidate = hash_vars(cs.clone(), &[current.clone(), element.clone()])?;
        let is_padding = element.is_eq(&FpVar::zero())?;
        current = FpVar::conditionally_select(&is_padding, &current, &candidate)?;
    }
    current.enforce_equal(root)
}

fn to_field(value: &BigUint, field: &'static str) -> Result<Fr, InputError> {
    biguint_to_field(value).map_err(|_| InputError::OutOfField { field })
}

impl Circuit for MerkleVerifyCircuit {
    fn name(&self) -> &'static str {
        NAME
    }

    fn define(&self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let leaf_hash = FpVar::new_input(cs.clone(), assigned(self.leaf_hash))?;
        let proof_elements = self
            .proof_elements
            .iter()
            .map(|element| FpVar::new_input(cs.clone(), assigned(*element)))
            .collect::<Result<Vec<_>, _>>()?;
        let root = FpVar::new_input(cs.clone(), assigned(self.root))?;

        enforce_path(cs, &leaf_hash, &proof_elements, &root)
    }

    fn prepare_input(&self, input: &CircuitInput) -> Result<Assignment, InputError> {
        let CircuitInput::MerkleVerify(proof) = input else {
            return Err(InputError::unexpected(NAME, input));
        };
        let missing = |field| InputError::MissingField {
            circuit: NAME,
            field,
        };

        let leaf_hash = proof.leaf_hash.as_ref().ok_or_else(|| missing("leaf_hash"))?;
        let siblings = proof.siblings.as_ref().ok_or_else(|| missing("siblings"))?;
        let root = proof.root.as_ref().ok_or_else(|| missing("root"))?;

        if siblings.len() > MAX_PROOF_ELEMENTS {
            return Err(InputError::TooManySiblings {
                max: MAX_PROOF_ELEMENTS,
                found: siblings.len(),
            });
        }
        let mut proof_elements = [Some(Fr::zero()); MAX_PROOF_ELEMENTS];
        for (slot, sibling) in proof_elements.iter_mut().zip(siblings) {
            *slot = Some(to_field(sibling, "siblings")?);
        }

        Ok(Assignment {
            circuit: Box::new(MerkleVerifyCircuit {
                leaf_hash: Some(to_field(leaf_hash, "leaf_hash")?),
                proof_elements,
                root: Some(to_field(root, "root")?),
            }),
            public_outputs: vec![leaf_hash.to_str_radix(10), root.to_str_radix(10)],
        })
    }

    /// Proof for the first leaf of a two-leaf tree.
    fn example_input(&self) -> CircuitInput {
        let [leaf0, leaf1] = EXAMPLE_ACCOUNTS.map(|account| account.leaf_hash());
        let root = hash_fields(&[leaf0, leaf1]);

        CircuitInput::MerkleVerify(MerkleProofInput::new(
            field_to_biguint(leaf0),
            vec![field_to_biguint(leaf1)],
            field_to_biguint(root),
        ))
    }
}
