//! Constraint gadgets shared by the circuits in this crate.

pub mod ecdsa;
pub mod poseidon;
