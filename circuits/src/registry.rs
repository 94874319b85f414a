use std::fmt;

use hashbrown::HashMap;

use crate::circuit::Circuit;
use crate::hash_commit::{self, HashCommitCircuit};
use crate::merkle_verify::{self, MerkleVerifyCircuit};
use crate::p256_verify::{self, P256VerifyCircuit};

type Constructor = Box<dyn Fn() -> Box<dyn Circuit> + Send + Sync>;

/// Circuits available to the prover, by name.
///
/// Constructors produce empty descriptors; the registry never hands out a
/// shared instance.
#[derive(Default)]
pub struct CircuitRegistry {
    constructors: HashMap<String, Constructor>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every circuit shipped with this crate.
    pub fn with_default_circuits() -> Self {
        let mut registry = Self::new();
        registry.register(hash_commit::NAME, || Box::<HashCommitCircuit>::default());
        registry.register(merkle_verify::NAME, || Box::<MerkleVerifyCircuit>::default());
        registry.register(p256_verify::NAME, || Box::<P256VerifyCircuit>::default());
        registry
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Circuit> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn get(&self, name: &str) -> Option<Box<dyn Circuit>> {
        self.constructors.get(name).map(|constructor| constructor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names = self.constructors.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("circuits", &self.list())
            .finish()
    }
}
