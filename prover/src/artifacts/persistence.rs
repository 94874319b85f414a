use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use ark_bls12_381::Bls12_381;
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Artifacts, CompiledCircuit};

const CONSTRAINT_SYSTEM_FILE: &str = "r1cs.bin";
const PROVING_KEY_FILE: &str = "proving_key.bin";
const VERIFYING_KEY_FILE: &str = "verifying_key.bin";
const MANIFEST_FILE: &str = "manifest.json";
const ZK_CIRCUIT_CACHE_DIR_NAME: &str = "zk_circuit_cache";
pub const ZK_CIRCUIT_CACHE_DIR_ENV: &str = "ZK_CIRCUIT_CACHE_DIR";

/// Bumped whenever the encoding of any stored artifact changes. Slots written
/// with another format are rebuilt.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("corrupt artifacts for circuit {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

/// Describes the committed artifact set of one circuit. Its presence is what
/// marks the set as complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub circuit: String,
    pub circuit_version: u32,
    pub format_version: u32,
    /// Hex SHA-256 of the compressed constraint system.
    pub constraint_system_digest: String,
    pub num_constraints: u64,
    pub num_public_inputs: u64,
}

/// A resource that is stored as one file inside a circuit's slot.
trait DiskResource {
    type Resource;

    const FILE_NAME: &'static str;

    fn serialize(r: &Self::Resource) -> Result<Vec<u8>, ArtifactError>;

    fn deserialize(bytes: &[u8]) -> Result<Self::Resource, ArtifactError>;

    /// Reads the resource from `slot` and deserializes it.
    fn get(slot: &Path) -> Result<Self::Resource, ArtifactError> {
        Self::deserialize(&fs::read(slot.join(Self::FILE_NAME))?)
    }

    /// Serializes the resource and atomically writes it into `slot`.
    fn put(slot: &Path, r: &Self::Resource) -> Result<(), ArtifactError> {
        write_atomic(&slot.join(Self::FILE_NAME), &Self::serialize(r)?)
    }
}

fn to_compressed_bytes<T: CanonicalSerialize>(r: &T) -> Result<Vec<u8>, ArtifactError> {
    let mut bytes = Vec::with_capacity(r.compressed_size());
    r.serialize_compressed(&mut bytes)?;
    Ok(bytes)
}

struct ConstraintSystemResource;

impl DiskResource for ConstraintSystemResource {
    type Resource = CompiledCircuit;
    const FILE_NAME: &'static str = CONSTRAINT_SYSTEM_FILE;

    fn serialize(r: &Self::Resource) -> Result<Vec<u8>, ArtifactError> {
        to_compressed_bytes(r)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self::Resource, ArtifactError> {
        Ok(CompiledCircuit::deserialize_compressed(bytes)?)
    }
}

struct ProvingKeyResource;

impl DiskResource for ProvingKeyResource {
    type Resource = ProvingKey<Bls12_381>;
    const FILE_NAME: &'static str = PROVING_KEY_FILE;

    fn serialize(r: &Self::Resource) -> Result<Vec<u8>, ArtifactError> {
        to_compressed_bytes(r)
    }

    // Subgroup checks over every query point dominate load time; the proving
    // key only ever comes from our own cache.
    fn deserialize(bytes: &[u8]) -> Result<Self::Resource, ArtifactError> {
        Ok(ProvingKey::deserialize_compressed_unchecked(bytes)?)
    }
}

struct VerifyingKeyResource;

impl DiskResource for VerifyingKeyResource {
    type Resource = VerifyingKey<Bls12_381>;
    const FILE_NAME: &'static str = VERIFYING_KEY_FILE;

    fn serialize(r: &Self::Resource) -> Result<Vec<u8>, ArtifactError> {
        to_compressed_bytes(r)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self::Resource, ArtifactError> {
        Ok(VerifyingKey::deserialize_compressed(bytes)?)
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it into
/// place so readers never observe a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

/// Name-keyed artifact slots under one root directory:
/// `<root>/<circuit>/{r1cs.bin, proving_key.bin, verifying_key.bin,
/// manifest.json}`.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The manifest of the committed set for `name`, if there is one in the
    /// current format.
    pub fn manifest(&self, name: &str) -> Result<Option<Manifest>, ArtifactError> {
        let bytes = match fs::read(self.slot(name).join(MANIFEST_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        Ok((manifest.format_version == ARTIFACT_FORMAT_VERSION).then_some(manifest))
    }

    /// Loads the set described by `manifest`, checking it against the
    /// recorded digest and public input count.
    pub fn load(&self, name: &str, manifest: &Manifest) -> Result<Artifacts, ArtifactError> {
        let slot = self.slot(name);
        let corrupt = |reason: String| ArtifactError::Corrupt {
            name: name.to_string(),
            reason,
        };

        let constraint_system = ConstraintSystemResource::get(&slot)?;
        let digest = constraint_system.digest()?;
        if digest != manifest.constraint_system_digest {
            return Err(corrupt(format!(
                "constraint system digest {digest} does not match manifest digest {}",
                manifest.constraint_system_digest
            )));
        }

        let proving_key = ProvingKeyResource::get(&slot)?;
        let verifying_key = VerifyingKeyResource::get(&slot)?;
        let key_inputs = verifying_key.gamma_abc_g1.len() as u64;
        if key_inputs != manifest.num_public_inputs + 1 || proving_key.vk != verifying_key {
            return Err(corrupt(format!(
                "verifying key does not belong to a circuit with {} public inputs",
                manifest.num_public_inputs
            )));
        }

        Ok(Artifacts {
            constraint_system,
            proving_key,
            verifying_key,
        })
    }

    /// Commits `artifacts` as the set for `name`.
    ///
    /// The previous manifest is removed first and the new one written last,
    /// so an interrupted write leaves the slot empty rather than mixed.
    pub fn persist(
        &self,
        name: &str,
        circuit_version: u32,
        artifacts: &Artifacts,
    ) -> Result<Manifest, ArtifactError> {
        let slot = self.slot(name);
        fs::create_dir_all(&slot).map_err(|err| {
            io::Error::other(format!(
                "Could not create artifact folder at {} (err: {})",
                slot.display(),
                err
            ))
        })?;
        remove_if_exists(&slot.join(MANIFEST_FILE))?;

        ConstraintSystemResource::put(&slot, &artifacts.constraint_system)?;
        ProvingKeyResource::put(&slot, &artifacts.proving_key)?;
        VerifyingKeyResource::put(&slot, &artifacts.verifying_key)?;

        let manifest = Manifest {
            circuit: name.to_string(),
            circuit_version,
            format_version: ARTIFACT_FORMAT_VERSION,
            constraint_system_digest: artifacts.constraint_system.digest()?,
            num_constraints: artifacts.constraint_system.num_constraints,
            num_public_inputs: artifacts.constraint_system.num_public_inputs(),
        };
        write_atomic(&slot.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        Ok(manifest)
    }

    /// Removes the set stored for `name`, if any.
    pub fn delete(&self, name: &str) -> Result<(), ArtifactError> {
        let slot = self.slot(name);
        if slot.is_dir() {
            // Drop the marker first so a partial removal reads as absent.
            remove_if_exists(&slot.join(MANIFEST_FILE))?;
            fs::remove_dir_all(slot)?;
        }
        Ok(())
    }

    /// Flushes every artifact set under the root. Directories that do not
    /// look like slots are left alone.
    pub fn delete_all(&self) -> Result<(), ArtifactError> {
        if !self.root.is_dir() {
            return Ok(());
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_slot = [
                MANIFEST_FILE,
                CONSTRAINT_SYSTEM_FILE,
                PROVING_KEY_FILE,
                VERIFYING_KEY_FILE,
            ]
            .iter()
            .any(|file| path.join(file).is_file());

            if path.is_dir() && is_slot {
                remove_if_exists(&path.join(MANIFEST_FILE))?;
                fs::remove_dir_all(&path)?;
            }
        }

        Ok(())
    }
}

/// The artifact cache directory: `ZK_CIRCUIT_CACHE_DIR` if set, else the OS's
/// standard cache location, else the working directory.
pub fn default_cache_dir() -> io::Result<PathBuf> {
    if let Some(path) = std::env::var_os(ZK_CIRCUIT_CACHE_DIR_ENV) {
        return Ok(PathBuf::from(path));
    }

    match ProjectDirs::from("", "", ZK_CIRCUIT_CACHE_DIR_NAME) {
        Some(proj_dir) => Ok(proj_dir.cache_dir().to_path_buf()),
        None => Ok(std::env::current_dir()?.join(ZK_CIRCUIT_CACHE_DIR_NAME)),
    }
}
