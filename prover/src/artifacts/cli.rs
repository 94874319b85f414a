//! CLI arguments for locating the artifact cache and choosing how keys are
//! generated.
use std::io;
use std::path::PathBuf;

use clap::{Args, ValueHint};
use zk_circuits::CircuitRegistry;

use super::{default_cache_dir, ArtifactManager, ArtifactStore};
use crate::setup::{CeremonySetup, KeySetup, DEFAULT_CONTRIBUTIONS, MAX_POWER};

/// The help heading for the artifact arguments.
///
/// This groups the artifact arguments together in the help message.
const HELP_HEADING: &str = "Artifact options";

#[derive(Args, Clone, PartialEq, Eq, Debug)]
pub struct CliArtifactConfig {
    /// Directory holding the cached circuit artifacts. Defaults to the OS
    /// cache directory.
    #[arg(long, env = "ZK_CIRCUIT_CACHE_DIR", help_heading = HELP_HEADING, value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,
    /// Powers-of-Tau response file. When set, keys come from a ceremony setup
    /// instead of a local one.
    #[arg(long, env = "ZK_CEREMONY_TRANSCRIPT", help_heading = HELP_HEADING, value_hint = ValueHint::FilePath, requires = "ceremony_power")]
    pub ceremony_transcript: Option<PathBuf>,
    /// The ceremony covers 2^power points.
    #[arg(long, env = "ZK_CEREMONY_POWER", help_heading = HELP_HEADING, value_parser = clap::value_parser!(u32).range(..=MAX_POWER as i64))]
    pub ceremony_power: Option<u32>,
    /// Number of phase-2 contributions applied on top of the transcript.
    #[arg(long, env = "ZK_CEREMONY_CONTRIBUTIONS", help_heading = HELP_HEADING, default_value_t = DEFAULT_CONTRIBUTIONS)]
    pub ceremony_contributions: usize,
}

impl CliArtifactConfig {
    pub fn store(&self) -> io::Result<ArtifactStore> {
        let root = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        Ok(ArtifactStore::new(root))
    }

    pub fn key_setup(&self) -> KeySetup {
        match (&self.ceremony_transcript, self.ceremony_power) {
            (Some(transcript), Some(power)) => KeySetup::Ceremony(CeremonySetup {
                transcript: transcript.clone(),
                power,
                contributions: self.ceremony_contributions,
            }),
            _ => KeySetup::Local,
        }
    }

    pub fn into_artifact_manager(self, registry: &CircuitRegistry) -> io::Result<ArtifactManager<'_>> {
        Ok(ArtifactManager::new(registry, self.store()?, self.key_setup()))
    }
}
