use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use zk_prover::artifacts::cli::CliArtifactConfig;

/// Build, prove and verify reusable Groth16 circuits
#[derive(Parser)]
#[command(version = zk_prover::version(), propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[clap(flatten)]
    pub(crate) artifact_config: CliArtifactConfig,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Builds the artifacts of a circuit, checks them with a self-test proof
    /// and exports its verifier descriptor.
    Build {
        /// Name of the registered circuit.
        #[arg(short, long)]
        circuit: String,
        /// Discard stored artifacts and build them again.
        #[arg(long)]
        rebuild: bool,
        /// Directory receiving `<circuit>-verifier.json`.
        #[arg(short, long, default_value = "contract", value_hint = ValueHint::DirPath)]
        output_dir: PathBuf,
    },
    /// Generates a proof and verifies it.
    Prove {
        /// Name of the registered circuit.
        #[arg(short, long)]
        circuit: String,
        /// JSON file holding the circuit input. Defaults to the circuit's
        /// example input.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        /// Where to write the proof file.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Verifies a proof file written by `prove`.
    Verify {
        /// The file containing the proof to verify
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Lists the registered circuits.
    List,
    /// Deletes all the previously cached artifacts.
    Clean,
}
