use std::fs::{self, File};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Deserializer;
use tracing::info;
use zk_circuits::{CircuitInput, CircuitRegistry};
use zk_prover::env::load_dotenvy_vars_if_present;
use zk_prover::export::{write_verifier, VerifierDescriptor};
use zk_prover::proof_types::{ProofFile, VerifyProofArgs};
use zk_prover::prover::{verify_proof, Prover};

use self::zk::*;
mod zk {
    pub mod cli;
}

fn print_verify_args(args: &VerifyProofArgs) {
    println!("argA: 0x{}", hex::encode(&args.a));
    println!("argB: 0x{}", hex::encode(&args.b));
    println!("argC: 0x{}", hex::encode(&args.c));
    for (i, witness) in args.public_witnesses.iter().enumerate() {
        println!("publicWitness[{i}]: 0x{}", hex::encode(witness));
    }
}

fn read_input(path: &Path) -> Result<CircuitInput> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let des = &mut Deserializer::from_reader(&file);
    serde_path_to_error::deserialize(des)
        .with_context(|| format!("Invalid circuit input in {}", path.display()))
}

fn main() -> Result<()> {
    load_dotenvy_vars_if_present().context("Failed to load .env file")?;
    zk_prover::tracing::init();

    let args = cli::Cli::parse();
    let registry = CircuitRegistry::with_default_circuits();

    match &args.command {
        cli::Command::List => {
            for name in registry.list() {
                println!("{name}");
            }
            return Ok(());
        }
        cli::Command::Clean => {
            let store = args.artifact_config.store()?;
            store.delete_all()?;
            info!("Deleted cached artifacts under {}", store.root().display());
            return Ok(());
        }
        _ => {}
    }

    let manager = args.artifact_config.into_artifact_manager(&registry)?;
    let prover = Prover::new(manager);

    match args.command {
        cli::Command::Verify { file } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let des = &mut Deserializer::from_reader(&reader);
            let proof_file: ProofFile = serde_path_to_error::deserialize(des)
                .with_context(|| format!("Invalid proof file {}", file.display()))?;
            let circuit = proof_file.circuit.clone();

            let verification = prover
                .verify_file(proof_file)
                .with_context(|| format!("Failed to verify proof for circuit {circuit}"))?;
            if !verification.is_verified() {
                bail!("Proof for circuit {circuit} was rejected");
            }
            info!("Proof for circuit {circuit} verified successfully!");
        }
        cli::Command::Build {
            circuit,
            rebuild,
            output_dir,
        } => {
            let bundle = prover
                .build(&circuit, rebuild)
                .with_context(|| format!("Failed to build circuit {circuit}"))?;
            print_verify_args(&bundle.verify_args);

            let descriptor = VerifierDescriptor::new(
                circuit.as_str(),
                &bundle.verifying_key,
                Some(bundle.verify_args.clone()),
            )
            .context("Failed to encode the verifying key")?;
            write_verifier(&output_dir, &descriptor)?;
        }
        cli::Command::Prove {
            circuit,
            input,
            output,
        } => {
            let input = match input {
                Some(path) => read_input(&path)?,
                None => registry
                    .get(&circuit)
                    .with_context(|| format!("Unknown circuit {circuit}"))?
                    .example_input(),
            };

            let bundle = prover
                .generate_proof(&circuit, &input)
                .with_context(|| format!("Failed to prove circuit {circuit}"))?;
            for (i, value) in bundle.public_outputs.iter().enumerate() {
                println!("publicOutput[{i}]: {value}");
            }

            let verification =
                verify_proof(&bundle.proof, &bundle.verifying_key, &bundle.public_witness)?;
            println!("Proof generated and verified: {}", verification.is_verified());

            if let Some(path) = output {
                let proof_file = ProofFile::from_bundle(circuit.as_str(), &bundle)
                    .context("Failed to encode proof")?;
                fs::write(&path, serde_json::to_vec_pretty(&proof_file)?)
                    .with_context(|| format!("Failed to write proof to {}", path.display()))?;
                info!("Successfully wrote proof file {}", path.display());
            }

            if !verification.is_verified() {
                bail!("Proof for circuit {circuit} was rejected");
            }
        }
        cli::Command::List | cli::Command::Clean => {
            unreachable!("handled before the prover is created")
        }
    }

    Ok(())
}
