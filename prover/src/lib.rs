pub mod artifacts;
pub mod env;
pub mod export;
pub mod proof_types;
pub mod prover;
pub mod setup;
pub mod tracing;
pub mod witness;

/// Common information for the `--version` CLI flags.
pub fn version() -> String {
    let pkg_name = env!("CARGO_PKG_NAME");
    let pkg_version = env!("CARGO_PKG_VERSION");
    let artifact_format = artifacts::persistence::ARTIFACT_FORMAT_VERSION;
    format!("{pkg_name} {pkg_version} (artifact format: v{artifact_format})")
}
