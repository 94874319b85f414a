use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Installs a plain-text subscriber filtered by `RUST_LOG`, defaulting to
/// `info` when the variable is unset.
pub fn init() {
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .init();
}
