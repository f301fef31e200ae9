use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber. Verbosity is controlled
/// by `RUST_LOG`; absent that, everything at `info` and above is shown.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
