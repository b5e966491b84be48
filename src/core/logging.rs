use tracing_subscriber::EnvFilter;

/// Install a JSON-lines subscriber on stdout.
///
/// `RUST_LOG` takes precedence over `level`. Repeated calls are no-ops, so
/// tests and embedding applications can call this freely.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_ascii_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
