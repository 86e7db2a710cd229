use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Stdout stays free for protocol and CLI output.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
