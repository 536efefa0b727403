use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over the configured filter.
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&crate::config::config().logging.filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
