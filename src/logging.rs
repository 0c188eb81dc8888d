use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs always go to stderr; stdout carries the report.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks warn / info / debug.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
