use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Priority: `RUST_LOG` > `--verbose` >
/// the configured level. Logs go to stderr so command output stays clean.
pub fn init(configured_level: &str, verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(configured_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .try_init();
}
