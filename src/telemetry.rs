//! Tracing subscriber setup for hosts embedding the subsystem

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber
///
/// With `debug` every level down to TRACE is emitted; otherwise `RUST_LOG`
/// decides. Returns false if a global subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
