//! Logging init (spec 6, `DPM_LOG_LEVEL`): out of the core's scope
//! (spec 1 names "logging setup" as an external collaborator), but the
//! ambient stack is still carried the way the teacher does it — a
//! `tracing_subscriber::EnvFilter`-driven subscriber writing to stderr.
//! Grounded on `examples/flox-flox/cli/flox/src/utils/init/logger.rs`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initialize the global `tracing` subscriber from `DPM_LOG_LEVEL`
/// (default `info`), writing human-readable output to stderr so stdout
/// stays free for the resolution document and other machine-readable
/// output.
pub fn init() {
    let filter = EnvFilter::try_from_env("DPM_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .try_init();
}
