use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the global subscriber. Console output goes to stderr at `info`
/// (`debug` with `verbose`), overridable through `RUST_LOG`. With `verbose`
/// a daily rolling file under `log_dir` receives the same events; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), default_level))
        })
    };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(crate::util::try_enable_ansi_on_windows())
        .with_filter(filter());

    let (file_layer, guard) = match (verbose, log_dir) {
        (true, Some(dir)) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, "mirrorpilot.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false).with_filter(filter());
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("⚠️ cannot create log dir {}: {}", dir.display(), e);
                (None, None)
            }
        },
        _ => (None, None),
    };

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry().with(console).with(file_layer).try_init();
    guard
}
