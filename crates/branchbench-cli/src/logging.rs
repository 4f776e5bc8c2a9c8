use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::Verbosity;

/// Initialize logging to stderr, optionally mirrored to a log file.
///
/// The filter comes from `BRANCHBENCH_LOG`, then `RUST_LOG`, and defaults to
/// `warn` (`debug` with `--verbose`). With `log_dir`, records also go to a
/// daily-rolling `branchbench.log` in that directory.
///
/// Returns a [`WorkerGuard`] when a file is written. It **must** be held for
/// the lifetime of the program so buffered records are flushed on shutdown.
pub fn init(verbosity: Verbosity, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_env("BRANCHBENCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "branchbench.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    guard
}

fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Verbose => "debug",
        Verbosity::Normal | Verbosity::Quiet => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_follows_verbosity() {
        assert_eq!(default_directive(Verbosity::Verbose), "debug");
        assert_eq!(default_directive(Verbosity::Normal), "warn");
        assert_eq!(default_directive(Verbosity::Quiet), "warn");
    }
}
