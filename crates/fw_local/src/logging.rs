//! File logging. The terminal owns stdout and stderr, so without a log file
//! nothing is recorded.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber writing to `log_file`. `RUST_LOG` overrides
/// the default level (`info`, or `debug` when `debug` is set).
pub fn init(log_file: Option<&Path>, debug: bool) -> io::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|error| io::Error::other(error.to_string()))
}
