//! Subscriber setup for the intercepted process.

use crate::config::LOG_ENV;
use std::fs::OpenOptions;
use std::sync::Mutex;

/// Install a `fmt` subscriber writing to `SIDECAR_LOG`, or stderr when unset.
///
/// Uses `try_init`, so a subscriber the host already installed is kept.
/// Returns whether this call installed one.
pub fn init_logging() -> bool {
    let builder = tracing_subscriber::fmt().with_ansi(false);
    let file = std::env::var_os(LOG_ENV).and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    match file {
        Some(file) => builder.with_writer(Mutex::new(file)).try_init().is_ok(),
        None => builder.with_writer(std::io::stderr).try_init().is_ok(),
    }
}
