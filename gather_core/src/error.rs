use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Whether to log (verbose) error output.
/// The bot enables it with `--debug` or the `DEBUG` env var.
static ERROR_LOGGER: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum GatherError {
    #[error("gatherer for service '{service}' panicked")]
    Panicked { service: String },
}

pub fn debug_error_enabled(enabled: bool) {
    ERROR_LOGGER.store(enabled, Ordering::Relaxed);
}

pub fn debug_error(err: anyhow::Error) {
    if ERROR_LOGGER.load(Ordering::Relaxed) {
        log::warn!("{}", err);
        for err in err.chain().skip(1) {
            log::warn!("Caused by: {}", err);
        }
    }
}
