use log::{info, log_enabled, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// Call once at startup; verbosity is controlled through the `RUST_LOG`
/// environment variable as usual.
pub fn init_logger() {
    env_logger::init();
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}
