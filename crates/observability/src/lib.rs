//! Tracing and logging setup shared by the binaries.

pub mod logging;

pub use logging::{LogConfig, LogFormat, UnknownLogFormat};

/// Initialize process-wide tracing from `config`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(config: &LogConfig) {
    logging::init(config);
}
