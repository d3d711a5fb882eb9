//! Logger setup for binaries and tests.

use env_logger::{Builder as LogBuilder, Env as EnvLoggerEnv};

/// Initializes `env_logger`, honouring `RUST_LOG` (default: `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger() {
    let _ignore_result = LogBuilder::from_env(EnvLoggerEnv::default().filter_or("RUST_LOG", "info"))
        .format_timestamp(None)
        .try_init();
}
