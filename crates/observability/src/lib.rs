//! Process-wide logging setup shared by the binaries.

pub mod tracing;

pub use tracing::LogFormat;

/// Initialize logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
