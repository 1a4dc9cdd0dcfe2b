//! Process-wide tracing setup shared by the binaries.

/// Subscriber installation (format and filtering).
pub mod tracing;

pub use crate::tracing::{LogFormat, TracingConfig};

/// Initialize tracing from the environment (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(&TracingConfig::from_env());
}
