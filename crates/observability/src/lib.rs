//! Process-wide logging setup shared by the binaries.

/// Subscriber installation (format selection, filters).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing/logging with the format chosen by `REALTY_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
