//! Tracing and logging setup shared by the stockroom binaries.

/// Initialize process-wide logging with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(LogFormat::Json);
}

pub use self::tracing::{LogFormat, ParseLogFormatError, init_with};

/// Subscriber configuration (filters, output format).
pub mod tracing;
