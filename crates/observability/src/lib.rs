//! Process-wide logging setup.

/// Subscriber construction (filters, JSON layer).
pub mod tracing;

pub use self::tracing::{TracingError, build_filter};

/// Initialize JSON logging, filtered by `RUST_LOG` or `info`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(None);
}

/// Like [`init`], but falls back to `level` when `RUST_LOG` is unset.
/// Typically fed from `AppConfig::log_level`.
pub fn init_with_filter(level: &str) {
    self::tracing::init(Some(level));
}
