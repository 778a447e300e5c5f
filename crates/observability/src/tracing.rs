//! Tracing/logging initialization.
//!
//! JSON lines on stdout with timestamps. `RUST_LOG` always wins over the
//! configured level.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },
}

/// Filter from `RUST_LOG`, else from `fallback`, else `info`.
pub fn build_filter(fallback: Option<&str>) -> Result<EnvFilter, TracingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = fallback
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LEVEL);
    EnvFilter::try_new(directive).map_err(|e| TracingError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. A broken directive falls back to `info`
/// instead of leaving the process without logs.
pub(crate) fn init(fallback: Option<&str>) {
    let filter = match build_filter(fallback) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("{err}; using '{DEFAULT_LEVEL}'");
            EnvFilter::new(DEFAULT_LEVEL)
        }
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();

    if installed.is_ok() {
        ::tracing::debug!("logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_used_without_env() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(Some("debug")).unwrap();
        assert_eq!(filter.to_string(), "debug");
        let filter = build_filter(Some("   ")).unwrap();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn bad_directive_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = build_filter(Some("invoicedesk=loud")).unwrap_err();
        assert!(matches!(err, TracingError::InvalidFilter { .. }));
    }

    #[test]
    fn init_twice_is_harmless() {
        crate::init_with_filter("warn");
        crate::init();
    }
}
