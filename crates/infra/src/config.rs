//! Application configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional `invoicedesk.{toml,json,yaml}` file in the working directory
//! 3. `INVOICEDESK__*` environment variables (a `.env` file is loaded first)

use std::path::PathBuf;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use invoicedesk_invoicing::normalize_language;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string. Without it the app runs on the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Where exported documents go when no target path is given.
    #[serde(default = "default_pdf_output_dir")]
    pub pdf_output_dir: PathBuf,

    /// Upper bound for a single renderer call.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_language")]
    pub default_language: String,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_pdf_output_dir() -> PathBuf {
    PathBuf::from("Exports")
}

fn default_render_timeout_ms() -> u64 {
    30_000
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            pdf_output_dir: default_pdf_output_dir(),
            render_timeout_ms: default_render_timeout_ms(),
            default_currency: default_currency(),
            default_language: default_language(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("invoicedesk").required(false))
                .add_source(Environment::with_prefix("INVOICEDESK").separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.render_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "render_timeout_ms must be greater than zero".to_string(),
            ));
        }
        let currency = self.default_currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Message(format!(
                "default_currency must be a 3 letter code, got {currency:?}"
            )));
        }
        if let Err(err) = normalize_language(&self.default_language) {
            return Err(ConfigError::Message(format!("default_language: {err}")));
        }
        if self.pdf_output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Message(
                "pdf_output_dir must not be empty".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn empty_source_yields_defaults() {
        assert_eq!(from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            database_url = "postgres://localhost/invoicedesk"
            pdf_output_dir = "/tmp/invoices"
            render_timeout_ms = 500
            default_currency = "BGN"
            default_language = "bg"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/invoicedesk")
        );
        assert_eq!(config.pdf_output_dir, PathBuf::from("/tmp/invoices"));
        assert_eq!(config.render_timeout(), Duration::from_millis(500));
        assert_eq!(config.default_currency, "BGN");
        assert_eq!(config.default_language, "bg");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_zero_timeout_and_bad_currency() {
        assert!(from_toml("render_timeout_ms = 0").is_err());
        assert!(from_toml("default_currency = \"EURO\"").is_err());
    }

    #[test]
    fn rejects_language_codes_drafts_would_refuse() {
        assert!(from_toml("default_language = \"\"").is_err());
        assert!(from_toml("default_language = \"english language\"").is_err());
        assert!(from_toml("default_language = \"e\"").is_err());
        assert_eq!(
            from_toml("default_language = \"bg-BG\"").unwrap().default_language,
            "bg-BG"
        );
    }
}
