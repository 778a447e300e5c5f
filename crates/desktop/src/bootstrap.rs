//! Process startup: configuration, logging and the store backend.

use anyhow::Context;
use tracing::{info, warn};

use invoicedesk_infra::{AppConfig, InMemoryInvoiceStore, PostgresInvoiceStore};

use crate::commands::AppState;

/// The state the host runs on, depending on whether a database is configured.
pub enum Backend {
    Postgres(AppState<PostgresInvoiceStore>),
    /// Nothing survives a restart.
    InMemory(AppState<InMemoryInvoiceStore>),
}

impl Backend {
    pub fn is_persistent(&self) -> bool {
        matches!(self, Backend::Postgres(_))
    }

    pub async fn shutdown(&self) {
        match self {
            Backend::Postgres(state) => state.shutdown().await,
            Backend::InMemory(state) => state.shutdown().await,
        }
    }
}

/// Load `AppConfig`, initialize logging and open the configured store.
pub async fn start() -> anyhow::Result<Backend> {
    let config = AppConfig::load().context("failed to load configuration")?;
    start_with(config).await
}

pub async fn start_with(config: AppConfig) -> anyhow::Result<Backend> {
    invoicedesk_observability::init_with_filter(&config.log_level);

    if config.database_url.is_some() {
        let state = AppState::connect(&config).await?;
        info!("using postgres store");
        return Ok(Backend::Postgres(state));
    }

    warn!("database_url not set; invoices are kept in memory only");
    Ok(Backend::InMemory(AppState::in_memory(&config)))
}
