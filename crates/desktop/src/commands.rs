//! Commands exposed to the host shell.
//!
//! Every command resolves the active company from [`AppState`] and returns a
//! DTO or a [`CommandError`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Mutex, RwLock};

use invoicedesk_core::CompanyId;
use invoicedesk_events::{EventBus, InMemoryEventBus};
use invoicedesk_infra::{
    AppConfig, DirectoryService, DocumentRenderer, HtmlInvoiceRenderer, InMemoryInvoiceStore,
    InvoiceEnvelope, InvoiceService, InvoiceStore, PdfSnapshotCache, PostgresInvoiceStore,
    SnapshotWorker, WorkerHandle,
};

use crate::types::{
    CommandError, CommandResult, CompanyDto, CompanyInput, CustomerDto, CustomerInput, DraftInput,
    ExportDto, InvoiceDto, InvoiceSummaryDto, SearchInput, company_id, customer_id, invoice_id,
};

pub type Bus = Arc<InMemoryEventBus<InvoiceEnvelope>>;
pub type Renderer = Arc<dyn DocumentRenderer>;

/// Application state shared across commands.
pub struct AppState<S: InvoiceStore> {
    pub directory: DirectoryService<S>,
    pub invoices: InvoiceService<S, Bus>,
    pub snapshots: Arc<PdfSnapshotCache<S, Renderer>>,
    pub bus: Bus,
    active_company: RwLock<Option<CompanyId>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<S> AppState<S>
where
    S: InvoiceStore + Clone + 'static,
    S::Tx: 'static,
{
    /// Wire the services over `store` and start the post-issue snapshot worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: S, renderer: Renderer, config: &AppConfig) -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let snapshots = Arc::new(PdfSnapshotCache::new(
            store.clone(),
            renderer,
            config.pdf_output_dir.clone(),
            config.render_timeout(),
        ));
        let worker = SnapshotWorker::new(Arc::clone(&snapshots)).spawn(bus.subscribe());

        Self {
            directory: DirectoryService::new(store.clone()),
            invoices: InvoiceService::new(store, Arc::clone(&bus), config),
            snapshots,
            bus,
            active_company: RwLock::new(None),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stop the snapshot worker. Commands keep working afterwards; issued
    /// invoices are then rendered on first export instead.
    pub async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.shutdown().await;
        }
    }
}

impl<S: InvoiceStore> AppState<S> {
    /// The selected company; `InvalidState` until one is selected.
    pub async fn active_company_id(&self) -> CommandResult<CompanyId> {
        self.active_company
            .read()
            .await
            .ok_or_else(|| CommandError::invalid_state("no active company selected"))
    }
}

impl AppState<InMemoryInvoiceStore> {
    /// Non-persistent state, for demos and tests.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            InMemoryInvoiceStore::new(),
            Arc::new(HtmlInvoiceRenderer::new()),
            config,
        )
    }
}

impl AppState<PostgresInvoiceStore> {
    /// Connect to `config.database_url` and apply pending migrations.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .context("database_url is not configured")?;
        let store = PostgresInvoiceStore::connect(url)
            .await
            .context("failed to connect to the invoice database")?;
        store
            .migrate()
            .await
            .context("failed to apply database migrations")?;

        tracing::info!(output_dir = %config.pdf_output_dir.display(), "invoice database ready");
        Ok(Self::new(store, Arc::new(HtmlInvoiceRenderer::new()), config))
    }
}

// Companies

pub async fn list_companies<S: InvoiceStore>(state: &AppState<S>) -> CommandResult<Vec<CompanyDto>> {
    let companies = state.directory.list_companies().await?;
    Ok(companies.iter().map(CompanyDto::from).collect())
}

pub async fn create_company<S: InvoiceStore>(
    state: &AppState<S>,
    input: CompanyInput,
) -> CommandResult<CompanyDto> {
    let (details, next_invoice_number) = input.into_details();
    let company = state
        .directory
        .create_company(details, next_invoice_number)
        .await?;
    Ok(CompanyDto::from(&company))
}

pub async fn update_company<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
    input: CompanyInput,
) -> CommandResult<CompanyDto> {
    let (details, _) = input.into_details();
    let company = state
        .directory
        .update_company(company_id(&id)?, details)
        .await?;
    Ok(CompanyDto::from(&company))
}

/// Deleting the active company clears the selection.
pub async fn delete_company<S: InvoiceStore>(state: &AppState<S>, id: String) -> CommandResult<()> {
    let id = company_id(&id)?;
    state.directory.delete_company(id).await?;

    let mut active = state.active_company.write().await;
    if *active == Some(id) {
        *active = None;
    }
    Ok(())
}

/// Make `id` the company every other command operates on.
pub async fn select_company<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
) -> CommandResult<CompanyDto> {
    let id = company_id(&id)?;
    let company = state.directory.get_company(id).await?;
    *state.active_company.write().await = Some(id);

    tracing::info!(company_id = %id, "active company selected");
    Ok(CompanyDto::from(&company))
}

pub async fn active_company<S: InvoiceStore>(state: &AppState<S>) -> CommandResult<CompanyDto> {
    let id = state.active_company_id().await?;
    let company = state.directory.get_company(id).await?;
    Ok(CompanyDto::from(&company))
}

// Customers

pub async fn list_customers<S: InvoiceStore>(
    state: &AppState<S>,
    search: Option<String>,
) -> CommandResult<Vec<CustomerDto>> {
    let company_id = state.active_company_id().await?;
    let customers = state
        .directory
        .list_customers(company_id, search.as_deref())
        .await?;
    Ok(customers.iter().map(CustomerDto::from).collect())
}

pub async fn get_customer<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
) -> CommandResult<CustomerDto> {
    let company_id = state.active_company_id().await?;
    let customer = state
        .directory
        .get_customer(company_id, customer_id(&id)?)
        .await?;
    Ok(CustomerDto::from(&customer))
}

pub async fn create_customer<S: InvoiceStore>(
    state: &AppState<S>,
    input: CustomerInput,
) -> CommandResult<CustomerDto> {
    let company_id = state.active_company_id().await?;
    let customer = state
        .directory
        .create_customer(company_id, input.into())
        .await?;
    Ok(CustomerDto::from(&customer))
}

pub async fn update_customer<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
    input: CustomerInput,
) -> CommandResult<CustomerDto> {
    let company_id = state.active_company_id().await?;
    let customer = state
        .directory
        .update_customer(company_id, customer_id(&id)?, input.into())
        .await?;
    Ok(CustomerDto::from(&customer))
}

pub async fn delete_customer<S: InvoiceStore>(state: &AppState<S>, id: String) -> CommandResult<()> {
    let company_id = state.active_company_id().await?;
    state
        .directory
        .delete_customer(company_id, customer_id(&id)?)
        .await?;
    Ok(())
}

// Invoices

pub async fn create_draft<S: InvoiceStore>(
    state: &AppState<S>,
    customer: String,
) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let invoice = state
        .invoices
        .create_draft(company_id, customer_id(&customer)?)
        .await?;
    Ok(InvoiceDto::from(&invoice))
}

pub async fn update_draft<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
    input: DraftInput,
) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let id = invoice_id(&id)?;
    let (changes, lines) = input.parse()?;
    let invoice = state
        .invoices
        .update_draft(company_id, id, changes, lines)
        .await?;
    Ok(InvoiceDto::from(&invoice))
}

pub async fn issue_invoice<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let invoice = state.invoices.issue(company_id, invoice_id(&id)?).await?;
    Ok(InvoiceDto::from(&invoice))
}

pub async fn mark_paid<S: InvoiceStore>(state: &AppState<S>, id: String) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let invoice = state.invoices.mark_paid(company_id, invoice_id(&id)?).await?;
    Ok(InvoiceDto::from(&invoice))
}

pub async fn cancel_invoice<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let invoice = state.invoices.cancel(company_id, invoice_id(&id)?).await?;
    Ok(InvoiceDto::from(&invoice))
}

pub async fn search_invoices<S: InvoiceStore>(
    state: &AppState<S>,
    input: SearchInput,
) -> CommandResult<Vec<InvoiceSummaryDto>> {
    let company_id = state.active_company_id().await?;
    let filter = input.parse()?;
    let found = state.invoices.search(company_id, &filter).await?;
    Ok(found.iter().map(InvoiceSummaryDto::from).collect())
}

pub async fn get_invoice_detail<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
) -> CommandResult<InvoiceDto> {
    let company_id = state.active_company_id().await?;
    let detail = state
        .invoices
        .get_detail(company_id, invoice_id(&id)?)
        .await?;
    Ok(InvoiceDto::from(&detail))
}

/// Write the invoice's stored document to `target`, or to the configured
/// output directory when `target` is empty.
pub async fn export_pdf<S: InvoiceStore>(
    state: &AppState<S>,
    id: String,
    target: Option<String>,
    regenerate: bool,
) -> CommandResult<ExportDto> {
    let company_id = state.active_company_id().await?;
    let target = target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(PathBuf::from);
    let path = state
        .snapshots
        .export_pdf(company_id, invoice_id(&id)?, target, regenerate)
        .await?;
    Ok(ExportDto {
        path: path.display().to_string(),
    })
}
