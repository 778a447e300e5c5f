//! Stored document of issued invoices.
//!
//! An issued invoice is rendered at most once unless regeneration is forced;
//! afterwards the stored bytes are served as they are. Rendering happens
//! outside any store transaction and is bounded by the configured timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument};

use invoicedesk_core::{CompanyId, InvoiceId};
use invoicedesk_invoicing::{Invoice, IssuedDocument};
use invoicedesk_parties::Company;

use crate::error::{InvoiceError, InvoiceResult};
use crate::render::{DocumentRenderer, RenderError};
use crate::repository::InvoiceRepository;
use crate::store::{InvoiceStore, IsolationLevel};

pub struct PdfSnapshotCache<S, R> {
    store: S,
    renderer: R,
    output_dir: PathBuf,
    timeout: Duration,
}

impl<S, R> PdfSnapshotCache<S, R>
where
    S: InvoiceStore,
    R: DocumentRenderer,
{
    pub fn new(store: S, renderer: R, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            store,
            renderer,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Stored document of an issued invoice, rendering and storing it first
    /// when there is none or `force_regenerate` is set.
    ///
    /// Fails with `InvalidState` for drafts and when stored bytes no longer
    /// match their hash.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn ensure_snapshot(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        force_regenerate: bool,
    ) -> InvoiceResult<IssuedDocument> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let invoice = repo.require_invoice(invoice_id).await?;
        ensure_issued(&invoice)?;
        if let Some(existing) = reusable(&invoice, force_regenerate)? {
            repo.commit().await?;
            debug!("reusing stored document");
            return Ok(existing);
        }
        let company = repo.require_company().await?;
        repo.commit().await?;

        let bytes = self.render(&company, &invoice).await?;
        let file_name = invoice
            .document()
            .map(|d| d.file_name().to_string())
            .unwrap_or_else(|| IssuedDocument::file_name_for(invoice.invoice_number()));
        let document = IssuedDocument::from_rendered(bytes, file_name, Utc::now());

        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut current = repo.require_invoice(invoice_id).await?;
        if let Some(existing) = reusable(&current, force_regenerate)? {
            // Someone stored a document while we were rendering.
            repo.rollback().await?;
            return Ok(existing);
        }
        current.attach_document(document.clone())?;
        repo.update_invoice(&current).await?;
        repo.commit().await?;

        info!(sha256 = %document.sha256(), len = document.bytes().len(), "document stored");
        Ok(document)
    }

    /// Write the invoice's document to `target`, or to the output directory
    /// under its stored file name. Returns the written path.
    ///
    /// Without `regenerate`, an existing document is written as stored and the
    /// renderer is not called.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn export_pdf(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        target: Option<PathBuf>,
        regenerate: bool,
    ) -> InvoiceResult<PathBuf> {
        let document = self
            .ensure_snapshot(company_id, invoice_id, regenerate)
            .await?;
        let path = target.unwrap_or_else(|| self.output_dir.join(document.file_name()));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, document.bytes()).await?;

        info!(path = %path.display(), "document exported");
        Ok(path)
    }

    async fn render(
        &self,
        company: &Company,
        invoice: &Invoice,
    ) -> InvoiceResult<Vec<u8>> {
        let rendering = self
            .renderer
            .render(company, invoice, invoice.lines(), invoice.language());
        match tokio::time::timeout(self.timeout, rendering).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(InvoiceError::from(RenderError::TimedOut(self.timeout))),
        }
    }
}

fn ensure_issued(invoice: &Invoice) -> InvoiceResult<()> {
    if !invoice.is_issued() {
        return Err(InvoiceError::InvalidState(format!(
            "invoice {} is not issued",
            invoice.invoice_number()
        )));
    }
    Ok(())
}

/// The stored document, verified, unless regeneration is forced.
fn reusable(invoice: &Invoice, force_regenerate: bool) -> InvoiceResult<Option<IssuedDocument>> {
    match invoice.document() {
        Some(document) if !force_regenerate => {
            document.verify()?;
            Ok(Some(document.clone()))
        }
        _ => Ok(None),
    }
}
