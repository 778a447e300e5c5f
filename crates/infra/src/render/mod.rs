//! Document rendering boundary.
//!
//! The services only see [`DocumentRenderer`]: company, invoice, lines and a
//! language code in, opaque bytes out. Output must be a pure function of the
//! inputs so a re-render of an issued invoice reproduces its stored document.

pub mod html;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use invoicedesk_invoicing::{Invoice, InvoiceLine};
use invoicedesk_parties::Company;

pub use html::HtmlInvoiceRenderer;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Failed(String),

    #[error("renderer timed out after {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        company: &Company,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        language: &str,
    ) -> Result<Vec<u8>, RenderError>;
}

#[async_trait]
impl<R> DocumentRenderer for Arc<R>
where
    R: DocumentRenderer + ?Sized,
{
    async fn render(
        &self,
        company: &Company,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        language: &str,
    ) -> Result<Vec<u8>, RenderError> {
        (**self).render(company, invoice, lines, language).await
    }
}
