use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use invoicedesk_core::{CompanyId, CustomerId, InvoiceId};
use invoicedesk_invoicing::{Invoice, InvoiceStatus};
use invoicedesk_parties::{Company, Customer};

/// Isolation requested when opening a transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Each read sees the latest committed data. Used for plain reads and
    /// single-row saves.
    ReadCommitted,
    /// Concurrent transactions behave as if run one after another; the store
    /// aborts one side of a conflicting pair with [`StoreError::Conflict`].
    Serializable,
}

/// Store operation error.
///
/// These are infrastructure errors; business failures are `DomainError`s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Serialization failure, write-write conflict or unique violation.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Foreign key violation, e.g. deleting a customer that invoices reference.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Connection, IO or decoding failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Invoice search criteria. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    /// Case-insensitive substring of the invoice number or customer name snapshot.
    pub text: Option<String>,
    /// Inclusive lower bound on the issue date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the issue date.
    pub date_to: Option<NaiveDate>,
    pub customer_id: Option<CustomerId>,
}

impl InvoiceFilter {
    /// Search text, trimmed; `None` when blank.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn matches(&self, summary: &InvoiceSummary) -> bool {
        if let Some(text) = self.text() {
            let text = text.to_lowercase();
            let hit = summary.invoice_number.to_lowercase().contains(&text)
                || summary.customer_name.to_lowercase().contains(&text);
            if !hit {
                return false;
            }
        }
        if self.date_from.is_some_and(|from| summary.issue_date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| summary.issue_date > to) {
            return false;
        }
        if self.customer_id.is_some_and(|id| summary.customer_id != id) {
            return false;
        }
        true
    }
}

/// One row of a search result. Carries no lines and no document bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: InvoiceId,
    pub company_id: CompanyId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub issued_at_utc: Option<DateTime<Utc>>,
    pub status: InvoiceStatus,
    pub currency: String,
    pub customer_name: String,
    pub sub_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub has_document: bool,
}

impl InvoiceSummary {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        use invoicedesk_core::{CompanyScoped, Entity};

        let totals = invoice.totals();
        Self {
            id: *invoice.id(),
            company_id: invoice.company_id(),
            customer_id: invoice.customer_id(),
            invoice_number: invoice.invoice_number().to_string(),
            issue_date: invoice.issue_date(),
            issued_at_utc: invoice.issued_at_utc(),
            status: invoice.status(),
            currency: invoice.currency().to_string(),
            customer_name: invoice.customer_snapshot().name.clone(),
            sub_total: totals.sub_total,
            tax_total: totals.tax_total,
            total: totals.total,
            has_document: invoice.document().is_some(),
        }
    }
}

/// Newest issue date first, then newest invoice first (ids are time ordered).
pub(crate) fn search_order(a: &InvoiceSummary, b: &InvoiceSummary) -> core::cmp::Ordering {
    b.issue_date.cmp(&a.issue_date).then_with(|| b.id.cmp(&a.id))
}

/// Transactional relational store for companies, customers and invoices.
///
/// Every mutation runs inside a [`StoreTransaction`]. Implementations must
/// make a transaction's writes visible all at once on commit or not at all.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    type Tx: StoreTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError>;
}

/// An open transaction.
///
/// Reads of customers and invoices are always filtered by `company_id`.
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn load_company(&mut self, id: CompanyId) -> Result<Option<Company>, StoreError>;

    /// All companies, ordered by name.
    async fn list_companies(&mut self) -> Result<Vec<Company>, StoreError>;

    /// Insert or update a company row.
    async fn save_company(&mut self, company: &Company) -> Result<(), StoreError>;

    /// Delete a company with its customers, invoices and lines.
    async fn delete_company(&mut self, id: CompanyId) -> Result<bool, StoreError>;

    async fn load_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError>;

    /// Customers of a company, ordered by name.
    async fn list_customers(&mut self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError>;

    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Constraint`] while invoices reference the customer.
    async fn delete_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<bool, StoreError>;

    /// Invoice with its lines and stored document.
    async fn load_invoice(
        &mut self,
        company_id: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Overwrite the invoice row and replace its line set.
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Summaries matching `filter`, ordered by [`search_order`].
    async fn search_invoices(
        &mut self,
        company_id: CompanyId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<InvoiceSummary>, StoreError>;

    /// Whether an invoice of the company already carries `invoice_number`.
    async fn invoice_number_taken(
        &mut self,
        company_id: CompanyId,
        invoice_number: &str,
    ) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> InvoiceStore for std::sync::Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError> {
        (**self).begin(isolation).await
    }
}
