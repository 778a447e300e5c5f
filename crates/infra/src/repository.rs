//! Company-scoped access to the store.
//!
//! An [`InvoiceRepository`] wraps one open transaction and one company id.
//! Every load it offers filters by that company, so services cannot reach
//! another tenant's rows by accident.

use invoicedesk_core::{CompanyId, CompanyScoped, CustomerId, InvoiceId};
use invoicedesk_invoicing::Invoice;
use invoicedesk_parties::{Company, Customer};

use crate::error::{InvoiceError, InvoiceResult};
use crate::store::{InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel, StoreTransaction};

pub struct InvoiceRepository<T> {
    tx: T,
    company_id: CompanyId,
}

impl<T: StoreTransaction> InvoiceRepository<T> {
    pub async fn begin<S>(
        store: &S,
        company_id: CompanyId,
        isolation: IsolationLevel,
    ) -> InvoiceResult<Self>
    where
        S: InvoiceStore<Tx = T>,
    {
        let tx = store.begin(isolation).await?;
        Ok(Self { tx, company_id })
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub async fn company(&mut self) -> InvoiceResult<Option<Company>> {
        Ok(self.tx.load_company(self.company_id).await?)
    }

    pub async fn require_company(&mut self) -> InvoiceResult<Company> {
        self.company()
            .await?
            .ok_or_else(|| InvoiceError::not_found(format!("company {}", self.company_id)))
    }

    pub async fn save_company(&mut self, company: &Company) -> InvoiceResult<()> {
        self.ensure_scope(company)?;
        Ok(self.tx.save_company(company).await?)
    }

    pub async fn customer(&mut self, id: CustomerId) -> InvoiceResult<Option<Customer>> {
        let customer = self.tx.load_customer(self.company_id, id).await?;
        Ok(customer.filter(|c| c.belongs_to(self.company_id)))
    }

    pub async fn require_customer(&mut self, id: CustomerId) -> InvoiceResult<Customer> {
        self.customer(id)
            .await?
            .ok_or_else(|| InvoiceError::not_found(format!("customer {id}")))
    }

    pub async fn customers(&mut self) -> InvoiceResult<Vec<Customer>> {
        Ok(self.tx.list_customers(self.company_id).await?)
    }

    pub async fn save_customer(&mut self, customer: &Customer) -> InvoiceResult<()> {
        self.ensure_scope(customer)?;
        Ok(self.tx.save_customer(customer).await?)
    }

    pub async fn delete_customer(&mut self, id: CustomerId) -> InvoiceResult<bool> {
        Ok(self.tx.delete_customer(self.company_id, id).await?)
    }

    pub async fn invoice(&mut self, id: InvoiceId) -> InvoiceResult<Option<Invoice>> {
        let invoice = self.tx.load_invoice(self.company_id, id).await?;
        Ok(invoice.filter(|i| i.belongs_to(self.company_id)))
    }

    pub async fn require_invoice(&mut self, id: InvoiceId) -> InvoiceResult<Invoice> {
        self.invoice(id)
            .await?
            .ok_or_else(|| InvoiceError::not_found(format!("invoice {id}")))
    }

    pub async fn insert_invoice(&mut self, invoice: &Invoice) -> InvoiceResult<()> {
        self.ensure_scope(invoice)?;
        Ok(self.tx.insert_invoice(invoice).await?)
    }

    pub async fn update_invoice(&mut self, invoice: &Invoice) -> InvoiceResult<()> {
        self.ensure_scope(invoice)?;
        Ok(self.tx.update_invoice(invoice).await?)
    }

    pub async fn invoice_number_taken(&mut self, invoice_number: &str) -> InvoiceResult<bool> {
        Ok(self
            .tx
            .invoice_number_taken(self.company_id, invoice_number)
            .await?)
    }

    pub async fn search(&mut self, filter: &InvoiceFilter) -> InvoiceResult<Vec<InvoiceSummary>> {
        Ok(self.tx.search_invoices(self.company_id, filter).await?)
    }

    pub async fn commit(self) -> InvoiceResult<()> {
        Ok(self.tx.commit().await?)
    }

    pub async fn rollback(self) -> InvoiceResult<()> {
        Ok(self.tx.rollback().await?)
    }

    fn ensure_scope(&self, entity: &impl CompanyScoped) -> InvoiceResult<()> {
        if !entity.belongs_to(self.company_id) {
            return Err(InvoiceError::not_found(format!(
                "entity of company {} in scope of company {}",
                entity.company_id(),
                self.company_id
            )));
        }
        Ok(())
    }
}
