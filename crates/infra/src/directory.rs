//! Company and customer management.

use tracing::{info, instrument};

use invoicedesk_core::{CompanyId, CustomerId};
use invoicedesk_parties::{Company, CompanyDetails, Customer, CustomerDetails};

use crate::error::{InvoiceError, InvoiceResult};
use crate::repository::InvoiceRepository;
use crate::store::{InvoiceStore, IsolationLevel, StoreTransaction};

pub struct DirectoryService<S> {
    store: S,
}

impl<S: InvoiceStore> DirectoryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// All companies, ordered by name.
    pub async fn list_companies(&self) -> InvoiceResult<Vec<Company>> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let companies = tx.list_companies().await?;
        tx.commit().await?;
        Ok(companies)
    }

    pub async fn get_company(&self, company_id: CompanyId) -> InvoiceResult<Company> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let company = repo.require_company().await?;
        repo.commit().await?;
        Ok(company)
    }

    /// Register a company. `next_invoice_number` seeds the counter when
    /// numbering continues from another system; it defaults to 1.
    #[instrument(skip(self, details), err)]
    pub async fn create_company(
        &self,
        details: CompanyDetails,
        next_invoice_number: Option<u64>,
    ) -> InvoiceResult<Company> {
        let mut company = Company::register(CompanyId::new(), details)?;
        if let Some(next) = next_invoice_number {
            company = company.with_next_invoice_number(next)?;
        }

        let mut repo = InvoiceRepository::begin(
            &self.store,
            company.id_typed(),
            IsolationLevel::ReadCommitted,
        )
        .await?;
        repo.save_company(&company).await?;
        repo.commit().await?;

        info!(company_id = %company.id_typed(), "company created");
        Ok(company)
    }

    /// Replace the editable details. The invoice counter is never touched here.
    #[instrument(skip(self, details), fields(company_id = %company_id), err)]
    pub async fn update_company(
        &self,
        company_id: CompanyId,
        details: CompanyDetails,
    ) -> InvoiceResult<Company> {
        // Serializable: the row also carries the counter, which a concurrent
        // issue may be advancing.
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut company = repo.require_company().await?;
        company.update_details(details)?;
        repo.save_company(&company).await?;
        repo.commit().await?;
        Ok(company)
    }

    /// Delete a company together with its customers and invoices.
    #[instrument(skip(self), fields(company_id = %company_id), err)]
    pub async fn delete_company(&self, company_id: CompanyId) -> InvoiceResult<()> {
        let mut tx = self.store.begin(IsolationLevel::Serializable).await?;
        if !tx.delete_company(company_id).await? {
            return Err(InvoiceError::not_found(format!("company {company_id}")));
        }
        tx.commit().await?;
        info!("company deleted");
        Ok(())
    }

    /// Customers of the company, ordered by name, optionally filtered by a
    /// case-insensitive substring of name or email.
    pub async fn list_customers(
        &self,
        company_id: CompanyId,
        search: Option<&str>,
    ) -> InvoiceResult<Vec<Customer>> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        repo.require_company().await?;
        let mut customers = repo.customers().await?;
        repo.commit().await?;

        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            customers.retain(|c| c.matches(needle));
        }
        Ok(customers)
    }

    pub async fn get_customer(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
    ) -> InvoiceResult<Customer> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let customer = repo.require_customer(customer_id).await?;
        repo.commit().await?;
        Ok(customer)
    }

    #[instrument(skip(self, details), fields(company_id = %company_id), err)]
    pub async fn create_customer(
        &self,
        company_id: CompanyId,
        details: CustomerDetails,
    ) -> InvoiceResult<Customer> {
        let customer = Customer::register(CustomerId::new(), company_id, details)?;

        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        repo.require_company().await?;
        repo.save_customer(&customer).await?;
        repo.commit().await?;

        info!(customer_id = %customer.id_typed(), "customer created");
        Ok(customer)
    }

    /// Existing invoices keep the snapshot they were saved or issued with.
    #[instrument(skip(self, details), fields(company_id = %company_id, customer_id = %customer_id), err)]
    pub async fn update_customer(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
        details: CustomerDetails,
    ) -> InvoiceResult<Customer> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let mut customer = repo.require_customer(customer_id).await?;
        customer.update_details(details)?;
        repo.save_customer(&customer).await?;
        repo.commit().await?;
        Ok(customer)
    }

    /// Fails with `InvalidState` while invoices reference the customer.
    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %customer_id), err)]
    pub async fn delete_customer(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
    ) -> InvoiceResult<()> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        if !repo.delete_customer(customer_id).await? {
            return Err(InvoiceError::not_found(format!("customer {customer_id}")));
        }
        repo.commit().await?;
        info!("customer deleted");
        Ok(())
    }
}
