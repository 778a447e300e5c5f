//! Invoice lifecycle service.
//!
//! Orchestrates the draft → issue flow on top of the store. Every mutation
//! runs in one transaction; anything that fails before commit leaves no trace.
//! Events are published only after a successful commit, and a failed publish
//! never undoes the committed change.

use chrono::{Local, Utc};
use tracing::{debug, info, instrument, warn};

use invoicedesk_core::{CompanyId, CustomerId, InvoiceId};
use invoicedesk_events::{Event, EventBus, EventEnvelope};
use invoicedesk_invoicing::{DraftChanges, Invoice, InvoiceEvent, InvoiceLine, LineInput};
use invoicedesk_parties::Customer;

use crate::config::AppConfig;
use crate::error::{InvoiceError, InvoiceResult};
use crate::repository::InvoiceRepository;
use crate::store::{InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel};

/// Envelope carried on the invoice event bus.
pub type InvoiceEnvelope = EventEnvelope<InvoiceEvent>;

/// Full view of one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    /// The customer as it is now; `None` once deleted. The invoice's own
    /// snapshot stays authoritative for what was billed.
    pub customer: Option<Customer>,
}

impl InvoiceDetail {
    pub fn lines(&self) -> &[InvoiceLine] {
        self.invoice.lines()
    }
}

pub struct InvoiceService<S, B> {
    store: S,
    bus: B,
    default_currency: String,
    default_language: String,
}

impl<S, B> InvoiceService<S, B>
where
    S: InvoiceStore,
    B: EventBus<InvoiceEnvelope>,
{
    pub fn new(store: S, bus: B, config: &AppConfig) -> Self {
        Self {
            store,
            bus,
            default_currency: config.default_currency.clone(),
            default_language: config.default_language.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a draft dated today (local calendar date) with a placeholder
    /// number and the configured default currency and language.
    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %customer_id), err)]
    pub async fn create_draft(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
    ) -> InvoiceResult<Invoice> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        repo.require_company().await?;
        let customer = repo.require_customer(customer_id).await?;

        let invoice = Invoice::draft(
            InvoiceId::new(),
            company_id,
            &customer,
            Local::now().date_naive(),
            &self.default_currency,
            &self.default_language,
            Utc::now(),
        )?;
        repo.insert_invoice(&invoice).await?;
        repo.commit().await?;

        info!(invoice_id = %invoice.id_typed(), "draft invoice created");
        Ok(invoice)
    }

    /// Save header fields and the full line set of a draft.
    #[instrument(skip(self, changes, lines), fields(company_id = %company_id, invoice_id = %invoice_id, lines = lines.len()), err)]
    pub async fn update_draft(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        changes: DraftChanges,
        lines: Vec<LineInput>,
    ) -> InvoiceResult<Invoice> {
        // Serializable so a concurrent issue cannot be overwritten by a stale draft.
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut invoice = repo.require_invoice(invoice_id).await?;
        invoice.ensure_draft()?;
        let customer = repo.require_customer(changes.customer_id).await?;

        invoice.update_draft(changes, &customer, &lines)?;
        repo.update_invoice(&invoice).await?;
        repo.commit().await?;

        info!(total = %invoice.totals().total, "draft invoice saved");
        Ok(invoice)
    }

    /// Issue a draft: permanent number, frozen snapshot, counter + 1.
    ///
    /// The counter read, the counter write and the invoice write commit
    /// together or not at all. A concurrent issue for the same company makes
    /// one side fail with `ConcurrencyConflict`; retrying it is safe.
    ///
    /// A number already held by another invoice of the company (possible
    /// after the prefix or next number was edited) fails with `InvalidState`
    /// and leaves the counter untouched.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn issue(&self, company_id: CompanyId, invoice_id: InvoiceId) -> InvoiceResult<Invoice> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut invoice = repo.require_invoice(invoice_id).await?;
        let mut company = repo.company().await?;
        let customer = repo.customer(invoice.customer_id()).await?;

        let issued = invoice.issue(company.as_mut(), customer.as_ref(), Utc::now())?;
        if repo.invoice_number_taken(&issued.invoice_number).await? {
            repo.rollback().await?;
            return Err(InvoiceError::InvalidState(format!(
                "invoice number {} is already used; change the prefix or next invoice number",
                issued.invoice_number
            )));
        }
        if let Some(company) = &company {
            repo.save_company(company).await?;
        }
        repo.update_invoice(&invoice).await?;
        repo.commit().await?;

        info!(invoice_number = %issued.invoice_number, "invoice issued");
        self.publish(company_id, invoice_id, InvoiceEvent::InvoiceIssued(issued));
        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn mark_paid(&self, company_id: CompanyId, invoice_id: InvoiceId) -> InvoiceResult<Invoice> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut invoice = repo.require_invoice(invoice_id).await?;
        let paid = invoice.mark_paid(Utc::now())?;
        repo.update_invoice(&invoice).await?;
        repo.commit().await?;

        info!("invoice marked paid");
        self.publish(company_id, invoice_id, InvoiceEvent::InvoicePaid(paid));
        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn cancel(&self, company_id: CompanyId, invoice_id: InvoiceId) -> InvoiceResult<Invoice> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::Serializable).await?;
        let mut invoice = repo.require_invoice(invoice_id).await?;
        let cancelled = invoice.cancel(Utc::now())?;
        repo.update_invoice(&invoice).await?;
        repo.commit().await?;

        info!("invoice cancelled");
        self.publish(company_id, invoice_id, InvoiceEvent::InvoiceCancelled(cancelled));
        Ok(invoice)
    }

    /// Summaries of the company's invoices, newest issue date first.
    #[instrument(skip(self, filter), fields(company_id = %company_id), err)]
    pub async fn search(
        &self,
        company_id: CompanyId,
        filter: &InvoiceFilter,
    ) -> InvoiceResult<Vec<InvoiceSummary>> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let found = repo.search(filter).await?;
        repo.commit().await?;
        Ok(found)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub async fn get_detail(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
    ) -> InvoiceResult<InvoiceDetail> {
        let mut repo =
            InvoiceRepository::begin(&self.store, company_id, IsolationLevel::ReadCommitted).await?;
        let invoice = repo.require_invoice(invoice_id).await?;
        let customer = repo.customer(invoice.customer_id()).await?;
        repo.commit().await?;
        Ok(InvoiceDetail { invoice, customer })
    }

    fn publish(&self, company_id: CompanyId, invoice_id: InvoiceId, event: InvoiceEvent) {
        let event_type = event.event_type();
        let version = event.version();
        let occurred_at = event.occurred_at();
        let envelope = InvoiceEnvelope::for_aggregate::<Invoice>(company_id, invoice_id, event);
        match self.bus.publish(envelope) {
            Ok(()) => debug!(
                event_type,
                version,
                occurred_at = %occurred_at,
                invoice_id = %invoice_id,
                "invoice event published"
            ),
            Err(err) => warn!(
                event_type,
                company_id = %company_id,
                invoice_id = %invoice_id,
                error = %err,
                "failed to publish invoice event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvoiceError;
    use crate::store::{InMemoryInvoiceStore, StoreTransaction};
    use invoicedesk_events::InMemoryEventBus;
    use invoicedesk_invoicing::{InvoiceStatus, VatType};
    use invoicedesk_parties::{Company, CompanyDetails, CustomerDetails};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type Service = InvoiceService<InMemoryInvoiceStore, Arc<InMemoryEventBus<InvoiceEnvelope>>>;

    async fn setup() -> (Service, Arc<InMemoryEventBus<InvoiceEnvelope>>, Company, Customer) {
        let store = InMemoryInvoiceStore::new();
        let company = Company::register(
            CompanyId::new(),
            CompanyDetails {
                name: "Acme".to_string(),
                vat_number: "BG1".to_string(),
                country_code: "BG".to_string(),
                invoice_number_prefix: Some("INV".to_string()),
                ..CompanyDetails::default()
            },
        )
        .unwrap();
        let customer = Customer::register(
            CustomerId::new(),
            company.id_typed(),
            CustomerDetails {
                name: "Globex".to_string(),
                ..CustomerDetails::default()
            },
        )
        .unwrap();
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.save_company(&company).await.unwrap();
        tx.save_customer(&customer).await.unwrap();
        tx.commit().await.unwrap();

        let bus = Arc::new(InMemoryEventBus::new());
        let service = InvoiceService::new(store, Arc::clone(&bus), &AppConfig::default());
        (service, bus, company, customer)
    }

    fn changes(customer: &Customer, invoice: &Invoice) -> DraftChanges {
        DraftChanges {
            customer_id: customer.id_typed(),
            issue_date: invoice.issue_date(),
            currency: "EUR".to_string(),
            language: "en".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn issue_publishes_after_commit() {
        let (service, bus, company, customer) = setup().await;
        let mut events = bus.subscribe();
        let company_id = company.id_typed();

        let draft = service.create_draft(company_id, customer.id_typed()).await.unwrap();
        assert_eq!(draft.currency(), "EUR");
        service
            .update_draft(
                company_id,
                draft.id_typed(),
                changes(&customer, &draft),
                vec![LineInput {
                    id: None,
                    description: "Consulting".to_string(),
                    qty: dec!(2),
                    unit_price: dec!(50.00),
                    tax_rate: dec!(0.20),
                    vat_type: VatType::Domestic,
                }],
            )
            .await
            .unwrap();

        let issued = service.issue(company_id, draft.id_typed()).await.unwrap();
        assert_eq!(issued.invoice_number(), "INV1");
        assert_eq!(issued.totals().total, dec!(120.00));

        let envelope = events.try_recv().unwrap();
        assert_eq!(envelope.company_id(), company_id);
        assert_eq!(envelope.aggregate_type(), "invoice");
        assert!(matches!(envelope.payload(), InvoiceEvent::InvoiceIssued(e) if e.invoice_number == "INV1"));
    }

    #[tokio::test]
    async fn failed_issue_publishes_nothing_and_keeps_counter() {
        let (service, bus, company, customer) = setup().await;
        let mut events = bus.subscribe();
        let company_id = company.id_typed();
        let draft = service.create_draft(company_id, customer.id_typed()).await.unwrap();
        service.issue(company_id, draft.id_typed()).await.unwrap();
        let _ = events.try_recv();

        let err = service.issue(company_id, draft.id_typed()).await.unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidState(_)));
        assert!(events.try_recv().is_err());

        let mut tx = service.store().begin(IsolationLevel::ReadCommitted).await.unwrap();
        let stored = tx.load_company(company_id).await.unwrap().unwrap();
        assert_eq!(stored.next_invoice_number(), 2);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (service, _bus, company, customer) = setup().await;
        assert!(matches!(
            service.create_draft(CompanyId::new(), customer.id_typed()).await,
            Err(InvoiceError::NotFound(_))
        ));
        assert!(matches!(
            service.create_draft(company.id_typed(), CustomerId::new()).await,
            Err(InvoiceError::NotFound(_))
        ));
        assert!(matches!(
            service.issue(company.id_typed(), InvoiceId::new()).await,
            Err(InvoiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn paid_and_cancelled_follow_issue() {
        let (service, _bus, company, customer) = setup().await;
        let company_id = company.id_typed();
        let draft = service.create_draft(company_id, customer.id_typed()).await.unwrap();

        assert!(matches!(
            service.mark_paid(company_id, draft.id_typed()).await,
            Err(InvoiceError::InvalidState(_))
        ));
        service.issue(company_id, draft.id_typed()).await.unwrap();
        let paid = service.mark_paid(company_id, draft.id_typed()).await.unwrap();
        assert_eq!(paid.status(), InvoiceStatus::Paid);
        assert!(matches!(
            service.cancel(company_id, draft.id_typed()).await,
            Err(InvoiceError::InvalidState(_))
        ));

        let detail = service.get_detail(company_id, draft.id_typed()).await.unwrap();
        assert_eq!(detail.invoice.status(), InvoiceStatus::Paid);
        assert_eq!(detail.customer.map(|c| c.id_typed()), Some(customer.id_typed()));
    }
}
