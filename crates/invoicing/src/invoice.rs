use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicedesk_core::{
    AggregateRoot, CompanyId, CompanyScoped, CustomerId, DomainError, DomainResult, Entity,
    InvoiceId,
};
use invoicedesk_parties::{Company, Customer, CustomerSnapshot};

use crate::document::IssuedDocument;
use crate::event::{InvoiceCancelled, InvoiceIssued, InvoicePaid};
use crate::line::{self, InvoiceLine, LineInput};
use crate::money::{self, InvoiceTotals};
use crate::numbering;

const NOTES_MAX: usize = 1000;

/// Invoice lifecycle state.
///
/// `Draft → Issued → {Paid, Cancelled}`. Business fields are frozen from
/// `Issued` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Issued => "Issued",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Cancelled => "Cancelled",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "issued" => Ok(InvoiceStatus::Issued),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(DomainError::validation(format!("unknown invoice status: {s}"))),
        }
    }
}

/// Header fields a draft save may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftChanges {
    pub customer_id: CustomerId,
    pub issue_date: NaiveDate,
    pub currency: String,
    pub language: String,
    pub notes: Option<String>,
}

/// Stored state of an invoice, used to rehydrate the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceParts {
    pub id: InvoiceId,
    pub company_id: CompanyId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub issued_at_utc: Option<DateTime<Utc>>,
    pub status: InvoiceStatus,
    pub currency: String,
    pub language: String,
    pub totals: InvoiceTotals,
    pub customer_snapshot: CustomerSnapshot,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub document: Option<IssuedDocument>,
}

/// Aggregate root: Invoice.
///
/// Owns its lines. Holds the company and customer by id only; callers resolve
/// them through the repository and pass them in where a rule needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    company_id: CompanyId,
    customer_id: CustomerId,
    invoice_number: String,
    issue_date: NaiveDate,
    issued_at_utc: Option<DateTime<Utc>>,
    status: InvoiceStatus,
    currency: String,
    language: String,
    totals: InvoiceTotals,
    customer_snapshot: CustomerSnapshot,
    notes: Option<String>,
    lines: Vec<InvoiceLine>,
    document: Option<IssuedDocument>,
}

impl Invoice {
    /// Start a draft for `customer` under `company_id`.
    ///
    /// Fails with `NotFound` when the customer belongs to another company.
    pub fn draft(
        id: InvoiceId,
        company_id: CompanyId,
        customer: &Customer,
        issue_date: NaiveDate,
        currency: &str,
        language: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !customer.belongs_to(company_id) {
            return Err(DomainError::not_found("customer"));
        }

        Ok(Self {
            id,
            company_id,
            customer_id: customer.id_typed(),
            invoice_number: numbering::draft_number(company_id, now),
            issue_date,
            issued_at_utc: None,
            status: InvoiceStatus::Draft,
            currency: normalize_currency(currency)?,
            language: normalize_language(language)?,
            totals: money::invoice_totals(core::iter::empty::<money::LineAmounts>())?,
            customer_snapshot: customer.snapshot(),
            notes: None,
            lines: Vec::new(),
            document: None,
        })
    }

    pub fn from_parts(parts: InvoiceParts) -> Self {
        Self {
            id: parts.id,
            company_id: parts.company_id,
            customer_id: parts.customer_id,
            invoice_number: parts.invoice_number,
            issue_date: parts.issue_date,
            issued_at_utc: parts.issued_at_utc,
            status: parts.status,
            currency: parts.currency,
            language: parts.language,
            totals: parts.totals,
            customer_snapshot: parts.customer_snapshot,
            notes: parts.notes,
            lines: parts.lines,
            document: parts.document,
        }
    }

    pub fn into_parts(self) -> InvoiceParts {
        InvoiceParts {
            id: self.id,
            company_id: self.company_id,
            customer_id: self.customer_id,
            invoice_number: self.invoice_number,
            issue_date: self.issue_date,
            issued_at_utc: self.issued_at_utc,
            status: self.status,
            currency: self.currency,
            language: self.language,
            totals: self.totals,
            customer_snapshot: self.customer_snapshot,
            notes: self.notes,
            lines: self.lines,
            document: self.document,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    /// When the invoice was issued. Informational only; `status` is the
    /// state discriminator.
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        self.issued_at_utc
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn customer_snapshot(&self) -> &CustomerSnapshot {
        &self.customer_snapshot
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn document(&self) -> Option<&IssuedDocument> {
        self.document.as_ref()
    }

    pub fn is_draft(&self) -> bool {
        self.status == InvoiceStatus::Draft && self.issued_at_utc.is_none()
    }

    /// Issued, possibly later marked paid or cancelled.
    pub fn is_issued(&self) -> bool {
        self.status != InvoiceStatus::Draft && self.issued_at_utc.is_some()
    }

    /// Save a draft: header fields, the refreshed customer snapshot and the
    /// merged line set. Totals are recomputed.
    ///
    /// Nothing changes when any check fails.
    pub fn update_draft(
        &mut self,
        changes: DraftChanges,
        customer: &Customer,
        lines: &[LineInput],
    ) -> DomainResult<()> {
        self.ensure_draft()?;
        if !customer.belongs_to(self.company_id) || customer.id_typed() != changes.customer_id {
            return Err(DomainError::not_found("customer"));
        }

        let currency = normalize_currency(&changes.currency)?;
        let language = normalize_language(&changes.language)?;
        let notes = normalize_notes(changes.notes)?;
        let mut merged = line::merge_lines(self.company_id, &self.lines, lines)?;
        let totals = money::invoice_totals(line::recalculate_all(&mut merged)?)?;

        self.customer_id = changes.customer_id;
        self.issue_date = changes.issue_date;
        self.currency = currency;
        self.language = language;
        self.notes = notes;
        self.customer_snapshot = customer.snapshot();
        self.lines = merged;
        self.totals = totals;
        Ok(())
    }

    /// Issue the draft: take the company's next number, freeze the customer
    /// snapshot, stamp `issued_at_utc` and recompute totals.
    ///
    /// `company` is mutated (its counter advances), so it must be the row
    /// loaded inside the issuing transaction. Fails with `InvalidState` when
    /// either relation is missing or belongs elsewhere.
    pub fn issue(
        &mut self,
        company: Option<&mut Company>,
        customer: Option<&Customer>,
        now: DateTime<Utc>,
    ) -> DomainResult<InvoiceIssued> {
        self.ensure_draft()?;
        let company = company
            .filter(|c| c.id_typed() == self.company_id)
            .ok_or_else(|| DomainError::invalid_state("missing company"))?;
        let customer = customer
            .filter(|c| c.id_typed() == self.customer_id && c.belongs_to(self.company_id))
            .ok_or_else(|| DomainError::invalid_state("missing customer"))?;

        // Everything fallible runs before the counter moves.
        let mut lines = self.lines.clone();
        let totals = money::invoice_totals(line::recalculate_all(&mut lines)?)?;
        let number = numbering::allocate(company)?;

        self.invoice_number = number;
        self.customer_snapshot = customer.snapshot();
        self.issued_at_utc = Some(now);
        self.status = InvoiceStatus::Issued;
        self.lines = lines;
        self.totals = totals;

        Ok(InvoiceIssued {
            company_id: self.company_id,
            invoice_id: self.id,
            invoice_number: self.invoice_number.clone(),
            occurred_at: now,
        })
    }

    /// Store the rendered document of an issued invoice.
    pub fn attach_document(&mut self, document: IssuedDocument) -> DomainResult<()> {
        if !self.is_issued() {
            return Err(DomainError::invalid_state(
                "only issued invoices carry a document",
            ));
        }
        document.verify()?;
        self.document = Some(document);
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> DomainResult<InvoicePaid> {
        self.ensure_status(InvoiceStatus::Issued, "only issued invoices can be marked paid")?;
        self.status = InvoiceStatus::Paid;
        Ok(InvoicePaid {
            company_id: self.company_id,
            invoice_id: self.id,
            occurred_at: now,
        })
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<InvoiceCancelled> {
        self.ensure_status(InvoiceStatus::Issued, "only issued invoices can be cancelled")?;
        self.status = InvoiceStatus::Cancelled;
        Ok(InvoiceCancelled {
            company_id: self.company_id,
            invoice_id: self.id,
            occurred_at: now,
        })
    }

    /// Fails with `InvalidState` unless the invoice is still an editable draft.
    pub fn ensure_draft(&self) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::invalid_state(format!(
                "invoice {} is {} and can no longer be edited",
                self.invoice_number, self.status
            )));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: InvoiceStatus, msg: &str) -> DomainResult<()> {
        if self.status != expected || self.issued_at_utc.is_none() {
            return Err(DomainError::invalid_state(msg));
        }
        Ok(())
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CompanyScoped for Invoice {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl AggregateRoot for Invoice {
    const TYPE_NAME: &'static str = "invoice";
}

/// Three ASCII letters, upper-cased.
fn normalize_currency(value: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.len() != 3 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(
            "currency must be a 3 letter ISO code",
        ));
    }
    Ok(value.to_ascii_uppercase())
}

/// A language tag of 2 to 8 characters such as `en` or `bg-BG`.
pub fn normalize_language(value: &str) -> DomainResult<String> {
    let value = value.trim();
    let valid = (2..=8).contains(&value.len())
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(DomainError::validation(format!(
            "unsupported language code: {value}"
        )));
    }
    Ok(value.to_string())
}

fn normalize_notes(notes: Option<String>) -> DomainResult<Option<String>> {
    let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if let Some(n) = &notes {
        if n.chars().count() > NOTES_MAX {
            return Err(DomainError::validation(format!(
                "notes must be at most {NOTES_MAX} characters"
            )));
        }
    }
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::VatType;
    use crate::numbering::is_draft_number;
    use invoicedesk_parties::{CompanyDetails, CustomerDetails};
    use rust_decimal_macros::dec;

    fn test_company(prefix: Option<&str>) -> Company {
        Company::register(
            CompanyId::new(),
            CompanyDetails {
                name: "Acme Ltd".to_string(),
                vat_number: "BG123456789".to_string(),
                country_code: "BG".to_string(),
                invoice_number_prefix: prefix.map(str::to_string),
                ..CompanyDetails::default()
            },
        )
        .unwrap()
    }

    fn test_customer(company_id: CompanyId, name: &str) -> Customer {
        Customer::register(
            CustomerId::new(),
            company_id,
            CustomerDetails {
                name: name.to_string(),
                address: Some("1 Customer Way".to_string()),
                vat_number: Some("DE811907980".to_string()),
                ..CustomerDetails::default()
            },
        )
        .unwrap()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 21).unwrap()
    }

    fn test_draft(company: &Company, customer: &Customer) -> Invoice {
        Invoice::draft(
            InvoiceId::new(),
            company.id_typed(),
            customer,
            test_date(),
            "EUR",
            "en",
            Utc::now(),
        )
        .unwrap()
    }

    fn changes(customer: &Customer) -> DraftChanges {
        DraftChanges {
            customer_id: customer.id_typed(),
            issue_date: test_date(),
            currency: "eur".to_string(),
            language: "en".to_string(),
            notes: Some("Thank you".to_string()),
        }
    }

    fn line(qty: rust_decimal::Decimal, price: rust_decimal::Decimal, vat_type: VatType) -> LineInput {
        LineInput {
            id: None,
            description: "Consulting".to_string(),
            qty,
            unit_price: price,
            tax_rate: dec!(0.20),
            vat_type,
        }
    }

    #[test]
    fn draft_starts_with_placeholder_and_snapshot() {
        let company = test_company(Some("INV"));
        let customer = test_customer(company.id_typed(), "Globex");
        let invoice = test_draft(&company, &customer);

        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert!(invoice.is_draft());
        assert!(is_draft_number(invoice.invoice_number()));
        assert_eq!(invoice.customer_snapshot().name, "Globex");
        assert!(invoice.lines().is_empty());
        assert_eq!(invoice.totals().total, dec!(0.00));
    }

    #[test]
    fn draft_rejects_customer_of_other_company() {
        let company = test_company(None);
        let foreign = test_customer(CompanyId::new(), "Elsewhere Inc");
        let err = Invoice::draft(
            InvoiceId::new(),
            company.id_typed(),
            &foreign,
            test_date(),
            "EUR",
            "en",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn update_draft_recomputes_totals_and_refreshes_snapshot() {
        let company = test_company(None);
        let mut customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);

        let mut details = customer.details().clone();
        details.name = "Globex Corporation".to_string();
        customer.update_details(details).unwrap();

        invoice
            .update_draft(
                changes(&customer),
                &customer,
                &[
                    line(dec!(2), dec!(50.00), VatType::Domestic),
                    line(dec!(1), dec!(10.00), VatType::IntraEuReverseCharge),
                ],
            )
            .unwrap();

        assert_eq!(invoice.totals().sub_total, dec!(110.00));
        assert_eq!(invoice.totals().tax_total, dec!(20.00));
        assert_eq!(invoice.totals().total, dec!(130.00));
        assert_eq!(invoice.currency(), "EUR");
        assert_eq!(invoice.notes(), Some("Thank you"));
        assert_eq!(invoice.customer_snapshot().name, "Globex Corporation");
    }

    #[test]
    fn update_draft_rejects_foreign_customer_without_changes() {
        let company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);
        let before = invoice.clone();

        let foreign = test_customer(CompanyId::new(), "Initech");
        let err = invoice
            .update_draft(changes(&foreign), &foreign, &[])
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(invoice, before);
    }

    #[test]
    fn update_draft_validation_failure_leaves_invoice_untouched() {
        let company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);
        let before = invoice.clone();

        let mut bad = changes(&customer);
        bad.currency = "EURO".to_string();
        assert!(matches!(
            invoice.update_draft(bad, &customer, &[]),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(invoice, before);
    }

    #[test]
    fn issue_assigns_number_and_advances_counter() {
        let mut company = test_company(Some("INV"));
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);
        invoice
            .update_draft(
                changes(&customer),
                &customer,
                &[line(dec!(2), dec!(50.00), VatType::Domestic)],
            )
            .unwrap();

        let now = Utc::now();
        let event = invoice.issue(Some(&mut company), Some(&customer), now).unwrap();

        assert_eq!(invoice.invoice_number(), "INV1");
        assert_eq!(event.invoice_number, "INV1");
        assert_eq!(invoice.status(), InvoiceStatus::Issued);
        assert_eq!(invoice.issued_at_utc(), Some(now));
        assert_eq!(invoice.totals().sub_total, dec!(100.00));
        assert_eq!(invoice.totals().tax_total, dec!(20.00));
        assert_eq!(invoice.totals().total, dec!(120.00));
        assert_eq!(company.next_invoice_number(), 2);
    }

    #[test]
    fn issued_invoice_is_immutable() {
        let mut company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);
        invoice.issue(Some(&mut company), Some(&customer), Utc::now()).unwrap();

        let err = invoice
            .update_draft(changes(&customer), &customer, &[])
            .unwrap_err();
        match err {
            DomainError::InvalidState(msg) if msg.contains("can no longer be edited") => {}
            _ => panic!("Expected InvalidState for issued invoice"),
        }

        let err = invoice
            .issue(Some(&mut company), Some(&customer), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(company.next_invoice_number(), 2);
    }

    #[test]
    fn issue_requires_company_and_customer() {
        let mut company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);

        match invoice.issue(None, Some(&customer), Utc::now()) {
            Err(DomainError::InvalidState(msg)) if msg == "missing company" => {}
            other => panic!("unexpected: {other:?}"),
        }
        match invoice.issue(Some(&mut company), None, Utc::now()) {
            Err(DomainError::InvalidState(msg)) if msg == "missing customer" => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(company.next_invoice_number(), 1);
        assert!(invoice.is_draft());
    }

    #[test]
    fn issue_rejects_company_of_another_tenant() {
        let mut other = test_company(None);
        let company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);

        assert!(matches!(
            invoice.issue(Some(&mut other), Some(&customer), Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
        assert_eq!(other.next_invoice_number(), 1);
    }

    #[test]
    fn paid_and_cancelled_require_issued() {
        let mut company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);

        assert!(invoice.mark_paid(Utc::now()).is_err());
        assert!(invoice.cancel(Utc::now()).is_err());

        invoice.issue(Some(&mut company), Some(&customer), Utc::now()).unwrap();
        let number = invoice.invoice_number().to_string();
        invoice.mark_paid(Utc::now()).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert!(invoice.is_issued());
        assert!(invoice.cancel(Utc::now()).is_err());
        assert_eq!(invoice.invoice_number(), number);
    }

    #[test]
    fn document_only_attaches_to_issued_invoices() {
        let mut company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let mut invoice = test_draft(&company, &customer);
        let doc = IssuedDocument::from_rendered(b"doc".to_vec(), "Invoice-1.pdf", Utc::now());

        assert!(matches!(
            invoice.attach_document(doc.clone()),
            Err(DomainError::InvalidState(_))
        ));

        invoice.issue(Some(&mut company), Some(&customer), Utc::now()).unwrap();
        invoice.attach_document(doc.clone()).unwrap();
        assert_eq!(invoice.document(), Some(&doc));
    }

    #[test]
    fn status_parses_from_storage_names() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Issued,
            InvoiceStatus::Paid,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("void".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn parts_roundtrip_preserves_state() {
        let company = test_company(None);
        let customer = test_customer(company.id_typed(), "Globex");
        let invoice = test_draft(&company, &customer);
        assert_eq!(Invoice::from_parts(invoice.clone().into_parts()), invoice);
    }
}
