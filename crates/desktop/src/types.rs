//! Serializable shapes exchanged with the host shell.
//!
//! Ids travel as strings and decimals as strings so no precision is lost on
//! the way through JSON.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoicedesk_core::{CompanyId, CompanyScoped, CustomerId, InvoiceId, InvoiceLineId};
use invoicedesk_infra::{InvoiceDetail, InvoiceError, InvoiceFilter, InvoiceSummary};
use invoicedesk_invoicing::{DraftChanges, Invoice, InvoiceLine, LineInput, VatType};
use invoicedesk_parties::{Company, CompanyDetails, Customer, CustomerDetails};

/// Kind of failure, one per `InvoiceError` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    InvalidState,
    Validation,
    Conflict,
    Render,
    Storage,
}

/// Failure of a command as shown to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub category: ErrorCategory,
    pub message: String,
    /// The same command may succeed when sent again unchanged.
    pub retryable: bool,
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Validation,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::InvalidState,
            message: message.into(),
            retryable: false,
        }
    }
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}: {}", self.category, self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<InvoiceError> for CommandError {
    fn from(value: InvoiceError) -> Self {
        let retryable = value.is_retryable();
        let category = match &value {
            InvoiceError::NotFound(_) => ErrorCategory::NotFound,
            InvoiceError::InvalidState(_) => ErrorCategory::InvalidState,
            InvoiceError::ValidationFailed(_) => ErrorCategory::Validation,
            InvoiceError::ConcurrencyConflict(_) => ErrorCategory::Conflict,
            InvoiceError::RenderFailed(_) => ErrorCategory::Render,
            InvoiceError::Storage(_) => ErrorCategory::Storage,
        };
        Self {
            category,
            message: value.to_string(),
            retryable,
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

pub(crate) fn parse_id<T>(field: &str, raw: &str) -> CommandResult<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| CommandError::validation(format!("invalid {field}: {e}")))
}

fn parse_decimal(field: &str, raw: &str) -> CommandResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| CommandError::validation(format!("invalid {field} '{raw}': {e}")))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// Companies

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyInput {
    pub name: String,
    pub vat_number: String,
    pub eik: Option<String>,
    pub country_code: String,
    pub address: String,
    pub bank_iban: String,
    pub bank_bic: String,
    pub invoice_number_prefix: Option<String>,
    pub logo_path: Option<String>,
    /// Only honoured on create.
    pub next_invoice_number: Option<u64>,
}

impl CompanyInput {
    pub(crate) fn into_details(self) -> (CompanyDetails, Option<u64>) {
        let details = CompanyDetails {
            name: self.name,
            vat_number: self.vat_number,
            eik: blank_to_none(self.eik),
            country_code: self.country_code,
            address: self.address,
            bank_iban: self.bank_iban,
            bank_bic: self.bank_bic,
            invoice_number_prefix: blank_to_none(self.invoice_number_prefix),
            logo_path: blank_to_none(self.logo_path),
        };
        (details, self.next_invoice_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyDto {
    pub id: String,
    pub name: String,
    pub vat_number: String,
    pub eik: Option<String>,
    pub country_code: String,
    pub address: String,
    pub bank_iban: String,
    pub bank_bic: String,
    pub invoice_number_prefix: Option<String>,
    pub logo_path: Option<String>,
    pub next_invoice_number: u64,
}

impl From<&Company> for CompanyDto {
    fn from(company: &Company) -> Self {
        let d = company.details();
        Self {
            id: company.id_typed().to_string(),
            name: d.name.clone(),
            vat_number: d.vat_number.clone(),
            eik: d.eik.clone(),
            country_code: d.country_code.clone(),
            address: d.address.clone(),
            bank_iban: d.bank_iban.clone(),
            bank_bic: d.bank_bic.clone(),
            invoice_number_prefix: d.invoice_number_prefix.clone(),
            logo_path: d.logo_path.clone(),
            next_invoice_number: company.next_invoice_number(),
        }
    }
}

// Customers

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub vat_number: Option<String>,
    pub eik: Option<String>,
    pub country_code: Option<String>,
    pub is_vat_registered: bool,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<CustomerInput> for CustomerDetails {
    fn from(input: CustomerInput) -> Self {
        CustomerDetails {
            name: input.name,
            vat_number: blank_to_none(input.vat_number),
            eik: blank_to_none(input.eik),
            country_code: blank_to_none(input.country_code),
            is_vat_registered: input.is_vat_registered,
            address: blank_to_none(input.address),
            email: blank_to_none(input.email),
            phone: blank_to_none(input.phone),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDto {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub vat_number: Option<String>,
    pub eik: Option<String>,
    pub country_code: Option<String>,
    pub is_vat_registered: bool,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&Customer> for CustomerDto {
    fn from(customer: &Customer) -> Self {
        let d = customer.details();
        Self {
            id: customer.id_typed().to_string(),
            company_id: customer.company_id().to_string(),
            name: d.name.clone(),
            vat_number: d.vat_number.clone(),
            eik: d.eik.clone(),
            country_code: d.country_code.clone(),
            is_vat_registered: d.is_vat_registered,
            address: d.address.clone(),
            email: d.email.clone(),
            phone: d.phone.clone(),
        }
    }
}

// Invoices

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineInputDto {
    /// Id of an existing line to keep; omitted for new lines.
    pub id: Option<String>,
    pub description: String,
    pub qty: String,
    pub unit_price: String,
    pub tax_rate: String,
    pub vat_type: String,
}

impl LineInputDto {
    pub(crate) fn parse(self) -> CommandResult<LineInput> {
        let id = match blank_to_none(self.id) {
            Some(raw) => Some(parse_id::<InvoiceLineId>("line id", &raw)?),
            None => None,
        };
        let vat_type = VatType::from_str(self.vat_type.trim())
            .map_err(|e| CommandError::validation(e.to_string()))?;
        Ok(LineInput {
            id,
            qty: parse_decimal("qty", &self.qty)?,
            unit_price: parse_decimal("unit price", &self.unit_price)?,
            tax_rate: parse_decimal("tax rate", &self.tax_rate)?,
            description: self.description,
            vat_type,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftInput {
    pub customer_id: String,
    pub issue_date: NaiveDate,
    pub currency: String,
    pub language: String,
    pub notes: Option<String>,
    pub lines: Vec<LineInputDto>,
}

impl DraftInput {
    pub(crate) fn parse(self) -> CommandResult<(DraftChanges, Vec<LineInput>)> {
        let changes = DraftChanges {
            customer_id: parse_id::<CustomerId>("customer id", &self.customer_id)?,
            issue_date: self.issue_date,
            currency: self.currency,
            language: self.language,
            notes: blank_to_none(self.notes),
        };
        let lines = self
            .lines
            .into_iter()
            .map(LineInputDto::parse)
            .collect::<CommandResult<Vec<_>>>()?;
        Ok((changes, lines))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDto {
    pub id: String,
    pub description: String,
    pub qty: String,
    pub unit_price: String,
    pub tax_rate: String,
    pub vat_type: String,
    pub line_total: String,
}

impl From<&InvoiceLine> for LineDto {
    fn from(line: &InvoiceLine) -> Self {
        Self {
            id: line.id.to_string(),
            description: line.description.clone(),
            qty: line.qty.to_string(),
            unit_price: line.unit_price.to_string(),
            tax_rate: line.tax_rate.to_string(),
            vat_type: line.vat_type.as_str().to_string(),
            line_total: line.line_total.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDto {
    pub id: String,
    pub company_id: String,
    pub customer_id: String,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub issued_at_utc: Option<DateTime<Utc>>,
    pub status: String,
    pub currency: String,
    pub language: String,
    pub customer_name: String,
    pub customer_address: Option<String>,
    pub customer_vat_number: Option<String>,
    pub notes: Option<String>,
    pub sub_total: String,
    pub tax_total: String,
    pub total: String,
    pub lines: Vec<LineDto>,
    /// SHA-256 of the stored document, once rendered.
    pub document_sha256: Option<String>,
    /// Current customer record; `None` if it no longer resolves.
    pub customer: Option<CustomerDto>,
}

impl From<&Invoice> for InvoiceDto {
    fn from(invoice: &Invoice) -> Self {
        let snapshot = invoice.customer_snapshot();
        let totals = invoice.totals();
        Self {
            id: invoice.id_typed().to_string(),
            company_id: invoice.company_id().to_string(),
            customer_id: invoice.customer_id().to_string(),
            invoice_number: invoice.invoice_number().to_string(),
            issue_date: invoice.issue_date(),
            issued_at_utc: invoice.issued_at_utc(),
            status: invoice.status().as_str().to_string(),
            currency: invoice.currency().to_string(),
            language: invoice.language().to_string(),
            customer_name: snapshot.name.clone(),
            customer_address: snapshot.address.clone(),
            customer_vat_number: snapshot.vat_number.clone(),
            notes: invoice.notes().map(str::to_string),
            sub_total: totals.sub_total.to_string(),
            tax_total: totals.tax_total.to_string(),
            total: totals.total.to_string(),
            lines: invoice.lines().iter().map(LineDto::from).collect(),
            document_sha256: invoice.document().map(|d| d.sha256().to_string()),
            customer: None,
        }
    }
}

impl From<&InvoiceDetail> for InvoiceDto {
    fn from(detail: &InvoiceDetail) -> Self {
        let mut dto = InvoiceDto::from(&detail.invoice);
        dto.customer = detail.customer.as_ref().map(CustomerDto::from);
        dto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummaryDto {
    pub id: String,
    pub customer_id: String,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub status: String,
    pub currency: String,
    pub customer_name: String,
    pub total: String,
}

impl From<&InvoiceSummary> for InvoiceSummaryDto {
    fn from(summary: &InvoiceSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            customer_id: summary.customer_id.to_string(),
            invoice_number: summary.invoice_number.clone(),
            issue_date: summary.issue_date,
            status: summary.status.as_str().to_string(),
            currency: summary.currency.clone(),
            customer_name: summary.customer_name.clone(),
            total: summary.total.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchInput {
    pub text: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub customer_id: Option<String>,
}

impl SearchInput {
    pub(crate) fn parse(self) -> CommandResult<InvoiceFilter> {
        let customer_id = match blank_to_none(self.customer_id) {
            Some(raw) => Some(parse_id::<CustomerId>("customer id", &raw)?),
            None => None,
        };
        Ok(InvoiceFilter {
            text: self.text,
            date_from: self.date_from,
            date_to: self.date_to,
            customer_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDto {
    pub path: String,
}

pub(crate) fn company_id(raw: &str) -> CommandResult<CompanyId> {
    parse_id("company id", raw)
}

pub(crate) fn customer_id(raw: &str) -> CommandResult<CustomerId> {
    parse_id("customer id", raw)
}

pub(crate) fn invoice_id(raw: &str) -> CommandResult<InvoiceId> {
    parse_id("invoice id", raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_input_parses_decimals_and_vat_type() {
        let line = LineInputDto {
            id: Some("  ".to_string()),
            description: "Consulting".to_string(),
            qty: " 1.5 ".to_string(),
            unit_price: "100.00".to_string(),
            tax_rate: "0.20".to_string(),
            vat_type: "IntraEuReverseCharge".to_string(),
        }
        .parse()
        .unwrap();
        assert_eq!(line.id, None);
        assert_eq!(line.qty, dec!(1.5));
        assert_eq!(line.vat_type, VatType::IntraEuReverseCharge);
    }

    #[test]
    fn malformed_input_is_a_validation_error() {
        let bad_qty = LineInputDto {
            qty: "one".to_string(),
            unit_price: "1".to_string(),
            tax_rate: "0".to_string(),
            vat_type: "Domestic".to_string(),
            ..LineInputDto::default()
        };
        assert_eq!(bad_qty.parse().unwrap_err().category, ErrorCategory::Validation);

        let bad_id = invoice_id("not-a-uuid").unwrap_err();
        assert_eq!(bad_id.category, ErrorCategory::Validation);
        assert!(!bad_id.retryable);
    }

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = CommandError::from(InvoiceError::ConcurrencyConflict("x".into()));
        assert_eq!(conflict.category, ErrorCategory::Conflict);
        assert!(conflict.retryable);

        let render = CommandError::from(InvoiceError::RenderFailed("x".into()));
        assert_eq!(render.category, ErrorCategory::Render);
        assert!(!render.retryable);
    }

    #[test]
    fn error_category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::InvalidState).unwrap(),
            "\"invalid_state\""
        );
    }
}
