//! Invoice numbering rules.
//!
//! Drafts carry a placeholder built from [`DRAFT_NUMBER_MARKER`]; permanent
//! numbers are `prefix + counter` (no separator) or the bare counter. The
//! counter itself is owned by [`Company`] and must only be advanced inside
//! the transaction that also persists the issued invoice.

use chrono::{DateTime, Utc};
use rand::Rng;

use invoicedesk_core::{CompanyId, DomainResult};
use invoicedesk_parties::{Company, DRAFT_NUMBER_MARKER};

/// Placeholder number for a fresh draft:
/// `DRAFT-{company}-{yyyyMMddHHmmssfff}-{4 random digits}`.
///
/// Fits the 64 character number column.
pub fn draft_number(company_id: CompanyId, now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!(
        "{DRAFT_NUMBER_MARKER}-{}-{}-{suffix}",
        company_id.as_uuid().simple(),
        now.format("%Y%m%d%H%M%S%3f"),
    )
}

pub fn is_draft_number(number: &str) -> bool {
    number
        .strip_prefix(DRAFT_NUMBER_MARKER)
        .is_some_and(|rest| rest.starts_with('-'))
}

/// `prefix + counter`, or the bare counter when the prefix is absent or blank.
pub fn format_invoice_number(prefix: Option<&str>, counter: u64) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}{counter}"),
        None => counter.to_string(),
    }
}

/// Take the company's next counter value and format it.
///
/// Advances the counter by exactly one. Callers hold the company row inside
/// the issuing transaction so a rollback discards the increment.
pub fn allocate(company: &mut Company) -> DomainResult<String> {
    let counter = company.take_next_invoice_number()?;
    Ok(format_invoice_number(company.invoice_number_prefix(), counter))
}
