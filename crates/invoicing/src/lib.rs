//! Invoicing domain module.
//!
//! Monetary math, invoice numbering and the `Invoice` aggregate with its
//! Draft → Issued state machine. Everything here is deterministic given its
//! inputs (the clock and the random draft suffix are passed in or isolated in
//! [`numbering::draft_number`]); transactions and IO live in `invoicedesk-infra`.

pub mod document;
pub mod event;
pub mod invoice;
pub mod line;
pub mod money;
pub mod numbering;

pub use document::{IssuedDocument, content_hash};
pub use event::{InvoiceCancelled, InvoiceEvent, InvoiceIssued, InvoicePaid};
pub use invoice::{DraftChanges, Invoice, InvoiceParts, InvoiceStatus, normalize_language};
pub use line::{InvoiceLine, LineInput};
pub use money::{InvoiceTotals, LineAmounts, VatType};
