//! Transactional storage of companies, customers and invoices.
//!
//! [`InvoiceStore`] hands out [`StoreTransaction`]s; the services never touch
//! rows outside one. Two backends share the same contract:
//! [`InMemoryInvoiceStore`] for tests and database-less runs, and
//! [`PostgresInvoiceStore`] for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryInvoiceStore, InMemoryTransaction};
pub use postgres::{PostgresInvoiceStore, PostgresTransaction};
pub use r#trait::{
    InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel, StoreError, StoreTransaction,
};
