//! Parties domain module: companies (tenants) and their customers.
//!
//! Pure domain logic (no IO, no storage). Persistence lives in
//! `invoicedesk-infra`, which only ever hands these entities back after
//! validating them here.

pub mod company;
pub mod customer;
mod fields;

pub use company::{Company, CompanyDetails, DRAFT_NUMBER_MARKER};
pub use customer::{Customer, CustomerDetails, CustomerSnapshot};
