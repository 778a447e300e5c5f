//! `invoicedesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model and the entity/aggregate markers.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::{CompanyScoped, Entity};
pub use error::{DomainError, DomainResult};
pub use id::{CompanyId, CustomerId, InvoiceId, InvoiceLineId};
pub use value_object::ValueObject;
