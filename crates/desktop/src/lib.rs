//! `invoicedesk-desktop`
//!
//! **Responsibility:** Host boundary of the desktop application.
//!
//! This crate provides:
//! - `AppState`: the wired services plus the active company
//! - One command function per user action, scoped to the active company
//! - Serializable DTOs and a categorised `CommandError`
//! - Startup that picks the Postgres or in-memory store from configuration
//!
//! The window shell calls into these commands; it never touches the store.

pub mod bootstrap;
pub mod commands;
pub mod types;

pub use bootstrap::{Backend, start};
pub use commands::AppState;
pub use types::{CommandError, CommandResult, ErrorCategory};
