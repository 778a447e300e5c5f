//! Infrastructure layer: storage, rendering, configuration and the services
//! that orchestrate the invoicing domain on top of them.

pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod render;
pub mod repository;
pub mod snapshot;
pub mod store;
pub mod workers;


pub use config::AppConfig;
pub use directory::DirectoryService;
pub use error::{InvoiceError, InvoiceResult};
pub use lifecycle::{InvoiceDetail, InvoiceEnvelope, InvoiceService};
pub use render::{DocumentRenderer, HtmlInvoiceRenderer, RenderError};
pub use repository::InvoiceRepository;
pub use snapshot::PdfSnapshotCache;
pub use store::{
    InMemoryInvoiceStore, InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel,
    PostgresInvoiceStore, StoreError, StoreTransaction,
};
pub use workers::{SnapshotWorker, WorkerHandle};
