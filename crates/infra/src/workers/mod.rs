//! Background consumers of the invoice event bus.

pub mod snapshot_worker;

pub use snapshot_worker::{SnapshotWorker, WorkerHandle};
