use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use invoicedesk_core::CompanyId;
use invoicedesk_events::{Event, Subscription};
use invoicedesk_invoicing::InvoiceEvent;

use crate::error::InvoiceResult;
use crate::lifecycle::InvoiceEnvelope;
use crate::render::DocumentRenderer;
use crate::snapshot::PdfSnapshotCache;
use crate::store::InvoiceStore;

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to finish its current message.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Renders the document of freshly issued invoices.
///
/// Consumes `InvoiceIssued` from the bus after the issuing transaction has
/// committed. Failures are logged and left for a later export to retry; they
/// never touch the issued invoice. Delivery is at-least-once, so handling is
/// idempotent: an invoice that already has a document is left alone.
pub struct SnapshotWorker<S, R> {
    cache: Arc<PdfSnapshotCache<S, R>>,
    company_id: Option<CompanyId>,
}

impl<S, R> SnapshotWorker<S, R>
where
    S: InvoiceStore + 'static,
    S::Tx: 'static,
    R: DocumentRenderer + 'static,
{
    pub fn new(cache: Arc<PdfSnapshotCache<S, R>>) -> Self {
        Self {
            cache,
            company_id: None,
        }
    }

    /// Ignore events of other companies.
    pub fn for_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    /// Handle one message.
    pub async fn handle(&self, envelope: &InvoiceEnvelope) -> InvoiceResult<()> {
        if self.company_id.is_some_and(|id| id != envelope.company_id()) {
            return Ok(());
        }
        match envelope.payload() {
            InvoiceEvent::InvoiceIssued(issued) => {
                self.cache
                    .ensure_snapshot(issued.company_id, issued.invoice_id, false)
                    .await?;
                debug!(
                    event_type = envelope.payload().event_type(),
                    invoice_number = %issued.invoice_number,
                    "issued invoice rendered"
                );
                Ok(())
            }
            InvoiceEvent::InvoicePaid(_) | InvoiceEvent::InvoiceCancelled(_) => Ok(()),
        }
    }

    /// Run on the tokio runtime until the subscription closes or shutdown is requested.
    pub fn spawn(self, mut subscription: Subscription<InvoiceEnvelope>) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            info!("snapshot worker started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    message = subscription.recv() => match message {
                        Some(envelope) => {
                            if let Err(err) = self.handle(&envelope).await {
                                warn!(
                                    event_type = envelope.payload().event_type(),
                                    version = envelope.payload().version(),
                                    invoice_id = %envelope.payload().invoice_id(),
                                    error = %err,
                                    "snapshot worker failed to render issued invoice"
                                );
                            }
                        }
                        None => break,
                    },
                }
            }
            info!("snapshot worker stopped");
        });

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}
