use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicedesk_core::{CompanyId, InvoiceId};
use invoicedesk_events::Event;

/// Event: InvoiceIssued. Published once the issuing transaction committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub company_id: CompanyId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub company_id: CompanyId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub company_id: CompanyId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoicePaid(InvoicePaid),
    InvoiceCancelled(InvoiceCancelled),
}

impl InvoiceEvent {
    pub fn company_id(&self) -> CompanyId {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.company_id,
            InvoiceEvent::InvoicePaid(e) => e.company_id,
            InvoiceEvent::InvoiceCancelled(e) => e.company_id,
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.invoice_id,
            InvoiceEvent::InvoicePaid(e) => e.invoice_id,
            InvoiceEvent::InvoiceCancelled(e) => e.invoice_id,
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::InvoicePaid(_) => "invoicing.invoice.paid",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoicePaid(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_names_are_stable_and_carry_business_time() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let company_id = CompanyId::new();
        let invoice_id = InvoiceId::new();

        let issued = InvoiceEvent::InvoiceIssued(InvoiceIssued {
            company_id,
            invoice_id,
            invoice_number: "INV1".to_string(),
            occurred_at: at,
        });
        let paid = InvoiceEvent::InvoicePaid(InvoicePaid { company_id, invoice_id, occurred_at: at });
        let cancelled =
            InvoiceEvent::InvoiceCancelled(InvoiceCancelled { company_id, invoice_id, occurred_at: at });

        assert_eq!(issued.event_type(), "invoicing.invoice.issued");
        assert_eq!(paid.event_type(), "invoicing.invoice.paid");
        assert_eq!(cancelled.event_type(), "invoicing.invoice.cancelled");
        for event in [&issued, &paid, &cancelled] {
            assert_eq!(event.version(), 1);
            assert_eq!(event.occurred_at(), at);
            assert_eq!(event.invoice_id(), invoice_id);
        }
    }
}
