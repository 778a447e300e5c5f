use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invoicedesk_core::{AggregateRoot, CompanyId};

use crate::event::Event;

/// Envelope for an event, carrying the tenant and the aggregate it is about.
///
/// Consumers must use `company_id` to scope any lookup they perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    company_id: CompanyId,

    aggregate_id: Uuid,
    aggregate_type: String,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        company_id: CompanyId,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            company_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
        }
    }

    /// Wrap an event emitted by aggregate `A`, with a fresh UUIDv7 event id.
    pub fn for_aggregate<A>(company_id: CompanyId, aggregate_id: impl Into<Uuid>, payload: E) -> Self
    where
        A: AggregateRoot,
        E: Event,
    {
        Self::new(Uuid::now_v7(), company_id, aggregate_id.into(), A::TYPE_NAME, payload)
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
