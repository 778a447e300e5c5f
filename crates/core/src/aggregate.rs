//! Aggregate root trait.

use crate::entity::{CompanyScoped, Entity};

/// Aggregate root marker.
///
/// An aggregate root is the only entry point for mutating the entities it owns
/// (an invoice owns its lines). Aggregates are always company scoped, and they
/// hold foreign keys to other aggregates rather than live references.
pub trait AggregateRoot: Entity + CompanyScoped {
    /// Stable type name, used in event envelopes and log fields.
    const TYPE_NAME: &'static str;
}
