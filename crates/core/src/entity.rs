//! Entity trait: identity + continuity across state changes.

use crate::id::CompanyId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity that lives inside exactly one company.
///
/// Repositories use this to reject rows that leak across the tenant boundary.
pub trait CompanyScoped {
    fn company_id(&self) -> CompanyId;

    /// `true` when the entity belongs to `company_id`.
    fn belongs_to(&self, company_id: CompanyId) -> bool {
        self.company_id() == company_id
    }
}
