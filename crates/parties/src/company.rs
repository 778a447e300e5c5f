use serde::{Deserialize, Serialize};

use invoicedesk_core::{AggregateRoot, CompanyId, CompanyScoped, DomainError, DomainResult, Entity};

use crate::fields;

/// Literal that starts every placeholder number given to a draft invoice.
///
/// Permanent numbers are built from the company prefix and counter, so a
/// prefix may never start with this marker.
pub const DRAFT_NUMBER_MARKER: &str = "DRAFT";

/// Editable legal and banking details of a company.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompanyDetails {
    pub name: String,
    pub vat_number: String,
    /// National registry id, optional.
    pub eik: Option<String>,
    pub country_code: String,
    pub address: String,
    pub bank_iban: String,
    pub bank_bic: String,
    pub invoice_number_prefix: Option<String>,
    pub logo_path: Option<String>,
}

impl CompanyDetails {
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.vat_number = self.vat_number.trim().to_string();
        self.country_code = self.country_code.trim().to_uppercase();
        self.address = self.address.trim().to_string();
        self.bank_iban = self.bank_iban.trim().to_string();
        self.bank_bic = self.bank_bic.trim().to_string();
        self.eik = fields::normalize(self.eik);
        self.invoice_number_prefix = fields::normalize(self.invoice_number_prefix);
        self.logo_path = fields::normalize(self.logo_path);
        self
    }

    fn validate(&self) -> DomainResult<()> {
        fields::required("company name", &self.name, 200)?;
        fields::required("VAT number", &self.vat_number, 50)?;
        fields::registry_id("EIK", self.eik.as_deref())?;
        fields::required("country code", &self.country_code, 8)?;
        fields::optional("address", Some(&self.address), 400)?;
        fields::optional("IBAN", Some(&self.bank_iban), 64)?;
        fields::optional("BIC", Some(&self.bank_bic), 32)?;
        fields::optional("logo path", self.logo_path.as_deref(), 400)?;

        if let Some(prefix) = &self.invoice_number_prefix {
            fields::optional("invoice number prefix", Some(prefix), 32)?;
            if prefix.chars().any(char::is_whitespace) {
                return Err(DomainError::validation(
                    "invoice number prefix must not contain whitespace",
                ));
            }
            if prefix.to_uppercase().starts_with(DRAFT_NUMBER_MARKER) {
                return Err(DomainError::validation(format!(
                    "invoice number prefix must not start with {DRAFT_NUMBER_MARKER}"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Company, the tenant boundary.
///
/// Owns the per-company invoice counter. The counter starts at 1, only ever
/// increases, and is only advanced through [`Company::take_next_invoice_number`],
/// which the issuing transaction calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    id: CompanyId,
    details: CompanyDetails,
    next_invoice_number: u64,
}

impl Company {
    /// Register a new company with its counter at 1.
    pub fn register(id: CompanyId, details: CompanyDetails) -> DomainResult<Self> {
        let details = details.normalized();
        details.validate()?;
        Ok(Self {
            id,
            details,
            next_invoice_number: 1,
        })
    }

    /// Rehydrate a stored company.
    pub fn from_parts(
        id: CompanyId,
        details: CompanyDetails,
        next_invoice_number: u64,
    ) -> DomainResult<Self> {
        Self::register(id, details)?.with_next_invoice_number(next_invoice_number)
    }

    /// Seed the counter of a company that is not persisted yet, e.g. when
    /// numbering continues from a previous system.
    pub fn with_next_invoice_number(mut self, next: u64) -> DomainResult<Self> {
        if next == 0 {
            return Err(DomainError::validation(
                "next invoice number must be at least 1",
            ));
        }
        self.next_invoice_number = next;
        Ok(self)
    }

    /// Replace the editable details. The counter is left untouched.
    pub fn update_details(&mut self, details: CompanyDetails) -> DomainResult<()> {
        let details = details.normalized();
        details.validate()?;
        self.details = details;
        Ok(())
    }

    /// Return the current counter value and advance it by exactly one.
    pub fn take_next_invoice_number(&mut self) -> DomainResult<u64> {
        let current = self.next_invoice_number;
        self.next_invoice_number = current
            .checked_add(1)
            .ok_or_else(|| DomainError::invalid_state("invoice counter exhausted"))?;
        Ok(current)
    }

    pub fn id_typed(&self) -> CompanyId {
        self.id
    }

    pub fn details(&self) -> &CompanyDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    /// Prefix for permanent invoice numbers, if configured.
    pub fn invoice_number_prefix(&self) -> Option<&str> {
        self.details.invoice_number_prefix.as_deref()
    }

    pub fn next_invoice_number(&self) -> u64 {
        self.next_invoice_number
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CompanyScoped for Company {
    fn company_id(&self) -> CompanyId {
        self.id
    }
}

impl AggregateRoot for Company {
    const TYPE_NAME: &'static str = "company";
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_details() -> CompanyDetails {
        CompanyDetails {
            name: "Acme Ltd".to_string(),
            vat_number: "BG123456789".to_string(),
            eik: Some("123456789".to_string()),
            country_code: "bg".to_string(),
            address: "1 Main St, Sofia".to_string(),
            bank_iban: "BG80BNBG96611020345678".to_string(),
            bank_bic: "BNBGBGSD".to_string(),
            invoice_number_prefix: Some("INV".to_string()),
            logo_path: None,
        }
    }

    #[test]
    fn register_starts_counter_at_one_and_normalizes() {
        let company = Company::register(CompanyId::new(), test_details()).unwrap();
        assert_eq!(company.next_invoice_number(), 1);
        assert_eq!(company.details().country_code, "BG");
        assert_eq!(company.invoice_number_prefix(), Some("INV"));
    }

    #[test]
    fn blank_prefix_is_treated_as_none() {
        let mut details = test_details();
        details.invoice_number_prefix = Some("   ".to_string());
        let company = Company::register(CompanyId::new(), details).unwrap();
        assert_eq!(company.invoice_number_prefix(), None);
    }

    #[test]
    fn register_rejects_missing_name() {
        let mut details = test_details();
        details.name = "  ".to_string();
        let err = Company::register(CompanyId::new(), details).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("company name") => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn register_rejects_malformed_eik() {
        let mut details = test_details();
        details.eik = Some("12-34".to_string());
        assert!(matches!(
            Company::register(CompanyId::new(), details),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn prefix_may_not_collide_with_draft_marker() {
        let mut details = test_details();
        details.invoice_number_prefix = Some("draft-".to_string());
        let err = Company::register(CompanyId::new(), details).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains(DRAFT_NUMBER_MARKER) => {}
            _ => panic!("Expected Validation error for reserved prefix"),
        }
    }

    #[test]
    fn prefix_may_not_contain_whitespace() {
        let mut details = test_details();
        details.invoice_number_prefix = Some("IN V".to_string());
        assert!(Company::register(CompanyId::new(), details).is_err());
    }

    #[test]
    fn counter_seed_must_be_positive() {
        let company = Company::register(CompanyId::new(), test_details()).unwrap();
        assert!(company.clone().with_next_invoice_number(0).is_err());
        assert_eq!(
            company.with_next_invoice_number(42).unwrap().next_invoice_number(),
            42
        );
    }

    #[test]
    fn update_details_keeps_counter() {
        let mut company = Company::from_parts(CompanyId::new(), test_details(), 7).unwrap();
        let mut details = test_details();
        details.name = "Acme Holdings".to_string();
        company.update_details(details).unwrap();
        assert_eq!(company.name(), "Acme Holdings");
        assert_eq!(company.next_invoice_number(), 7);
    }

    #[test]
    fn failed_update_leaves_company_unchanged() {
        let mut company = Company::register(CompanyId::new(), test_details()).unwrap();
        let before = company.clone();
        let mut details = test_details();
        details.vat_number = String::new();
        assert!(company.update_details(details).is_err());
        assert_eq!(company, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        #[test]
        fn take_next_invoice_number_is_dense(start in 1u64..1_000_000, n in 1usize..50) {
            let mut company = Company::from_parts(CompanyId::new(), test_details(), start).unwrap();
            let taken: Vec<u64> = (0..n).map(|_| company.take_next_invoice_number().unwrap()).collect();
            let expected: Vec<u64> = (start..start + n as u64).collect();
            prop_assert_eq!(taken, expected);
            prop_assert_eq!(company.next_invoice_number(), start + n as u64);
        }
    }
}
