use serde::{Deserialize, Serialize};

use invoicedesk_core::{
    AggregateRoot, CompanyId, CompanyScoped, CustomerId, DomainResult, Entity, ValueObject,
};

use crate::fields;

/// Editable details of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub vat_number: Option<String>,
    pub eik: Option<String>,
    pub country_code: Option<String>,
    pub is_vat_registered: bool,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CustomerDetails {
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.vat_number = fields::normalize(self.vat_number);
        self.eik = fields::normalize(self.eik);
        self.country_code = fields::normalize(self.country_code).map(|c| c.to_uppercase());
        self.address = fields::normalize(self.address);
        self.email = fields::normalize(self.email);
        self.phone = fields::normalize(self.phone);
        self
    }

    fn validate(&self) -> DomainResult<()> {
        fields::required("customer name", &self.name, 200)?;
        fields::optional("VAT number", self.vat_number.as_deref(), 50)?;
        fields::registry_id("EIK", self.eik.as_deref())?;
        fields::optional("country code", self.country_code.as_deref(), 8)?;
        fields::optional("address", self.address.as_deref(), 400)?;
        fields::optional("email", self.email.as_deref(), 200)?;
        fields::optional("phone", self.phone.as_deref(), 50)?;
        Ok(())
    }
}

/// Point-in-time copy of the customer fields printed on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub address: Option<String>,
    pub vat_number: Option<String>,
}

impl ValueObject for CustomerSnapshot {}

/// Aggregate root: Customer. Belongs to exactly one company for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    company_id: CompanyId,
    details: CustomerDetails,
}

impl Customer {
    pub fn register(
        id: CustomerId,
        company_id: CompanyId,
        details: CustomerDetails,
    ) -> DomainResult<Self> {
        let details = details.normalized();
        details.validate()?;
        Ok(Self {
            id,
            company_id,
            details,
        })
    }

    pub fn update_details(&mut self, details: CustomerDetails) -> DomainResult<()> {
        let details = details.normalized();
        details.validate()?;
        self.details = details;
        Ok(())
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn details(&self) -> &CustomerDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    /// Copy of the fields an invoice freezes at save and issue time.
    pub fn snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            name: self.details.name.clone(),
            address: self.details.address.clone(),
            vat_number: self.details.vat_number.clone(),
        }
    }

    /// Case-insensitive match on name or email, used by customer search.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.details.name.to_lowercase().contains(&needle)
            || self
                .details
                .email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains(&needle))
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CompanyScoped for Customer {
    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

impl AggregateRoot for Customer {
    const TYPE_NAME: &'static str = "customer";
}
