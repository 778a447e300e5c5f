use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use invoicedesk_core::{DomainError, DomainResult};

/// The rendered document frozen onto an issued invoice.
///
/// `sha256` is the lowercase hex digest of `bytes`; [`IssuedDocument::verify`]
/// checks that the two still agree.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedDocument {
    bytes: Vec<u8>,
    file_name: String,
    sha256: String,
    created_at_utc: DateTime<Utc>,
}

impl IssuedDocument {
    /// Wrap freshly rendered bytes, hashing them.
    pub fn from_rendered(bytes: Vec<u8>, file_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let sha256 = content_hash(&bytes);
        Self {
            bytes,
            file_name: file_name.into(),
            sha256,
            created_at_utc: now,
        }
    }

    /// Rehydrate a stored document.
    pub fn from_parts(
        bytes: Vec<u8>,
        file_name: String,
        sha256: String,
        created_at_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            bytes,
            file_name,
            sha256,
            created_at_utc,
        }
    }

    /// `Invoice-{number}.pdf`
    pub fn file_name_for(invoice_number: &str) -> String {
        format!("Invoice-{invoice_number}.pdf")
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at_utc
    }

    /// Fails with `InvalidState` when the stored hash no longer matches the bytes.
    pub fn verify(&self) -> DomainResult<()> {
        if content_hash(&self.bytes) != self.sha256 {
            return Err(DomainError::invalid_state(format!(
                "stored document {} does not match its hash",
                self.file_name
            )));
        }
        Ok(())
    }
}

// Bytes are elided from debug output.
impl core::fmt::Debug for IssuedDocument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IssuedDocument")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .field("created_at_utc", &self.created_at_utc)
            .finish()
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verify_detects_tampering() {
        let doc = IssuedDocument::from_rendered(b"%PDF".to_vec(), "Invoice-1.pdf", Utc::now());
        assert!(doc.verify().is_ok());

        let tampered = IssuedDocument::from_parts(
            b"%PDF!".to_vec(),
            doc.file_name().to_string(),
            doc.sha256().to_string(),
            doc.created_at_utc(),
        );
        assert!(matches!(tampered.verify(), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn file_name_follows_invoice_number() {
        assert_eq!(IssuedDocument::file_name_for("INV7"), "Invoice-INV7.pdf");
    }
}
