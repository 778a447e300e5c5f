//! Postgres-backed store.
//!
//! Schema lives in `migrations/`. Isolation is chosen per transaction with
//! `SET TRANSACTION ISOLATION LEVEL` as the first statement.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `40001` | serialization failure | `Conflict` |
//! | `40P01` | deadlock detected | `Conflict` |
//! | `23505` | unique violation (invoice number) | `Conflict` |
//! | `23503` | foreign key violation (restrict delete) | `Constraint` |
//! | other / connection errors | | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use invoicedesk_core::{CompanyId, CompanyScoped, CustomerId, Entity, InvoiceId, InvoiceLineId};
use invoicedesk_invoicing::{
    Invoice, InvoiceLine, InvoiceParts, InvoiceStatus, InvoiceTotals, IssuedDocument,
};
use invoicedesk_parties::{Company, CompanyDetails, Customer, CustomerDetails, CustomerSnapshot};

use super::r#trait::{
    InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel, StoreError, StoreTransaction,
};

/// Postgres implementation of [`InvoiceStore`].
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: PgPool,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    type Tx = PostgresTransaction;

    #[instrument(skip(self), err)]
    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let statement = match isolation {
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
        };
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PostgresTransaction { tx })
    }
}

/// Open Postgres transaction. Dropped without commit, sqlx rolls it back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl core::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

const COMPANY_COLUMNS: &str = "id, name, vat_number, eik, country_code, address, bank_iban, \
     bank_bic, invoice_number_prefix, logo_path, next_invoice_number";

const CUSTOMER_COLUMNS: &str = "id, company_id, name, vat_number, eik, country_code, \
     is_vat_registered, address, email, phone";

const INVOICE_HEADER_COLUMNS: &str = "id, company_id, customer_id, invoice_number, issue_date, \
     issued_at_utc, status, currency, language, sub_total, tax_total, total, customer_name, \
     customer_address, customer_vat_number, notes";

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn load_company(&mut self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_company", e))?;

        row.map(|r| Company::try_from(decode::<CompanyRow>(&r)?))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_companies(&mut self) -> Result<Vec<Company>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies ORDER BY name, id"
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_companies", e))?;

        rows.iter()
            .map(|r| Company::try_from(decode::<CompanyRow>(r)?))
            .collect()
    }

    #[instrument(skip(self, company), fields(company_id = %company.id()), err)]
    async fn save_company(&mut self, company: &Company) -> Result<(), StoreError> {
        let d = company.details();
        let next = i64::try_from(company.next_invoice_number())
            .map_err(|_| StoreError::Backend("invoice counter out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO companies (
                id, name, vat_number, eik, country_code, address, bank_iban, bank_bic,
                invoice_number_prefix, logo_path, next_invoice_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                vat_number = EXCLUDED.vat_number,
                eik = EXCLUDED.eik,
                country_code = EXCLUDED.country_code,
                address = EXCLUDED.address,
                bank_iban = EXCLUDED.bank_iban,
                bank_bic = EXCLUDED.bank_bic,
                invoice_number_prefix = EXCLUDED.invoice_number_prefix,
                logo_path = EXCLUDED.logo_path,
                next_invoice_number = EXCLUDED.next_invoice_number
            "#,
        )
        .bind(company.id().as_uuid())
        .bind(&d.name)
        .bind(&d.vat_number)
        .bind(&d.eik)
        .bind(&d.country_code)
        .bind(&d.address)
        .bind(&d.bank_iban)
        .bind(&d.bank_bic)
        .bind(&d.invoice_number_prefix)
        .bind(&d.logo_path)
        .bind(next)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_company", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn delete_company(&mut self, id: CompanyId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_company", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %id), err)]
    async fn load_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE company_id = $1 AND id = $2"
        ))
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_customer", e))?;

        row.map(|r| Customer::try_from(decode::<CustomerRow>(&r)?))
            .transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_customers(&mut self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE company_id = $1 ORDER BY name, id"
        ))
        .bind(company_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter()
            .map(|r| Customer::try_from(decode::<CustomerRow>(r)?))
            .collect()
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id()), err)]
    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let d = customer.details();
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, company_id, name, vat_number, eik, country_code, is_vat_registered,
                address, email, phone
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                vat_number = EXCLUDED.vat_number,
                eik = EXCLUDED.eik,
                country_code = EXCLUDED.country_code,
                is_vat_registered = EXCLUDED.is_vat_registered,
                address = EXCLUDED.address,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone
            WHERE customers.company_id = EXCLUDED.company_id
            "#,
        )
        .bind(customer.id().as_uuid())
        .bind(customer.company_id().as_uuid())
        .bind(&d.name)
        .bind(&d.vat_number)
        .bind(&d.eik)
        .bind(&d.country_code)
        .bind(d.is_vat_registered)
        .bind(&d.address)
        .bind(&d.email)
        .bind(&d.phone)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_customer", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %id), err)]
    async fn delete_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM customers WHERE company_id = $1 AND id = $2")
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id), err)]
    async fn load_invoice(
        &mut self,
        company_id: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_HEADER_COLUMNS}, pdf_bytes, pdf_file_name, pdf_sha256, \
             pdf_created_at_utc FROM invoices WHERE company_id = $1 AND id = $2"
        ))
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_invoice", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = decode::<InvoiceRow>(&row)?;
        let document = decode::<DocumentRow>(&row)?.into_document();

        let line_rows = sqlx::query(
            r#"
            SELECT id, company_id, description, qty, unit_price, tax_rate, vat_type, line_total
            FROM invoice_lines
            WHERE invoice_id = $1 AND company_id = $2
            ORDER BY position
            "#,
        )
        .bind(id.as_uuid())
        .bind(company_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_invoice_lines", e))?;

        let lines = line_rows
            .iter()
            .map(|r| InvoiceLine::try_from(decode::<LineRow>(r)?))
            .collect::<Result<Vec<InvoiceLine>, StoreError>>()?;

        Ok(Some(header.into_invoice(lines, document)?))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id()), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let snapshot = invoice.customer_snapshot();
        let totals = invoice.totals();
        let document = invoice.document();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, company_id, customer_id, invoice_number, issue_date, issued_at_utc,
                status, currency, language, sub_total, tax_total, total, customer_name,
                customer_address, customer_vat_number, notes,
                pdf_bytes, pdf_file_name, pdf_sha256, pdf_created_at_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20)
            "#,
        )
        .bind(invoice.id().as_uuid())
        .bind(invoice.company_id().as_uuid())
        .bind(invoice.customer_id().as_uuid())
        .bind(invoice.invoice_number())
        .bind(invoice.issue_date())
        .bind(invoice.issued_at_utc())
        .bind(invoice.status().as_str())
        .bind(invoice.currency())
        .bind(invoice.language())
        .bind(totals.sub_total)
        .bind(totals.tax_total)
        .bind(totals.total)
        .bind(&snapshot.name)
        .bind(&snapshot.address)
        .bind(&snapshot.vat_number)
        .bind(invoice.notes())
        .bind(document.map(IssuedDocument::bytes))
        .bind(document.map(IssuedDocument::file_name))
        .bind(document.map(IssuedDocument::sha256))
        .bind(document.map(IssuedDocument::created_at_utc))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        self.replace_lines(invoice).await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id(), status = %invoice.status()), err)]
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let snapshot = invoice.customer_snapshot();
        let totals = invoice.totals();
        let document = invoice.document();

        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                customer_id = $3,
                invoice_number = $4,
                issue_date = $5,
                issued_at_utc = $6,
                status = $7,
                currency = $8,
                language = $9,
                sub_total = $10,
                tax_total = $11,
                total = $12,
                customer_name = $13,
                customer_address = $14,
                customer_vat_number = $15,
                notes = $16,
                pdf_bytes = $17,
                pdf_file_name = $18,
                pdf_sha256 = $19,
                pdf_created_at_utc = $20
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(invoice.company_id().as_uuid())
        .bind(invoice.id().as_uuid())
        .bind(invoice.customer_id().as_uuid())
        .bind(invoice.invoice_number())
        .bind(invoice.issue_date())
        .bind(invoice.issued_at_utc())
        .bind(invoice.status().as_str())
        .bind(invoice.currency())
        .bind(invoice.language())
        .bind(totals.sub_total)
        .bind(totals.tax_total)
        .bind(totals.total)
        .bind(&snapshot.name)
        .bind(&snapshot.address)
        .bind(&snapshot.vat_number)
        .bind(invoice.notes())
        .bind(document.map(IssuedDocument::bytes))
        .bind(document.map(IssuedDocument::file_name))
        .bind(document.map(IssuedDocument::sha256))
        .bind(document.map(IssuedDocument::created_at_utc))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "invoice {} no longer exists",
                invoice.id()
            )));
        }

        self.replace_lines(invoice).await
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id), err)]
    async fn search_invoices(
        &mut self,
        company_id: CompanyId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        let pattern = filter.text().map(like_pattern);
        let customer = filter.customer_id.map(|id| *id.as_uuid());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {INVOICE_HEADER_COLUMNS}, pdf_sha256 IS NOT NULL AS has_document
            FROM invoices
            WHERE company_id = $1
                AND ($2::text IS NULL OR invoice_number ILIKE $2 OR customer_name ILIKE $2)
                AND ($3::date IS NULL OR issue_date >= $3)
                AND ($4::date IS NULL OR issue_date <= $4)
                AND ($5::uuid IS NULL OR customer_id = $5)
            ORDER BY issue_date DESC, id DESC
            "#
        ))
        .bind(company_id.as_uuid())
        .bind(pattern)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(customer)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("search_invoices", e))?;

        rows.iter()
            .map(|r| {
                let has_document: bool = r
                    .try_get("has_document")
                    .map_err(|e| map_sqlx_error("decode", e))?;
                decode::<InvoiceRow>(r)?.into_summary(has_document)
            })
            .collect()
    }

    async fn invoice_number_taken(
        &mut self,
        company_id: CompanyId,
        invoice_number: &str,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE company_id = $1 AND invoice_number = $2)",
        )
        .bind(company_id.as_uuid())
        .bind(invoice_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("invoice_number_taken", e))
    }

    #[instrument(skip(self), err)]
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

impl PostgresTransaction {
    async fn replace_lines(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1")
            .bind(invoice.id().as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_lines", e))?;

        for (position, line) in invoice.lines().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Backend("too many invoice lines".to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    id, invoice_id, company_id, position, description, qty, unit_price,
                    tax_rate, vat_type, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(invoice.id().as_uuid())
            .bind(line.company_id.as_uuid())
            .bind(position)
            .bind(&line.description)
            .bind(line.qty)
            .bind(line.unit_price)
            .bind(line.tax_rate)
            .bind(line.vat_type.as_str())
            .bind(line.line_total)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_line", e))?;
        }
        Ok(())
    }
}

/// `%text%` with LIKE metacharacters escaped.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> Result<T, StoreError> {
    T::from_row(row).map_err(|e| map_sqlx_error("decode", e))
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("stored {what} is invalid: {err}"))
}

/// Map SQLx errors to [`StoreError`].
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    vat_number: String,
    eik: Option<String>,
    country_code: String,
    address: String,
    bank_iban: String,
    bank_bic: String,
    invoice_number_prefix: Option<String>,
    logo_path: Option<String>,
    next_invoice_number: i64,
}

impl TryFrom<CompanyRow> for Company {
    type Error = StoreError;

    fn try_from(row: CompanyRow) -> Result<Self, Self::Error> {
        let next = u64::try_from(row.next_invoice_number).map_err(|e| corrupt("company", e))?;
        Company::from_parts(
            CompanyId::from_uuid(row.id),
            CompanyDetails {
                name: row.name,
                vat_number: row.vat_number,
                eik: row.eik,
                country_code: row.country_code,
                address: row.address,
                bank_iban: row.bank_iban,
                bank_bic: row.bank_bic,
                invoice_number_prefix: row.invoice_number_prefix,
                logo_path: row.logo_path,
            },
            next,
        )
        .map_err(|e| corrupt("company", e))
    }
}

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    vat_number: Option<String>,
    eik: Option<String>,
    country_code: Option<String>,
    is_vat_registered: bool,
    address: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Customer::register(
            CustomerId::from_uuid(row.id),
            CompanyId::from_uuid(row.company_id),
            CustomerDetails {
                name: row.name,
                vat_number: row.vat_number,
                eik: row.eik,
                country_code: row.country_code,
                is_vat_registered: row.is_vat_registered,
                address: row.address,
                email: row.email,
                phone: row.phone,
            },
        )
        .map_err(|e| corrupt("customer", e))
    }
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    company_id: Uuid,
    customer_id: Uuid,
    invoice_number: String,
    issue_date: NaiveDate,
    issued_at_utc: Option<DateTime<Utc>>,
    status: String,
    currency: String,
    language: String,
    sub_total: Decimal,
    tax_total: Decimal,
    total: Decimal,
    customer_name: String,
    customer_address: Option<String>,
    customer_vat_number: Option<String>,
    notes: Option<String>,
}

impl InvoiceRow {
    fn parsed_status(&self) -> Result<InvoiceStatus, StoreError> {
        self.status.parse().map_err(|e| corrupt("invoice status", e))
    }

    fn into_invoice(
        self,
        lines: Vec<InvoiceLine>,
        document: Option<IssuedDocument>,
    ) -> Result<Invoice, StoreError> {
        let status = self.parsed_status()?;
        Ok(Invoice::from_parts(InvoiceParts {
            id: InvoiceId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            customer_id: CustomerId::from_uuid(self.customer_id),
            invoice_number: self.invoice_number,
            issue_date: self.issue_date,
            issued_at_utc: self.issued_at_utc,
            status,
            currency: self.currency.trim().to_string(),
            language: self.language,
            totals: InvoiceTotals {
                sub_total: self.sub_total,
                tax_total: self.tax_total,
                total: self.total,
            },
            customer_snapshot: CustomerSnapshot {
                name: self.customer_name,
                address: self.customer_address,
                vat_number: self.customer_vat_number,
            },
            notes: self.notes,
            lines,
            document,
        }))
    }

    fn into_summary(self, has_document: bool) -> Result<InvoiceSummary, StoreError> {
        let status = self.parsed_status()?;
        Ok(InvoiceSummary {
            id: InvoiceId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            customer_id: CustomerId::from_uuid(self.customer_id),
            invoice_number: self.invoice_number,
            issue_date: self.issue_date,
            issued_at_utc: self.issued_at_utc,
            status,
            currency: self.currency.trim().to_string(),
            customer_name: self.customer_name,
            sub_total: self.sub_total,
            tax_total: self.tax_total,
            total: self.total,
            has_document,
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    pdf_bytes: Option<Vec<u8>>,
    pdf_file_name: Option<String>,
    pdf_sha256: Option<String>,
    pdf_created_at_utc: Option<DateTime<Utc>>,
}

impl DocumentRow {
    /// A document exists only when all four columns are set.
    fn into_document(self) -> Option<IssuedDocument> {
        match (
            self.pdf_bytes,
            self.pdf_file_name,
            self.pdf_sha256,
            self.pdf_created_at_utc,
        ) {
            (Some(bytes), Some(file_name), Some(sha256), Some(created_at)) => Some(
                IssuedDocument::from_parts(bytes, file_name, sha256.trim().to_string(), created_at),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    company_id: Uuid,
    description: String,
    qty: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
    vat_type: String,
    line_total: Decimal,
}

impl TryFrom<LineRow> for InvoiceLine {
    type Error = StoreError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(InvoiceLine {
            id: InvoiceLineId::from_uuid(row.id),
            company_id: CompanyId::from_uuid(row.company_id),
            description: row.description,
            qty: row.qty,
            unit_price: row.unit_price,
            tax_rate: row.tax_rate,
            vat_type: row.vat_type.parse().map_err(|e| corrupt("VAT type", e))?,
            line_total: row.line_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("INV"), "%INV%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn partial_document_columns_mean_no_document() {
        let row = DocumentRow {
            pdf_bytes: Some(vec![1, 2, 3]),
            pdf_file_name: None,
            pdf_sha256: None,
            pdf_created_at_utc: None,
        };
        assert!(row.into_document().is_none());
    }

    #[test]
    fn corrupt_status_is_a_backend_error() {
        let row = InvoiceRow {
            id: Uuid::now_v7(),
            company_id: Uuid::now_v7(),
            customer_id: Uuid::now_v7(),
            invoice_number: "INV1".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            issued_at_utc: None,
            status: "Void".to_string(),
            currency: "EUR".to_string(),
            language: "en".to_string(),
            sub_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
            customer_name: "Globex".to_string(),
            customer_address: None,
            customer_vat_number: None,
            notes: None,
        };
        assert!(matches!(row.into_summary(false), Err(StoreError::Backend(_))));
    }
}
