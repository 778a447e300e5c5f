//! In-memory transactional store.
//!
//! Intended for tests and running without a database. Transactions buffer their
//! writes and validate them on commit:
//!
//! - `Serializable`: reads come from a snapshot taken at `begin`. Commit fails
//!   with `Conflict` if any row or table the transaction read has changed
//!   since, or if a row it writes was committed by someone else meanwhile
//!   (first committer wins).
//! - `ReadCommitted`: reads see the latest committed rows; no read validation.
//!
//! Constraints (foreign keys, cascades, unique invoice numbers) are checked
//! against the would-be state before anything becomes visible.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use invoicedesk_core::{CompanyId, CompanyScoped, CustomerId, Entity, InvoiceId};
use invoicedesk_invoicing::Invoice;
use invoicedesk_parties::{Company, Customer};

use super::r#trait::{
    InvoiceFilter, InvoiceStore, InvoiceSummary, IsolationLevel, StoreError, StoreTransaction,
    search_order,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Table {
    Companies,
    Customers,
    Invoices,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum RowKey {
    Company(CompanyId),
    Customer(CustomerId),
    Invoice(InvoiceId),
}

impl RowKey {
    fn table(&self) -> Table {
        match self {
            RowKey::Company(_) => Table::Companies,
            RowKey::Customer(_) => Table::Customers,
            RowKey::Invoice(_) => Table::Invoices,
        }
    }
}

#[derive(Debug, Clone)]
enum Row {
    Company(Company),
    Customer(Customer),
    Invoice(Invoice),
}

impl Row {
    fn company_id(&self) -> CompanyId {
        match self {
            Row::Company(c) => c.company_id(),
            Row::Customer(c) => c.company_id(),
            Row::Invoice(i) => i.company_id(),
        }
    }
}

#[derive(Debug, Clone)]
struct Versioned {
    /// Commit clock of the transaction that last wrote the row.
    version: u64,
    row: Row,
}

type Rows = BTreeMap<RowKey, Versioned>;

#[derive(Debug, Default)]
struct Database {
    rows: Rows,
    clock: u64,
    /// Commit clock of the last change to each table (inserts and deletes included).
    table_clock: HashMap<Table, u64>,
}

/// In-memory [`InvoiceStore`].
///
/// Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceStore {
    db: Arc<RwLock<Database>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StoreError> {
        // Let concurrent tasks interleave here as they would on a real database.
        tokio::task::yield_now().await;

        let db = self.db.read().map_err(|_| poisoned())?;
        let snapshot = match isolation {
            IsolationLevel::Serializable => Some(db.rows.clone()),
            IsolationLevel::ReadCommitted => None,
        };
        Ok(InMemoryTransaction {
            db: Arc::clone(&self.db),
            isolation,
            start_clock: db.clock,
            snapshot,
            reads: HashMap::new(),
            scanned: BTreeSet::new(),
            writes: BTreeMap::new(),
        })
    }
}

/// Transaction over [`InMemoryInvoiceStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    db: Arc<RwLock<Database>>,
    isolation: IsolationLevel,
    start_clock: u64,
    snapshot: Option<Rows>,
    /// Version seen per row read (0 = absent).
    reads: HashMap<RowKey, u64>,
    scanned: BTreeSet<Table>,
    /// Buffered writes; `None` deletes the row.
    writes: BTreeMap<RowKey, Option<Row>>,
}

impl InMemoryTransaction {
    fn read(&mut self, key: RowKey) -> Result<Option<Row>, StoreError> {
        if let Some(write) = self.writes.get(&key) {
            return Ok(write.clone());
        }

        let found = match &self.snapshot {
            Some(rows) => rows.get(&key).cloned(),
            None => self.db.read().map_err(|_| poisoned())?.rows.get(&key).cloned(),
        };
        self.reads
            .entry(key)
            .or_insert_with(|| found.as_ref().map(|v| v.version).unwrap_or(0));
        Ok(found.map(|v| v.row))
    }

    /// Visible rows of `table`, own writes included, in key order.
    fn scan(&mut self, table: Table) -> Result<Vec<Row>, StoreError> {
        let visible = self.visible(table)?;
        self.scanned.insert(table);
        Ok(visible)
    }

    /// Like [`Self::scan`] but without recording a table read, so concurrent
    /// inserts elsewhere in the table do not abort a serializable commit.
    fn visible(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let mut visible: BTreeMap<RowKey, Row> = {
            let collect = |rows: &Rows| -> BTreeMap<RowKey, Row> {
                rows.iter()
                    .filter(|(k, _)| k.table() == table)
                    .map(|(k, v)| (*k, v.row.clone()))
                    .collect()
            };
            match &self.snapshot {
                Some(rows) => collect(rows),
                None => collect(&self.db.read().map_err(|_| poisoned())?.rows),
            }
        };

        for (key, write) in self.writes.iter().filter(|(k, _)| k.table() == table) {
            match write {
                Some(row) => {
                    visible.insert(*key, row.clone());
                }
                None => {
                    visible.remove(key);
                }
            }
        }

        Ok(visible.into_values().collect())
    }

    fn write(&mut self, key: RowKey, row: Option<Row>) {
        self.writes.insert(key, row);
    }

    fn validate_reads(&self, db: &Database) -> Result<(), StoreError> {
        for (key, seen) in &self.reads {
            let current = db.rows.get(key).map(|v| v.version).unwrap_or(0);
            if current != *seen {
                return Err(StoreError::Conflict(format!(
                    "{key:?} changed after it was read"
                )));
            }
        }
        for table in &self.scanned {
            if db.table_clock.get(table).copied().unwrap_or(0) > self.start_clock {
                return Err(StoreError::Conflict(format!(
                    "{table:?} changed after it was scanned"
                )));
            }
        }
        Ok(())
    }

    fn validate_writes(&self, db: &Database) -> Result<(), StoreError> {
        for key in self.writes.keys() {
            let current = db.rows.get(key).map(|v| v.version).unwrap_or(0);
            if current > self.start_clock {
                return Err(StoreError::Conflict(format!(
                    "{key:?} was modified by a concurrent transaction"
                )));
            }
        }
        // A row deleted concurrently leaves no version behind; the table clock catches it.
        for key in self.writes.keys() {
            if self.reads.get(key).is_some_and(|seen| *seen != 0)
                && !db.rows.contains_key(key)
            {
                return Err(StoreError::Conflict(format!(
                    "{key:?} was deleted by a concurrent transaction"
                )));
            }
        }
        Ok(())
    }
}

/// Foreign keys and unique invoice numbers over the whole row set.
fn check_constraints(rows: &Rows) -> Result<(), StoreError> {
    let mut numbers: HashSet<(CompanyId, &str)> = HashSet::new();

    for versioned in rows.values() {
        match &versioned.row {
            Row::Company(_) => {}
            Row::Customer(customer) => {
                if !rows.contains_key(&RowKey::Company(customer.company_id())) {
                    return Err(StoreError::Constraint(format!(
                        "customer {} references a missing company",
                        customer.id()
                    )));
                }
            }
            Row::Invoice(invoice) => {
                if !rows.contains_key(&RowKey::Company(invoice.company_id())) {
                    return Err(StoreError::Constraint(format!(
                        "invoice {} references a missing company",
                        invoice.id()
                    )));
                }
                let customer_ok = match rows.get(&RowKey::Customer(invoice.customer_id())) {
                    Some(Versioned {
                        row: Row::Customer(c),
                        ..
                    }) => c.belongs_to(invoice.company_id()),
                    _ => false,
                };
                if !customer_ok {
                    return Err(StoreError::Constraint(format!(
                        "customer {} is referenced by invoice {}",
                        invoice.customer_id(),
                        invoice.invoice_number()
                    )));
                }
                if !numbers.insert((invoice.company_id(), invoice.invoice_number())) {
                    return Err(StoreError::Conflict(format!(
                        "duplicate invoice number {}",
                        invoice.invoice_number()
                    )));
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load_company(&mut self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(match self.read(RowKey::Company(id))? {
            Some(Row::Company(c)) => Some(c),
            _ => None,
        })
    }

    async fn list_companies(&mut self) -> Result<Vec<Company>, StoreError> {
        let mut companies: Vec<Company> = self
            .scan(Table::Companies)?
            .into_iter()
            .filter_map(|row| match row {
                Row::Company(c) => Some(c),
                _ => None,
            })
            .collect();
        companies.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(companies)
    }

    async fn save_company(&mut self, company: &Company) -> Result<(), StoreError> {
        self.write(
            RowKey::Company(company.id_typed()),
            Some(Row::Company(company.clone())),
        );
        Ok(())
    }

    async fn delete_company(&mut self, id: CompanyId) -> Result<bool, StoreError> {
        if self.read(RowKey::Company(id))?.is_none() {
            return Ok(false);
        }
        let mut doomed = Vec::new();
        for table in [Table::Customers, Table::Invoices] {
            for row in self.scan(table)? {
                if row.company_id() == id {
                    doomed.push(match row {
                        Row::Customer(c) => RowKey::Customer(c.id_typed()),
                        Row::Invoice(i) => RowKey::Invoice(i.id_typed()),
                        Row::Company(c) => RowKey::Company(c.id_typed()),
                    });
                }
            }
        }
        for key in doomed {
            self.write(key, None);
        }
        self.write(RowKey::Company(id), None);
        Ok(true)
    }

    async fn load_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(match self.read(RowKey::Customer(id))? {
            Some(Row::Customer(c)) if c.belongs_to(company_id) => Some(c),
            _ => None,
        })
    }

    async fn list_customers(&mut self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError> {
        let mut customers: Vec<Customer> = self
            .scan(Table::Customers)?
            .into_iter()
            .filter_map(|row| match row {
                Row::Customer(c) if c.belongs_to(company_id) => Some(c),
                _ => None,
            })
            .collect();
        customers.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(customers)
    }

    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        self.write(
            RowKey::Customer(customer.id_typed()),
            Some(Row::Customer(customer.clone())),
        );
        Ok(())
    }

    async fn delete_customer(
        &mut self,
        company_id: CompanyId,
        id: CustomerId,
    ) -> Result<bool, StoreError> {
        if self.load_customer(company_id, id).await?.is_none() {
            return Ok(false);
        }
        let referenced = self.scan(Table::Invoices)?.iter().any(|row| match row {
            Row::Invoice(i) => i.customer_id() == id,
            _ => false,
        });
        if referenced {
            return Err(StoreError::Constraint(format!(
                "customer {id} is referenced by invoices"
            )));
        }
        self.write(RowKey::Customer(id), None);
        Ok(true)
    }

    async fn load_invoice(
        &mut self,
        company_id: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(match self.read(RowKey::Invoice(id))? {
            Some(Row::Invoice(i)) if i.belongs_to(company_id) => Some(i),
            _ => None,
        })
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let key = RowKey::Invoice(invoice.id_typed());
        if self.read(key)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "invoice {} already exists",
                invoice.id()
            )));
        }
        self.write(key, Some(Row::Invoice(invoice.clone())));
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let key = RowKey::Invoice(invoice.id_typed());
        match self.read(key)? {
            Some(Row::Invoice(existing)) if existing.belongs_to(invoice.company_id()) => {
                self.write(key, Some(Row::Invoice(invoice.clone())));
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!(
                "invoice {} no longer exists",
                invoice.id()
            ))),
        }
    }

    async fn search_invoices(
        &mut self,
        company_id: CompanyId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        let mut found: Vec<InvoiceSummary> = self
            .scan(Table::Invoices)?
            .iter()
            .filter_map(|row| match row {
                Row::Invoice(i) if i.belongs_to(company_id) => Some(InvoiceSummary::from_invoice(i)),
                _ => None,
            })
            .filter(|summary| filter.matches(summary))
            .collect();
        found.sort_by(search_order);
        Ok(found)
    }

    async fn invoice_number_taken(
        &mut self,
        company_id: CompanyId,
        invoice_number: &str,
    ) -> Result<bool, StoreError> {
        // Phantoms are left to the unique-number check in `commit`.
        Ok(self.visible(Table::Invoices)?.iter().any(|row| {
            matches!(row, Row::Invoice(i) if i.belongs_to(company_id) && i.invoice_number() == invoice_number)
        }))
    }

    async fn commit(self) -> Result<(), StoreError> {
        tokio::task::yield_now().await;

        if self.writes.is_empty() {
            return Ok(());
        }

        let mut db = self.db.write().map_err(|_| poisoned())?;
        if self.isolation == IsolationLevel::Serializable {
            self.validate_reads(&db)?;
            self.validate_writes(&db)?;
        }

        let clock = db.clock + 1;
        let mut next = db.rows.clone();
        let mut touched: BTreeSet<Table> = BTreeSet::new();
        let mut deleted_companies: HashSet<CompanyId> = HashSet::new();

        for (key, write) in self.writes {
            touched.insert(key.table());
            match write {
                Some(row) => {
                    next.insert(key, Versioned { version: clock, row });
                }
                None => {
                    next.remove(&key);
                    if let RowKey::Company(id) = key {
                        deleted_companies.insert(id);
                    }
                }
            }
        }

        // Cascade rows committed by others after this transaction began.
        if !deleted_companies.is_empty() {
            next.retain(|key, v| {
                let keep = !deleted_companies.contains(&v.row.company_id());
                if !keep {
                    touched.insert(key.table());
                }
                keep
            });
        }

        check_constraints(&next)?;

        db.rows = next;
        db.clock = clock;
        for table in touched {
            db.table_clock.insert(table, clock);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use invoicedesk_parties::{CompanyDetails, CustomerDetails};

    fn test_company() -> Company {
        Company::register(
            CompanyId::new(),
            CompanyDetails {
                name: "Acme".to_string(),
                vat_number: "BG1".to_string(),
                country_code: "BG".to_string(),
                invoice_number_prefix: Some("INV".to_string()),
                ..CompanyDetails::default()
            },
        )
        .unwrap()
    }

    fn test_customer(company_id: CompanyId) -> Customer {
        Customer::register(
            CustomerId::new(),
            company_id,
            CustomerDetails {
                name: "Globex".to_string(),
                ..CustomerDetails::default()
            },
        )
        .unwrap()
    }

    fn test_invoice(company: &Company, customer: &Customer) -> Invoice {
        Invoice::draft(
            InvoiceId::new(),
            company.id_typed(),
            customer,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            "EUR",
            "en",
            Utc::now(),
        )
        .unwrap()
    }

    async fn seeded() -> (InMemoryInvoiceStore, Company, Customer) {
        let store = InMemoryInvoiceStore::new();
        let company = test_company();
        let customer = test_customer(company.id_typed());
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.save_company(&company).await.unwrap();
        tx.save_customer(&customer).await.unwrap();
        tx.commit().await.unwrap();
        (store, company, customer)
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_and_dropped_on_rollback() {
        let (store, company, customer) = seeded().await;
        let invoice = test_invoice(&company, &customer);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.insert_invoice(&invoice).await.unwrap();
        assert!(tx.load_invoice(company.id_typed(), invoice.id_typed()).await.unwrap().is_some());

        let mut other = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(other.load_invoice(company.id_typed(), invoice.id_typed()).await.unwrap().is_none());

        tx.rollback().await.unwrap();
        let mut after = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(after.load_invoice(company.id_typed(), invoice.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn serializable_counter_race_aborts_second_committer() {
        let (store, company, _) = seeded().await;

        let mut a = store.begin(IsolationLevel::Serializable).await.unwrap();
        let mut b = store.begin(IsolationLevel::Serializable).await.unwrap();

        let mut ca = a.load_company(company.id_typed()).await.unwrap().unwrap();
        let mut cb = b.load_company(company.id_typed()).await.unwrap().unwrap();
        assert_eq!(ca.take_next_invoice_number().unwrap(), 1);
        assert_eq!(cb.take_next_invoice_number().unwrap(), 1);
        a.save_company(&ca).await.unwrap();
        b.save_company(&cb).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(b.commit().await, Err(StoreError::Conflict(_))));

        let mut check = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let stored = check.load_company(company.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.next_invoice_number(), 2);
    }

    #[tokio::test]
    async fn serializable_reads_see_the_begin_snapshot() {
        let (store, company, _) = seeded().await;
        let mut reader = store.begin(IsolationLevel::Serializable).await.unwrap();

        let mut writer = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut updated = company.clone();
        updated.take_next_invoice_number().unwrap();
        writer.save_company(&updated).await.unwrap();
        writer.commit().await.unwrap();

        let seen = reader.load_company(company.id_typed()).await.unwrap().unwrap();
        assert_eq!(seen.next_invoice_number(), 1);
    }

    #[tokio::test]
    async fn customer_reads_are_company_scoped() {
        let (store, company, customer) = seeded().await;
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.load_customer(company.id_typed(), customer.id_typed()).await.unwrap().is_some());
        assert!(tx.load_customer(CompanyId::new(), customer.id_typed()).await.unwrap().is_none());
        assert!(tx.list_customers(CompanyId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_invoice_numbers_conflict() {
        let (store, mut company, customer) = seeded().await;
        let mut first = test_invoice(&company, &customer);
        let mut second = test_invoice(&company, &customer);
        let mut twin = company.clone();
        first.issue(Some(&mut company), Some(&customer), Utc::now()).unwrap();
        second.issue(Some(&mut twin), Some(&customer), Utc::now()).unwrap();
        assert_eq!(first.invoice_number(), second.invoice_number());

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.insert_invoice(&first).await.unwrap();
        tx.insert_invoice(&second).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn invoice_number_lookup_sees_committed_and_own_rows_of_the_company() {
        let (store, mut company, customer) = seeded().await;
        let mut issued = test_invoice(&company, &customer);
        issued.issue(Some(&mut company), Some(&customer), Utc::now()).unwrap();
        let number = issued.invoice_number().to_string();

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        assert!(!tx.invoice_number_taken(company.id_typed(), &number).await.unwrap());
        tx.insert_invoice(&issued).await.unwrap();
        assert!(tx.invoice_number_taken(company.id_typed(), &number).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.invoice_number_taken(company.id_typed(), &number).await.unwrap());
        assert!(!tx.invoice_number_taken(CompanyId::new(), &number).await.unwrap());
    }

    #[tokio::test]
    async fn referenced_customer_cannot_be_deleted() {
        let (store, company, customer) = seeded().await;
        let invoice = test_invoice(&company, &customer);
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.insert_invoice(&invoice).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(matches!(
            tx.delete_customer(company.id_typed(), customer.id_typed()).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn deleting_company_cascades() {
        let (store, company, customer) = seeded().await;
        let invoice = test_invoice(&company, &customer);
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.insert_invoice(&invoice).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.delete_company(company.id_typed()).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.list_companies().await.unwrap().is_empty());
        assert!(tx.list_customers(company.id_typed()).await.unwrap().is_empty());
        assert!(tx
            .search_invoices(company.id_typed(), &InvoiceFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn customer_of_missing_company_violates_foreign_key() {
        let store = InMemoryInvoiceStore::new();
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.save_customer(&test_customer(CompanyId::new())).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Constraint(_))));
    }
}
