//! Transaction Store
//!
//! Public operations over the record map. Every operation except `count`
//! passes the admission gate first; the permit lives until the operation
//! returns, whichever way it returns.

use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use super::admission::{AdmissionConfig, AdmissionController, AdmissionPermit};
use super::page_cache::{PageCache, PageCacheConfig, PageKey};
use super::records::RecordMap;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{Transaction, TransactionInput, TransactionPage};

/// Store configuration
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Admission gate
    pub admission: AdmissionConfig,
    /// Page cache
    pub page_cache: PageCacheConfig,
}

impl StoreConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.admission.validate()
    }
}

/// The transaction record store
pub struct TransactionStore {
    records: RecordMap,
    admission: AdmissionController,
    pages: PageCache,
}

impl TransactionStore {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            records: RecordMap::new(),
            admission: AdmissionController::with_config(config.admission),
            pages: PageCache::with_config(config.page_cache),
        }
    }

    /// Create a shared store
    pub fn shared(config: StoreConfig) -> Arc<Self> {
        Arc::new(Self::with_config(config))
    }

    async fn admit(&self, operation: &'static str) -> Result<AdmissionPermit> {
        self.admission.acquire().await.inspect_err(|e| {
            metrics::record_outcome(operation, e);
        })
    }

    /// Store a new record.
    ///
    /// A missing or blank id is replaced with a fresh UUID. An existing
    /// record with the same id is overwritten.
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: TransactionInput) -> Result<Transaction> {
        let _permit = self.admit("create").await?;

        let result = self.create_admitted(input);
        metrics::record_result("create", &result);
        result
    }

    fn create_admitted(&self, input: TransactionInput) -> Result<Transaction> {
        input.validate()?;

        let id = match input.requested_id() {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let record = input.into_transaction(id);

        if let Some(previous) = self.records.insert(record.clone()) {
            debug!(id = %previous.id, "Replaced existing transaction");
        }
        self.after_write();

        debug!(id = %record.id, amount = record.amount, "Created transaction");
        Ok(record)
    }

    /// Remove a record. `None` means there was nothing to remove.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<Option<Transaction>> {
        let _permit = self.admit("delete").await?;

        let removed = self.records.remove(id);
        if removed.is_some() {
            self.after_write();
            debug!(id, "Deleted transaction");
        }

        let result = Ok(removed);
        metrics::record_found("delete", &result);
        result
    }

    /// Replace description and amount of an existing record.
    ///
    /// The patch's id is ignored. Returns `None` without inserting when `id`
    /// is absent.
    #[instrument(skip(self, patch))]
    pub async fn modify(&self, id: &str, patch: TransactionInput) -> Result<Option<Transaction>> {
        let _permit = self.admit("modify").await?;

        let result = self.modify_admitted(id, patch);
        metrics::record_found("modify", &result);
        result
    }

    fn modify_admitted(&self, id: &str, patch: TransactionInput) -> Result<Option<Transaction>> {
        patch.validate()?;

        let TransactionInput {
            description,
            amount,
            ..
        } = patch;

        let updated = self.records.update(id, move |record| {
            record.description = description;
            record.amount = amount;
        });

        if updated.is_some() {
            self.after_write();
            debug!(id, "Modified transaction");
        }
        Ok(updated)
    }

    /// Fetch a single record
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let _permit = self.admit("get").await?;

        let result = Ok(self.records.get(id));
        metrics::record_found("get", &result);
        result
    }

    /// One page of records in ascending id order.
    ///
    /// A page past the end is empty, not an error. `size` must be positive.
    #[instrument(skip(self))]
    pub async fn list(&self, page: usize, size: usize) -> Result<TransactionPage> {
        let _permit = self.admit("list").await?;

        let result = self.list_admitted(page, size);
        metrics::record_result("list", &result);
        result
    }

    fn list_admitted(&self, page: usize, size: usize) -> Result<TransactionPage> {
        let key = PageKey::new(page, size);
        let cached = self
            .pages
            .try_get_or_compute(key, || key.slice(self.records.sorted_snapshot()))?;

        Ok(TransactionPage::new(
            cached.items.clone(),
            page,
            size,
            self.count(),
        ))
    }

    /// Current number of records. Never waits for admission.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Admission gate, for stats and health reporting
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Page cache, for stats reporting
    pub fn page_cache(&self) -> &PageCache {
        &self.pages
    }

    fn after_write(&self) {
        self.pages.invalidate_all();
        metrics::RECORDS.set(self.records.len() as i64);
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStore")
            .field("records", &self.records.len())
            .field("admission", &self.admission.stats())
            .field("cached_pages", &self.pages.len())
            .finish()
    }
}

/// Reject a page size of zero before admission is even requested.
///
/// The store checks again after admission; this lets the transport fail
/// cheaply on obviously bad queries.
pub fn check_page_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::Validation(
            "Page size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
