//! txnstore - Transaction Record Store
//!
//! An in-memory store of transaction records (id, description, amount)
//! served over HTTP, with bounded admission under load and a cached,
//! paginated read path.
//!
//! # Architecture
//!
//! ```text
//! HTTP (api) → Admission Controller → Record Map
//!                                   ↘ Page Cache (cleared on every write)
//! ```
//!
//! # Modules
//!
//! - [`api`] - HTTP routes, health checks, and server loops
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`model`] - Records, input payloads, pages
//! - [`store`] - Record map, admission control, page cache
//!
//! # Example
//!
//! ```no_run
//! use txnstore::{TransactionInput, TransactionStore};
//!
//! # async fn demo() -> txnstore::Result<()> {
//! let store = TransactionStore::new();
//! let created = store.create(TransactionInput::new("Coffee", 3.5)).await?;
//! let page = store.list(0, 10).await?;
//! assert_eq!(page.total_items, 1);
//! store.delete(&created.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod metrics;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use error::{Error, OverloadReason, Result};
pub use model::{Transaction, TransactionInput, TransactionPage};
pub use store::{AdmissionConfig, PageCacheConfig, StoreConfig, TransactionStore};
