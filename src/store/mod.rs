//! Transaction Store
//!
//! In-memory record store with admission control and a cached paged view.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        TransactionStore                                   │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  create / delete / modify / get / list                                    │
//! │         │                                                                 │
//! │  ┌──────▼──────────────┐                                                  │
//! │  │ AdmissionController │  counter cap (fast fail) + timed slot wait       │
//! │  └──────┬──────────────┘                                                  │
//! │         │ permit (released on drop)                                       │
//! │  ┌──────▼──────────┐        ┌────────────────────┐                        │
//! │  │ RecordMap       │───────▶│ PageCache          │                        │
//! │  │ (DashMap)       │ writes │ (page,size) → page │                        │
//! │  └─────────────────┘ clear  └────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

mod admission;
mod page_cache;
mod records;
mod proptest;
mod service;

pub use admission::{AdmissionConfig, AdmissionController, AdmissionPermit, AdmissionStats};
pub use page_cache::{CachedPage, PageCache, PageCacheConfig, PageCacheStats, PageKey};
pub use records::RecordMap;
pub use service::{check_page_size, StoreConfig, TransactionStore};

use std::time::Duration;

/// Default cap on concurrently executing operations
pub const DEFAULT_MAX_CONCURRENT: usize = 1000;

/// Default wait for an admission slot
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of cached pages
pub const DEFAULT_PAGE_CACHE_ENTRIES: usize = 1024;

/// Default page index for list requests
pub const DEFAULT_PAGE: usize = 0;

/// Default page size for list requests
pub const DEFAULT_PAGE_SIZE: usize = 10;
