//! Transaction Data Model
//!
//! Records, the input payload used for create and modify, and the page shape
//! returned by the list operation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum description length in characters
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// A stored transaction record. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique, non-empty identifier
    pub id: String,
    /// Free-form description (1-255 chars, non-blank)
    pub description: String,
    /// Amount, never negative
    pub amount: f64,
}

impl Transaction {
    /// Create a record. No validation happens here; records only reach the
    /// store through [`TransactionInput::validate`].
    pub fn new(id: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            amount,
        }
    }
}

/// Payload for create and modify.
///
/// On create a missing or blank `id` asks the store to generate one. On
/// modify the `id` is ignored; the path id wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Requested id; blank or missing means "generate one"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Description, validated before storing
    #[serde(default)]
    pub description: String,
    /// Amount, validated before storing
    pub amount: f64,
}

impl TransactionInput {
    /// Input without an id
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: None,
            description: description.into(),
            amount,
        }
    }

    /// Input with a caller-chosen id
    pub fn with_id(id: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: Some(id.into()),
            description: description.into(),
            amount,
        }
    }

    /// The caller-supplied id, if it is usable as one.
    ///
    /// Empty and whitespace-only ids mean "assign a new id".
    pub fn requested_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Check description and amount. Never coerces.
    pub fn validate(&self) -> Result<()> {
        if self.amount.is_nan() || self.amount.is_infinite() {
            return Err(Error::Validation(
                "Transaction amount must be a finite number".to_string(),
            ));
        }

        if self.amount < 0.0 {
            return Err(Error::Validation(
                "Transaction amount cannot be negative".to_string(),
            ));
        }

        if self.description.trim().is_empty() {
            return Err(Error::Validation(
                "Transaction description cannot be empty".to_string(),
            ));
        }

        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "Transaction description cannot exceed {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        Ok(())
    }

    /// Build the record to store under `id`
    pub(crate) fn into_transaction(self, id: String) -> Transaction {
        Transaction {
            id,
            description: self.description,
            amount: self.amount,
        }
    }
}

impl From<Transaction> for TransactionInput {
    fn from(t: Transaction) -> Self {
        Self {
            id: Some(t.id),
            description: t.description,
            amount: t.amount,
        }
    }
}

/// One page of the ordered record listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    /// Records on this page, ascending by id
    pub transactions: Vec<Transaction>,
    /// Zero-based page index that was requested
    pub current_page: usize,
    /// Live record count
    pub total_items: usize,
    /// `ceil(total_items / size)`
    pub total_pages: usize,
}

impl TransactionPage {
    /// Assemble a page, deriving `total_pages` from `size`
    pub fn new(transactions: Vec<Transaction>, page: usize, size: usize, total: usize) -> Self {
        Self {
            transactions,
            current_page: page,
            total_items: total,
            total_pages: total_pages(total, size),
        }
    }

    /// Number of records on this page
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if this page holds no records
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// `ceil(total / size)`; zero when `size` is zero
pub fn total_pages(total: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        total.div_ceil(size)
    }
}

// =============================================================================
// Tests
// =============================================================================
