//! Property-Based Tests for Paging
//!
//! # Test Properties
//!
//! 1. **Partition**: the pages of one size cover the sorted record set
//!    exactly once, in order
//! 2. **Page count**: `total_pages == ceil(total / size)`
//! 3. **Cache coherence**: a list after any write sequence matches a fresh
//!    computation

#![cfg(test)]

use std::collections::BTreeMap;

use proptest::prelude::*;

use super::{PageKey, TransactionStore};
use crate::model::{total_pages, Transaction, TransactionInput};

// =============================================================================
// Property Strategies
// =============================================================================

/// Short ids so collisions (overwrites) actually happen
fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,3}"
}

fn records_strategy() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec((id_strategy(), 0u32..10_000), 0..60).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(id, cents)| Transaction::new(id.clone(), format!("txn {}", id), cents as f64 / 100.0))
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Op {
    Create(String, f64),
    Delete(String),
    Modify(String, f64),
    List(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (id_strategy(), 0.0f64..1000.0).prop_map(|(id, a)| Op::Create(id, a)),
        id_strategy().prop_map(Op::Delete),
        (id_strategy(), 0.0f64..1000.0).prop_map(|(id, a)| Op::Modify(id, a)),
        (0usize..6, 1usize..8).prop_map(|(p, s)| Op::List(p, s)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

// =============================================================================
// Paging Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Concatenating every page of one size yields the full sorted set
    #[test]
    fn prop_pages_partition_sorted_set(records in records_strategy(), size in 1usize..12) {
        let rt = runtime();
        let store = TransactionStore::new();

        let mut expected: BTreeMap<String, Transaction> = BTreeMap::new();
        rt.block_on(async {
            for r in &records {
                store
                    .create(TransactionInput::with_id(r.id.clone(), r.description.clone(), r.amount))
                    .await
                    .unwrap();
            }
        });
        for r in records {
            expected.insert(r.id.clone(), r);
        }

        let total = expected.len();
        let pages = total_pages(total, size);
        let mut seen = Vec::new();
        for page in 0..=pages {
            let listed = rt.block_on(store.list(page, size)).unwrap();
            prop_assert_eq!(listed.total_items, total);
            prop_assert_eq!(listed.total_pages, pages);
            prop_assert!(listed.len() <= size);
            if page == pages {
                prop_assert!(listed.is_empty());
            }
            seen.extend(listed.transactions);
        }

        let expected: Vec<Transaction> = expected.into_values().collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_total_pages_is_ceiling(total in 0usize..100_000, size in 1usize..1000) {
        let pages = total_pages(total, size);
        prop_assert!(pages * size >= total);
        if total > 0 {
            prop_assert!((pages - 1) * size < total);
        } else {
            prop_assert_eq!(pages, 0);
        }
    }

    /// Slicing never panics, even for offsets that overflow
    #[test]
    fn prop_page_key_bounds(page in any::<usize>(), size in 1usize..usize::MAX, len in 0usize..1000) {
        if let Some((start, end)) = PageKey::new(page, size).bounds(len) {
            prop_assert!(start < end);
            prop_assert!(end <= len);
        }
    }

    /// Cached pages never outlive the writes that change them
    #[test]
    fn prop_list_matches_model_after_writes(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let rt = runtime();
        let store = TransactionStore::new();
        let mut model: BTreeMap<String, Transaction> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Create(id, amount) => {
                    let input = TransactionInput::with_id(id.clone(), "created", amount);
                    let created = rt.block_on(store.create(input)).unwrap();
                    model.insert(id, created);
                }
                Op::Delete(id) => {
                    let removed = rt.block_on(store.delete(&id)).unwrap();
                    prop_assert_eq!(removed, model.remove(&id));
                }
                Op::Modify(id, amount) => {
                    let patch = TransactionInput::new("modified", amount);
                    let updated = rt.block_on(store.modify(&id, patch)).unwrap();
                    let expected = model.get_mut(&id).map(|r| {
                        r.description = "modified".to_string();
                        r.amount = amount;
                        r.clone()
                    });
                    prop_assert_eq!(updated, expected);
                }
                Op::List(page, size) => {
                    let listed = rt.block_on(store.list(page, size)).unwrap();
                    let expected: Vec<Transaction> = model
                        .values()
                        .skip(page * size)
                        .take(size)
                        .cloned()
                        .collect();
                    prop_assert_eq!(listed.transactions, expected);
                    prop_assert_eq!(listed.total_items, model.len());
                }
            }
        }
    }
}
