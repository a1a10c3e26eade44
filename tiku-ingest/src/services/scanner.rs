//! Incomplete-work scanning
//!
//! Derives the current work list from the catalog and the checkpoint store.
//! An item is incomplete when its key is absent, or when its stored value
//! fails the normalizer's stored-value rules, which silently re-opens stale
//! seed placeholders without any migration step.

use crate::models::{Catalog, GroupCompletion, WorkItem};
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::validator::Normalizer;

/// Incomplete work items in deterministic (group, index) order
pub fn incomplete_items(
    catalog: &Catalog,
    store: &CheckpointStore,
    normalizer: &Normalizer,
) -> Vec<WorkItem> {
    let mut pending = Vec::new();

    for item in catalog.items() {
        match store.get(&item.key()) {
            None => pending.push(item),
            Some(value) => {
                if let Err(reason) = normalizer.validate_stored(value) {
                    tracing::debug!(
                        item = %item,
                        rule = reason.rule_name(),
                        "Stored value re-opened"
                    );
                    pending.push(item);
                }
            }
        }
    }

    pending
}

/// Per-group completion counts, using the same completeness predicate as
/// `incomplete_items`
pub fn completion_by_group(
    catalog: &Catalog,
    store: &CheckpointStore,
    normalizer: &Normalizer,
) -> Vec<GroupCompletion> {
    catalog
        .groups()
        .map(|(group, spec)| {
            let complete = (1..=spec.item_count)
                .filter(|&index| {
                    store
                        .get(&WorkItem::new(group, index).key())
                        .map(|value| normalizer.validate_stored(value).is_ok())
                        .unwrap_or(false)
                })
                .count() as u32;

            GroupCompletion {
                group,
                complete,
                total: spec.item_count,
            }
        })
        .collect()
}
