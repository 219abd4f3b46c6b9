//! Reconciliation of one fetch result against a feed's retained history.
//!
//! Pure data transformation: no I/O, never fails. The watcher calls
//! [`reconcile`] at commit time, under its registry lock, against the
//! history as it is *then* — not a snapshot taken when the cycle started.

use crate::feed::FeedEntry;

/// Retained history is bounded at the fetched item count times this
/// multiplier, recomputed every cycle. A feed serving 10 items keeps at
/// most 30 in memory.
const HISTORY_LENGTH_MULTIPLIER: usize = 3;

/// Outcome of reconciling one fetch against existing history.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Entries not present in history, ascending by publish date. These
    /// are the entries to notify for, in emission order.
    pub new_items: Vec<FeedEntry>,
    /// The updated history to commit.
    pub history: Vec<FeedEntry>,
    /// The recomputed retention capacity to commit.
    pub max_history_len: usize,
}

/// Reconciles `fetched` against `history`.
///
/// In order: recompute the retention capacity from the fetched count,
/// stable-sort the fetched entries ascending by publish date (undated
/// entries order before any dated entry), keep those with no identity
/// match in history, then append the survivors and trim the history from
/// the front to capacity.
///
/// Trimming only happens when something was appended: an empty or
/// all-duplicate fetch recomputes the capacity but leaves the stored
/// history untouched. When the upstream feed shrinks, the new capacity
/// may evict entries appended in the same cycle.
pub fn reconcile(history: &[FeedEntry], mut fetched: Vec<FeedEntry>) -> Reconciliation {
    let max_history_len = fetched.len() * HISTORY_LENGTH_MULTIPLIER;

    fetched.sort_by(|a, b| a.published.cmp(&b.published));

    let new_items: Vec<FeedEntry> = fetched
        .into_iter()
        .filter(|item| !history.iter().any(|stored| item.is_same_item(stored)))
        .collect();

    let mut updated = history.to_vec();
    if !new_items.is_empty() {
        updated.extend(new_items.iter().cloned());
        if updated.len() > max_history_len {
            updated.drain(..updated.len() - max_history_len);
        }
    }

    Reconciliation {
        new_items,
        history: updated,
        max_history_len,
    }
}
