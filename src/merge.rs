//! Merging freshly-normalized day records into the canonical store.
//!
//! Replace-or-insert keyed by date: upstream totals are cumulative-to-date
//! for the day, not deltas, so a re-fetched day overwrites the stored one
//! wholesale. Applying the same batch twice is a no-op beyond the first.

use crate::store::{CanonicalStore, DayRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Applies `new_records` to the store and advances `last_updated`.
///
/// Dates stay unique and sorted; `last_updated` is monotonic even if the
/// wall clock stepped backwards between runs.
pub fn merge(store: &mut CanonicalStore, new_records: Vec<DayRecord>, now: DateTime<Utc>) {
    let mut by_date: BTreeMap<chrono::NaiveDate, DayRecord> = store
        .reading_activity
        .drain(..)
        .map(|record| (record.date, record))
        .collect();

    for record in new_records {
        by_date.insert(record.date, record);
    }

    store.reading_activity = by_date.into_values().collect();
    store.last_updated = Some(match store.last_updated {
        Some(previous) if previous > now => previous,
        _ => now,
    });
}
