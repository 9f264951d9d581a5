//! Turns raw weekly payloads into per-day, per-book household aggregates.
//!
//! Pure transformation, no I/O. The household, not the child, is the unit
//! of record: books are keyed by ASIN within a day and accumulated across
//! every payload covering that day, so two children reading the same title
//! sum into one entry. Each payload covers disjoint days for its child, so
//! nothing is double-counted.

use crate::fetch::{date_of_epoch, RawWeekPayload};
use crate::store::{BookEntry, DayRecord};
use serde_json::Value;
use std::collections::BTreeMap;

/// Aggregates weekly payloads into day records, sorted by date.
///
/// Malformed book entries are dropped with a warning; a day with no valid
/// books is omitted entirely (the upstream pads weeks with zero-duration
/// placeholder intervals).
pub fn normalize(payloads: &[RawWeekPayload]) -> Vec<DayRecord> {
    let mut days: BTreeMap<chrono::NaiveDate, BTreeMap<String, BookEntry>> = BTreeMap::new();

    for payload in payloads {
        let Some(categories) = payload.body.get("activityV2Data").and_then(Value::as_array)
        else {
            continue;
        };
        for category in categories {
            let Some(intervals) = category.get("intervals").and_then(Value::as_array) else {
                continue;
            };
            for interval in intervals {
                let Some(date) = interval
                    .get("startTime")
                    .and_then(Value::as_i64)
                    .and_then(date_of_epoch)
                else {
                    continue;
                };
                let Some(results) = interval
                    .get("aggregatedActivityResults")
                    .and_then(Value::as_array)
                else {
                    continue;
                };
                for result in results {
                    match parse_book(result) {
                        Some(book) => accumulate(days.entry(date).or_default(), book),
                        None => tracing::warn!(
                            "dropping malformed book entry on {}: {}",
                            date,
                            result
                        ),
                    }
                }
            }
        }
    }

    days.into_iter()
        .filter_map(|(date, books)| build_day(date, books))
        .collect()
}

/// Parses one `aggregatedActivityResults` element. `None` means the entry is
/// unusable: no ASIN, negative duration, or a non-positive session count.
fn parse_book(result: &Value) -> Option<BookEntry> {
    let attributes = &result["attributes"];
    let asin = attributes["ORIGINAL_KEY"].as_str()?.to_string();
    let duration = result["activityDuration"].as_i64()?;
    if duration < 0 {
        return None;
    }
    let sessions = result["activityCount"].as_i64()?;
    if sessions <= 0 {
        return None;
    }
    Some(BookEntry {
        title: attributes["TITLE"].as_str().unwrap_or("Unknown").to_string(),
        asin,
        duration_seconds: duration as u64,
        sessions: sessions as u32,
        thumbnail: attributes["THUMBNAIL_URL"].as_str().map(String::from),
    })
}

/// Folds a book into the day's per-ASIN aggregate. Title and thumbnail stick
/// from the first occurrence.
fn accumulate(books: &mut BTreeMap<String, BookEntry>, book: BookEntry) {
    match books.get_mut(&book.asin) {
        Some(existing) => {
            existing.duration_seconds += book.duration_seconds;
            existing.sessions += book.sessions;
        }
        None => {
            books.insert(book.asin.clone(), book);
        }
    }
}

fn build_day(date: chrono::NaiveDate, books: BTreeMap<String, BookEntry>) -> Option<DayRecord> {
    if books.is_empty() {
        return None;
    }
    let mut books: Vec<BookEntry> = books.into_values().collect();
    // Longest-read first; ASIN tie-break keeps output deterministic.
    books.sort_by(|a, b| {
        b.duration_seconds
            .cmp(&a.duration_seconds)
            .then_with(|| a.asin.cmp(&b.asin))
    });
    let total_seconds: u64 = books.iter().map(|b| b.duration_seconds).sum();
    Some(DayRecord {
        date,
        total_seconds,
        total_minutes: round_to_tenth(total_seconds as f64 / 60.0),
        books,
    })
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
