//! Window computation, weekly partitioning, and the weekly-activity API
//! calls.
//!
//! The upstream endpoint aggregates per week and rejects wider spans, so a
//! fetch window is tiled into ≤7-day sub-windows and fetched oldest-first,
//! one child at a time. A 5xx on a sub-window past the retention horizon is
//! expected and skipped; anything else non-2xx is retried with backoff and
//! escalates if retries run out, so recent data is never dropped silently.

use crate::error::RunError;
use crate::session::Session;
use anyhow::{Context, Result};
use chrono::offset::LocalResult;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::time::Duration;

pub const ACTIVITIES_API: &str =
    "https://www.amazon.com/parentdashboard/ajax/get-weekly-activities-v2";

/// The dashboard reports activity in this timezone regardless of locale.
pub const DASHBOARD_TZ: chrono_tz::Tz = chrono_tz::America::Los_Angeles;
const TIME_ZONE_NAME: &str = "America/Los_Angeles";

/// Lookback for the very first run, when no store exists yet.
const BOOTSTRAP_DAYS: i64 = 120;
/// The upstream serves roughly this much history; older queries 5xx.
const RETENTION_DAYS: i64 = 90;

const MAX_RETRIES: u32 = 2;
const BACKOFF_SECS: u64 = 5;
/// Courtesy delay between calls to avoid rate limiting.
const RATE_LIMIT_DELAY_MS: u64 = 300;
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// An inclusive calendar-date range to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Computes the window for this run from the store's newest date.
    ///
    /// Bootstrap (empty store): the last `BOOTSTRAP_DAYS` days ending today.
    /// Incremental: `[latest, today]`, where the newest stored day is
    /// re-fetched to pick up late-arriving sync updates.
    pub fn compute(latest_stored: Option<NaiveDate>, today: NaiveDate) -> Self {
        match latest_stored {
            Some(latest) if latest <= today => Self {
                start: latest,
                end: today,
            },
            // Stored date in the future means clock skew; fetch just today.
            Some(_) => Self {
                start: today,
                end: today,
            },
            None => Self {
                start: today - chrono::Duration::days(BOOTSTRAP_DAYS - 1),
                end: today,
            },
        }
    }

    /// Tiles the window into consecutive sub-windows of at most 7 days,
    /// with no gaps or overlaps.
    pub fn partition(&self) -> Vec<FetchWindow> {
        let mut sub_windows = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = (start + chrono::Duration::days(6)).min(self.end);
            sub_windows.push(FetchWindow { start, end });
            start = end + chrono::Duration::days(1);
        }
        sub_windows
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The exact request body sent to the weekly-activity endpoint, retained in
/// the snapshot archive for audit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekQuery {
    pub child_directed_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub aggregation_interval: u32,
    pub time_zone: String,
}

/// One successful weekly-activity response for one child.
#[derive(Debug, Clone, Serialize)]
pub struct RawWeekPayload {
    pub child_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: u16,
    pub query: WeekQuery,
    pub body: serde_json::Value,
}

/// A sub-window skipped because it lies beyond the retention horizon.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedWindow {
    pub child_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

enum WeekOutcome {
    Fetched(RawWeekPayload),
    RetentionExpired(SkippedWindow),
}

/// Everything one run fetched: raw payloads plus the retention skips.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub payloads: Vec<RawWeekPayload>,
    pub skipped: Vec<SkippedWindow>,
}

#[derive(Debug, PartialEq, Eq)]
enum Classification {
    Success,
    RetentionExpired,
    Transient,
}

/// Classifies one HTTP outcome for a sub-window.
fn classify_status(status: u16, sub_window_end: NaiveDate, today: NaiveDate) -> Classification {
    if (200..300).contains(&status) {
        return Classification::Success;
    }
    let horizon = today - chrono::Duration::days(RETENTION_DAYS);
    if (500..600).contains(&status) && sub_window_end < horizon {
        return Classification::RetentionExpired;
    }
    Classification::Transient
}

/// Epoch seconds of local midnight at the start of `date`.
pub(crate) fn midnight_epoch(date: NaiveDate) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);
    match DASHBOARD_TZ.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        // Midnight skipped by a DST jump; fall back to the UTC reading.
        LocalResult::None => DASHBOARD_TZ.from_utc_datetime(&naive).timestamp(),
    }
}

/// Calendar date (dashboard timezone) containing the given instant.
pub(crate) fn date_of_epoch(epoch_seconds: i64) -> Option<NaiveDate> {
    let instant = chrono::DateTime::from_timestamp(epoch_seconds, 0)?;
    Some(instant.with_timezone(&DASHBOARD_TZ).date_naive())
}

/// Issues the weekly-activity calls for a window, per child per sub-window.
pub struct ActivityFetcher {
    agent: ureq::Agent,
    session: Session,
    today: NaiveDate,
    now_epoch: i64,
}

impl ActivityFetcher {
    pub fn new(session: Session) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(API_TIMEOUT))
            .http_status_as_error(false)
            .build();
        let now = Utc::now().with_timezone(&DASHBOARD_TZ);
        Self {
            agent: config.into(),
            session,
            today: now.date_naive(),
            now_epoch: now.timestamp(),
        }
    }

    /// Fetches every sub-window for every child, oldest-first.
    ///
    /// Retention-expired sub-windows are recorded and skipped; an unretried
    /// transient failure aborts with [`RunError::Fetch`].
    pub fn fetch_window(&self, window: &FetchWindow) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let sub_windows = window.partition();
        let total = sub_windows.len();

        for (child_id, name) in &self.session.children {
            eprintln!("[kindle-stats] Fetching history for {} ({})...", name, child_id);
            for (index, sub) in sub_windows.iter().enumerate() {
                let label = format!("Week {}/{}: {} to {}", index + 1, total, sub.start, sub.end);
                match self.fetch_week(child_id, sub)? {
                    WeekOutcome::Fetched(payload) => {
                        eprintln!("  {} - OK", label);
                        report.payloads.push(payload);
                    }
                    WeekOutcome::RetentionExpired(skipped) => {
                        eprintln!("  {} - beyond retention, skipped", label);
                        report.skipped.push(skipped);
                    }
                }
                std::thread::sleep(Duration::from_millis(RATE_LIMIT_DELAY_MS));
            }
        }
        Ok(report)
    }

    fn fetch_week(&self, child_id: &str, sub: &FetchWindow) -> Result<WeekOutcome> {
        let query = WeekQuery {
            child_directed_id: child_id.to_string(),
            start_time: midnight_epoch(sub.start),
            // Exclusive end: midnight after the last day, clamped to now for
            // the still-running current day.
            end_time: midnight_epoch(sub.end + chrono::Duration::days(1)).min(self.now_epoch),
            aggregation_interval: 86400,
            time_zone: TIME_ZONE_NAME.to_string(),
        };
        let body_text =
            serde_json::to_string(&query).context("Failed to serialize weekly-activity query")?;

        let mut last_failure = String::new();
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(
                    "retrying weekly-activity call for {} to {} (attempt {}/{}): {}",
                    sub.start,
                    sub.end,
                    attempt + 1,
                    MAX_RETRIES + 1,
                    last_failure
                );
                std::thread::sleep(Duration::from_secs(BACKOFF_SECS * attempt as u64));
            }

            match self.call_once(&body_text) {
                Ok((status, body)) => match classify_status(status, sub.end, self.today) {
                    Classification::Success => {
                        return Ok(WeekOutcome::Fetched(RawWeekPayload {
                            child_id: child_id.to_string(),
                            start: sub.start,
                            end: sub.end,
                            status,
                            query,
                            body,
                        }));
                    }
                    Classification::RetentionExpired => {
                        tracing::info!(
                            "sub-window {} to {} is beyond the ~{}-day retention horizon (HTTP {})",
                            sub.start,
                            sub.end,
                            RETENTION_DAYS,
                            status
                        );
                        return Ok(WeekOutcome::RetentionExpired(SkippedWindow {
                            child_id: child_id.to_string(),
                            start: sub.start,
                            end: sub.end,
                        }));
                    }
                    Classification::Transient => {
                        last_failure = format!("HTTP {}", status);
                    }
                },
                Err(err) => {
                    last_failure = format!("{:#}", err);
                }
            }
        }

        Err(RunError::fetch(format!(
            "weekly-activity call for {} to {} failed after {} attempts: {}",
            sub.start,
            sub.end,
            MAX_RETRIES + 1,
            last_failure
        ))
        .into())
    }

    fn call_once(&self, body_text: &str) -> Result<(u16, serde_json::Value)> {
        let mut response = self
            .agent
            .post(ACTIVITIES_API)
            .header("Content-Type", "application/json;charset=UTF-8")
            .header("Accept", "application/json")
            .header("x-amzn-csrf", &self.session.csrf_token)
            .header("Cookie", &self.session.cookie_header)
            .send(body_text)
            .context("weekly-activity request failed")?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read weekly-activity response")?;
        // Keep a truncated transcript of unparseable bodies for the archive.
        let body = serde_json::from_str(&text).unwrap_or_else(|_| {
            serde_json::json!({ "_raw_text": text.chars().take(500).collect::<String>() })
        });
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bootstrap_window_spans_120_days_ending_today() {
        let today = date(2026, 8, 7);
        let window = FetchWindow::compute(None, today);
        assert_eq!(window.end, today);
        assert_eq!(window.days(), 120);
        assert_eq!(window.start, date(2026, 4, 10));
    }

    #[test]
    fn test_incremental_window_starts_at_latest_stored_date() {
        let today = date(2026, 8, 7);
        let window = FetchWindow::compute(Some(date(2026, 8, 1)), today);
        assert_eq!(window, FetchWindow { start: date(2026, 8, 1), end: today });
    }

    #[test]
    fn test_future_stored_date_clamps_to_today() {
        let today = date(2026, 8, 7);
        let window = FetchWindow::compute(Some(date(2026, 8, 20)), today);
        assert_eq!(window, FetchWindow { start: today, end: today });
    }

    #[test]
    fn test_partition_tiles_exactly_with_no_gaps_or_overlaps() {
        let window = FetchWindow {
            start: date(2026, 4, 10),
            end: date(2026, 8, 7),
        };
        let sub_windows = window.partition();

        assert_eq!(sub_windows[0].start, window.start);
        assert_eq!(sub_windows.last().unwrap().end, window.end);
        let mut expected_start = window.start;
        let mut covered = 0;
        for sub in &sub_windows {
            assert_eq!(sub.start, expected_start);
            assert!(sub.days() <= 7);
            assert!(sub.days() >= 1);
            covered += sub.days();
            expected_start = sub.end + chrono::Duration::days(1);
        }
        assert_eq!(covered, window.days());
    }

    #[test]
    fn test_partition_single_day_window() {
        let window = FetchWindow {
            start: date(2026, 8, 7),
            end: date(2026, 8, 7),
        };
        let sub_windows = window.partition();
        assert_eq!(sub_windows.len(), 1);
        assert_eq!(sub_windows[0].days(), 1);
    }

    #[test]
    fn test_partition_nine_days_splits_seven_two() {
        let window = FetchWindow {
            start: date(2026, 8, 1),
            end: date(2026, 8, 9),
        };
        let sub_windows = window.partition();
        assert_eq!(sub_windows.len(), 2);
        assert_eq!(sub_windows[0].days(), 7);
        assert_eq!(sub_windows[1].days(), 2);
        assert_eq!(sub_windows[1].end, window.end);
    }

    #[test]
    fn test_classify_2xx_is_success() {
        let today = date(2026, 8, 7);
        assert_eq!(
            classify_status(200, today, today),
            Classification::Success
        );
        assert_eq!(
            classify_status(204, date(2026, 1, 1), today),
            Classification::Success
        );
    }

    #[test]
    fn test_classify_5xx_past_retention_is_expected() {
        let today = date(2026, 8, 7);
        // 95 days old: beyond the ~90-day horizon.
        let old_end = today - chrono::Duration::days(95);
        assert_eq!(
            classify_status(500, old_end, today),
            Classification::RetentionExpired
        );
        assert_eq!(
            classify_status(503, old_end, today),
            Classification::RetentionExpired
        );
    }

    #[test]
    fn test_classify_5xx_within_retention_is_transient() {
        let today = date(2026, 8, 7);
        let recent_end = today - chrono::Duration::days(10);
        assert_eq!(
            classify_status(500, recent_end, today),
            Classification::Transient
        );
    }

    #[test]
    fn test_classify_4xx_is_always_transient() {
        let today = date(2026, 8, 7);
        let old_end = today - chrono::Duration::days(95);
        assert_eq!(
            classify_status(404, old_end, today),
            Classification::Transient
        );
        assert_eq!(classify_status(403, today, today), Classification::Transient);
    }

    #[test]
    fn test_midnight_epoch_winter_date() {
        // 2026-01-15 00:00 PST is 08:00 UTC.
        assert_eq!(midnight_epoch(date(2026, 1, 15)), 1_768_464_000);
    }

    #[test]
    fn test_date_of_epoch_roundtrip() {
        let day = date(2026, 6, 15);
        let ts = midnight_epoch(day);
        assert_eq!(date_of_epoch(ts), Some(day));
        // Late evening local time still lands on the same calendar day.
        assert_eq!(date_of_epoch(ts + 23 * 3600), Some(day));
    }

    #[test]
    fn test_week_query_serializes_to_wire_names() {
        let query = WeekQuery {
            child_directed_id: "amzn1.child.abc".to_string(),
            start_time: 1_768_464_000,
            end_time: 1_769_068_800,
            aggregation_interval: 86400,
            time_zone: TIME_ZONE_NAME.to_string(),
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["childDirectedId"], "amzn1.child.abc");
        assert_eq!(value["startTime"], 1_768_464_000i64);
        assert_eq!(value["aggregationInterval"], 86400);
        assert_eq!(value["timeZone"], "America/Los_Angeles");
    }
}
