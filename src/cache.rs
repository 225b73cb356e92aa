//! File-backed cache with a daily refresh-hour invalidation policy.
//!
//! Each cache key maps to one JSON file under the store directory, holding
//! a [`CacheEntry`] wrapper around an arbitrary serializable payload. Data
//! is meant to refresh once per day at a fixed local wall-clock hour and
//! stay valid for the rest of that day plus the early hours of the next,
//! until the refresh hour passes again.
//!
//! # Policy
//!
//! ```text
//! stale(entry) := entry.lastFetchDate != today  AND  currentHour >= refreshHour
//! ```
//!
//! So a payload written at 08:05 is served until 08:00 the next day, and a
//! payload written yesterday is still served at 07:59 today. Staleness is
//! only evaluated on reads; an entry nobody reads just sits there.
//!
//! # Failure semantics
//!
//! Storage problems are never surfaced: unreadable or unparseable entries
//! read as a miss, and failed writes are logged and dropped. Callers fall
//! back to a live fetch either way.

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A stored cache record wrapping a serializable payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached payload.
    pub payload: T,
    /// Write time as UTC epoch milliseconds.
    pub stored_at_epoch_millis: i64,
    /// Local calendar date of the write, `YYYY-MM-DD`.
    pub last_fetch_date: String,
}

/// Diagnostic view of one cache key, produced by [`CacheStore::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    /// Whether a readable entry exists at all.
    pub exists: bool,
    /// The entry's local write date, if one exists.
    pub last_fetch_date: Option<String>,
    /// The entry's write time in epoch milliseconds, if one exists.
    pub stored_at_epoch_millis: Option<i64>,
    /// Whether the entry would be considered stale right now.
    pub is_stale: Option<bool>,
}

/// Decide whether an entry written on `last_fetch_date` must be refetched.
///
/// This is the whole invalidation rule, kept as a pure function of its
/// inputs so the refresh window is testable at any simulated time. Every
/// key's policy is independent; nothing here looks at other entries.
///
/// # Arguments
///
/// * `last_fetch_date` - the entry's local write date, `YYYY-MM-DD`
/// * `refresh_hour` - hour-of-day (0-23) at which data rolls over
/// * `now` - the local time to evaluate against
pub fn should_refetch(last_fetch_date: &str, refresh_hour: u32, now: NaiveDateTime) -> bool {
    let today = now.date().format("%Y-%m-%d").to_string();
    last_fetch_date != today && now.hour() >= refresh_hour
}

/// Key-value store persisting one JSON file per key.
///
/// The store is cheap to construct and holds no open handles; every
/// operation touches the filesystem directly. Concurrent writers for the
/// same key are not coordinated, so the last writer wins.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read a payload, applying the refresh policy.
    ///
    /// # Returns
    ///
    /// The payload if a fresh entry exists. A stale entry is deleted as a
    /// side effect and reads as absent, as does a missing or unparseable
    /// one.
    pub fn get<T: DeserializeOwned>(&self, key: &str, refresh_hour: u32) -> Option<T> {
        self.get_at(key, refresh_hour, Local::now().naive_local())
    }

    /// Read a payload without applying the refresh policy.
    ///
    /// No side effects. This exists for the orchestrators' last-resort
    /// fallback: after a failed live fetch, possibly-stale data beats no
    /// data. Everyday reads should go through [`CacheStore::get`].
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_entry::<T>(key).map(|entry| entry.payload)
    }

    /// Write a payload, stamping it with the current time and local date.
    ///
    /// Failures are logged at `warn` and swallowed; the cache is an
    /// optimization, not a system of record.
    pub fn set<T: Serialize>(&self, key: &str, payload: &T, refresh_hour: u32) {
        self.set_at(key, payload, refresh_hour, Local::now().naive_local())
    }

    /// Delete the entry for `key` unconditionally.
    pub fn clear(&self, key: &str) {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => debug!(key, "cache entry cleared"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(key, error = %e, "failed to clear cache entry"),
        }
    }

    /// Inspect the entry for `key` without touching it.
    pub fn info(&self, key: &str, refresh_hour: u32) -> CacheInfo {
        self.info_at(key, refresh_hour, Local::now().naive_local())
    }

    fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        refresh_hour: u32,
        now: NaiveDateTime,
    ) -> Option<T> {
        let entry = self.read_entry::<T>(key)?;
        if should_refetch(&entry.last_fetch_date, refresh_hour, now) {
            debug!(
                key,
                last_fetch_date = %entry.last_fetch_date,
                refresh_hour,
                "cache entry stale; removing"
            );
            match fs::remove_file(self.path_for(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(key, error = %e, "failed to remove stale cache entry"),
            }
            return None;
        }
        debug!(key, last_fetch_date = %entry.last_fetch_date, "cache hit");
        Some(entry.payload)
    }

    fn set_at<T: Serialize>(&self, key: &str, payload: &T, refresh_hour: u32, now: NaiveDateTime) {
        let entry = CacheEntry {
            payload,
            stored_at_epoch_millis: Utc::now().timestamp_millis(),
            last_fetch_date: now.date().format("%Y-%m-%d").to_string(),
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache entry; dropping write");
                return;
            }
        };
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(key, error = %e, "failed to create cache directory; dropping write");
            return;
        }
        match fs::write(self.path_for(key), serialized) {
            Ok(()) => debug!(
                key,
                refresh_hour,
                last_fetch_date = %entry.last_fetch_date,
                "cached payload until the next refresh hour"
            ),
            Err(e) => warn!(key, error = %e, "failed to write cache entry; dropping write"),
        }
    }

    fn info_at(&self, key: &str, refresh_hour: u32, now: NaiveDateTime) -> CacheInfo {
        match self.read_entry::<serde_json::Value>(key) {
            Some(entry) => CacheInfo {
                exists: true,
                is_stale: Some(should_refetch(&entry.last_fetch_date, refresh_hour, now)),
                last_fetch_date: Some(entry.last_fetch_date),
                stored_at_epoch_millis: Some(entry.stored_at_epoch_millis),
            },
            None => CacheInfo {
                exists: false,
                last_fetch_date: None,
                stored_at_epoch_millis: None,
                is_stale: None,
            },
        }
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(key, error = %e, "cache read failed; treating as miss");
                }
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "cache entry unparseable; treating as miss");
                None
            }
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Card, Category};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn test_store(name: &str) -> CacheStore {
        let dir = std::env::temp_dir().join(format!(
            "briefing-cache-test-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        CacheStore::new(dir)
    }

    fn sample_cards() -> Vec<Card> {
        vec![Card {
            id: "card-0".to_string(),
            headline: "Headline".to_string(),
            summary: "Summary.".to_string(),
            bullets: vec!["One".to_string()],
            category: Category::Top,
            timestamp: "2025-08-11T08:00:00+00:00".to_string(),
            citations: vec!["BBC News — https://www.bbc.com/news".to_string()],
        }]
    }

    #[test]
    fn test_same_day_write_is_fresh_all_day_for_every_hour() {
        for refresh_hour in 0..24 {
            for hour in 0..24 {
                assert!(
                    !should_refetch("2025-08-11", refresh_hour, at(2025, 8, 11, hour)),
                    "refresh_hour={refresh_hour} hour={hour}"
                );
            }
        }
    }

    #[test]
    fn test_next_day_rolls_over_exactly_at_refresh_hour() {
        for refresh_hour in 0..24 {
            for hour in 0..24 {
                let expected = hour >= refresh_hour;
                assert_eq!(
                    should_refetch("2025-08-11", refresh_hour, at(2025, 8, 12, hour)),
                    expected,
                    "refresh_hour={refresh_hour} hour={hour}"
                );
            }
        }
    }

    #[test]
    fn test_midnight_refresh_hour_invalidates_at_date_change() {
        assert!(should_refetch("2025-08-11", 0, at(2025, 8, 12, 0)));
    }

    #[test]
    fn test_pre_refresh_grace_window_reopens_each_morning() {
        // The rule compares only the calendar date, so an entry untouched
        // for two days is still served before the refresh hour.
        assert!(!should_refetch("2025-08-11", 8, at(2025, 8, 13, 6)));
        assert!(should_refetch("2025-08-11", 8, at(2025, 8, 13, 8)));
    }

    #[test]
    fn test_set_then_get_round_trips_before_refresh_hour() {
        let store = test_store("round-trip");
        let cards = sample_cards();
        // Written today, so the entry stays fresh for any refresh hour.
        store.set("daily-news-cards", &cards, 8);
        let back: Option<Vec<Card>> = store.get("daily-news-cards", 8);
        assert_eq!(back, Some(cards));
    }

    #[test]
    fn test_get_deletes_stale_entry() {
        let store = test_store("stale-delete");
        let cards = sample_cards();
        store.set_at("daily-news-cards", &cards, 8, at(2000, 1, 1, 9));
        let read: Option<Vec<Card>> = store.get_at("daily-news-cards", 8, at(2000, 1, 2, 9));
        assert_eq!(read, None);
        // The stale read removed the file, so even a policy-free read misses.
        let peeked: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert_eq!(peeked, None);
    }

    #[test]
    fn test_peek_ignores_policy_and_has_no_side_effects() {
        let store = test_store("peek");
        let cards = sample_cards();
        store.set_at("daily-news-cards", &cards, 8, at(2000, 1, 1, 9));
        let peeked: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert_eq!(peeked, Some(cards.clone()));
        // Still present afterwards.
        let again: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert_eq!(again, Some(cards));
    }

    #[test]
    fn test_clear_removes_entry_and_tolerates_missing_key() {
        let store = test_store("clear");
        store.set("daily-news-cards", &sample_cards(), 8);
        store.clear("daily-news-cards");
        let read: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert_eq!(read, None);
        // Clearing again is a no-op, not a panic.
        store.clear("daily-news-cards");
    }

    #[test]
    fn test_info_reports_missing_entry() {
        let store = test_store("info-missing");
        let info = store.info("daily-news-cards", 8);
        assert!(!info.exists);
        assert_eq!(info.last_fetch_date, None);
        assert_eq!(info.stored_at_epoch_millis, None);
        assert_eq!(info.is_stale, None);
    }

    #[test]
    fn test_info_reports_staleness_without_deleting() {
        let store = test_store("info-stale");
        store.set_at("daily-news-cards", &sample_cards(), 8, at(2000, 1, 1, 9));
        let info = store.info_at("daily-news-cards", 8, at(2000, 1, 2, 9));
        assert!(info.exists);
        assert_eq!(info.last_fetch_date.as_deref(), Some("2000-01-01"));
        assert_eq!(info.is_stale, Some(true));
        // info is a pure read; the entry survives.
        let peeked: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert!(peeked.is_some());
    }

    #[test]
    fn test_corrupt_entry_reads_as_miss() {
        let store = test_store("corrupt");
        fs::create_dir_all(&store.dir).unwrap();
        fs::write(store.path_for("daily-news-cards"), "not json {").unwrap();
        let read: Option<Vec<Card>> = store.get("daily-news-cards", 8);
        assert_eq!(read, None);
        let peeked: Option<Vec<Card>> = store.peek("daily-news-cards");
        assert_eq!(peeked, None);
    }

    #[test]
    fn test_keys_sanitize_to_safe_file_names() {
        let store = test_store("sanitize");
        let path = store.path_for("daily/news:cards");
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(file_name, "daily_news_cards.json");
    }

    #[test]
    fn test_entry_serializes_with_camel_case_fields() {
        let entry = CacheEntry {
            payload: vec!["x".to_string()],
            stored_at_epoch_millis: 1_700_000_000_000,
            last_fetch_date: "2025-08-11".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("storedAtEpochMillis"));
        assert!(json.contains("lastFetchDate"));
    }
}
