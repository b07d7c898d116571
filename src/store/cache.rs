//! Read side of a vendor's durable store.
//!
//! The store is a per-vendor CSV file, append-only for the duration
//! of a run and loaded fully into memory at vendor-pass start. Two
//! views are built from it: the result cache (skip re-fetching
//! references checked within the TTL window) and the article index
//! (candidate pool for fuzzy reconciliation).

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;

use crate::models::ScrapedRecord;

/// Most recent persisted record per reference.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, ScrapedRecord>,
}

impl ResultCache {
    /// Load a store file. Absent, empty, or unreadable stores yield
    /// an empty cache; malformed rows are skipped. This never fails:
    /// a cold cache only costs re-fetching.
    pub fn load(path: &Path) -> Self {
        let mut cache = Self::default();
        let mut reader = match csv::Reader::from_path(path) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no usable store, starting with empty cache");
                return cache;
            }
        };
        for row in reader.deserialize::<ScrapedRecord>() {
            match row {
                Ok(record) => cache.insert(record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed store row"),
            }
        }
        tracing::debug!(path = %path.display(), entries = cache.entries.len(), "cache loaded");
        cache
    }

    /// Keep the newest record per reference. The store is append-only
    /// so later rows win when timestamps tie or don't parse.
    fn insert(&mut self, record: ScrapedRecord) {
        match self.entries.get(&record.reference) {
            Some(existing) => {
                let keep_new = match (record.checked_at_time(), existing.checked_at_time()) {
                    (Some(new), Some(old)) => new >= old,
                    (None, Some(_)) => false,
                    _ => true,
                };
                if keep_new {
                    self.entries.insert(record.reference.clone(), record);
                }
            }
            None => {
                self.entries.insert(record.reference.clone(), record);
            }
        }
    }

    /// The record for `reference` if it was checked within the last
    /// `ttl_days`. Absent references and unparsable timestamps are
    /// misses, not errors.
    pub fn lookup(&self, reference: &str, ttl_days: i64, now: NaiveDateTime) -> Option<&ScrapedRecord> {
        let record = self.entries.get(reference)?;
        let checked_at = record.checked_at_time()?;
        if now.signed_duration_since(checked_at) <= Duration::days(ttl_days) {
            Some(record)
        } else {
            None
        }
    }

    /// Newest record for `reference` regardless of TTL. Feeds the
    /// previous-price and trend columns.
    pub fn latest(&self, reference: &str) -> Option<&ScrapedRecord> {
        self.entries.get(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Distinct article titles known to a vendor's store. Rebuilt at
/// vendor-pass start, read-only for the run's duration.
#[derive(Debug, Default)]
pub struct VendorArticleIndex {
    titles: Vec<String>,
}

impl VendorArticleIndex {
    pub fn load(path: &Path) -> Self {
        let mut index = Self::default();
        let mut seen = std::collections::HashSet::new();
        let mut reader = match csv::Reader::from_path(path) {
            Ok(reader) => reader,
            Err(_) => return index,
        };
        for record in reader.deserialize::<ScrapedRecord>().flatten() {
            if let Some(article) = record.article {
                if !article.is_empty() && seen.insert(article.clone()) {
                    index.titles.push(article);
                }
            }
        }
        index
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
