//! Write side of a vendor's durable store.
//!
//! Records accumulate in memory and are appended to the CSV file in
//! batches, so a crash mid-pass loses at most one batch. A fatal
//! error triggers a single emergency flush of whatever is buffered.

use std::fs::OpenOptions;
use std::path::PathBuf;

use crate::models::ScrapedRecord;
use crate::Result;

/// Default buffer size before an automatic flush.
pub const DEFAULT_SAVE_THRESHOLD: usize = 500;

pub struct BatchWriter {
    path: PathBuf,
    buffer: Vec<ScrapedRecord>,
    threshold: usize,
    flush_count: u32,
    emergency_flushed: bool,
}

impl BatchWriter {
    pub fn new(path: PathBuf, threshold: usize) -> Self {
        Self {
            path,
            buffer: Vec::new(),
            threshold: threshold.max(1),
            flush_count: 0,
            emergency_flushed: false,
        }
    }

    /// Buffer a record; flushes automatically when the buffer reaches
    /// the threshold. Returns whether a flush happened.
    pub fn append(&mut self, record: ScrapedRecord) -> Result<bool> {
        self.buffer.push(record);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Append the buffer to the store and clear it. Creates the file
    /// with a header row when it does not exist yet. A no-op on an
    /// empty buffer.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let write_headers = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_headers)
            .from_writer(file);
        for record in &self.buffer {
            writer.serialize(record)?;
        }
        writer.flush()?;
        tracing::debug!(
            path = %self.path.display(),
            rows = self.buffer.len(),
            "flushed batch to store"
        );
        self.buffer.clear();
        self.flush_count += 1;
        Ok(())
    }

    /// Best-effort flush on a fatal error. Runs at most once per
    /// writer and only when records are buffered; a failure here is
    /// logged, not propagated, since the caller is already aborting.
    pub fn emergency_flush(&mut self) {
        if self.emergency_flushed || self.buffer.is_empty() {
            return;
        }
        self.emergency_flushed = true;
        let pending = self.buffer.len();
        match self.flush() {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                rows = pending,
                "emergency flush saved pending batch"
            ),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                rows = pending,
                error = %e,
                "emergency flush failed, pending batch lost"
            ),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of completed flushes, automatic and manual.
    pub fn flush_count(&self) -> u32 {
        self.flush_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(reference: &str) -> ScrapedRecord {
        let now = NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        ScrapedRecord::unavailable(reference, "toolnation", now)
    }

    fn row_count(path: &std::path::Path) -> usize {
        csv::Reader::from_path(path).unwrap().records().count()
    }

    #[test]
    fn test_append_flushes_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let mut writer = BatchWriter::new(path.clone(), 3);

        assert!(!writer.append(record("A")).unwrap());
        assert!(!writer.append(record("B")).unwrap());
        assert!(writer.append(record("C")).unwrap());

        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.flush_count(), 1);
        assert_eq!(row_count(&path), 3);
    }

    #[test]
    fn test_one_flush_per_full_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let mut writer = BatchWriter::new(path.clone(), 3);

        for i in 0..7 {
            writer.append(record(&format!("R{i}"))).unwrap();
        }
        // Two automatic flushes for 7 records at threshold 3, one
        // record left pending.
        assert_eq!(writer.flush_count(), 2);
        assert_eq!(writer.pending(), 1);
        assert_eq!(row_count(&path), 6);

        writer.flush().unwrap();
        assert_eq!(row_count(&path), 7);
    }

    #[test]
    fn test_flush_on_empty_buffer_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let mut writer = BatchWriter::new(path.clone(), 3);

        writer.flush().unwrap();
        assert_eq!(writer.flush_count(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");

        let mut writer = BatchWriter::new(path.clone(), 500);
        writer.append(record("A")).unwrap();
        writer.flush().unwrap();
        writer.append(record("B")).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_lines = content
            .lines()
            .filter(|l| l.starts_with("reference,"))
            .count();
        assert_eq!(header_lines, 1);
        assert_eq!(row_count(&path), 2);
    }

    #[test]
    fn test_emergency_flush_saves_pending_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let mut writer = BatchWriter::new(path.clone(), 500);

        writer.append(record("A")).unwrap();
        writer.append(record("B")).unwrap();

        writer.emergency_flush();
        assert_eq!(row_count(&path), 2);
        assert_eq!(writer.flush_count(), 1);

        // A second emergency flush does nothing, even with new data.
        writer.append(record("C")).unwrap();
        writer.emergency_flush();
        assert_eq!(row_count(&path), 2);
    }

    #[test]
    fn test_emergency_flush_empty_buffer_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let mut writer = BatchWriter::new(path.clone(), 500);

        writer.emergency_flush();
        assert!(!path.exists());
        assert_eq!(writer.flush_count(), 0);
    }
}
