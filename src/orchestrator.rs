//! Drives a full collection run: every catalog reference through
//! every enabled vendor, strictly sequentially, with cache
//! short-circuiting, batch persistence, and per-vendor fault
//! isolation.

use chrono::NaiveDateTime;
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{
    BrowserFetcher, BrowserSession, HttpFetcher, PageCollector, VendorCollector, VendorConfig,
};
use crate::config::AppConfig;
use crate::models::{CatalogReference, ScrapedRecord};
use crate::pricing;
use crate::store::{BatchWriter, ResultCache, VendorArticleIndex};
use crate::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Integer 0-100 progress callback, invoked after each discrete step.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Receives the outcome once a run completes, whether or not anything
/// was exported. The real implementation lives with the notification
/// surface; the pipeline only knows this interface.
pub trait CompletionNotifier: Send + Sync {
    fn run_completed(&self, export_path: Option<&Path>, summary: &RunSummary);
}

/// Receives the merged dataset for spreadsheet synchronization.
pub trait SpreadsheetSync: Send + Sync {
    fn sync(&self, records: &[ScrapedRecord]) -> Result<()>;
}

pub struct NoopNotifier;

impl CompletionNotifier for NoopNotifier {
    fn run_completed(&self, export_path: Option<&Path>, summary: &RunSummary) {
        let export = export_path
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        tracing::info!(
            export = %export,
            records = summary.total_records,
            "run completed"
        );
    }
}

pub struct NoopSpreadsheetSync;

impl SpreadsheetSync for NoopSpreadsheetSync {
    fn sync(&self, _records: &[ScrapedRecord]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorOutcome {
    pub vendor: String,
    /// Freshly fetched records with a resolved article.
    pub fresh: usize,
    /// Cache hits copied into the run output.
    pub cached: usize,
    /// Default "unavailable" records.
    pub unavailable: usize,
    /// The pass aborted on a fatal error (after an emergency flush).
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub vendors: Vec<VendorOutcome>,
    pub total_records: usize,
    pub export_path: Option<PathBuf>,
    pub cancelled: bool,
}

pub struct Orchestrator {
    config: AppConfig,
    progress: Option<ProgressFn>,
    cancel: Arc<AtomicBool>,
    notifier: Box<dyn CompletionNotifier>,
    spreadsheet: Box<dyn SpreadsheetSync>,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            progress: None,
            cancel: Arc::new(AtomicBool::new(false)),
            notifier: Box::new(NoopNotifier),
            spreadsheet: Box::new(NoopSpreadsheetSync),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn CompletionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_spreadsheet_sync(mut self, spreadsheet: Box<dyn SpreadsheetSync>) -> Self {
        self.spreadsheet = spreadsheet;
        self
    }

    /// Shared flag for cooperative cancellation; checked between
    /// items. A forced kill bypasses this and the session cleanup.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub async fn run(&self, catalog: &[CatalogReference]) -> Result<RunSummary> {
        let enabled: Vec<&VendorConfig> = self
            .config
            .vendors
            .iter()
            .filter(|v| v.is_enabled())
            .collect();
        // 1 catalog step + one per vendor + merge + export.
        let total_steps = 1 + enabled.len() + 2;
        let mut done_steps = 0usize;

        tracing::info!(
            references = catalog.len(),
            vendors = enabled.len(),
            "starting collection run"
        );
        done_steps += 1;
        self.report(done_steps, total_steps);

        let mut summary = RunSummary::default();
        let mut merged: Vec<ScrapedRecord> = Vec::new();

        for vendor in enabled {
            if self.cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }

            let store_path = self.config.store.data_dir.join(format!("{}.csv", vendor.name));
            let mut writer = BatchWriter::new(store_path.clone(), self.config.store.save_threshold);
            let mut outcome = VendorOutcome {
                vendor: vendor.name.clone(),
                fresh: 0,
                cached: 0,
                unavailable: 0,
                failed: false,
            };

            match self
                .vendor_pass(vendor, catalog, &store_path, &mut writer, &mut outcome, &mut merged)
                .await
            {
                Ok(completed) => {
                    if !completed {
                        summary.cancelled = true;
                        summary.vendors.push(outcome);
                        break;
                    }
                }
                Err(e) => {
                    // One vendor's failure never blocks the others;
                    // save whatever this pass had buffered and move on.
                    tracing::error!(vendor = %vendor.name, error = %e, "vendor pass aborted");
                    writer.emergency_flush();
                    outcome.failed = true;
                }
            }

            summary.vendors.push(outcome);
            done_steps += 1;
            self.report(done_steps, total_steps);
        }

        summary.total_records = merged.len();
        done_steps += 1;
        self.report(done_steps, total_steps);

        if !merged.is_empty() {
            summary.export_path = Some(self.write_export(&merged)?);
        }
        done_steps += 1;
        self.report(done_steps, total_steps);

        self.notifier
            .run_completed(summary.export_path.as_deref(), &summary);
        if !merged.is_empty() {
            if let Err(e) = self.spreadsheet.sync(&merged) {
                tracing::error!(error = %e, "spreadsheet sync failed");
            }
        }

        tracing::info!(
            records = summary.total_records,
            cancelled = summary.cancelled,
            "collection run finished"
        );
        Ok(summary)
    }

    /// Returns Ok(false) when cancellation cut the pass short (after
    /// flushing the pending batch). Errors abort the pass and are
    /// handled at vendor granularity by the caller.
    async fn vendor_pass(
        &self,
        vendor: &VendorConfig,
        catalog: &[CatalogReference],
        store_path: &Path,
        writer: &mut BatchWriter,
        outcome: &mut VendorOutcome,
        merged: &mut Vec<ScrapedRecord>,
    ) -> Result<bool> {
        let cache = ResultCache::load(store_path);
        let index = VendorArticleIndex::load(store_path);
        // Session and client are acquired once per pass and reused
        // across items; dropping the collector tears them down.
        let collector = self.build_collector(vendor, index)?;
        let now = now_local();
        let ttl = self.config.store.cache_ttl_days;

        tracing::info!(
            vendor = %vendor.name,
            cache_entries = cache.len(),
            "starting vendor pass"
        );

        let mut fetched_any = false;
        for reference in catalog {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!(vendor = %vendor.name, "cancellation requested, flushing pending batch");
                writer.flush()?;
                return Ok(false);
            }

            if let Some(hit) = cache.lookup(reference, ttl, now) {
                tracing::debug!(vendor = %vendor.name, reference = %reference, "cache hit");
                merged.push(hit.clone());
                outcome.cached += 1;
                continue;
            }

            if fetched_any {
                self.item_delay().await;
            }
            fetched_any = true;

            let mut record = collector.collect(reference).await;
            record.apply_history(cache.latest(reference));
            if record.article.is_some() {
                outcome.fresh += 1;
            } else {
                outcome.unavailable += 1;
            }
            merged.push(record.clone());
            writer.append(record)?;
        }

        writer.flush()?;
        Ok(true)
    }

    fn build_collector(
        &self,
        vendor: &VendorConfig,
        index: VendorArticleIndex,
    ) -> Result<Box<dyn VendorCollector>> {
        let timeout = Duration::from_secs(self.config.scraper.request_timeout);
        let tax_rate = Decimal::from_f64(self.config.tax_rate)
            .unwrap_or_else(pricing::default_tax_rate);

        if vendor.use_browser {
            let session = BrowserSession::launch(self.config.scraper.chrome_path.as_deref())?;
            let fetcher = BrowserFetcher::new(session, timeout);
            Ok(Box::new(PageCollector::new(
                vendor.clone(),
                fetcher,
                self.config.matcher.clone(),
                index,
                tax_rate,
            )?))
        } else {
            let fetcher = HttpFetcher::new(&self.config.scraper.user_agent, timeout)?;
            Ok(Box::new(PageCollector::new(
                vendor.clone(),
                fetcher,
                self.config.matcher.clone(),
                index,
                tax_rate,
            )?))
        }
    }

    /// Randomized pause between consecutive item fetches.
    async fn item_delay(&self) {
        let min = self.config.scraper.item_delay_min_ms;
        let max = self.config.scraper.item_delay_max_ms;
        if max == 0 {
            return;
        }
        let ms = { rand::thread_rng().gen_range(min..=max.max(min)) };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn write_export(&self, records: &[ScrapedRecord]) -> Result<PathBuf> {
        let exports_dir = self.config.store.data_dir.join("exports");
        std::fs::create_dir_all(&exports_dir)?;
        let filename = format!("run_{}.csv", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let path = exports_dir.join(filename);

        let mut writer = csv::Writer::from_path(&path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), rows = records.len(), "wrote merged export");
        Ok(path)
    }

    fn report(&self, done: usize, total: usize) {
        if let Some(callback) = &self.progress {
            let percent = ((done as f64 / total as f64) * 100.0).round() as u8;
            callback(percent.min(100));
        }
    }
}

fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
