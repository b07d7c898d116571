//! Per-vendor collection: resolve a catalog reference to a detail
//! page, validate the landing, extract the record.
//!
//! All vendors share one state machine; what differs per vendor is a
//! `VendorConfig` strategy object (URL template, selectors, consent
//! rule, matcher tuning) and the transport behind the `PageFetcher`
//! seam.

pub mod fetch;
pub mod session;

pub use fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use session::{BrowserFetcher, BrowserSession};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::matcher::{MatcherConfig, ReferenceMatcher, DEFAULT_MATCH_CUTOFF};
use crate::models::{ScrapedRecord, StockStatus, TIMESTAMP_FORMAT};
use crate::pricing;
use crate::store::VendorArticleIndex;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// CSS selectors describing one vendor's markup. Optional selectors
/// yield a well-defined absence when missing or unmatched, never an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSelectors {
    /// Cookie/consent interstitial control, dismissed best-effort.
    #[serde(default)]
    pub consent_button: Option<String>,
    /// First result link on a search/listing landing.
    #[serde(default)]
    pub result_link: Option<String>,
    /// Article title; its presence is what marks a detail page.
    pub title: String,
    /// The vendor's own displayed reference/part code.
    #[serde(default)]
    pub displayed_reference: Option<String>,
    #[serde(default)]
    pub price_excl_tax: Option<String>,
    #[serde(default)]
    pub price_incl_tax: Option<String>,
    #[serde(default)]
    pub stock: Option<String>,
    #[serde(default)]
    pub offer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    pub name: String,
    /// Entry URL template; `{reference}` is replaced with the
    /// percent-encoded catalog reference.
    pub entry_url: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Drive a headless browser instead of plain HTTP.
    #[serde(default)]
    pub use_browser: bool,
    /// Consult the vendor's article index during reconciliation.
    #[serde(default)]
    pub use_article_index: bool,
    /// Historically tuned per vendor; not unified on purpose.
    #[serde(default = "default_cutoff")]
    pub match_cutoff: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Overrides the global tax rate when set.
    #[serde(default)]
    pub tax_rate: Option<f64>,
    pub selectors: VendorSelectors,
}

fn default_cutoff() -> f64 {
    DEFAULT_MATCH_CUTOFF
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl VendorConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn entry_url_for(&self, reference: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(reference.as_bytes()).collect();
        self.entry_url.replace("{reference}", &encoded)
    }
}

/// One vendor's collection strategy. `collect` never fails: every
/// failure mode degrades to the default "unavailable" record.
#[async_trait]
pub trait VendorCollector: Send + Sync {
    fn vendor_name(&self) -> &str;
    async fn collect(&self, reference: &str) -> ScrapedRecord;
}

/// Attempt-level outcome classification. Retryable errors go back
/// around the loop after the fixed delay; terminal ones return the
/// default record immediately.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Terminal(String),
}

impl From<FetchError> for AttemptError {
    fn from(e: FetchError) -> Self {
        match e {
            // Retrying cannot make a missing resource appear.
            FetchError::NotFound => AttemptError::Terminal("resource not found (404)".to_string()),
            FetchError::Transport(msg) | FetchError::Parse(msg) => AttemptError::Retryable(msg),
        }
    }
}

enum Landing {
    Detail,
    Listing(Option<String>),
}

/// Fields pulled off a detail page, each independently optional.
#[derive(Debug, Default)]
struct ExtractedFields {
    title: Option<String>,
    displayed_reference: Option<String>,
    price_excl_tax: Option<Decimal>,
    price_incl_tax: Option<Decimal>,
    stock_text: Option<String>,
    offer: Option<String>,
}

pub struct PageCollector<F: PageFetcher> {
    config: VendorConfig,
    fetcher: F,
    matcher: ReferenceMatcher,
    index: VendorArticleIndex,
    tax_rate: Decimal,
}

impl<F: PageFetcher> PageCollector<F> {
    pub fn new(
        config: VendorConfig,
        fetcher: F,
        matcher_config: MatcherConfig,
        index: VendorArticleIndex,
        global_tax_rate: Decimal,
    ) -> crate::Result<Self> {
        let tax_rate = config
            .tax_rate
            .and_then(Decimal::from_f64)
            .unwrap_or(global_tax_rate);
        Ok(Self {
            config,
            fetcher,
            matcher: ReferenceMatcher::new(matcher_config)?,
            index,
            tax_rate,
        })
    }

    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    async fn attempt(&self, reference: &str) -> Result<ScrapedRecord, AttemptError> {
        let consent = self.config.selectors.consent_button.as_deref();
        let entry_url = self.config.entry_url_for(reference);
        let mut page = self.fetcher.fetch(&entry_url, consent).await?;

        match classify_landing(&page, &self.config.selectors)? {
            Landing::Detail => {}
            Landing::Listing(Some(result_url)) => {
                tracing::debug!(
                    vendor = %self.config.name,
                    reference,
                    url = %result_url,
                    "following first search result"
                );
                page = self.fetcher.fetch(&result_url, consent).await?;
            }
            Landing::Listing(None) => {
                // An empty result list will stay empty; don't retry.
                return Err(AttemptError::Terminal("search returned no results".to_string()));
            }
        }

        let fields = extract_fields(&page, &self.config.selectors);

        let title = fields.title.clone().ok_or_else(|| {
            AttemptError::Retryable(format!(
                "no article title at selector '{}'",
                self.config.selectors.title
            ))
        })?;

        self.validate_reference(reference, &title, fields.displayed_reference.as_deref())?;

        let (price_excl_tax, price_incl_tax) =
            pricing::derive_price_texts(fields.price_excl_tax, fields.price_incl_tax, self.tax_rate);

        Ok(ScrapedRecord {
            reference: reference.to_string(),
            vendor: self.config.name.clone(),
            article: Some(title),
            url: Some(page.url),
            price_excl_tax,
            price_incl_tax,
            previous_price: None,
            trend: crate::models::PriceTrend::Unknown,
            offer: fields.offer,
            stock: parse_stock(fields.stock_text.as_deref(), fields.price_incl_tax.is_some()),
            checked_at: self.now().format(TIMESTAMP_FORMAT).to_string(),
        })
    }

    /// Guard against landing on the wrong product. An exactly-equal
    /// displayed code passes outright; otherwise the fuzzy matcher
    /// decides against the vendor's title (and article index when
    /// configured).
    fn validate_reference(
        &self,
        reference: &str,
        title: &str,
        displayed: Option<&str>,
    ) -> Result<(), AttemptError> {
        let Some(displayed) = displayed else {
            // Vendor shows no code on the page; nothing to reconcile.
            return Ok(());
        };
        if ReferenceMatcher::normalize(displayed) == ReferenceMatcher::normalize(reference) {
            return Ok(());
        }

        let score = self.matcher.score(reference, title);
        let mut accepted = score >= self.config.match_cutoff;

        if !accepted && self.config.use_article_index && !self.matcher.is_bundle(title) {
            // The store has resolved this reference before; a known
            // article above the cutoff vouches for a landing whose
            // displayed code and title phrasing both diverge. Bundles
            // stay excluded.
            accepted = self
                .matcher
                .best_match(
                    reference,
                    self.index.titles().iter().map(String::as_str),
                    self.config.match_cutoff,
                )
                .is_some();
        }

        if accepted {
            tracing::info!(
                vendor = %self.config.name,
                reference,
                displayed,
                title,
                score,
                "displayed reference differs, accepted reconciled match"
            );
            Ok(())
        } else {
            Err(AttemptError::Terminal(format!(
                "displayed reference '{displayed}' does not match (score {score:.2} < {:.2})",
                self.config.match_cutoff
            )))
        }
    }
}

#[async_trait]
impl<F: PageFetcher> VendorCollector for PageCollector<F> {
    fn vendor_name(&self) -> &str {
        &self.config.name
    }

    async fn collect(&self, reference: &str) -> ScrapedRecord {
        let max_retries = self.config.max_retries.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        for attempt in 1..=max_retries {
            match self.attempt(reference).await {
                Ok(record) => {
                    tracing::info!(
                        vendor = %self.config.name,
                        reference,
                        article = record.article.as_deref().unwrap_or(""),
                        "collected record"
                    );
                    return record;
                }
                Err(AttemptError::Terminal(reason)) => {
                    tracing::info!(
                        vendor = %self.config.name,
                        reference,
                        reason,
                        "reference unavailable, not retrying"
                    );
                    return ScrapedRecord::unavailable(reference, &self.config.name, self.now());
                }
                Err(AttemptError::Retryable(reason)) => {
                    tracing::warn!(
                        vendor = %self.config.name,
                        reference,
                        attempt,
                        max_retries,
                        reason,
                        "attempt failed"
                    );
                    if attempt < max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            vendor = %self.config.name,
            reference,
            "retries exhausted, returning default record"
        );
        ScrapedRecord::unavailable(reference, &self.config.name, self.now())
    }
}

/// Is this a detail page or a search/listing page? Decided by which
/// selectors match: a title marks a detail page, otherwise the first
/// result link (resolved against the page address) is followed once.
fn classify_landing(page: &FetchedPage, selectors: &VendorSelectors) -> Result<Landing, AttemptError> {
    let document = Html::parse_document(&page.html);

    if let Ok(title_selector) = Selector::parse(&selectors.title) {
        if document.select(&title_selector).next().is_some() {
            return Ok(Landing::Detail);
        }
    }

    let Some(link_selector_str) = selectors.result_link.as_deref() else {
        return Err(AttemptError::Retryable(
            "page is neither a detail page nor a configured listing".to_string(),
        ));
    };
    let link_selector = Selector::parse(link_selector_str).map_err(|e| {
        AttemptError::Retryable(format!(
            "invalid result link selector '{link_selector_str}': {e:?}"
        ))
    })?;

    let href = document
        .select(&link_selector)
        .find_map(|el| el.value().attr("href").map(str::to_string));

    match href {
        Some(href) => {
            let absolute = Url::parse(&page.url)
                .and_then(|base| base.join(&href))
                .map(|u| u.to_string())
                .unwrap_or(href);
            Ok(Landing::Listing(Some(absolute)))
        }
        None => Ok(Landing::Listing(None)),
    }
}

/// Pull every configured field off the detail page. Each extraction
/// yields a value or a well-defined absence; nothing here can fail.
fn extract_fields(page: &FetchedPage, selectors: &VendorSelectors) -> ExtractedFields {
    let document = Html::parse_document(&page.html);

    let text_at = |selector: Option<&str>| -> Option<String> {
        let parsed = Selector::parse(selector?).ok()?;
        let element = document.select(&parsed).next()?;
        let text = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    };

    ExtractedFields {
        title: text_at(Some(selectors.title.as_str())),
        displayed_reference: text_at(selectors.displayed_reference.as_deref()),
        price_excl_tax: text_at(selectors.price_excl_tax.as_deref())
            .as_deref()
            .and_then(pricing::parse_price),
        price_incl_tax: text_at(selectors.price_incl_tax.as_deref())
            .as_deref()
            .and_then(pricing::parse_price),
        stock_text: text_at(selectors.stock.as_deref()),
        offer: text_at(selectors.offer.as_deref()),
    }
}

/// Reduce the vendor's availability text to a stable status. A page
/// that shows a price but no stock wording is assumed purchasable.
fn parse_stock(text: Option<&str>, has_price: bool) -> StockStatus {
    match text {
        Some(text) => {
            let lower = text.to_lowercase();
            if lower.contains("out of stock")
                || lower.contains("rupture")
                || lower.contains("indisponible")
                || lower.contains("sold out")
            {
                StockStatus::OutOfStock
            } else if lower.contains("stock") || lower.contains("available") || lower.contains("disponible") {
                StockStatus::InStock
            } else {
                StockStatus::Unknown
            }
        }
        None if has_price => StockStatus::InStock,
        None => StockStatus::Unknown,
    }
}
