use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{PriceTrend, StockStatus, TIMESTAMP_FORMAT};
use crate::pricing;

/// A catalog entry as supplied by the user: a manufacturer part code
/// or a free-text article name. Opaque to the pipeline.
pub type CatalogReference = String;

/// One row of the durable store: the state of (reference, vendor) at
/// check time. Rows are append-only; a record is either freshly
/// fetched or copied verbatim from a still-valid cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedRecord {
    pub reference: String,
    pub vendor: String,
    pub article: Option<String>,
    pub url: Option<String>,
    /// Price excluding tax, storage text form ("123,45").
    pub price_excl_tax: Option<String>,
    /// Price including tax, storage text form.
    pub price_incl_tax: Option<String>,
    pub previous_price: Option<String>,
    pub trend: PriceTrend,
    pub offer: Option<String>,
    pub stock: StockStatus,
    /// `TIMESTAMP_FORMAT` text; unparsable values are cache misses.
    pub checked_at: String,
}

impl ScrapedRecord {
    /// The default "unavailable" record returned when a reference
    /// could not be resolved on a vendor: empty prices, unknown stock,
    /// stamped with the current time.
    pub fn unavailable(reference: &str, vendor: &str, now: NaiveDateTime) -> Self {
        Self {
            reference: reference.to_string(),
            vendor: vendor.to_string(),
            article: None,
            url: None,
            price_excl_tax: None,
            price_incl_tax: None,
            previous_price: None,
            trend: PriceTrend::Unknown,
            offer: None,
            stock: StockStatus::Unknown,
            checked_at: now.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Parse the check timestamp. None for malformed values.
    pub fn checked_at_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.checked_at, TIMESTAMP_FORMAT).ok()
    }

    /// Fill `previous_price` and `trend` from the last persisted
    /// record for the same reference, comparing tax-inclusive prices.
    pub fn apply_history(&mut self, previous: Option<&ScrapedRecord>) {
        let Some(prev) = previous else {
            self.trend = PriceTrend::Unknown;
            return;
        };
        self.previous_price = prev.price_incl_tax.clone();
        let old = prev.price_incl_tax.as_deref().and_then(pricing::parse_price);
        let new = self.price_incl_tax.as_deref().and_then(pricing::parse_price);
        self.trend = match (old, new) {
            (Some(old), Some(new)) if new > old => PriceTrend::Up,
            (Some(old), Some(new)) if new < old => PriceTrend::Down,
            (Some(_), Some(_)) => PriceTrend::Same,
            _ => PriceTrend::Unknown,
        };
    }
}
