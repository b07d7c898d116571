use serde::{Deserialize, Serialize};

pub mod record;

// Re-exports for convenience
pub use record::*;

/// Storage text form of check timestamps. A value that does not parse
/// with this format is treated as a cache miss, never as an error.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Availability as displayed by the vendor, reduced to what the store
/// can encode stably.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StockStatus {
    #[serde(rename = "in stock")]
    InStock,
    #[serde(rename = "out of stock")]
    OutOfStock,
    #[serde(rename = "unavailable")]
    Unknown,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in stock",
            StockStatus::OutOfStock => "out of stock",
            StockStatus::Unknown => "unavailable",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the price relative to the previous check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PriceTrend {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "same")]
    Same,
    #[serde(rename = "")]
    Unknown,
}

impl std::fmt::Display for PriceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceTrend::Up => "up",
            PriceTrend::Down => "down",
            PriceTrend::Same => "same",
            PriceTrend::Unknown => "",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_encoding() {
        assert_eq!(StockStatus::InStock.to_string(), "in stock");
        assert_eq!(StockStatus::Unknown.to_string(), "unavailable");
    }

    #[test]
    fn test_trend_encoding() {
        assert_eq!(PriceTrend::Down.to_string(), "down");
        assert_eq!(PriceTrend::Unknown.to_string(), "");
    }
}
