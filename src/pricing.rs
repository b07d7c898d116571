//! Reconciles tax-inclusive and tax-exclusive prices.
//!
//! Vendors display one or the other (sometimes both); the store keeps
//! both columns. Pure numeric code, no retry semantics.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Belgian VAT. Vendors that trade under a different rate override it
/// in their config block.
pub fn default_tax_rate() -> Decimal {
    Decimal::new(21, 2)
}

/// Derive the missing side of an (excl. tax, incl. tax) price pair.
///
/// Both present: returned unchanged, no cross-validation. Exactly one
/// present: the other is computed with the multiplier `1 + rate` and
/// rounded to 2 decimals. Both absent: both stay absent.
pub fn derive_prices(
    excl_tax: Option<Decimal>,
    incl_tax: Option<Decimal>,
    rate: Decimal,
) -> (Option<Decimal>, Option<Decimal>) {
    let multiplier = Decimal::ONE + rate;
    match (excl_tax, incl_tax) {
        (Some(excl), Some(incl)) => (Some(excl), Some(incl)),
        (Some(excl), None) => (Some(excl), Some((excl * multiplier).round_dp(2))),
        (None, Some(incl)) => (Some((incl / multiplier).round_dp(2)), Some(incl)),
        (None, None) => (None, None),
    }
}

/// Storage text form: 2 decimals, comma separator ("82,64").
pub fn format_price(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2)).replace('.', ",")
}

/// Parse a price out of vendor or store text. Tolerates currency
/// symbols, whitespace (incl. non-breaking), thousands dots before a
/// comma decimal, and either decimal separator.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    // "1.234,56" -> "1234.56"; "1234.56" stays as-is.
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    // "199,-" vendors leave a dangling separator after cleanup.
    Decimal::from_str(normalized.trim_end_matches('.')).ok()
}

/// `derive_prices` with text-form output for record fields.
pub fn derive_price_texts(
    excl_tax: Option<Decimal>,
    incl_tax: Option<Decimal>,
    rate: Decimal,
) -> (Option<String>, Option<String>) {
    let (excl, incl) = derive_prices(excl_tax, incl_tax, rate);
    (excl.map(format_price), incl.map(format_price))
}
