//! Turns retailer price and size text into comparable per-litre figures.

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Prices above this are treated as scraping noise.
pub const MAX_PRICE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

const UNITS: &str = r"millilitres?|milliliters?|ml|litres?|liters?|l";

static VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d+(?:\.\d+)?)\s*({UNITS})\b")).expect("volume regex")
});

// "6 x 375ml", "6x375mL"
static COUNT_THEN_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d+)\s*[x×]\s*(\d+(?:\.\d+)?)\s*({UNITS})\b")).expect("count regex")
});

// "375ml x 6"
static VOLUME_THEN_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d+(?:\.\d+)?)\s*({UNITS})\s*[x×]\s*(\d+)\b")).expect("count regex")
});

static PACK_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpack\s+of\s+(\d+)").expect("pack regex"));

// "30 Pack", "24-pack", "10 cans"
static N_PACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*-?\s*(?:pack|cans|bottles)\b").expect("pack regex")
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("unparsable size: '{0}'")]
    UnparsableSize(String),

    #[error("invalid price: '{0}'")]
    InvalidPrice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalized {
    pub size_ml: u32,
    pub price: Decimal,
    pub price_per_litre: Decimal,
}

pub fn normalize(raw_price: &str, raw_size: &str) -> Result<Normalized, NormalizeError> {
    let size_ml = parse_size_ml(raw_size)?;
    let price = parse_price(raw_price)?;
    Ok(Normalized {
        size_ml,
        price,
        price_per_litre: price_per_litre(price, size_ml),
    })
}

/// Price per litre rounded to cents, midpoints away from zero.
pub fn price_per_litre(price: Decimal, size_ml: u32) -> Decimal {
    price
        .checked_mul(Decimal::ONE_THOUSAND)
        .and_then(|per_ml| per_ml.checked_div(Decimal::from(size_ml)))
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total volume in millilitres across every unit in the listing.
pub fn parse_size_ml(raw: &str) -> Result<u32, NormalizeError> {
    let unparsable = || NormalizeError::UnparsableSize(raw.to_string());

    let (count, unit_ml) = if let Some(caps) = COUNT_THEN_VOLUME.captures(raw) {
        (parse_count(&caps[1]), to_ml(&caps[2], &caps[3]))
    } else if let Some(caps) = VOLUME_THEN_COUNT.captures(raw) {
        (parse_count(&caps[3]), to_ml(&caps[1], &caps[2]))
    } else {
        let caps = VOLUME.captures(raw).ok_or_else(unparsable)?;
        let unit_ml = to_ml(&caps[1], &caps[2]);
        let count = PACK_OF
            .captures(raw)
            .or_else(|| N_PACK.captures(raw))
            .map(|c| parse_count(&c[1]))
            .unwrap_or(Some(1));
        (count, unit_ml)
    };

    let count = count.filter(|c| *c > 0).ok_or_else(unparsable)?;
    let unit_ml = unit_ml.ok_or_else(unparsable)?;

    let total = unit_ml
        .checked_mul(Decimal::from(count))
        .ok_or_else(unparsable)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    match total.to_u32() {
        Some(ml) if ml > 0 => Ok(ml),
        _ => Err(unparsable()),
    }
}

/// Accepts "$4.50", "AU$1,234.00", " 3.2 "; rejects anything non-positive
/// or above [`MAX_PRICE`].
pub fn parse_price(raw: &str) -> Result<Decimal, NormalizeError> {
    let invalid = || NormalizeError::InvalidPrice(raw.to_string());

    let trimmed = raw.trim();
    let without_currency = trimmed
        .strip_prefix("AU$")
        .or_else(|| trimmed.strip_prefix("au$"))
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);

    let cleaned: String = without_currency
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let price = Decimal::from_str(&cleaned).map_err(|_| invalid())?;
    if price <= Decimal::ZERO || price > MAX_PRICE {
        return Err(invalid());
    }
    Ok(price)
}

fn parse_count(text: &str) -> Option<u32> {
    text.parse::<u32>().ok()
}

fn to_ml(value: &str, unit: &str) -> Option<Decimal> {
    let value = Decimal::from_str(value).ok()?;
    if unit.to_lowercase().starts_with('m') {
        Some(value)
    } else {
        value.checked_mul(Decimal::ONE_THOUSAND)
    }
}
