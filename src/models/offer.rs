use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::models::{Retailer, StockStatus};
use crate::normalizer;

/// A listing as a retailer returned it, before matching or normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawOffer {
    pub retailer: Retailer,
    pub title: String,
    pub raw_price: String,
    pub raw_size: String,
    pub stock_status: StockStatus,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

impl RawOffer {
    pub fn new(
        retailer: Retailer,
        title: impl Into<String>,
        raw_price: impl Into<String>,
        raw_size: impl Into<String>,
        stock_status: StockStatus,
        url: impl Into<String>,
    ) -> Self {
        Self {
            retailer,
            title: title.into(),
            raw_price: raw_price.into(),
            raw_size: raw_size.into(),
            stock_status,
            url: url.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// One persisted price observation.
///
/// `price_per_litre` is never stored on the struct: it is derived from
/// `price` and `size_ml` whenever it is needed, so the two can't drift.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NormalizedOffer {
    pub date: NaiveDate,
    pub retailer: Retailer,
    pub product_id: String,
    pub size_ml: u32,
    pub price: Decimal,
    pub stock_status: StockStatus,
    pub product_url: String,
    pub fetched_at: DateTime<Utc>,
}

impl NormalizedOffer {
    pub fn from_raw(raw: &RawOffer, product_id: &str, size_ml: u32, price: Decimal) -> Self {
        Self {
            date: local_date(&raw.fetched_at),
            retailer: raw.retailer,
            product_id: product_id.to_string(),
            size_ml,
            price,
            stock_status: raw.stock_status,
            product_url: raw.url.clone(),
            fetched_at: raw.fetched_at,
        }
    }

    pub fn price_per_litre(&self) -> Decimal {
        normalizer::price_per_litre(self.price, self.size_ml)
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock_status == StockStatus::InStock
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.product_id.trim().is_empty() {
            return Err("product_id must not be empty".to_string());
        }
        if self.size_ml == 0 {
            return Err(format!("size_ml must be positive for '{}'", self.product_id));
        }
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be positive for '{}', got {}", self.product_id, self.price));
        }
        Ok(())
    }
}

/// The calendar day an observation belongs to, in the machine's local time.
pub fn local_date(at: &DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Today in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl Serialize for NormalizedOffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NormalizedOffer", 9)?;
        state.serialize_field("date", &self.date)?;
        state.serialize_field("retailer", &self.retailer)?;
        state.serialize_field("product_id", &self.product_id)?;
        state.serialize_field("size_ml", &self.size_ml)?;
        state.serialize_field("price", &self.price)?;
        state.serialize_field("price_per_litre", &self.price_per_litre())?;
        state.serialize_field("stock_status", &self.stock_status)?;
        state.serialize_field("product_url", &self.product_url)?;
        state.serialize_field("fetched_at", &self.fetched_at)?;
        state.end()
    }
}
