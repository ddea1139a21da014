// Shared fixtures for the integration tests.

pub mod adapter_tests;
pub mod pipeline_tests;
pub mod store_tests;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use soda_watcher::{
    AppConfig, PriceStore,
    config::{NetworkConfig, RetailerConfig},
    models::{NormalizedOffer, RawOffer, Retailer, StockStatus},
    retailers::{FetchError, RetailerAdapter},
};
use std::time::Duration;

/// Fast retries and no request spacing.
pub fn test_network() -> NetworkConfig {
    NetworkConfig {
        request_timeout_secs: 5,
        adapter_timeout_secs: 10,
        retry_attempts: 3,
        retry_delay_ms: 10,
        min_request_interval_ms: 0,
    }
}

pub fn retailer_config(retailer: Retailer, base_url: &str) -> RetailerConfig {
    RetailerConfig {
        retailer,
        enabled: true,
        base_url: Some(base_url.to_string()),
        network: test_network(),
    }
}

/// Every retailer pointed at a mock server.
pub fn test_config(coles: &str, woolworths: &str, amazon: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.retailers = vec![
        retailer_config(Retailer::Coles, coles),
        retailer_config(Retailer::Woolworths, woolworths),
        retailer_config(Retailer::Amazon, amazon),
    ];
    config
}

pub async fn create_test_store() -> anyhow::Result<PriceStore> {
    Ok(PriceStore::in_memory().await?)
}

pub fn fetched_at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

pub fn offer(retailer: Retailer, product_id: &str, price: Decimal, size_ml: u32, at: DateTime<Utc>) -> NormalizedOffer {
    NormalizedOffer {
        date: at.date_naive(),
        retailer,
        product_id: product_id.to_string(),
        size_ml,
        price,
        stock_status: StockStatus::InStock,
        product_url: format!("https://{}.example/{}", retailer, product_id),
        fetched_at: at,
    }
}

pub fn raw(retailer: Retailer, title: &str, price: &str, size: &str) -> RawOffer {
    RawOffer::new(
        retailer,
        title,
        price,
        size,
        StockStatus::InStock,
        format!("https://{}.example/{}", retailer, title.len()),
    )
}

/// Returns the same canned result for every fetch.
pub struct StubAdapter {
    pub retailer: Retailer,
    pub result: Result<Vec<RawOffer>, FetchError>,
}

impl StubAdapter {
    pub fn ok(retailer: Retailer, offers: Vec<RawOffer>) -> Self {
        Self { retailer, result: Ok(offers) }
    }

    pub fn failing(retailer: Retailer, error: FetchError) -> Self {
        Self { retailer, result: Err(error) }
    }
}

#[async_trait]
impl RetailerAdapter for StubAdapter {
    fn retailer(&self) -> Retailer {
        self.retailer
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn fetch(&self, _queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        self.result.clone()
    }
}

pub fn coles_next_data_page(results: &str) -> String {
    format!(
        r#"<html><body><script id="__NEXT_DATA__" type="application/json">
        {{"props":{{"pageProps":{{"searchResults":{{"results":{}}}}}}}}}
        </script></body></html>"#,
        results
    )
}
