use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::{AppConfig, RetailerConfig, ScraperConfig};
use crate::models::{RawOffer, Retailer};

pub mod amazon;
pub mod coles;
pub mod woolworths;

pub use amazon::AmazonAdapter;
pub use coles::ColesAdapter;
pub use woolworths::WoolworthsAdapter;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Timeouts, connection failures, 5xx and 429. Retried.
    #[error("transient: {0}")]
    Transient(String),

    /// Unexpected layout, 4xx, bot walls, undecodable bodies. Never retried.
    #[error("structural: {0}")]
    Structural(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            FetchError::Transient(reason) | FetchError::Structural(reason) => reason,
        }
    }
}

/// A retailer's search capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetailerAdapter: Send + Sync {
    fn retailer(&self) -> Retailer;

    /// Upper bound the coordinator places on one `fetch` call.
    fn fetch_timeout(&self) -> Duration;

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError>;
}

#[async_trait]
impl<T: RetailerAdapter + ?Sized> RetailerAdapter for Box<T> {
    fn retailer(&self) -> Retailer {
        (**self).retailer()
    }

    fn fetch_timeout(&self) -> Duration {
        (**self).fetch_timeout()
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        (**self).fetch(queries).await
    }
}

/// The closed set of supported retailers, chosen by configuration.
pub enum Adapter {
    Coles(ColesAdapter),
    Woolworths(WoolworthsAdapter),
    Amazon(AmazonAdapter),
}

impl Adapter {
    pub fn from_config(retailer: &RetailerConfig, scraper: &ScraperConfig) -> Result<Self, FetchError> {
        Ok(match retailer.retailer {
            Retailer::Coles => Adapter::Coles(ColesAdapter::new(retailer, scraper)?),
            Retailer::Woolworths => Adapter::Woolworths(WoolworthsAdapter::new(retailer, scraper)?),
            Retailer::Amazon => Adapter::Amazon(AmazonAdapter::new(retailer, scraper)?),
        })
    }
}

#[async_trait]
impl RetailerAdapter for Adapter {
    fn retailer(&self) -> Retailer {
        match self {
            Adapter::Coles(a) => a.retailer(),
            Adapter::Woolworths(a) => a.retailer(),
            Adapter::Amazon(a) => a.retailer(),
        }
    }

    fn fetch_timeout(&self) -> Duration {
        match self {
            Adapter::Coles(a) => a.fetch_timeout(),
            Adapter::Woolworths(a) => a.fetch_timeout(),
            Adapter::Amazon(a) => a.fetch_timeout(),
        }
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        match self {
            Adapter::Coles(a) => a.fetch(queries).await,
            Adapter::Woolworths(a) => a.fetch(queries).await,
            Adapter::Amazon(a) => a.fetch(queries).await,
        }
    }
}

/// Adapters for every enabled retailer, in configuration order.
pub fn build_adapters(config: &AppConfig) -> Result<Vec<Adapter>, FetchError> {
    config
        .enabled_retailers()
        .map(|retailer| Adapter::from_config(retailer, &config.scraper))
        .collect()
}

/// Folds per-query outcomes into one adapter result. Failed queries are
/// tolerated while at least one query succeeds.
pub(crate) fn merge_query_results(
    retailer: Retailer,
    results: Vec<(String, Result<Vec<RawOffer>, FetchError>)>,
) -> Result<Vec<RawOffer>, FetchError> {
    let mut offers = Vec::new();
    let mut first_error = None;
    let mut succeeded = 0;

    for (query, result) in results {
        match result {
            Ok(found) => {
                succeeded += 1;
                offers.extend(found);
            }
            Err(e) => {
                warn!(retailer = %retailer, query = %query, error = %e, "Search query failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok(offers),
    }
}

/// Collapses whitespace in scraped text.
pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
