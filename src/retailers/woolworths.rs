use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{FetchError, RetailerAdapter, clean_text, merge_query_results};
use crate::config::{RetailerConfig, ScraperConfig};
use crate::models::{RawOffer, Retailer, StockStatus};
use crate::scraper::HttpFetcher;

const PAGE_SIZE: usize = 36;

pub struct WoolworthsAdapter {
    fetcher: HttpFetcher,
    base_url: String,
    max_listings: usize,
    adapter_timeout: Duration,
}

/// A search hit before it becomes a [`RawOffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub stockcode: String,
    pub display_name: String,
    pub price: Option<String>,
    pub package_size: String,
    pub in_stock: Option<bool>,
}

impl WoolworthsAdapter {
    pub fn new(config: &RetailerConfig, scraper: &ScraperConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: HttpFetcher::new(Retailer::Woolworths, &config.network, &scraper.user_agent)?,
            base_url: config.base_url(),
            max_listings: scraper.max_listings,
            adapter_timeout: config.network.adapter_timeout(),
        })
    }

    #[instrument(skip(self), fields(retailer = "woolworths"))]
    async fn search(&self, query: &str) -> Result<Vec<RawOffer>, FetchError> {
        let url = format!("{}/apis/ui/Search/products", self.base_url);
        let response = self.fetcher.post_json(&url, &search_payload(query)).await?;
        let listings = parse_search_response(&response, self.max_listings)?;

        let mut offers = Vec::with_capacity(listings.len());
        for mut listing in listings {
            if listing.price.is_none() {
                self.fill_from_product_page(&mut listing).await;
            }
            offers.push(to_offer(listing, &self.base_url));
        }

        debug!(count = offers.len(), "Parsed Woolworths listings");
        Ok(offers)
    }

    /// Prices are sometimes missing from search results; the product
    /// endpoint has them. A failure here only loses this listing's price.
    async fn fill_from_product_page(&self, listing: &mut Listing) {
        let url = format!("{}/apis/ui/Product/{}", self.base_url, listing.stockcode);
        match self.fetcher.get_json(&url).await {
            Ok(detail) => apply_product_detail(listing, &detail),
            Err(e) => warn!(stockcode = %listing.stockcode, error = %e, "Product lookup failed"),
        }
    }
}

#[async_trait]
impl RetailerAdapter for WoolworthsAdapter {
    fn retailer(&self) -> Retailer {
        Retailer::Woolworths
    }

    fn fetch_timeout(&self) -> Duration {
        self.adapter_timeout
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push((query.clone(), self.search(query).await));
        }
        merge_query_results(Retailer::Woolworths, results)
    }
}

pub fn search_payload(query: &str) -> Value {
    json!({
        "Filters": [],
        "IsSpecial": false,
        "Location": format!("/shop/search/products?searchTerm={}", query.replace(' ', "%20")),
        "PageNumber": 1,
        "PageSize": PAGE_SIZE,
        "SearchTerm": query,
        "SortType": "TraderRelevance",
        "IsHideUnavailableProducts": false,
    })
}

/// Flattens the search response; bundles carry their products one level down.
pub fn parse_search_response(response: &Value, max_listings: usize) -> Result<Vec<Listing>, FetchError> {
    let products = match response.get("Products") {
        Some(Value::Array(products)) => products,
        Some(Value::Null) => return Ok(Vec::new()),
        _ => return Err(FetchError::Structural("search response has no Products array".into())),
    };

    let flattened = products.iter().flat_map(|entry| match entry.get("Products") {
        Some(Value::Array(nested)) => nested.iter().collect::<Vec<_>>(),
        _ => vec![entry],
    });

    Ok(flattened.filter_map(listing_from_json).take(max_listings).collect())
}

fn listing_from_json(product: &Value) -> Option<Listing> {
    let stockcode = match product.get("Stockcode")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let display_name = product.get("DisplayName")?.as_str()?.to_string();

    Some(Listing {
        stockcode,
        display_name,
        price: price_from(product),
        package_size: product
            .get("PackageSize")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        in_stock: product.get("IsInStock").and_then(Value::as_bool),
    })
}

pub fn apply_product_detail(listing: &mut Listing, detail: &Value) {
    let product = detail.get("Product").unwrap_or(detail);

    if let Some(price) = price_from(product) {
        listing.price = Some(price);
    }
    if listing.package_size.is_empty() {
        if let Some(size) = product.get("PackageSize").and_then(Value::as_str) {
            listing.package_size = size.to_string();
        }
    }
    if let Some(in_stock) = product.get("IsInStock").and_then(Value::as_bool) {
        listing.in_stock = Some(in_stock);
    }
}

/// A zero or absent price means "not priced here".
fn price_from(product: &Value) -> Option<String> {
    let price = product.get("Price")?.as_f64()?;
    (price > 0.0).then(|| product["Price"].to_string())
}

fn to_offer(listing: Listing, base_url: &str) -> RawOffer {
    RawOffer {
        retailer: Retailer::Woolworths,
        title: clean_text(&listing.display_name),
        raw_price: listing.price.unwrap_or_default(),
        raw_size: clean_text(&format!("{} {}", listing.package_size, listing.display_name)),
        // Listings without an IsInStock flag are sold as normal.
        stock_status: StockStatus::from_flag(Some(listing.in_stock.unwrap_or(true))),
        url: format!("{}/shop/productdetails/{}", base_url, listing.stockcode),
        fetched_at: Utc::now(),
    }
}
