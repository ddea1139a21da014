use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{FetchError, RetailerAdapter, clean_text, merge_query_results};
use crate::config::{RetailerConfig, ScraperConfig};
use crate::models::{RawOffer, Retailer, StockStatus};
use crate::scraper::HttpFetcher;

mod selectors {
    use super::*;

    pub static NEXT_DATA: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());

    pub static PRODUCT_TILE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(r#"[data-testid="product-tile"], section.product__tile"#).unwrap());

    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#".product__title, [data-testid="product-name"], h2 a, h3 a"#).unwrap()
    });

    pub static LINK: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(r#"a.product__link, a[href*="/product/"]"#).unwrap());

    pub static PRICE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#".price__value, [data-testid="product-pricing"], .price"#).unwrap()
    });

    pub static OUT_OF_STOCK: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"[data-testid="out-of-stock"], .out-of-stock, .unavailable"#).unwrap()
    });
}

pub struct ColesAdapter {
    fetcher: HttpFetcher,
    base_url: String,
    max_listings: usize,
    adapter_timeout: Duration,
}

impl ColesAdapter {
    pub fn new(config: &RetailerConfig, scraper: &ScraperConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: HttpFetcher::new(Retailer::Coles, &config.network, &scraper.user_agent)?,
            base_url: config.base_url(),
            max_listings: scraper.max_listings,
            adapter_timeout: config.network.adapter_timeout(),
        })
    }

    fn search_url(&self, query: &str) -> Result<String, FetchError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| FetchError::Structural(format!("invalid search url: {}", e)))?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url.into())
    }

    #[instrument(skip(self), fields(retailer = "coles"))]
    async fn search(&self, query: &str) -> Result<Vec<RawOffer>, FetchError> {
        let url = self.search_url(query)?;
        let html = self.fetcher.get_text(&url).await?;
        let offers = parse_search_page(&html, &self.base_url, self.max_listings)?;
        debug!(count = offers.len(), "Parsed Coles listings");
        Ok(offers)
    }
}

#[async_trait]
impl RetailerAdapter for ColesAdapter {
    fn retailer(&self) -> Retailer {
        Retailer::Coles
    }

    fn fetch_timeout(&self) -> Duration {
        self.adapter_timeout
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push((query.clone(), self.search(query).await));
        }
        merge_query_results(Retailer::Coles, results)
    }
}

/// Reads listings from a Coles search page: the embedded `__NEXT_DATA__`
/// payload when present, otherwise the rendered product tiles.
pub fn parse_search_page(html: &str, base_url: &str, max_listings: usize) -> Result<Vec<RawOffer>, FetchError> {
    let lowered = html.to_lowercase();
    if lowered.contains("incapsula") || lowered.contains("_incapsula_resource") {
        return Err(FetchError::Structural("bot protection page (Incapsula)".into()));
    }

    let document = Html::parse_document(html);

    if let Some(script) = document.select(&selectors::NEXT_DATA).next() {
        let payload = script.text().collect::<String>();
        let data: Value = serde_json::from_str(&payload)
            .map_err(|e| FetchError::Structural(format!("undecodable __NEXT_DATA__: {}", e)))?;

        if let Some(results) = data
            .pointer("/props/pageProps/searchResults/results")
            .and_then(Value::as_array)
        {
            return Ok(results
                .iter()
                .filter_map(|item| offer_from_json(item, base_url))
                .take(max_listings)
                .collect());
        }
    }

    let tiles: Vec<ElementRef> = document.select(&selectors::PRODUCT_TILE).collect();
    if tiles.is_empty() {
        if lowered.contains("no results") || lowered.contains("we couldn't find") {
            return Ok(Vec::new());
        }
        return Err(FetchError::Structural("no search results in Coles page".into()));
    }

    Ok(tiles
        .into_iter()
        .filter_map(|tile| offer_from_tile(tile, base_url))
        .take(max_listings)
        .collect())
}

fn offer_from_json(item: &Value, base_url: &str) -> Option<RawOffer> {
    // Sponsored banners and other tile kinds carry no product name.
    let name = item.get("name")?.as_str()?;
    let brand = item.get("brand").and_then(Value::as_str).unwrap_or_default();
    let size = item.get("size").and_then(Value::as_str).unwrap_or_default();
    let id = item.get("id").map(value_to_string).unwrap_or_default();

    let price = item
        .pointer("/pricing/now")
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .unwrap_or_default();

    let stock_status = StockStatus::from_flag(item.get("availability").and_then(Value::as_bool));
    let title = clean_text(&format!("{} {}", brand, name));
    let slug = slugify(&format!("{} {} {}", brand, name, size));

    Some(RawOffer {
        retailer: Retailer::Coles,
        raw_size: clean_text(&format!("{} {}", size, title)),
        title,
        raw_price: price,
        stock_status,
        url: format!("{}/product/{}-{}", base_url, slug, id),
        fetched_at: Utc::now(),
    })
}

fn offer_from_tile(tile: ElementRef, base_url: &str) -> Option<RawOffer> {
    let title = tile
        .select(&selectors::TITLE)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())?;

    let href = tile
        .select(&selectors::LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or_default();
    let url = if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url, href)
    };

    let raw_price = tile
        .select(&selectors::PRICE)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .unwrap_or_default();

    let stock_status = if tile.select(&selectors::OUT_OF_STOCK).next().is_some() {
        StockStatus::OutOfStock
    } else {
        StockStatus::InStock
    };

    Some(RawOffer {
        retailer: Retailer::Coles,
        raw_size: title.clone(),
        title,
        raw_price,
        stock_status,
        url,
        fetched_at: Utc::now(),
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
