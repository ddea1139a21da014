use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
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

    pub static RESULT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(r#"[data-component-type="s-search-result"]"#).unwrap());

    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"h2 a span, h2 span, [data-cy="title-recipe-title"]"#).unwrap()
    });

    pub static BRAND: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"[data-cy="title-recipe-brand"], h5 .a-size-base-plus"#).unwrap()
    });

    pub static LINK: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h2 a, a.a-link-normal").unwrap());

    pub static PRICE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(".a-price .a-offscreen").unwrap());
}

const CAPTCHA_MARKERS: [&str; 3] = [
    "validatecaptcha",
    "enter the characters you see below",
    "type the characters you see in this image",
];

pub struct AmazonAdapter {
    fetcher: HttpFetcher,
    base_url: String,
    max_listings: usize,
    adapter_timeout: Duration,
}

impl AmazonAdapter {
    pub fn new(config: &RetailerConfig, scraper: &ScraperConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: HttpFetcher::new(Retailer::Amazon, &config.network, &scraper.user_agent)?,
            base_url: config.base_url(),
            max_listings: scraper.max_listings,
            adapter_timeout: config.network.adapter_timeout(),
        })
    }

    fn search_url(&self, query: &str) -> Result<String, FetchError> {
        let mut url = Url::parse(&format!("{}/s", self.base_url))
            .map_err(|e| FetchError::Structural(format!("invalid search url: {}", e)))?;
        url.query_pairs_mut().append_pair("k", query);
        Ok(url.into())
    }

    #[instrument(skip(self), fields(retailer = "amazon"))]
    async fn search(&self, query: &str) -> Result<Vec<RawOffer>, FetchError> {
        let url = self.search_url(query)?;
        let html = self.fetcher.get_text(&url).await?;
        let offers = parse_search_page(&html, &self.base_url, self.max_listings)?;
        debug!(count = offers.len(), "Parsed Amazon listings");
        Ok(offers)
    }
}

#[async_trait]
impl RetailerAdapter for AmazonAdapter {
    fn retailer(&self) -> Retailer {
        Retailer::Amazon
    }

    fn fetch_timeout(&self) -> Duration {
        self.adapter_timeout
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<RawOffer>, FetchError> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push((query.clone(), self.search(query).await));
        }
        merge_query_results(Retailer::Amazon, results)
    }
}

pub fn parse_search_page(html: &str, base_url: &str, max_listings: usize) -> Result<Vec<RawOffer>, FetchError> {
    let lowered = html.to_lowercase();
    if CAPTCHA_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(FetchError::Structural("captcha page".into()));
    }

    let document = Html::parse_document(html);
    let results: Vec<ElementRef> = document.select(&selectors::RESULT).collect();

    if results.is_empty() {
        if lowered.contains("no results for") {
            return Ok(Vec::new());
        }
        return Err(FetchError::Structural("no search results in Amazon page".into()));
    }

    Ok(results
        .into_iter()
        .filter_map(|tile| offer_from_tile(tile, base_url))
        .take(max_listings)
        .collect())
}

fn offer_from_tile(tile: ElementRef, base_url: &str) -> Option<RawOffer> {
    let mut title = tile
        .select(&selectors::TITLE)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())?;

    // Newer layouts render the brand on its own line above the title.
    if let Some(brand) = tile
        .select(&selectors::BRAND)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|b| !b.is_empty())
    {
        if !title.to_lowercase().contains(&brand.to_lowercase()) {
            title = format!("{} {}", brand, title);
        }
    }

    let url = match tile.value().attr("data-asin").filter(|a| !a.is_empty()) {
        Some(asin) => format!("{}/dp/{}", base_url, asin),
        None => {
            let href = tile
                .select(&selectors::LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default();
            if href.starts_with('/') {
                format!("{}{}", base_url, href)
            } else {
                href.to_string()
            }
        }
    };

    let raw_price = tile
        .select(&selectors::PRICE)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .unwrap_or_default();

    // A priced tile is buyable unless it says otherwise.
    let text = tile.text().collect::<String>().to_lowercase();
    let stock_status = if text.contains("currently unavailable") {
        StockStatus::OutOfStock
    } else if raw_price.is_empty() {
        StockStatus::Unknown
    } else {
        StockStatus::InStock
    };

    Some(RawOffer {
        retailer: Retailer::Amazon,
        raw_size: title.clone(),
        title,
        raw_price,
        stock_status,
        url,
        fetched_at: Utc::now(),
    })
}
