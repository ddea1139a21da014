use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::models::Retailer;
use crate::retailers::FetchError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Shared HTTP plumbing for retailer adapters: bounded timeouts, polite
/// spacing between requests and retries for transient failures.
pub struct HttpFetcher {
    client: Client,
    retailer: Retailer,
    network: NetworkConfig,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(retailer: Retailer, network: &NetworkConfig, user_agent: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-AU,en;q=0.9"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(network.request_timeout())
            .build()
            .map_err(|e| FetchError::Structural(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retailer,
            network: network.clone(),
            last_request: Mutex::new(None),
        })
    }

    pub fn retailer(&self) -> Retailer {
        self.retailer
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.send_with_retry(url, || self.client.get(url)).await
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let body = self.send_with_retry(url, || self.client.get(url)).await?;
        parse_json(&body)
    }

    pub async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, FetchError> {
        let body = self
            .send_with_retry(url, || self.client.post(url).json(payload))
            .await?;
        parse_json(&body)
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<String, FetchError>
    where
        F: Fn() -> RequestBuilder,
    {
        let base_ms = (self.network.retry_delay_ms / 2).max(1);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(MAX_BACKOFF)
            .map(jitter)
            .take(self.network.retry_attempts);

        let this = self;
        let build = &build;
        RetryIf::start(
            strategy,
            || async move {
                let result = this.send_once(build()).await;
                if let Err(e) = &result {
                    if e.is_transient() {
                        warn!(retailer = %this.retailer, url, error = %e, "Transient fetch failure");
                    }
                }
                result
            },
            |e: &FetchError| e.is_transient(),
        )
        .await
    }

    async fn send_once(&self, request: RequestBuilder) -> Result<String, FetchError> {
        self.throttle().await;

        let response = request.send().await.map_err(classify_reqwest)?;
        let status = response.status();
        debug!(retailer = %self.retailer, status = %status, url = %response.url(), "Response received");

        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        response.text().await.map_err(classify_reqwest)
    }

    /// Waits until `min_request_interval` has passed since the previous request.
    async fn throttle(&self) {
        let interval = self.network.min_request_interval();
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn parse_json(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Structural(format!("undecodable JSON body: {}", e)))
}

pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::Transient(format!("HTTP {}", status)))
    } else {
        Some(FetchError::Structural(format!("HTTP {}", status)))
    }
}

pub fn classify_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Transient(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status).unwrap_or_else(|| FetchError::Structural(err.to_string()))
    } else {
        FetchError::Structural(err.to_string())
    }
}
