use super::*;
use serde_json::json;
use soda_watcher::config::ScraperConfig;
use soda_watcher::retailers::{AmazonAdapter, ColesAdapter, FetchError, RetailerAdapter, WoolworthsAdapter};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sunkist_page() -> String {
    coles_next_data_page(
        r#"[{"_type":"PRODUCT","id":5120290,"name":"Zero Sugar Orange Soft Drink Cans","brand":"Sunkist",
             "size":"10 x 375mL","availability":true,"pricing":{"now":8.5}}]"#,
    )
}

#[tokio::test]
async fn test_coles_retries_transient_failures() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "sunkist zero sugar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sunkist_page()))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = ColesAdapter::new(&retailer_config(Retailer::Coles, &server.uri()), &ScraperConfig::default())?;
    let offers = adapter.fetch(&["sunkist zero sugar".to_string()]).await?;

    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].title, "Sunkist Zero Sugar Orange Soft Drink Cans");
    assert_eq!(offers[0].raw_price, "8.5");
    assert!(offers[0].url.starts_with(&server.uri()));
    Ok(())
}

#[tokio::test]
async fn test_coles_gives_up_after_retry_budget() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    // One attempt plus three retries.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let adapter = ColesAdapter::new(&retailer_config(Retailer::Coles, &server.uri()), &ScraperConfig::default())?;
    let err = adapter.fetch(&["fanta zero sugar".to_string()]).await.unwrap_err();

    assert!(err.is_transient());
    assert!(err.reason().contains("503"));
    Ok(())
}

#[tokio::test]
async fn test_forbidden_is_structural_and_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = ColesAdapter::new(&retailer_config(Retailer::Coles, &server.uri()), &ScraperConfig::default())?;
    let err = adapter.fetch(&["fanta zero sugar".to_string()]).await.unwrap_err();

    assert!(matches!(err, FetchError::Structural(ref reason) if reason.contains("403")));
    Ok(())
}

#[tokio::test]
async fn test_one_failed_query_does_not_fail_the_adapter() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "sunkist zero sugar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sunkist_page()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "fanta zero sugar"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let adapter = ColesAdapter::new(&retailer_config(Retailer::Coles, &server.uri()), &ScraperConfig::default())?;
    let offers = adapter
        .fetch(&["sunkist zero sugar".to_string(), "fanta zero sugar".to_string()])
        .await?;

    assert_eq!(offers.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_woolworths_looks_up_missing_prices() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/apis/ui/Search/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Products": [
                {
                    "Products": [{
                        "Stockcode": 123789,
                        "DisplayName": "Pepsi Max Mango No Sugar Cola Soft Drink Bottle 1.25l",
                        "Price": null,
                        "PackageSize": "1.25L",
                        "IsInStock": true
                    }]
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apis/ui/Product/123789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Product": { "Stockcode": 123789, "Price": 2.75, "IsInStock": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WoolworthsAdapter::new(
        &retailer_config(Retailer::Woolworths, &server.uri()),
        &ScraperConfig::default(),
    )?;
    let offers = adapter.fetch(&["pepsi max mango".to_string()]).await?;

    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].raw_price, "2.75");
    assert_eq!(offers[0].url, format!("{}/shop/productdetails/123789", server.uri()));
    assert_eq!(offers[0].stock_status, StockStatus::InStock);
    Ok(())
}

#[tokio::test]
async fn test_woolworths_product_lookup_failure_keeps_listing() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/apis/ui/Search/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Products": [{
                "Stockcode": "42",
                "DisplayName": "Fanta Zero Sugar Orange Soft Drink Bottle 1.25L",
                "Price": 0,
                "PackageSize": "1.25L"
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apis/ui/Product/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let adapter = WoolworthsAdapter::new(
        &retailer_config(Retailer::Woolworths, &server.uri()),
        &ScraperConfig::default(),
    )?;
    let offers = adapter.fetch(&["fanta zero sugar".to_string()]).await?;

    // The listing survives without a price; the normalizer drops it later.
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].raw_price, "");
    assert_eq!(offers[0].stock_status, StockStatus::InStock);
    Ok(())
}

#[tokio::test]
async fn test_amazon_captcha_is_structural() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><form action="/errors/validateCaptcha"><p>Enter the characters you see below</p></form></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = AmazonAdapter::new(&retailer_config(Retailer::Amazon, &server.uri()), &ScraperConfig::default())?;
    let err = adapter.fetch(&["pepsi max mango".to_string()]).await.unwrap_err();

    assert_eq!(err, FetchError::Structural("captcha page".into()));
    Ok(())
}
