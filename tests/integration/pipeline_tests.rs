use super::*;
use serde_json::json;
use soda_watcher::coordinator::RetailerStatus;
use soda_watcher::models::ProductCatalog;
use soda_watcher::retailers::build_adapters;
use soda_watcher::{AppError, ScrapeCoordinator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_one_structural_failure_still_persists_the_others() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let coordinator = ScrapeCoordinator::new(
        vec![
            StubAdapter::ok(
                Retailer::Coles,
                vec![raw(Retailer::Coles, "Fanta Zero Sugar Orange Cans 10 x 375mL", "$9.00", "10 x 375mL")],
            ),
            StubAdapter::ok(
                Retailer::Woolworths,
                vec![raw(Retailer::Woolworths, "Fanta Zero Sugar Orange Cans 10 x 375mL", "$8.40", "375ml X 10 pack")],
            ),
            StubAdapter::failing(Retailer::Amazon, FetchError::Structural("captcha page".into())),
        ],
        ProductCatalog::standard(),
    );

    let report = coordinator.run_cycle(&store).await?;

    assert_eq!(report.summary.failed_retailers(), vec![Retailer::Amazon]);
    assert_eq!(
        report.summary.report_for(Retailer::Amazon).map(|r| r.status.clone()),
        Some(RetailerStatus::Failed { reason: "structural: captcha page".into() })
    );

    let latest = store.latest(None, None).await?;
    let retailers: Vec<Retailer> = latest.iter().map(|o| o.retailer).collect();
    assert_eq!(retailers, vec![Retailer::Coles, Retailer::Woolworths]);

    assert_eq!(store.last_cycle().await?, Some(report.summary));
    Ok(())
}

#[tokio::test]
async fn test_failed_append_leaves_latest_unchanged() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let first = ScrapeCoordinator::new(
        vec![StubAdapter::ok(
            Retailer::Coles,
            vec![raw(Retailer::Coles, "Sunkist Zero Sugar Cans 10 x 375mL", "$9.00", "10 x 375mL")],
        )],
        ProductCatalog::standard(),
    );
    let persisted = first.run_cycle(&store).await?;
    let before = store.latest(None, None).await?;

    // Any insert of this product aborts the transaction.
    sqlx::query(
        "CREATE TRIGGER reject_fanta BEFORE INSERT ON price_history \
         WHEN NEW.product_id = 'fanta-zero-bottle' \
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(store.pool())
    .await?;

    let second = ScrapeCoordinator::new(
        vec![StubAdapter::ok(
            Retailer::Coles,
            vec![
                raw(Retailer::Coles, "Sunkist Zero Sugar Cans 10 x 375mL", "$6.00", "10 x 375mL"),
                raw(Retailer::Coles, "Fanta Zero Sugar Orange Bottle 1.25L", "$2.00", "1.25L"),
            ],
        )],
        ProductCatalog::standard(),
    );
    let result = second.run_cycle(&store).await;

    assert!(matches!(result, Err(AppError::Store(_))));
    assert_eq!(store.latest(None, None).await?, before);
    assert_eq!(store.last_cycle().await?, Some(persisted.summary));
    Ok(())
}

#[tokio::test]
async fn test_same_day_rescrape_supersedes_earlier_price() -> anyhow::Result<()> {
    let store = create_test_store().await?;

    for price in ["$9.00", "$7.50"] {
        let coordinator = ScrapeCoordinator::new(
            vec![StubAdapter::ok(
                Retailer::Woolworths,
                vec![raw(Retailer::Woolworths, "Pepsi Max Mango Cans 10 x 375mL", price, "10 x 375mL")],
            )],
            ProductCatalog::standard(),
        );
        coordinator.run_cycle(&store).await?;
    }

    let latest = store.latest(Some("pepsi-max-mango-can"), Some(Retailer::Woolworths)).await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].price_per_litre(), rust_decimal_macros::dec!(2.00));

    let today = latest[0].date;
    let history = store
        .history("pepsi-max-mango-can", Retailer::Woolworths, today, today)
        .await?;
    assert_eq!(history.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_real_adapters_against_mock_retailers() -> anyhow::Result<()> {
    let coles = MockServer::start().await;
    let woolworths = MockServer::start().await;
    let amazon = MockServer::start().await;

    // Every query gets the same page, so each retailer reports duplicates.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(coles_next_data_page(
            r#"[
                {"_type":"PRODUCT","id":1,"name":"Zero Sugar Orange Soft Drink Cans","brand":"Sunkist",
                 "size":"10 x 375mL","availability":true,"pricing":{"now":8.5}},
                {"_type":"PRODUCT","id":2,"name":"Soda Maker Orange Syrup","brand":"Sunkist",
                 "size":"440mL","availability":true,"pricing":{"now":7}}
            ]"#,
        )))
        .mount(&coles)
        .await;

    Mock::given(method("POST"))
        .and(path("/apis/ui/Search/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Products": [{
                "Stockcode": 777,
                "DisplayName": "Fanta Zero Sugar Orange Soft Drink Bottle 1.25L",
                "Price": 2.5,
                "PackageSize": "1.25L",
                "IsInStock": true
            }]
        })))
        .mount(&woolworths)
        .await;

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><p>Type the characters you see in this image</p></html>",
        ))
        .mount(&amazon)
        .await;

    let config = test_config(&coles.uri(), &woolworths.uri(), &amazon.uri());
    let store = create_test_store().await?;
    let coordinator = ScrapeCoordinator::new(build_adapters(&config)?, config.catalog.clone());

    let report = coordinator.run_cycle(&store).await?;

    let coles_report = report.summary.report_for(Retailer::Coles).unwrap();
    assert_eq!(coles_report.fetched, 6);
    assert_eq!(coles_report.discarded, 3);
    assert_eq!(coles_report.duplicates, 2);
    assert_eq!(coles_report.kept, 1);

    let woolworths_report = report.summary.report_for(Retailer::Woolworths).unwrap();
    assert_eq!(woolworths_report.kept, 1);
    assert_eq!(report.summary.failed_retailers(), vec![Retailer::Amazon]);

    let latest = store.latest(None, None).await?;
    let products: Vec<(&str, Retailer)> = latest.iter().map(|o| (o.product_id.as_str(), o.retailer)).collect();
    assert_eq!(
        products,
        vec![
            ("fanta-zero-bottle", Retailer::Woolworths),
            ("sunkist-zero-can", Retailer::Coles),
        ]
    );
    Ok(())
}
