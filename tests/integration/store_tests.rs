use super::*;
use rust_decimal_macros::dec;
use soda_watcher::config::DatabaseConfig;
use tempfile::TempDir;

fn file_database(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("nested").join("prices.db").display()),
        max_connections: 4,
        acquire_timeout: 10,
    }
}

#[tokio::test]
async fn test_history_survives_reopening() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = file_database(&dir);

    {
        let store = PriceStore::connect(&config).await?;
        store
            .append(&[
                offer(Retailer::Coles, "fanta-zero-can", dec!(9.00), 3750, fetched_at(1, 9)),
                offer(Retailer::Coles, "fanta-zero-can", dec!(8.25), 3750, fetched_at(2, 9)),
            ])
            .await?;
        store.pool().close().await;
    }

    assert!(dir.path().join("nested").join("prices.db").exists());

    let store = PriceStore::connect(&config).await?;
    let latest = store.latest(Some("fanta-zero-can"), None).await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].price, dec!(8.25));
    assert_eq!(latest[0].price_per_litre(), dec!(2.20));

    let history = store
        .history(
            "fanta-zero-can",
            Retailer::Coles,
            fetched_at(1, 0).date_naive(),
            fetched_at(30, 0).date_naive(),
        )
        .await?;
    assert_eq!(history.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_are_serialized() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = PriceStore::connect(&file_database(&dir)).await?;

    let coles: Vec<NormalizedOffer> = (1..=10)
        .map(|day| offer(Retailer::Coles, "sunkist-zero-can", dec!(9.00), 3750, fetched_at(day, 9)))
        .collect();
    let woolworths: Vec<NormalizedOffer> = (1..=10)
        .map(|day| offer(Retailer::Woolworths, "sunkist-zero-can", dec!(8.00), 3750, fetched_at(day, 9)))
        .collect();

    let (a, b) = tokio::join!(store.append(&coles), store.append(&woolworths));
    a?;
    b?;

    let from = fetched_at(1, 0).date_naive();
    let to = fetched_at(10, 0).date_naive();
    assert_eq!(store.history("sunkist-zero-can", Retailer::Coles, from, to).await?.len(), 10);
    assert_eq!(store.history("sunkist-zero-can", Retailer::Woolworths, from, to).await?.len(), 10);
    Ok(())
}

#[tokio::test]
async fn test_retailer_stats_for_a_day() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    store
        .append(&[
            offer(Retailer::Woolworths, "pepsi-max-mango-can", dec!(7.50), 3750, fetched_at(3, 9)),
            offer(Retailer::Amazon, "pepsi-max-mango-can", dec!(27.00), 9000, fetched_at(3, 9)),
            offer(Retailer::Amazon, "pepsi-max-mango-bottle", dec!(4.50), 1250, fetched_at(3, 9)),
            offer(Retailer::Amazon, "pepsi-max-mango-bottle", dec!(1.00), 1250, fetched_at(4, 9)),
        ])
        .await?;

    let stats = store.retailer_stats(fetched_at(3, 0).date_naive()).await?;
    assert_eq!(stats.len(), 2);

    assert_eq!(stats[0].retailer, Retailer::Woolworths);
    assert_eq!(stats[0].offers, 1);

    // 27.00 / 9 L = 3.00 and 4.50 / 1.25 L = 3.60.
    assert_eq!(stats[1].retailer, Retailer::Amazon);
    assert_eq!(stats[1].offers, 2);
    assert_eq!(stats[1].average_price_per_litre, dec!(3.30));
    assert_eq!(stats[1].min_price_per_litre, dec!(3.00));
    assert_eq!(stats[1].max_price_per_litre, dec!(3.60));
    Ok(())
}
