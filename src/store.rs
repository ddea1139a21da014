use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::coordinator::CycleSummary;
use crate::models::{NormalizedOffer, Retailer, StockStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("invalid offer: {0}")]
    InvalidRow(String),
}

const SELECT_COLUMNS: &str = "id, date, retailer, product_id, size_ml, price, price_per_litre, \
                              stock_status, product_url, fetched_at";

#[derive(Debug, FromRow)]
struct PriceRow {
    id: i64,
    date: NaiveDate,
    retailer: Retailer,
    product_id: String,
    size_ml: i64,
    // Decimals are kept as text so no precision is lost to REAL.
    price: String,
    price_per_litre: String,
    stock_status: StockStatus,
    product_url: String,
    fetched_at: DateTime<Utc>,
}

impl PriceRow {
    fn into_offer(self) -> Result<NormalizedOffer, StoreError> {
        let corrupt = |field: &str, value: &str| {
            StoreError::Corrupt(format!("row {}: bad {} '{}'", self.id, field, value))
        };

        let offer = NormalizedOffer {
            date: self.date,
            retailer: self.retailer,
            product_id: self.product_id.clone(),
            size_ml: u32::try_from(self.size_ml).map_err(|_| corrupt("size_ml", &self.size_ml.to_string()))?,
            price: Decimal::from_str(&self.price).map_err(|_| corrupt("price", &self.price))?,
            stock_status: self.stock_status,
            product_url: self.product_url.clone(),
            fetched_at: self.fetched_at,
        };

        offer.validate().map_err(StoreError::Corrupt)?;

        // The stored figure is informational; the derived one is authoritative.
        let derived = offer.price_per_litre();
        if Decimal::from_str(&self.price_per_litre).ok() != Some(derived) {
            warn!(
                row = self.id,
                stored = %self.price_per_litre,
                %derived,
                "Stored price_per_litre disagrees with price and size"
            );
        }

        Ok(offer)
    }
}

/// Column decode failures mean a row holds something we never write.
fn read_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {}: {}", index, source))
        }
        other => StoreError::Database(other),
    }
}

/// Per-retailer price-per-litre figures for one day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetailerStats {
    pub retailer: Retailer,
    pub offers: usize,
    pub average_price_per_litre: Decimal,
    pub min_price_per_litre: Decimal,
    pub max_price_per_litre: Decimal,
}

/// Append-only SQLite history of normalized offers.
pub struct PriceStore {
    pool: SqlitePool,
    write_gate: Mutex<()>,
}

impl PriceStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        let in_memory = config.url.contains(":memory:");
        if !in_memory {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
                }
            }
        }

        // Every in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: 10,
        })
        .await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            write_gate: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Appends every offer or none of them.
    pub async fn append(&self, offers: &[NormalizedOffer]) -> Result<(), StoreError> {
        self.write(offers, None).await
    }

    /// Appends the offers and records the cycle summary in one transaction.
    pub async fn append_cycle(&self, offers: &[NormalizedOffer], summary: &CycleSummary) -> Result<(), StoreError> {
        self.write(offers, Some(summary)).await
    }

    async fn write(&self, offers: &[NormalizedOffer], summary: Option<&CycleSummary>) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        for offer in offers {
            offer.validate().map_err(StoreError::InvalidRow)?;

            sqlx::query(
                r#"
                INSERT INTO price_history (
                    date, retailer, product_id, size_ml, price, price_per_litre,
                    stock_status, product_url, fetched_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(offer.date)
            .bind(offer.retailer)
            .bind(&offer.product_id)
            .bind(i64::from(offer.size_ml))
            .bind(offer.price.to_string())
            .bind(offer.price_per_litre().to_string())
            .bind(offer.stock_status)
            .bind(&offer.product_url)
            .bind(timestamp(&offer.fetched_at))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(summary) = summary {
            let summary_json = serde_json::to_string(summary)
                .map_err(|e| StoreError::InvalidRow(format!("unserializable cycle summary: {}", e)))?;

            sqlx::query("INSERT INTO scrape_cycles (id, started_at, finished_at, summary_json) VALUES (?, ?, ?, ?)")
                .bind(summary.cycle_id.to_string())
                .bind(timestamp(&summary.started_at))
                .bind(timestamp(&summary.finished_at))
                .bind(summary_json)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(rows = offers.len(), "Appended price history");
        Ok(())
    }

    /// Most recent row per (product, retailer): latest date, then latest
    /// fetch time, then last inserted.
    pub async fn latest(
        &self,
        product_id: Option<&str>,
        retailer: Option<Retailer>,
    ) -> Result<Vec<NormalizedOffer>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM price_history p
            WHERE p.id = (
                SELECT q.id FROM price_history q
                WHERE q.product_id = p.product_id AND q.retailer = p.retailer
                ORDER BY q.date DESC, q.fetched_at DESC, q.id DESC
                LIMIT 1
            )
            AND (? IS NULL OR p.product_id = ?)
            AND (? IS NULL OR p.retailer = ?)
            ORDER BY p.product_id, p.retailer
            "#
        );

        let rows: Vec<PriceRow> = sqlx::query_as(&sql)
            .bind(product_id)
            .bind(product_id)
            .bind(retailer)
            .bind(retailer)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        debug!(rows = rows.len(), "Loaded latest offers");
        rows.into_iter().map(PriceRow::into_offer).collect()
    }

    /// Rows for one product at one retailer with `from <= date <= to`, oldest first.
    pub async fn history(
        &self,
        product_id: &str,
        retailer: Retailer,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NormalizedOffer>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM price_history
            WHERE product_id = ? AND retailer = ? AND date >= ? AND date <= ?
            ORDER BY date ASC, fetched_at ASC, id ASC
            "#
        );

        let rows: Vec<PriceRow> = sqlx::query_as(&sql)
            .bind(product_id)
            .bind(retailer)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        rows.into_iter().map(PriceRow::into_offer).collect()
    }

    pub async fn last_cycle(&self) -> Result<Option<CycleSummary>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT summary_json FROM scrape_cycles ORDER BY finished_at DESC, rowid DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(json,)| {
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(format!("cycle summary: {}", e)))
        })
        .transpose()
    }

    /// Cheapest in-stock latest offers by price per litre.
    pub async fn best_deals(&self, limit: usize) -> Result<Vec<NormalizedOffer>, StoreError> {
        let mut offers: Vec<NormalizedOffer> = self
            .latest(None, None)
            .await?
            .into_iter()
            .filter(NormalizedOffer::is_in_stock)
            .collect();

        offers.sort_by_key(|o| o.price_per_litre());
        offers.truncate(limit);
        Ok(offers)
    }

    pub async fn retailer_stats(&self, date: NaiveDate) -> Result<Vec<RetailerStats>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM price_history WHERE date = ? ORDER BY id");
        let rows: Vec<PriceRow> = sqlx::query_as(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        let offers = rows
            .into_iter()
            .map(PriceRow::into_offer)
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = Vec::new();
        for retailer in Retailer::ALL {
            let figures: Vec<Decimal> = offers
                .iter()
                .filter(|o| o.retailer == retailer)
                .map(NormalizedOffer::price_per_litre)
                .collect();

            let (Some(min), Some(max)) = (figures.iter().min(), figures.iter().max()) else {
                continue;
            };

            let sum: Decimal = figures.iter().sum();
            let average = (sum / Decimal::from(figures.len()))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

            stats.push(RetailerStats {
                retailer,
                offers: figures.len(),
                average_price_per_litre: average,
                min_price_per_litre: *min,
                max_price_per_litre: *max,
            });
        }

        Ok(stats)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
