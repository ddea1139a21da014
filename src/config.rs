use config::{Config, ConfigError, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use url::Url;

use crate::models::{AlertPreferences, Packaging, ProductCatalog, Retailer};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub retailers: Vec<RetailerConfig>,
    pub catalog: ProductCatalog,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    /// Listings taken from each search page.
    pub max_listings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerConfig {
    pub retailer: Retailer,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    /// Upper bound on a whole adapter fetch, retries included.
    pub adapter_timeout_secs: u64,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    pub min_request_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub can_threshold: Decimal,
    pub bottle_threshold: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rolling log files are written here when set.
    pub directory: Option<String>,
    pub file_prefix: String,
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/soda_prices.db".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            max_listings: 20,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            adapter_timeout_secs: 120,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            min_request_interval_ms: 1500,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let prefs = AlertPreferences::default();
        Self {
            can_threshold: prefs.threshold_for(Packaging::Can).unwrap_or(Decimal::new(250, 2)),
            bottle_threshold: prefs.threshold_for(Packaging::Bottle).unwrap_or(Decimal::new(200, 2)),
        }
    }
}

impl AlertsConfig {
    pub fn preferences(&self) -> AlertPreferences {
        let mut prefs = AlertPreferences::default();
        prefs.thresholds.insert(Packaging::Can, self.can_threshold);
        prefs.thresholds.insert(Packaging::Bottle, self.bottle_threshold);
        prefs
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "soda_watcher=info".to_string(),
            directory: None,
            file_prefix: "soda-watcher.log".to_string(),
        }
    }
}

impl RetailerConfig {
    pub fn new(retailer: Retailer) -> Self {
        Self {
            retailer,
            enabled: true,
            base_url: None,
            network: NetworkConfig::default(),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default_base_url(self.retailer).to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

pub fn default_base_url(retailer: Retailer) -> &'static str {
    match retailer {
        Retailer::Coles => "https://www.coles.com.au",
        Retailer::Woolworths => "https://www.woolworths.com.au",
        Retailer::Amazon => "https://www.amazon.com.au",
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SODA_"
            .add_source(Environment::with_prefix("SODA").separator("__").try_parsing(true))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.fill_missing_retailers();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.fill_missing_retailers();
        config.validate()?;
        Ok(config)
    }

    /// Retailers absent from the file run with default settings.
    fn fill_missing_retailers(&mut self) {
        for retailer in Retailer::ALL {
            if !self.retailers.iter().any(|r| r.retailer == retailer) {
                self.retailers.push(RetailerConfig::new(retailer));
            }
        }
    }

    pub fn enabled_retailers(&self) -> impl Iterator<Item = &RetailerConfig> {
        self.retailers.iter().filter(|r| r.enabled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate scraper configuration
        if self.scraper.max_listings == 0 {
            return Err(ConfigError::Message("Scraper max_listings must be greater than 0".into()));
        }

        // Validate retailers
        let mut seen = HashSet::new();
        for retailer in &self.retailers {
            if !seen.insert(retailer.retailer) {
                return Err(ConfigError::Message(format!(
                    "Retailer {} is configured more than once",
                    retailer.retailer
                )));
            }

            if let Some(base_url) = &retailer.base_url {
                if Url::parse(base_url).is_err() {
                    return Err(ConfigError::Message(format!(
                        "Invalid base URL format for {}: {}",
                        retailer.retailer, base_url
                    )));
                }
            }

            let network = &retailer.network;
            if network.request_timeout_secs == 0 || network.adapter_timeout_secs == 0 {
                return Err(ConfigError::Message(format!(
                    "Timeouts for {} must be greater than 0",
                    retailer.retailer
                )));
            }
        }

        if self.enabled_retailers().next().is_none() {
            return Err(ConfigError::Message("At least one retailer must be enabled".into()));
        }

        // Validate catalog
        self.catalog
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid catalog: {}", e)))?;

        // Validate alert thresholds
        self.alerts
            .preferences()
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid alert threshold: {}", e)))?;

        Ok(())
    }
}
