pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod matcher;
pub mod models;
pub mod normalizer;
pub mod notifier;
pub mod retailers;
pub mod scraper;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use coordinator::{CycleReport, CycleSummary, ScrapeCoordinator};
pub use store::PriceStore;
pub use utils::error::{AppError, Result};
