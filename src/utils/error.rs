use thiserror::Error;

use crate::normalizer::NormalizeError;
use crate::retailers::FetchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Unknown retailer: {0}")]
    UnknownRetailer(String),

    #[error("Unknown product: {product_id}")]
    UnknownProduct { product_id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cycle cancelled")]
    Cancelled,
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_unknown_product_error() {
        let err = AppError::UnknownProduct {
            product_id: "tab-cola-can".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown product: tab-cola-can");
    }

    #[test]
    fn test_fetch_error_wraps() {
        let err: AppError = FetchError::Structural("no product grid".to_string()).into();
        assert!(err.to_string().contains("no product grid"));
    }
}
