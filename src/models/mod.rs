use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::AppError;

pub mod alert;
pub mod offer;
pub mod product;

// Re-exports for convenience
pub use alert::*;
pub use offer::*;
pub use product::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Retailer {
    #[sqlx(rename = "coles")]
    Coles,
    #[sqlx(rename = "woolworths")]
    Woolworths,
    #[sqlx(rename = "amazon")]
    Amazon,
}

impl Retailer {
    pub const ALL: [Retailer; 3] = [Retailer::Coles, Retailer::Woolworths, Retailer::Amazon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Retailer::Coles => "coles",
            Retailer::Woolworths => "woolworths",
            Retailer::Amazon => "amazon",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Retailer::Coles => "Coles",
            Retailer::Woolworths => "Woolworths",
            Retailer::Amazon => "Amazon AU",
        }
    }
}

impl fmt::Display for Retailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Retailer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coles" => Ok(Retailer::Coles),
            "woolworths" | "woolies" => Ok(Retailer::Woolworths),
            "amazon" => Ok(Retailer::Amazon),
            other => Err(AppError::UnknownRetailer(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum StockStatus {
    #[sqlx(rename = "in_stock")]
    InStock,
    #[sqlx(rename = "out_of_stock")]
    OutOfStock,
    #[sqlx(rename = "unknown")]
    Unknown,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Unknown => "unknown",
        }
    }

    pub fn from_flag(in_stock: Option<bool>) -> Self {
        match in_stock {
            Some(true) => StockStatus::InStock,
            Some(false) => StockStatus::OutOfStock,
            None => StockStatus::Unknown,
        }
    }
}

impl FromStr for StockStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            "unknown" => Ok(StockStatus::Unknown),
            other => Err(AppError::Validation(format!("unknown stock status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    Can,
    Bottle,
}

impl fmt::Display for Packaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packaging::Can => f.write_str("can"),
            Packaging::Bottle => f.write_str("bottle"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Brand {
    Sunkist,
    Fanta,
    PepsiMaxMango,
}
