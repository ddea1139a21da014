use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{NormalizedOffer, Packaging, Retailer};

/// Per-litre price ceilings, keyed by packaging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPreferences {
    pub thresholds: HashMap<Packaging, Decimal>,
}

impl AlertPreferences {
    pub fn threshold_for(&self, packaging: Packaging) -> Option<Decimal> {
        self.thresholds.get(&packaging).copied()
    }

    pub fn validate(&self) -> Result<(), String> {
        for (packaging, threshold) in &self.thresholds {
            if *threshold <= Decimal::ZERO {
                return Err(format!("threshold for {} must be positive, got {}", packaging, threshold));
            }
        }
        Ok(())
    }
}

impl Default for AlertPreferences {
    fn default() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(Packaging::Can, Decimal::new(250, 2));
        thresholds.insert(Packaging::Bottle, Decimal::new(200, 2));
        Self { thresholds }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    pub product_id: String,
    pub retailer: Retailer,
    pub price_per_litre: Decimal,
    pub threshold: Decimal,
    /// `price_per_litre - threshold`; zero or negative for every alert.
    pub difference: Decimal,
    pub offer: NormalizedOffer,
}

impl Alert {
    pub fn new(offer: NormalizedOffer, threshold: Decimal) -> Self {
        let price_per_litre = offer.price_per_litre();
        Self {
            product_id: offer.product_id.clone(),
            retailer: offer.retailer,
            price_per_litre,
            threshold,
            difference: price_per_litre - threshold,
            offer,
        }
    }
}
