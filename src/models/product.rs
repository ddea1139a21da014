use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{Brand, Packaging};
use crate::utils::error::AppError;

/// A tracked product as configured at startup. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDefinition {
    pub id: String,
    pub brand: Brand,
    #[serde(default)]
    pub flavor: Option<String>,
    pub packaging: Packaging,

    /// Search term sent to retailer search endpoints.
    pub query: String,

    /// Every pattern must appear in the title. A pattern may offer
    /// alternatives separated by `|`.
    pub patterns: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl ProductDefinition {
    pub fn new(
        id: &str,
        brand: Brand,
        flavor: Option<&str>,
        packaging: Packaging,
        query: &str,
        patterns: &[&str],
        exclusions: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            brand,
            flavor: flavor.map(str::to_string),
            packaging,
            query: query.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            exclusions: exclusions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCatalog {
    pub products: Vec<ProductDefinition>,

    /// Keywords that discard a listing before any definition is considered.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

const ZERO_SUGAR: &str = "zero sugar|sugar free|no sugar|diet|zero";
const CAN: &str = "can|cans";
const BOTTLE: &str = "bottle|1.25l|1.25 l|2l|2 l|600ml|600 ml|1.5l|1.5 l";

impl ProductCatalog {
    pub fn new(products: Vec<ProductDefinition>, exclusions: Vec<String>) -> Result<Self, AppError> {
        let catalog = Self { products, exclusions };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The three tracked drinks, each in can and bottle form.
    pub fn standard() -> Self {
        let products = vec![
            ProductDefinition::new(
                "sunkist-zero-can",
                Brand::Sunkist,
                Some("orange"),
                Packaging::Can,
                "sunkist zero sugar",
                &["sunkist", ZERO_SUGAR, CAN],
                &["bottle"],
            ),
            ProductDefinition::new(
                "sunkist-zero-bottle",
                Brand::Sunkist,
                Some("orange"),
                Packaging::Bottle,
                "sunkist zero sugar",
                &["sunkist", ZERO_SUGAR, BOTTLE],
                &["can"],
            ),
            ProductDefinition::new(
                "fanta-zero-can",
                Brand::Fanta,
                Some("orange"),
                Packaging::Can,
                "fanta zero sugar",
                &["fanta", ZERO_SUGAR, CAN],
                &["bottle", "grape", "raspberry", "creaming soda", "pineapple"],
            ),
            ProductDefinition::new(
                "fanta-zero-bottle",
                Brand::Fanta,
                Some("orange"),
                Packaging::Bottle,
                "fanta zero sugar",
                &["fanta", ZERO_SUGAR, BOTTLE],
                &["can", "grape", "raspberry", "creaming soda", "pineapple"],
            ),
            ProductDefinition::new(
                "pepsi-max-mango-can",
                Brand::PepsiMaxMango,
                Some("mango"),
                Packaging::Can,
                "pepsi max mango",
                &["pepsi max", "mango", CAN],
                &["bottle"],
            ),
            ProductDefinition::new(
                "pepsi-max-mango-bottle",
                Brand::PepsiMaxMango,
                Some("mango"),
                Packaging::Bottle,
                "pepsi max mango",
                &["pepsi max", "mango", BOTTLE],
                &["can"],
            ),
        ];

        let exclusions = [
            "mix",
            "concentrate",
            "syrup",
            "drink maker",
            "soda maker",
            "powder",
            "crystal",
            "tablet",
            "capsule",
            "drops",
            "flavoring",
            "flavouring",
            "essence",
            "extract",
        ]
        .iter()
        .map(|e| e.to_string())
        .collect();

        Self { products, exclusions }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.products.is_empty() {
            return Err(AppError::Validation("catalog must define at least one product".into()));
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            if product.id.trim().is_empty() {
                return Err(AppError::Validation("product id must not be empty".into()));
            }
            if !seen.insert(product.id.as_str()) {
                return Err(AppError::Validation(format!("duplicate product id '{}'", product.id)));
            }
            if product.query.trim().is_empty() {
                return Err(AppError::Validation(format!("product '{}' has an empty query", product.id)));
            }
            if product.patterns.is_empty() {
                return Err(AppError::Validation(format!("product '{}' has no patterns", product.id)));
            }
            let has_blank = product
                .patterns
                .iter()
                .any(|p| p.split('|').all(|alt| alt.trim().is_empty()));
            if has_blank {
                return Err(AppError::Validation(format!("product '{}' has a blank pattern", product.id)));
            }
        }

        Ok(())
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductDefinition> {
        self.products.iter().find(|p| p.id == product_id)
    }

    pub fn packaging_of(&self, product_id: &str) -> Option<Packaging> {
        self.get(product_id).map(|p| p.packaging)
    }

    /// De-duplicated search terms in declaration order.
    pub fn search_queries(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.products
            .iter()
            .map(|p| p.query.trim().to_lowercase())
            .filter(|q| seen.insert(q.clone()))
            .collect()
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
