use async_trait::async_trait;
use tracing::info;

use crate::models::Alert;
use crate::utils::error::Result;

/// Delivers alerts somewhere. Suppressing repeat notifications is the
/// implementation's concern; every call receives the full alert set.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alerts: &[Alert]) -> Result<()>;
}

/// Reports alerts through the tracing pipeline.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alerts: &[Alert]) -> Result<()> {
        if alerts.is_empty() {
            info!("No offers under their price thresholds");
            return Ok(());
        }

        for alert in alerts {
            info!(
                product_id = %alert.product_id,
                retailer = %alert.retailer,
                price_per_litre = %alert.price_per_litre,
                threshold = %alert.threshold,
                difference = %alert.difference,
                url = %alert.offer.product_url,
                "Price alert"
            );
        }
        info!(count = alerts.len(), "Price alerts reported");
        Ok(())
    }
}
