use tracing::{debug, warn};

use crate::models::{Alert, AlertPreferences, NormalizedOffer, ProductCatalog};

/// Alerts for every in-stock offer priced at or under its packaging's
/// threshold, cheapest per litre first.
///
/// Offers for products the catalog no longer knows, or whose packaging has
/// no threshold, are skipped.
pub fn evaluate(latest: &[NormalizedOffer], catalog: &ProductCatalog, preferences: &AlertPreferences) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = latest
        .iter()
        .filter(|offer| offer.is_in_stock())
        .filter_map(|offer| {
            let Some(packaging) = catalog.packaging_of(&offer.product_id) else {
                warn!(product_id = %offer.product_id, "Offer for unknown product ignored");
                return None;
            };
            let threshold = preferences.threshold_for(packaging)?;
            let price_per_litre = offer.price_per_litre();

            debug!(
                product_id = %offer.product_id,
                retailer = %offer.retailer,
                %price_per_litre,
                %threshold,
                "Evaluated offer"
            );

            (price_per_litre <= threshold).then(|| Alert::new(offer.clone(), threshold))
        })
        .collect();

    alerts.sort_by(|a, b| a.price_per_litre.cmp(&b.price_per_litre));
    alerts
}
