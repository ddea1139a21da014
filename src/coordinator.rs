use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::matcher::{MatchOutcome, Matcher};
use crate::models::{NormalizedOffer, ProductCatalog, RawOffer, Retailer};
use crate::normalizer::{self, NormalizeError};
use crate::retailers::RetailerAdapter;
use crate::store::PriceStore;
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Matching,
    Normalizing,
    Deduplicating,
    Persisted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetailerStatus {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetailerReport {
    pub retailer: Retailer,
    #[serde(flatten)]
    pub status: RetailerStatus,
    pub fetched: usize,
    pub matched: usize,
    pub discarded: usize,
    pub skipped_size: usize,
    pub skipped_price: usize,
    pub duplicates: usize,
    pub kept: usize,
}

impl RetailerReport {
    fn new(retailer: Retailer) -> Self {
        Self {
            retailer,
            status: RetailerStatus::Succeeded,
            fetched: 0,
            matched: 0,
            discarded: 0,
            skipped_size: 0,
            skipped_price: 0,
            duplicates: 0,
            kept: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RetailerStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub retailers: Vec<RetailerReport>,
}

impl CycleSummary {
    pub fn report_for(&self, retailer: Retailer) -> Option<&RetailerReport> {
        self.retailers.iter().find(|r| r.retailer == retailer)
    }

    pub fn failed_retailers(&self) -> Vec<Retailer> {
        self.retailers.iter().filter(|r| r.is_failed()).map(|r| r.retailer).collect()
    }

    pub fn total_kept(&self) -> usize {
        self.retailers.iter().map(|r| r.kept).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub offers: Vec<NormalizedOffer>,
    pub summary: CycleSummary,
}

/// Runs one scrape cycle across every adapter: fetch, match, normalize,
/// de-duplicate and (for [`run_cycle`](Self::run_cycle)) persist.
pub struct ScrapeCoordinator<A: RetailerAdapter> {
    adapters: Vec<A>,
    catalog: ProductCatalog,
    phase: watch::Sender<CyclePhase>,
}

impl<A: RetailerAdapter> ScrapeCoordinator<A> {
    pub fn new(adapters: Vec<A>, catalog: ProductCatalog) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self { adapters, catalog, phase }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions of running cycles.
    pub fn subscribe(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: CyclePhase) {
        debug!(?phase, "Cycle phase");
        self.phase.send_replace(phase);
    }

    /// Collects, then appends the offers and summary in one transaction.
    /// A store failure fails the whole cycle and nothing is written.
    pub async fn run_cycle(&self, store: &PriceStore) -> Result<CycleReport> {
        let report = self.gather().await;

        match store.append_cycle(&report.offers, &report.summary).await {
            Ok(()) => {
                self.set_phase(CyclePhase::Persisted);
                counter!("soda_watcher_cycles_total", "status" => "persisted").increment(1);
                info!(
                    cycle_id = %report.summary.cycle_id,
                    offers = report.offers.len(),
                    "Cycle persisted"
                );
                self.set_phase(CyclePhase::Idle);
                Ok(report)
            }
            Err(e) => {
                counter!("soda_watcher_cycles_total", "status" => "failed").increment(1);
                warn!(cycle_id = %report.summary.cycle_id, error = %e, "Cycle could not be persisted");
                self.set_phase(CyclePhase::Idle);
                Err(e.into())
            }
        }
    }

    /// The full pipeline without persisting.
    pub async fn collect(&self) -> CycleReport {
        let report = self.gather().await;
        self.set_phase(CyclePhase::Idle);
        report
    }

    /// Fetch through de-duplication, leaving the phase at `Deduplicating`.
    #[instrument(skip(self), fields(adapters = self.adapters.len()))]
    async fn gather(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%cycle_id, "Starting scrape cycle");

        self.set_phase(CyclePhase::Fetching);
        let queries = self.catalog.search_queries();
        let fetches = self.adapters.iter().map(|adapter| {
            let queries = &queries;
            async move {
                let retailer = adapter.retailer();
                let limit = adapter.fetch_timeout();
                let outcome = match timeout(limit, adapter.fetch(queries)).await {
                    Ok(Ok(offers)) => Ok(offers),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", limit.as_secs_f64())),
                };
                (retailer, outcome)
            }
        });
        let fetched = join_all(fetches).await;

        let mut reports: Vec<RetailerReport> = Vec::with_capacity(fetched.len());
        let mut raw_offers: Vec<RawOffer> = Vec::new();
        for (retailer, outcome) in fetched {
            let mut report = RetailerReport::new(retailer);
            match outcome {
                Ok(offers) => {
                    report.fetched = offers.len();
                    counter!("soda_watcher_offers_total", "retailer" => retailer.as_str(), "outcome" => "fetched")
                        .increment(offers.len() as u64);
                    raw_offers.extend(offers);
                }
                Err(reason) => {
                    warn!(retailer = %retailer, %reason, "Retailer failed");
                    counter!("soda_watcher_retailer_failures_total", "retailer" => retailer.as_str()).increment(1);
                    report.status = RetailerStatus::Failed { reason };
                }
            }
            reports.push(report);
        }

        self.set_phase(CyclePhase::Matching);
        let matched = self.match_offers(raw_offers, &mut reports);

        self.set_phase(CyclePhase::Normalizing);
        let normalized = normalize_offers(matched, &mut reports);

        self.set_phase(CyclePhase::Deduplicating);
        let offers = deduplicate(normalized, &mut reports);

        for report in &reports {
            counter!("soda_watcher_offers_total", "retailer" => report.retailer.as_str(), "outcome" => "kept")
                .increment(report.kept as u64);
        }

        let summary = CycleSummary {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            retailers: reports,
        };

        info!(
            %cycle_id,
            kept = summary.total_kept(),
            failed = summary.failed_retailers().len(),
            "Scrape cycle collected"
        );

        CycleReport { offers, summary }
    }

    fn match_offers(&self, raw_offers: Vec<RawOffer>, reports: &mut Vec<RetailerReport>) -> Vec<(RawOffer, String)> {
        let matcher = Matcher::new(&self.catalog);
        let mut matched = Vec::with_capacity(raw_offers.len());

        for offer in raw_offers {
            let report = report_mut(reports, offer.retailer);
            match matcher.classify(&offer.title) {
                MatchOutcome::Matched(definition) => {
                    report.matched += 1;
                    matched.push((offer, definition.id.clone()));
                }
                MatchOutcome::Excluded | MatchOutcome::NoMatch => {
                    debug!(retailer = %offer.retailer, title = %offer.title, "Discarded listing");
                    report.discarded += 1;
                }
            }
        }

        matched
    }
}

fn normalize_offers(matched: Vec<(RawOffer, String)>, reports: &mut Vec<RetailerReport>) -> Vec<NormalizedOffer> {
    let mut normalized = Vec::with_capacity(matched.len());

    for (raw, product_id) in matched {
        let report = report_mut(reports, raw.retailer);
        match normalizer::normalize(&raw.raw_price, &raw.raw_size) {
            Ok(n) => normalized.push(NormalizedOffer::from_raw(&raw, &product_id, n.size_ml, n.price)),
            Err(NormalizeError::UnparsableSize(size)) => {
                warn!(retailer = %raw.retailer, %product_id, %size, "Skipping offer with unparsable size");
                report.skipped_size += 1;
            }
            Err(NormalizeError::InvalidPrice(price)) => {
                warn!(retailer = %raw.retailer, %product_id, %price, "Skipping offer with invalid price");
                report.skipped_price += 1;
            }
        }
    }

    normalized
}

/// Keeps the lowest price per litre for each (retailer, product); the
/// first offer seen wins ties. Output order follows first appearance.
pub fn deduplicate(offers: Vec<NormalizedOffer>, reports: &mut Vec<RetailerReport>) -> Vec<NormalizedOffer> {
    let mut best: Vec<(NormalizedOffer, Decimal)> = Vec::with_capacity(offers.len());
    let mut index: HashMap<(Retailer, String), usize> = HashMap::new();

    for offer in offers {
        let ppl = offer.price_per_litre();
        let key = (offer.retailer, offer.product_id.clone());
        match index.get(&key) {
            Some(&i) => {
                report_mut(reports, offer.retailer).duplicates += 1;
                if ppl < best[i].1 {
                    best[i] = (offer, ppl);
                }
            }
            None => {
                index.insert(key, best.len());
                best.push((offer, ppl));
            }
        }
    }

    for (offer, _) in &best {
        report_mut(reports, offer.retailer).kept += 1;
    }

    best.into_iter().map(|(offer, _)| offer).collect()
}

fn report_mut(reports: &mut Vec<RetailerReport>, retailer: Retailer) -> &mut RetailerReport {
    let index = match reports.iter().position(|r| r.retailer == retailer) {
        Some(i) => i,
        None => {
            reports.push(RetailerReport::new(retailer));
            reports.len() - 1
        }
    };
    &mut reports[index]
}
