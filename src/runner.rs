//! Batch runner
//!
//! Walks the pair mapping sequentially: fetch, parse, aggregate, record.
//! A pair that cannot be priced is recorded with an error and the batch
//! moves on.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::persistence::{PairRecord, RatesSnapshot};
use crate::pricing::{aggregate, AggregationPolicy, PriceSummary};
use crate::sources::{parse_offers, PageFetcher};
use crate::types::PairSpec;

/// Runner settings, lifted out of [`AppConfig`]
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub policy: AggregationPolicy,
    pub max_wait: Duration,
    pub pause_between_pairs: Duration,
    pub source: String,
}

impl RunnerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy: config.aggregation.clone(),
            max_wait: config.scraper.max_wait(),
            pause_between_pairs: config.scraper.pause_between_pairs(),
            source: config.output.source.clone(),
        }
    }
}

pub struct Runner<F: PageFetcher> {
    fetcher: F,
    settings: RunnerSettings,
}

impl<F: PageFetcher> Runner<F> {
    pub fn new(fetcher: F, settings: RunnerSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn price_pair(&self, pair: &PairSpec) -> Result<PriceSummary> {
        let fragments = self.fetcher.fetch(&pair.url, self.settings.max_wait).await?;
        let offers = parse_offers(&fragments);
        let policy = self.settings.policy.for_pair(pair);
        let summary = aggregate(&offers, &policy)?;

        tracing::debug!(
            pair = %pair.key,
            fragments = fragments.len(),
            offers = offers.len(),
            mode = %policy.averaging_mode,
            "Offers aggregated"
        );
        Ok(summary)
    }

    /// Price one pair; failures become an error record, never an `Err`
    pub async fn collect_pair(&self, pair: &PairSpec) -> PairRecord {
        match self.price_pair(pair).await {
            Ok(summary) => {
                info!(
                    pair = %pair.key,
                    price_rub = summary.price,
                    used = summary.top_offers.len(),
                    sample = summary.sample_size,
                    "✅ Pair priced"
                );
                PairRecord::priced(pair, summary, Utc::now())
            }
            Err(err) => {
                let error = format!("{:#}", err);
                warn!(
                    pair = %pair.key,
                    url = %pair.url,
                    error = %error,
                    "❌ Pair not priced"
                );
                PairRecord::failed(pair, error, Utc::now())
            }
        }
    }

    /// Price every pair and assemble the snapshot
    pub async fn run(&self, pairs: &[PairSpec]) -> RatesSnapshot {
        let mut snapshot = RatesSnapshot::new(&self.settings.source, Utc::now());
        info!(
            pairs = pairs.len(),
            fetcher = self.fetcher.name(),
            "Starting scrape cycle"
        );

        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 && !self.settings.pause_between_pairs.is_zero() {
                tokio::time::sleep(self.settings.pause_between_pairs).await;
            }
            let record = self.collect_pair(pair).await;
            snapshot.insert(&pair.key, record);
        }

        snapshot.touch(Utc::now());
        info!(
            total = snapshot.pairs.len(),
            priced = snapshot.priced_count(),
            failed = snapshot.failed_count(),
            "Scrape cycle finished"
        );
        snapshot
    }
}
