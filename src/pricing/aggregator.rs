//! Offer Aggregator - Combines scraped offers into one representative price
//!
//! Ranks offers by unit price, keeps the cheapest `top_n`, optionally drops
//! outliers around the median and collapses the rest according to the
//! policy's averaging mode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::policy::AggregationPolicy;
use super::stats;
use crate::types::{AveragingMode, RawOffer};

/// Aggregation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// Every offer was invalid or filtered out
    #[error("no valid offers ({received} scraped, none usable)")]
    NoValidOffers { received: usize },
}

/// Aggregated price for one trading pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Representative price, rounded to 2 decimals
    pub price: f64,
    /// Offers actually used, ascending by price
    pub top_offers: Vec<RawOffer>,
    /// Offers left after validity and quantity filtering, before outlier exclusion
    pub sample_size: usize,
}

/// Aggregate scraped offers under `policy`.
///
/// Pure: the same input always yields the same output.
pub fn aggregate(
    offers: &[RawOffer],
    policy: &AggregationPolicy,
) -> Result<PriceSummary, AggregateError> {
    let mut usable: Vec<RawOffer> = offers
        .iter()
        .filter(|o| o.is_valid())
        .filter(|o| policy.min_quantity.map_or(true, |min| o.quantity >= min))
        .cloned()
        .collect();

    if usable.is_empty() {
        return Err(AggregateError::NoValidOffers {
            received: offers.len(),
        });
    }
    let sample_size = usable.len();

    // Vec::sort_by is stable: equal prices keep scrape order
    usable.sort_by(|a, b| a.unit_price.total_cmp(&b.unit_price));
    if policy.distinct_prices {
        usable.dedup_by(|next, prev| next.unit_price == prev.unit_price);
    }
    usable.truncate(policy.effective_top_n());

    let candidates = match policy.outlier_band_pct {
        Some(band) => exclude_outliers(usable, band, policy.outlier_min_keep),
        None => usable,
    };

    let raw_price = compute_price(&candidates, policy.averaging_mode);

    Ok(PriceSummary {
        price: stats::round_price(raw_price),
        top_offers: candidates,
        sample_size,
    })
}

/// Drop candidates further than `band` (fractional) from the median.
/// Never leaves fewer than `min_keep`: the filter is skipped instead.
fn exclude_outliers(candidates: Vec<RawOffer>, band: f64, min_keep: usize) -> Vec<RawOffer> {
    if candidates.len() < min_keep {
        return candidates;
    }

    let prices: Vec<f64> = candidates.iter().map(|o| o.unit_price).collect();
    let median = match stats::median(&prices) {
        Some(m) if m > 0.0 => m,
        _ => return candidates,
    };

    let kept: Vec<RawOffer> = candidates
        .iter()
        .filter(|o| (o.unit_price - median).abs() / median <= band)
        .cloned()
        .collect();

    if kept.len() < min_keep {
        return candidates;
    }
    kept
}

/// Collapse non-empty, sorted candidates into one unrounded price
fn compute_price(candidates: &[RawOffer], mode: AveragingMode) -> f64 {
    let prices: Vec<f64> = candidates.iter().map(|o| o.unit_price).collect();
    let mean = || stats::mean(&prices).unwrap_or(0.0);

    match mode {
        AveragingMode::First => prices.iter().copied().fold(f64::INFINITY, f64::min),
        AveragingMode::Mean => mean(),
        AveragingMode::Median => stats::median(&prices).unwrap_or(0.0),
        AveragingMode::Vwap => {
            let points: Vec<(f64, f64)> = candidates
                .iter()
                .map(|o| (o.unit_price, o.quantity))
                .collect();
            stats::vwap(&points).unwrap_or_else(mean)
        }
    }
}
