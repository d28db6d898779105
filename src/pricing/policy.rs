//! Aggregation policy: how a list of offers becomes one price

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::types::{AveragingMode, PairSpec};

/// Default number of cheapest offers considered
pub const DEFAULT_TOP_N: usize = 5;
/// Smallest candidate set the outlier filter may leave behind
pub const DEFAULT_OUTLIER_MIN_KEEP: usize = 3;

/// Configurable aggregation policy. Global defaults live in the
/// `aggregation` config section; pairs may override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    /// Maximum number of offers to consider (0 behaves as 1)
    pub top_n: usize,
    pub averaging_mode: AveragingMode,
    /// Fractional band around the candidate median (0.25 = 25%)
    #[serde(default)]
    pub outlier_band_pct: Option<f64>,
    pub outlier_min_keep: usize,
    /// Offers below this quantity are ignored
    #[serde(default)]
    pub min_quantity: Option<f64>,
    /// Collapse offers that repeat an already-seen price
    #[serde(default)]
    pub distinct_prices: bool,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            averaging_mode: AveragingMode::Mean,
            outlier_band_pct: None,
            outlier_min_keep: DEFAULT_OUTLIER_MIN_KEEP,
            min_quantity: None,
            distinct_prices: false,
        }
    }
}

impl AggregationPolicy {
    pub fn new(top_n: usize, averaging_mode: AveragingMode) -> Self {
        Self {
            top_n,
            averaging_mode,
            ..Default::default()
        }
    }

    pub fn with_outlier_band(mut self, band_pct: f64) -> Self {
        self.outlier_band_pct = Some(band_pct);
        self
    }

    pub fn with_min_quantity(mut self, min_quantity: f64) -> Self {
        self.min_quantity = Some(min_quantity);
        self
    }

    pub fn with_distinct_prices(mut self, distinct: bool) -> Self {
        self.distinct_prices = distinct;
        self
    }

    /// Candidate count actually used
    pub fn effective_top_n(&self) -> usize {
        self.top_n.max(1)
    }

    /// Policy for one pair: these defaults with the pair's overrides applied
    pub fn for_pair(&self, pair: &PairSpec) -> Self {
        Self {
            top_n: pair.top_n.unwrap_or(self.top_n),
            averaging_mode: pair.averaging_mode.unwrap_or(self.averaging_mode),
            outlier_band_pct: pair.outlier_band_pct.or(self.outlier_band_pct),
            outlier_min_keep: self.outlier_min_keep,
            min_quantity: pair.min_quantity.or(self.min_quantity),
            distinct_prices: self.distinct_prices,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(band) = self.outlier_band_pct {
            if !band.is_finite() || band < 0.0 {
                bail!("outlier_band_pct must be a non-negative number, got {}", band);
            }
        }
        if let Some(min_qty) = self.min_quantity {
            if !min_qty.is_finite() || min_qty < 0.0 {
                bail!("min_quantity must be a non-negative number, got {}", min_qty);
            }
        }
        if self.outlier_min_keep == 0 {
            bail!("outlier_min_keep must be at least 1");
        }
        Ok(())
    }
}
