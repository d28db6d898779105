//! Small numeric helpers for price aggregation

use rust_decimal::prelude::*;

/// Decimal places kept in published prices
pub const PRICE_DECIMALS: u32 = 2;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median; even-length input averages the two middle values
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Volume-weighted average of `(price, quantity)` pairs.
/// Returns `None` when the total quantity is zero.
pub fn vwap(points: &[(f64, f64)]) -> Option<f64> {
    let total_qty: f64 = points.iter().map(|(_, q)| q).sum();
    if total_qty <= 0.0 || !total_qty.is_finite() {
        return None;
    }
    let notional: f64 = points.iter().map(|(p, q)| p * q).sum();
    Some(notional / total_qty)
}

/// Round to [`PRICE_DECIMALS`] places, half away from zero.
/// Rounding happens in decimal space: `14.125` becomes `14.13`.
pub fn round_price(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or_else(|| (value * 100.0).round() / 100.0)
}
