//! Pricing module - Offer aggregation
//!
//! Turns a noisy list of scraped offers into one price plus the offers
//! that produced it.

mod aggregator;
mod policy;
pub mod stats;

pub use aggregator::{aggregate, AggregateError, PriceSummary};
pub use policy::{AggregationPolicy, DEFAULT_OUTLIER_MIN_KEEP, DEFAULT_TOP_N};
