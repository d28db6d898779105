//! Page sources: fetching listing pages and turning them into offers
//!
//! The fetcher returns raw [`OfferFragment`]s; [`parse`] converts them
//! into [`RawOffer`]s for the aggregator.

pub mod extract;
mod http;
pub mod parse;

pub use extract::{FragmentExtractor, OfferFragment};
pub use http::{backoff_with_jitter, HttpFetcher, RetryPolicy};
pub use parse::{parse_offer, parse_offers, parse_quantity, parse_rub};

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Trait for listing-page fetchers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetcher name for logs
    fn name(&self) -> &'static str;

    /// Fetch `url`, waiting at most `max_wait` per attempt, and return the
    /// text fragments that look like offers
    async fn fetch(&self, url: &str, max_wait: Duration) -> Result<Vec<OfferFragment>>;
}
