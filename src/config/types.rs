//! Configuration section types

use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::{FragmentExtractor, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Maximum wait per page request in milliseconds
    pub max_wait_ms: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// First retry delay in milliseconds (doubles per retry)
    pub retry_base_delay_ms: u64,
    /// Retry delay ceiling in milliseconds
    pub retry_max_delay_ms: u64,
    /// Pause between consecutive pairs in milliseconds
    pub pause_between_pairs_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl ScraperConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn pause_between_pairs(&self) -> Duration {
        Duration::from_millis(self.pause_between_pairs_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_wait_ms == 0 {
            bail!("scraper.max_wait_ms must be greater than zero");
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            bail!(
                "scraper.retry_max_delay_ms ({}) is below retry_base_delay_ms ({})",
                self.retry_max_delay_ms,
                self.retry_base_delay_ms
            );
        }
        if self.user_agent.trim().is_empty() {
            bail!("scraper.user_agent must not be empty");
        }
        Ok(())
    }
}

/// CSS selectors for the listing layout
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Offer row; empty means "scan price elements directly"
    #[serde(default)]
    pub row: String,
    pub price: String,
    /// Quantity element inside a row; empty disables quantities
    #[serde(default)]
    pub amount: String,
}

impl SelectorConfig {
    pub fn compile(&self) -> Result<FragmentExtractor> {
        FragmentExtractor::new(Some(&self.row), &self.price, Some(&self.amount))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory for rates.json and index.html
    pub out_dir: String,
    /// Directory for page dumps; empty disables them
    #[serde(default)]
    pub debug_dir: String,
    /// Snapshot `source` tag
    pub source: String,
    /// Also write the static HTML viewer
    pub write_viewer: bool,
}

impl OutputConfig {
    pub fn out_path(&self) -> PathBuf {
        PathBuf::from(&self.out_dir)
    }

    pub fn debug_path(&self) -> Option<PathBuf> {
        let dir = self.debug_dir.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// pretty | compact | json
    pub format: String,
}
