//! Scrape-cycle configuration
//!
//! Sections: `scraper` (timeouts, retries, pacing, request headers),
//! `selectors` (CSS for offer rows, price and amount), `aggregation`
//! (default [`AggregationPolicy`]), `output` (snapshot and debug dirs)
//! and `logging`. Layered as built-in defaults, then `config/default`
//! and `config/local`, then `RATEFEED__*` environment variables (a
//! `.env` file is read first).

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::pricing::AggregationPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127 Safari/537.36";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path of the pair mapping (JSON or YAML)
    pub mapping_path: String,
    pub scraper: ScraperConfig,
    pub selectors: SelectorConfig,
    /// Global aggregation policy; pairs may override parts of it
    pub aggregation: AggregationPolicy,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Builder pre-populated with every default
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("mapping_path", "./mapping.json")?
            // Scraper defaults
            .set_default("scraper.max_wait_ms", 35_000)?
            .set_default("scraper.max_retries", 2)?
            .set_default("scraper.retry_base_delay_ms", 800)?
            .set_default("scraper.retry_max_delay_ms", 10_000)?
            .set_default("scraper.pause_between_pairs_ms", 1_000)?
            .set_default("scraper.user_agent", DEFAULT_USER_AGENT)?
            .set_default("scraper.accept_language", "ru-RU,ru;q=0.9")?
            // Selector defaults
            .set_default("selectors.row", ".tc-item")?
            .set_default("selectors.price", ".tc-price")?
            .set_default("selectors.amount", ".tc-amount")?
            // Aggregation defaults
            .set_default("aggregation.top_n", 5)?
            .set_default("aggregation.averaging_mode", "mean")?
            .set_default("aggregation.outlier_min_keep", 3)?
            .set_default("aggregation.distinct_prices", false)?
            // Output defaults
            .set_default("output.out_dir", "./dist")?
            .set_default("output.debug_dir", "./debug")?
            .set_default("output.source", "funpay")?
            .set_default("output.write_viewer", true)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;
        Ok(builder)
    }

    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (RATEFEED__*)
            .add_source(Environment::with_prefix("RATEFEED").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.mapping_path.trim().is_empty() {
            bail!("mapping_path must not be empty");
        }
        if self.output.source.trim().is_empty() {
            bail!("output.source must not be empty");
        }
        if self.output.out_dir.trim().is_empty() {
            bail!("output.out_dir must not be empty");
        }
        self.scraper.validate()?;
        self.aggregation
            .validate()
            .context("Invalid aggregation section")?;
        self.selectors
            .compile()
            .context("Invalid selectors section")?;
        Ok(())
    }

    /// One-line digest for the startup log
    pub fn digest(&self) -> String {
        format!(
            "mapping={} source={} top_n={} mode={} band={:?} max_wait_ms={} retries={} out={}",
            self.mapping_path,
            self.output.source,
            self.aggregation.top_n,
            self.aggregation.averaging_mode,
            self.aggregation.outlier_band_pct,
            self.scraper.max_wait_ms,
            self.scraper.max_retries,
            self.output.out_dir
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AveragingMode;

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> AppConfig {
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_defaults_deserialize_and_validate() {
        let cfg = from_builder(AppConfig::defaults().unwrap());
        assert_eq!(cfg.scraper.max_wait_ms, 35_000);
        assert_eq!(cfg.scraper.max_retries, 2);
        assert_eq!(cfg.aggregation.top_n, 5);
        assert_eq!(cfg.aggregation.averaging_mode, AveragingMode::Mean);
        assert_eq!(cfg.aggregation.outlier_band_pct, None);
        assert_eq!(cfg.output.source, "funpay");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let builder = AppConfig::defaults()
            .unwrap()
            .set_override("aggregation.averaging_mode", "vwap")
            .unwrap()
            .set_override("aggregation.outlier_band_pct", 0.25)
            .unwrap()
            .set_override("output.debug_dir", "")
            .unwrap();
        let cfg = from_builder(builder);
        assert_eq!(cfg.aggregation.averaging_mode, AveragingMode::Vwap);
        assert_eq!(cfg.aggregation.outlier_band_pct, Some(0.25));
        assert_eq!(cfg.output.debug_path(), None);
    }

    #[test]
    fn test_validate_rejects_zero_wait() {
        let builder = AppConfig::defaults()
            .unwrap()
            .set_override("scraper.max_wait_ms", 0)
            .unwrap();
        assert!(from_builder(builder).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_selector() {
        let builder = AppConfig::defaults()
            .unwrap()
            .set_override("selectors.price", "div[[")
            .unwrap();
        assert!(from_builder(builder).validate().is_err());
    }

    #[test]
    fn test_digest_mentions_mode() {
        let cfg = from_builder(AppConfig::defaults().unwrap());
        assert!(cfg.digest().contains("mode=mean"));
        assert_eq!(cfg.scraper.retry_policy().total_attempts(), 3);
    }
}
