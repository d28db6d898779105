//! Core types used throughout RateFeed
//!
//! Defines offers, averaging modes and the trading-pair mapping.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// One offer row observed on a listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOffer {
    /// Unit price in RUB
    #[serde(rename = "price_RUB")]
    pub unit_price: f64,
    /// Available quantity (1 when the page shows none)
    #[serde(rename = "amount")]
    pub quantity: f64,
    /// Seller name from the row's profile link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl RawOffer {
    pub fn new(unit_price: f64, quantity: f64) -> Self {
        Self {
            unit_price,
            quantity,
            seller: None,
            href: None,
        }
    }

    /// Attach the seller profile the offer was listed under
    pub fn with_seller(mut self, seller: Option<String>, href: Option<String>) -> Self {
        self.seller = seller;
        self.href = href;
        self
    }

    /// Offer with the default quantity of 1
    pub fn priced(unit_price: f64) -> Self {
        Self::new(unit_price, 1.0)
    }

    /// Positive, finite price and quantity
    pub fn is_valid(&self) -> bool {
        self.unit_price.is_finite()
            && self.unit_price > 0.0
            && self.quantity.is_finite()
            && self.quantity > 0.0
    }
}

/// How the surviving candidates collapse into one price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AveragingMode {
    /// Cheapest offer only
    #[serde(alias = "FIRST")]
    First,
    /// Arithmetic mean of the candidates
    #[default]
    #[serde(alias = "MEAN")]
    Mean,
    /// Quantity-weighted mean
    #[serde(alias = "VWAP")]
    Vwap,
    #[serde(alias = "MEDIAN")]
    Median,
}

impl fmt::Display for AveragingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AveragingMode::First => write!(f, "first"),
            AveragingMode::Mean => write!(f, "mean"),
            AveragingMode::Vwap => write!(f, "vwap"),
            AveragingMode::Median => write!(f, "median"),
        }
    }
}

/// A (game, currency) pair and where to scrape it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSpec {
    /// Snapshot key, e.g. "poe1:divine-orb"
    pub key: String,
    pub game: String,
    pub currency: String,
    /// Listing page URL
    #[serde(alias = "funpay_url")]
    pub url: String,
    /// Per-pair policy overrides; unset fields fall back to the global policy
    #[serde(default, alias = "avg_top", skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub averaging_mode: Option<AveragingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier_band_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<f64>,
}

impl PairSpec {
    pub fn new(key: &str, game: &str, currency: &str, url: &str) -> Self {
        Self {
            key: key.to_string(),
            game: game.to_string(),
            currency: currency.to_string(),
            url: url.to_string(),
            top_n: None,
            averaging_mode: None,
            outlier_band_pct: None,
            min_quantity: None,
        }
    }
}

impl fmt::Display for PairSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} / {})", self.key, self.game, self.currency)
    }
}

/// Mapping files come either as a bare list or wrapped in `{"pairs": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingFile {
    List(Vec<PairSpec>),
    Wrapped { pairs: Vec<PairSpec> },
}

impl MappingFile {
    fn into_pairs(self) -> Vec<PairSpec> {
        match self {
            MappingFile::List(pairs) => pairs,
            MappingFile::Wrapped { pairs } => pairs,
        }
    }
}

/// Parse mapping text. `yaml` selects the YAML reader, JSON otherwise.
pub fn parse_mapping(text: &str, yaml: bool) -> Result<Vec<PairSpec>> {
    let file: MappingFile = if yaml {
        serde_yaml::from_str(text).context("Failed to parse YAML mapping")?
    } else {
        serde_json::from_str(text).context("Failed to parse JSON mapping")?
    };
    let pairs = file.into_pairs();

    let mut seen = HashSet::new();
    for pair in &pairs {
        if pair.key.trim().is_empty() {
            bail!("Mapping entry for {} / {} has an empty key", pair.game, pair.currency);
        }
        if pair.url.trim().is_empty() {
            bail!("Mapping entry {} has an empty url", pair.key);
        }
        if !seen.insert(pair.key.as_str()) {
            bail!("Duplicate mapping key: {}", pair.key);
        }
    }

    Ok(pairs)
}

/// Load the pair mapping from disk
pub fn load_mapping(path: impl AsRef<Path>) -> Result<Vec<PairSpec>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    parse_mapping(&text, yaml).with_context(|| format!("Invalid mapping file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_validity() {
        assert!(RawOffer::priced(10.0).is_valid());
        assert!(!RawOffer::priced(0.0).is_valid());
        assert!(!RawOffer::priced(-1.0).is_valid());
        assert!(!RawOffer::priced(f64::NAN).is_valid());
        assert!(!RawOffer::new(10.0, 0.0).is_valid());
        assert!(!RawOffer::new(10.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_offer_serializes_with_snapshot_names() {
        let json = serde_json::to_value(RawOffer::new(21.5, 3.0)).unwrap();
        assert_eq!(json["price_RUB"], 21.5);
        assert_eq!(json["amount"], 3.0);
    }

    #[test]
    fn test_offer_seller_trail() {
        let offer = RawOffer::new(21.5, 3.0).with_seller(
            Some("seller1".to_string()),
            Some("https://funpay.com/users/42/".to_string()),
        );
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["seller"], "seller1");
        assert_eq!(json["href"], "https://funpay.com/users/42/");

        let back: RawOffer = serde_json::from_value(json).unwrap();
        assert_eq!(back, offer);

        let bare = serde_json::to_value(RawOffer::new(1.0, 1.0)).unwrap();
        assert!(bare.get("seller").is_none());
        assert!(bare.get("href").is_none());
    }

    #[test]
    fn test_averaging_mode_serde() {
        assert_eq!(AveragingMode::default(), AveragingMode::Mean);
        let m: AveragingMode = serde_json::from_str("\"FIRST\"").unwrap();
        assert_eq!(m, AveragingMode::First);
        let m: AveragingMode = serde_json::from_str("\"vwap\"").unwrap();
        assert_eq!(m, AveragingMode::Vwap);
        assert!(serde_json::from_str::<AveragingMode>("\"avg\"").is_err());
    }

    #[test]
    fn test_parse_mapping_list_shape() {
        let text = r#"[
            {"key": "poe1:divine", "game": "poe1", "currency": "divine",
             "funpay_url": "https://funpay.com/chips/173/", "avg_top": 3}
        ]"#;
        let pairs = parse_mapping(text, false).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].url, "https://funpay.com/chips/173/");
        assert_eq!(pairs[0].top_n, Some(3));
        assert_eq!(pairs[0].averaging_mode, None);
    }

    #[test]
    fn test_parse_mapping_wrapped_shape() {
        let text = r#"{"pairs": [
            {"key": "a", "game": "g", "currency": "c", "url": "https://x/1",
             "averaging_mode": "vwap", "outlier_band_pct": 0.25}
        ]}"#;
        let pairs = parse_mapping(text, false).unwrap();
        assert_eq!(pairs[0].averaging_mode, Some(AveragingMode::Vwap));
        assert_eq!(pairs[0].outlier_band_pct, Some(0.25));
    }

    #[test]
    fn test_parse_mapping_yaml() {
        let text = "pairs:\n  - key: a\n    game: g\n    currency: c\n    url: https://x/1\n";
        let pairs = parse_mapping(text, true).unwrap();
        assert_eq!(pairs[0].key, "a");
    }

    #[test]
    fn test_parse_mapping_rejects_duplicates() {
        let text = r#"[
            {"key": "a", "game": "g", "currency": "c", "url": "https://x/1"},
            {"key": "a", "game": "g", "currency": "d", "url": "https://x/2"}
        ]"#;
        let err = parse_mapping(text, false).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }
}
