//! Snapshot Persistence Module
//!
//! Defines the published `rates.json` schema and writes it, together with
//! the static viewer page, to the output directory.

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pricing::PriceSummary;
use crate::types::{PairSpec, RawOffer};

pub const SNAPSHOT_FILE: &str = "rates.json";
pub const VIEWER_FILE: &str = "index.html";

const VIEWER_HTML: &str = include_str!("viewer.html");

/// RFC 3339 UTC timestamps with millisecond precision (`...T12:00:00.000Z`)
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Timestamps are kept at the millisecond precision they are written with
fn millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Published record for one trading pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub game: String,
    pub currency: String,
    /// Aggregated price; 0 when the pair could not be priced
    #[serde(rename = "price_RUB")]
    pub price_rub: f64,
    /// Not computed; kept for consumers of the schema
    pub change_24h: Option<f64>,
    pub change_7d: Option<f64>,
    #[serde(with = "iso_millis")]
    pub updated_at: DateTime<Utc>,
    pub trades_top5: Vec<RawOffer>,
    /// Usable offers seen before outlier filtering
    pub sample_size: Option<usize>,
    pub error: Option<String>,
}

impl PairRecord {
    pub fn priced(pair: &PairSpec, summary: PriceSummary, at: DateTime<Utc>) -> Self {
        Self {
            game: pair.game.clone(),
            currency: pair.currency.clone(),
            price_rub: summary.price,
            change_24h: None,
            change_7d: None,
            updated_at: millis(at),
            trades_top5: summary.top_offers,
            sample_size: Some(summary.sample_size),
            error: None,
        }
    }

    pub fn failed(pair: &PairSpec, error: impl Display, at: DateTime<Utc>) -> Self {
        Self {
            game: pair.game.clone(),
            currency: pair.currency.clone(),
            price_rub: 0.0,
            change_24h: None,
            change_7d: None,
            updated_at: millis(at),
            trades_top5: Vec::new(),
            sample_size: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_priced(&self) -> bool {
        self.error.is_none()
    }
}

/// The whole published snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesSnapshot {
    #[serde(with = "iso_millis")]
    pub updated_at: DateTime<Utc>,
    pub source: String,
    /// Keyed by pair key, sorted for stable diffs
    pub pairs: BTreeMap<String, PairRecord>,
}

impl RatesSnapshot {
    pub fn new(source: &str, updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at: millis(updated_at),
            source: source.to_string(),
            pairs: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, record: PairRecord) {
        self.pairs.insert(key.to_string(), record);
    }

    /// Stamp the snapshot as finished at `at`
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = millis(at);
    }

    pub fn priced_count(&self) -> usize {
        self.pairs.values().filter(|r| r.is_priced()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.pairs.len() - self.priced_count()
    }

    /// Pretty JSON with 2-space indentation
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }
}

/// Writes snapshots and the viewer page into one directory
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    out_dir: PathBuf,
    write_viewer: bool,
}

impl SnapshotWriter {
    pub fn new(out_dir: impl Into<PathBuf>, write_viewer: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            write_viewer,
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.out_dir.join(SNAPSHOT_FILE)
    }

    /// Write `rates.json` (and `index.html` when enabled); returns the snapshot path
    pub fn write(&self, snapshot: &RatesSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("Failed to create output dir {}", self.out_dir.display())
        })?;

        let path = self.snapshot_path();
        let mut json = snapshot.to_json()?;
        json.push('\n');
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        if self.write_viewer {
            let viewer = self.out_dir.join(VIEWER_FILE);
            fs::write(&viewer, VIEWER_HTML)
                .with_context(|| format!("Failed to write {}", viewer.display()))?;
        }

        info!(
            path = %path.display(),
            pairs = snapshot.pairs.len(),
            priced = snapshot.priced_count(),
            "💾 Snapshot saved"
        );
        Ok(path)
    }

    /// Read a snapshot back from disk
    pub fn load(path: impl AsRef<Path>) -> Result<RatesSnapshot> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }
}
