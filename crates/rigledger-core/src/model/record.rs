use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Policy governing how a batch merges into the current snapshot.
///
/// `Merge` and `Append` are semantically identical (neither ever deletes);
/// both are kept because operators choose them distinctly and the audit trail
/// records what was chosen. `Replace` swaps the whole snapshot for the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Replace,
    Merge,
    Append,
}

impl MergeStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
            Self::Append => "append",
        }
    }

    /// Whether this strategy drops snapshot records absent from the batch.
    #[must_use]
    pub const fn is_replace(self) -> bool {
        matches!(self, Self::Replace)
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized strategy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown merge strategy '{0}' (expected replace, merge, or append)")]
pub struct UnknownStrategy(pub String);

impl FromStr for MergeStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            "append" => Ok(Self::Append),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// One priced inventory item as normalized from a single sheet row.
///
/// A record is valid only if `name` is non-empty and `price` and `hashrate`
/// are both positive; the normalizer drops rows that cannot satisfy this,
/// and the ingestion engine re-checks it defensively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerRecord {
    /// Unique key within a snapshot.
    pub name: String,
    /// TH/s. GH/s inputs are converted during normalization.
    pub hashrate: f64,
    /// Currency units.
    pub price: f64,
    #[serde(default)]
    pub daily_earnings: f64,
    /// Rated draw in watts, when known.
    #[serde(default)]
    pub power_consumption: Option<u32>,
    /// Watts per TH/s; derived from power/hashrate when the sheet omits it.
    #[serde(default)]
    pub efficiency: Option<f64>,
    #[serde(default)]
    pub algorithm: Option<String>,
    /// Calendar date the value is *for* (operator-chosen, not upload time).
    pub date: NaiveDate,
    /// Instant the batch was ingested, microseconds since the Unix epoch.
    pub upload_timestamp: i64,
    /// Globally unique per row, even across same-day repeated uploads.
    pub upload_id: String,
}

impl MinerRecord {
    /// Required-field validity: non-empty name, positive price and hashrate.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.price > 0.0 && self.hashrate > 0.0
    }
}

/// One observation in an item's time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    /// Microseconds since the Unix epoch.
    pub upload_timestamp: i64,
    pub upload_id: String,
    pub price: f64,
    pub hashrate: f64,
    #[serde(default)]
    pub daily_earnings: f64,
    #[serde(default)]
    pub efficiency: Option<f64>,
    #[serde(default)]
    pub power_consumption: Option<u32>,
}

impl HistoryEntry {
    /// Build the history entry recorded for an ingested record.
    #[must_use]
    pub fn from_record(record: &MinerRecord) -> Self {
        Self {
            date: record.date,
            upload_timestamp: record.upload_timestamp,
            upload_id: record.upload_id.clone(),
            price: record.price,
            hashrate: record.hashrate,
            daily_earnings: record.daily_earnings,
            efficiency: record.efficiency,
            power_consumption: record.power_consumption,
        }
    }
}

/// Two views of one item's time series.
///
/// `intraday` holds every ingested observation, ascending by upload
/// timestamp. `daily` holds exactly one entry per distinct date — the
/// intraday entry with the latest timestamp for that date — ascending by
/// date. `daily` is always derivable from `intraday`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinerHistory {
    #[serde(default)]
    pub daily: Vec<HistoryEntry>,
    #[serde(default)]
    pub intraday: Vec<HistoryEntry>,
}

impl MinerHistory {
    /// Derive the daily view from a timestamp-sorted intraday sequence:
    /// latest entry per date, sorted ascending by date.
    #[must_use]
    pub fn derive_daily(intraday: &[HistoryEntry]) -> Vec<HistoryEntry> {
        let mut latest: std::collections::BTreeMap<NaiveDate, &HistoryEntry> =
            std::collections::BTreeMap::new();
        // On a timestamp tie the later entry in sequence order wins, matching
        // the append-order semantics of intraday insertion.
        for entry in intraday {
            match latest.get(&entry.date) {
                Some(existing) if existing.upload_timestamp > entry.upload_timestamp => {}
                _ => {
                    latest.insert(entry.date, entry);
                }
            }
        }
        latest.into_values().cloned().collect()
    }
}

/// Latest ingested hardware characteristics for one item name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinerSpecs {
    #[serde(default)]
    pub power_consumption: Option<u32>,
    #[serde(default)]
    pub efficiency: Option<f64>,
    #[serde(default)]
    pub algorithm: Option<String>,
}

impl MinerSpecs {
    #[must_use]
    pub fn from_record(record: &MinerRecord) -> Self {
        Self {
            power_consumption: record.power_consumption,
            efficiency: record.efficiency,
            algorithm: record.algorithm.clone(),
        }
    }
}
