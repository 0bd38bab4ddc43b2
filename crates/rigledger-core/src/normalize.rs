//! Row normalization: one raw sheet row -> zero or one [`MinerRecord`].
//!
//! Price sheets arrive in two layouts, detected per row by inspecting cell 0:
//!
//! - **rich** — cell 0 is a URL-like token (vendor image link). Layout:
//!   `[image, name, "110 TH/s", algorithm, "$2,100", "$7.10", power?, eff?]`.
//!   Hashrate needs regex extraction from free text, with GH/s converted to
//!   TH/s.
//! - **flat** — positional numeric cells:
//!   `[name, hashrate, price, earnings, power?, efficiency?]`.
//!
//! Backfill rules: a missing power draw is looked up by exact name in the
//! static reference table; a missing or zero efficiency is derived as
//! `power / hashrate` when both are present.
//!
//! Rows that cannot yield a valid record (empty name, non-positive price or
//! hashrate) are dropped, not errored — real sheets carry headers, blank
//! separators, and discontinued models with no price. Explicit validation
//! errors are the preview engine's job, for batches built outside this path.

use std::sync::LazyLock;

use chrono::NaiveDate;
use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::model::power;
use crate::model::record::MinerRecord;

/// One loosely-typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Empty,
}

impl RawCell {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric value of a cell, accepting `$` / `,` / whitespace decoration
    /// in text cells.
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
                    .collect();
                cleaned.parse().ok()
            }
            Self::Empty => None,
        }
    }
}

/// `"110 TH/s"`, `"9500GH/s"`, `"0.85 Gh/s"` — value plus unit, any case,
/// optional whitespace between them.
static HASHRATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*([GT])H/?S").expect("hashrate pattern is valid")
});

/// Extract a TH/s hashrate from free text like `"110 TH/s"` or `"9500 GH/s"`.
fn parse_hashrate_text(text: &str) -> Option<f64> {
    let caps = HASHRATE_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let th = if caps[2].eq_ignore_ascii_case("G") {
        value / 1000.0
    } else {
        value
    };
    Some(th)
}

/// Whether cell 0 marks the rich (image-first) layout.
fn looks_like_url(cell: &RawCell) -> bool {
    cell.as_text().is_some_and(|s| {
        let s = s.trim();
        s.starts_with("http://")
            || s.starts_with("https://")
            || s.starts_with("//")
            || s.starts_with("www.")
    })
}

static EMPTY_CELL: RawCell = RawCell::Empty;

fn cell(row: &[RawCell], idx: usize) -> &RawCell {
    row.get(idx).unwrap_or(&EMPTY_CELL)
}

/// Non-negative integer watts from a cell; fractional values are truncated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_watts(c: &RawCell) -> Option<u32> {
    let n = c.as_number()?;
    if n.is_finite() && n >= 0.0 {
        Some(n as u32)
    } else {
        None
    }
}

struct ParsedRow {
    name: String,
    hashrate: f64,
    price: f64,
    daily_earnings: f64,
    power_consumption: Option<u32>,
    efficiency: Option<f64>,
    algorithm: Option<String>,
}

fn parse_rich(row: &[RawCell]) -> Option<ParsedRow> {
    let name = cell(row, 1).as_text()?.trim().to_string();
    let hashrate = cell(row, 2)
        .as_text()
        .and_then(parse_hashrate_text)
        .or_else(|| cell(row, 2).as_number())?;
    let algorithm = cell(row, 3)
        .as_text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let price = cell(row, 4).as_number()?;
    let daily_earnings = cell(row, 5).as_number().unwrap_or(0.0);
    let power_consumption = as_watts(cell(row, 6));
    let efficiency = cell(row, 7).as_number();
    Some(ParsedRow {
        name,
        hashrate,
        price,
        daily_earnings,
        power_consumption,
        efficiency,
        algorithm,
    })
}

fn parse_flat(row: &[RawCell]) -> Option<ParsedRow> {
    let name = cell(row, 0).as_text()?.trim().to_string();
    let hashrate = cell(row, 1).as_number()?;
    let price = cell(row, 2).as_number()?;
    let daily_earnings = cell(row, 3).as_number().unwrap_or(0.0);
    let power_consumption = as_watts(cell(row, 4));
    let efficiency = cell(row, 5).as_number();
    Some(ParsedRow {
        name,
        hashrate,
        price,
        daily_earnings,
        power_consumption,
        efficiency,
        algorithm: None,
    })
}

/// Synthesize a globally unique upload id for one row.
///
/// Combines the data date, the batch instant, the row index, and a random
/// suffix so intraday entries never collide, even across repeated same-day
/// uploads of the same sheet.
#[must_use]
pub fn make_upload_id(data_date: NaiveDate, batch_instant_us: i64, row_index: usize) -> String {
    let noise: u32 = rand::thread_rng().r#gen();
    format!(
        "{}-{batch_instant_us}-{row_index}-{noise:08x}",
        data_date.format("%Y%m%d")
    )
}

/// Normalize a single raw row. Returns `None` for rows that cannot produce a
/// valid record; that is expected, not an error.
#[must_use]
pub fn normalize_row(
    row: &[RawCell],
    data_date: NaiveDate,
    batch_instant_us: i64,
    row_index: usize,
) -> Option<MinerRecord> {
    let parsed = if looks_like_url(cell(row, 0)) {
        parse_rich(row)
    } else {
        parse_flat(row)
    };
    let Some(mut parsed) = parsed else {
        debug!(row_index, "dropping row: missing required cells");
        return None;
    };

    // Power backfill from the reference table, then efficiency from power.
    if parsed.power_consumption.is_none() {
        parsed.power_consumption = power::rated_watts(&parsed.name);
    }
    let efficiency_missing = parsed.efficiency.unwrap_or(0.0) <= 0.0;
    if efficiency_missing && parsed.hashrate > 0.0 {
        if let Some(watts) = parsed.power_consumption {
            parsed.efficiency = Some(f64::from(watts) / parsed.hashrate);
        } else {
            parsed.efficiency = None;
        }
    }

    let record = MinerRecord {
        name: parsed.name,
        hashrate: parsed.hashrate,
        price: parsed.price,
        daily_earnings: parsed.daily_earnings,
        power_consumption: parsed.power_consumption,
        efficiency: parsed.efficiency,
        algorithm: parsed.algorithm,
        date: data_date,
        upload_timestamp: batch_instant_us,
        upload_id: make_upload_id(data_date, batch_instant_us, row_index),
    };
    if record.is_valid() {
        Some(record)
    } else {
        debug!(row_index, name = %record.name, "dropping row: failed validity check");
        None
    }
}

/// Normalize an ordered sequence of raw rows into a batch.
///
/// Invalid or incomplete rows are dropped silently (logged at debug); the
/// batch carries only records satisfying the validity rules.
#[must_use]
pub fn normalize_rows(
    rows: &[Vec<RawCell>],
    data_date: NaiveDate,
    batch_instant_us: i64,
) -> Vec<MinerRecord> {
    let records: Vec<MinerRecord> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| normalize_row(row, data_date, batch_instant_us, idx))
        .collect();
    debug!(
        rows = rows.len(),
        records = records.len(),
        "normalized upload batch"
    );
    records
}
