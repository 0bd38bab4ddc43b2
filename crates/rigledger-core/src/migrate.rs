//! One-time migration of the legacy flat history shape.
//!
//! Early versions persisted each item's history as a flat chronological
//! array of entries; the current shape splits it into `daily` + `intraday`.
//! The transform is gated by a persisted completion flag (the engine checks
//! it, this module only transforms) and defensively idempotent: history that
//! already has the new shape is left alone.
//!
//! Legacy entries may lack `upload_timestamp` and `upload_id`. Timestamps
//! default to noon UTC of the entry's date; ids are synthesized with a
//! `legacy_` prefix plus index and randomness. Entries whose shape is not
//! recognized are skipped with a warning, never fatal.

use chrono::NaiveDate;
use rand::Rng;
use serde_json::Value;
use tracing::warn;

use crate::error::LedgerError;
use crate::model::record::{HistoryEntry, MinerHistory};
use crate::state::HistoryMap;

/// Noon UTC of `date`, microseconds since the Unix epoch.
fn noon_utc_us(date: NaiveDate) -> i64 {
    let noon = date.and_hms_opt(12, 0, 0).expect("noon is valid");
    noon.and_utc().timestamp_micros()
}

fn synth_legacy_id(index: usize) -> String {
    let noise: u32 = rand::thread_rng().r#gen();
    format!("legacy_{index}_{noise:08x}")
}

fn parse_legacy_entry(name: &str, index: usize, raw: &Value) -> Option<HistoryEntry> {
    let entry = try_parse_entry(index, raw);
    if entry.is_none() {
        warn!(name, index, "skipping unrecognized legacy history entry");
    }
    entry
}

#[allow(clippy::cast_possible_truncation)]
fn try_parse_entry(index: usize, raw: &Value) -> Option<HistoryEntry> {
    let obj = raw.as_object()?;
    let date: NaiveDate = obj
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())?;
    let price = obj.get("price").and_then(Value::as_f64)?;
    let hashrate = obj.get("hashrate").and_then(Value::as_f64).unwrap_or(0.0);
    let upload_timestamp = obj
        .get("upload_timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| noon_utc_us(date));
    let upload_id = obj
        .get("upload_id")
        .and_then(Value::as_str)
        .map_or_else(|| synth_legacy_id(index), String::from);
    Some(HistoryEntry {
        date,
        upload_timestamp,
        upload_id,
        price,
        hashrate,
        daily_earnings: obj
            .get("daily_earnings")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        efficiency: obj.get("efficiency").and_then(Value::as_f64),
        power_consumption: obj
            .get("power_consumption")
            .and_then(Value::as_u64)
            .map(|w| w as u32),
    })
}

/// Transform a stored history document from the flat shape.
///
/// Returns `Ok(None)` when there is nothing to migrate: the stored history
/// is empty, or already in the daily/intraday shape. The caller sets the
/// completion flag in both cases.
///
/// # Errors
///
/// [`LedgerError::Corrupt`] when the document is not an object at all.
pub fn migrate_legacy(stored: &Value) -> Result<Option<HistoryMap>, LedgerError> {
    let items = match stored {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(LedgerError::Corrupt {
                key: "history".into(),
                reason: format!("expected object, found {other}"),
            });
        }
    };
    if items.is_empty() {
        return Ok(None);
    }

    // Defensive idempotence: if the first item already has the new shape,
    // never double-migrate.
    if items
        .values()
        .next()
        .and_then(Value::as_object)
        .is_some_and(|o| o.contains_key("daily") || o.contains_key("intraday"))
    {
        return Ok(None);
    }

    let mut migrated = HistoryMap::new();
    for (name, raw_entries) in items {
        let Some(entries) = raw_entries.as_array() else {
            warn!(name, "skipping item with unrecognized legacy history shape");
            continue;
        };
        let mut intraday: Vec<HistoryEntry> = entries
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| parse_legacy_entry(name, idx, raw))
            .collect();
        intraday.sort_by_key(|e| e.upload_timestamp);
        let daily = MinerHistory::derive_daily(&intraday);
        migrated.insert(name.clone(), MinerHistory { daily, intraday });
    }
    Ok(Some(migrated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_empty_mean_nothing_to_migrate() {
        assert!(migrate_legacy(&Value::Null).expect("null").is_none());
        assert!(migrate_legacy(&json!({})).expect("empty").is_none());
    }

    #[test]
    fn new_shape_is_left_alone() {
        let stored = json!({
            "Antminer S19": { "daily": [], "intraday": [] }
        });
        assert!(migrate_legacy(&stored).expect("migrate").is_none());
    }

    #[test]
    fn flat_array_becomes_daily_and_intraday() {
        let stored = json!({
            "Antminer S19": [
                { "date": "2024-01-02", "price": 60.0, "hashrate": 95.0 },
                { "date": "2024-01-01", "price": 50.0, "hashrate": 95.0 },
            ]
        });
        let migrated = migrate_legacy(&stored)
            .expect("migrate")
            .expect("has items");
        let history = &migrated["Antminer S19"];
        assert_eq!(history.intraday.len(), 2);
        assert_eq!(history.daily.len(), 2);
        // sorted by backfilled noon-UTC timestamps, so 01-01 first
        assert_eq!(history.intraday[0].date, "2024-01-01".parse().expect("d"));
        assert!(history.intraday[0].upload_id.starts_with("legacy_"));
        assert_eq!(
            history.intraday[0].upload_timestamp,
            noon_utc_us("2024-01-01".parse().expect("d"))
        );
    }

    #[test]
    fn same_day_legacy_entries_collapse_in_daily() {
        let stored = json!({
            "Antminer S19": [
                { "date": "2024-01-01", "price": 50.0 },
                { "date": "2024-01-01", "price": 52.0, "upload_timestamp": 99 },
            ]
        });
        let migrated = migrate_legacy(&stored)
            .expect("migrate")
            .expect("has items");
        let history = &migrated["Antminer S19"];
        assert_eq!(history.intraday.len(), 2);
        assert_eq!(history.daily.len(), 1);
        // noon UTC of 2024-01-01 beats an explicit timestamp of 99 µs
        assert!((history.daily[0].price - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrecognized_entries_are_skipped_not_fatal() {
        let stored = json!({
            "Antminer S19": [
                "not an object",
                { "price": 50.0 },
                { "date": "2024-01-01", "price": 50.0 },
            ],
            "Broken": "not an array"
        });
        let migrated = migrate_legacy(&stored)
            .expect("migrate")
            .expect("has items");
        assert_eq!(migrated["Antminer S19"].intraday.len(), 1);
        assert!(!migrated.contains_key("Broken"));
    }

    #[test]
    fn non_object_document_is_corrupt() {
        let err = migrate_legacy(&json!([1, 2, 3])).expect_err("must fail");
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn explicit_ids_and_timestamps_are_preserved() {
        let stored = json!({
            "Antminer S19": [
                { "date": "2024-01-01", "price": 50.0,
                  "upload_timestamp": 1234, "upload_id": "u-kept" },
            ]
        });
        let migrated = migrate_legacy(&stored)
            .expect("migrate")
            .expect("has items");
        let entry = &migrated["Antminer S19"].intraday[0];
        assert_eq!(entry.upload_id, "u-kept");
        assert_eq!(entry.upload_timestamp, 1234);
    }
}
