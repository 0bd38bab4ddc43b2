//! Ingestion: apply a confirmed batch to the ledger as one logical unit.
//!
//! The caller is expected to have confirmed an error-free preview; the batch
//! is re-validated here anyway, and a validation failure applies nothing.
//! All work happens on a clone of the incoming state — the caller sees either
//! the complete next state or the unchanged original, never a partial mix.
//!
//! Per-batch steps, in order:
//!
//! 1. Capture the pre-mutation [`StateSnapshot`] for the audit record.
//! 2. Per record: grow known-names (counting truly-new against the
//!    *pre-mutation* set), overwrite specs, append to `intraday`, recompute
//!    that date's `daily` entry, raise `max_prices`.
//! 3. Apply the merge strategy to produce the next snapshot list, capturing
//!    overwritten prices into `previous_prices` (cleared for fresh names).
//! 4. Append the audit record.

use chrono::NaiveDate;
use tracing::info;

use crate::error::LedgerError;
use crate::model::record::{HistoryEntry, MergeStrategy, MinerHistory, MinerRecord, MinerSpecs};
use crate::preview::preview_ingestion;
use crate::state::{make_audit_id, AuditRecord, LedgerState};

/// Result of one ingestion: the complete next state plus the audit record
/// appended to its trail.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub state: LedgerState,
    pub audit: AuditRecord,
}

/// Insert `entry` into a timestamp-sorted intraday sequence.
fn insert_intraday(intraday: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    let at = intraday.partition_point(|e| e.upload_timestamp <= entry.upload_timestamp);
    intraday.insert(at, entry);
}

/// Recompute the daily entry for `date`: the intraday entry with the
/// maximum timestamp among those sharing the date, inserted or replaced
/// keeping `daily` sorted ascending by date.
fn recompute_daily(history: &mut MinerHistory, date: NaiveDate) {
    let Some(winner) = history
        .intraday
        .iter()
        .filter(|e| e.date == date)
        .max_by_key(|e| e.upload_timestamp)
        .cloned()
    else {
        return;
    };
    match history.daily.binary_search_by(|e| e.date.cmp(&date)) {
        Ok(at) => history.daily[at] = winner,
        Err(at) => history.daily.insert(at, winner),
    }
}

/// Apply a confirmed batch.
///
/// `ingested_at_us` is the ingestion instant stamped on the audit record;
/// the records themselves carry their own batch instant from normalization.
///
/// # Errors
///
/// [`LedgerError::Validation`] when any record violates the required-field
/// rules (the preview's error list is surfaced verbatim). The incoming state
/// is untouched on error.
pub fn ingest(
    state: &LedgerState,
    batch: &[MinerRecord],
    file_name: &str,
    strategy: MergeStrategy,
    data_date: NaiveDate,
    ingested_at_us: i64,
) -> Result<IngestOutcome, LedgerError> {
    let preview = preview_ingestion(batch, &state.snapshot, strategy);
    if !preview.is_confirmable() {
        return Err(LedgerError::Validation {
            reasons: preview.errors,
        });
    }

    // Step 1: pre-mutation snapshot, before any copy is touched.
    let pre = state.capture();
    let mut next = state.clone();

    // Step 2: history, specs, known-names, max-prices.
    let mut new_miner_count = 0_usize;
    for record in batch {
        if !pre.known_names.contains(&record.name) && next.known_names.insert(record.name.clone())
        {
            new_miner_count += 1;
        }
        next.specs
            .insert(record.name.clone(), MinerSpecs::from_record(record));

        let history = next.history.entry(record.name.clone()).or_default();
        insert_intraday(&mut history.intraday, HistoryEntry::from_record(record));
        recompute_daily(history, record.date);

        let max = next.max_prices.entry(record.name.clone()).or_insert(0.0);
        if record.price > *max {
            *max = record.price;
        }
    }

    // Step 3: merge strategy -> next snapshot list + previous-prices.
    if strategy.is_replace() {
        for record in batch {
            match pre.snapshot.iter().find(|r| r.name == record.name) {
                Some(old) => {
                    next.previous_prices.insert(record.name.clone(), old.price);
                }
                None => {
                    next.previous_prices.remove(&record.name);
                }
            }
        }
        // One record per distinct name; a sheet repeating a model keeps the
        // later row, matching the merge branch.
        let mut replaced: Vec<MinerRecord> = Vec::with_capacity(batch.len());
        for record in batch {
            match replaced.iter_mut().find(|r| r.name == record.name) {
                Some(slot) => *slot = record.clone(),
                None => replaced.push(record.clone()),
            }
        }
        next.snapshot = replaced;
    } else {
        for record in batch {
            match next.snapshot.iter_mut().find(|r| r.name == record.name) {
                Some(slot) => {
                    next.previous_prices.insert(record.name.clone(), slot.price);
                    *slot = record.clone();
                }
                None => {
                    next.previous_prices.remove(&record.name);
                    next.snapshot.push(record.clone());
                }
            }
        }
    }

    // Step 4: audit record.
    let audit = AuditRecord {
        id: make_audit_id(ingested_at_us),
        date: data_date,
        timestamp: ingested_at_us,
        file_name: file_name.to_string(),
        miner_count: batch.len(),
        new_miner_count,
        updated_count: preview.summary.updated,
        strategy,
        snapshot: Some(pre),
    };
    next.audit_trail.push(audit.clone());

    info!(
        file = file_name,
        strategy = %strategy,
        miners = batch.len(),
        new = new_miner_count,
        updated = preview.summary.updated,
        "ingested upload"
    );
    Ok(IngestOutcome { state: next, audit })
}
