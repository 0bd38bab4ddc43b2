//! Lossy history compaction.
//!
//! Per-item time series grow with every upload. Compaction keeps, per item:
//!
//! - (a) exactly one intraday entry per distinct date — the one with the
//!   maximum timestamp for that date (the daily boundary), kept forever; and
//! - (b) every intraday entry inside the retention window, regardless of (a).
//!
//! The union of (a) and (b), sorted by timestamp, becomes the new `intraday`;
//! the new `daily` is exactly set (a) sorted by date. The audit trail is
//! truncated to its most recent `audit_cap` entries.
//!
//! Older non-boundary intraday detail is discarded by design. Compaction is
//! operator-triggered, never automatic, and idempotent: a second pass over
//! compacted state removes nothing.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::model::record::MinerHistory;
use crate::state::LedgerState;

const US_PER_DAY: i64 = 24 * 60 * 60 * 1_000_000;

/// What one compaction pass removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactOutcome {
    pub intraday_before: usize,
    pub intraday_after: usize,
    pub audits_dropped: usize,
}

/// Compact one item's series. Pure; returns the replacement history.
fn compact_history(history: &MinerHistory, cutoff_us: i64) -> MinerHistory {
    let daily = MinerHistory::derive_daily(&history.intraday);
    let boundary_ids: BTreeSet<&str> = daily.iter().map(|e| e.upload_id.as_str()).collect();

    let mut intraday: Vec<_> = history
        .intraday
        .iter()
        .filter(|e| {
            e.upload_timestamp >= cutoff_us || boundary_ids.contains(e.upload_id.as_str())
        })
        .cloned()
        .collect();
    intraday.sort_by_key(|e| e.upload_timestamp);

    MinerHistory { daily, intraday }
}

/// Shrink every item's series and cap the audit trail.
///
/// `now_us` anchors the retention window: entries with a timestamp within
/// `retention_days` of it always survive.
#[must_use]
pub fn compact(
    state: &LedgerState,
    retention_days: u32,
    audit_cap: usize,
    now_us: i64,
) -> (LedgerState, CompactOutcome) {
    let cutoff_us = now_us - i64::from(retention_days) * US_PER_DAY;

    let mut next = state.clone();
    let mut before = 0_usize;
    let mut after = 0_usize;
    for history in next.history.values_mut() {
        before += history.intraday.len();
        *history = compact_history(history, cutoff_us);
        after += history.intraday.len();
    }

    let audits_dropped = next.audit_trail.len().saturating_sub(audit_cap);
    if audits_dropped > 0 {
        next.audit_trail.drain(..audits_dropped);
    }

    let outcome = CompactOutcome {
        intraday_before: before,
        intraday_after: after,
        audits_dropped,
    };
    info!(
        dropped_entries = before - after,
        audits_dropped, "compacted history"
    );
    (next, outcome)
}
