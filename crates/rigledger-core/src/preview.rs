//! Read-only diff of a normalized batch against the current snapshot.
//!
//! Classification is exhaustive and disjoint: every valid batch record lands
//! in exactly one of new / updated / unchanged; error checks run
//! independently per row and any error blocks confirmation downstream. Under
//! the `replace` strategy, snapshot names absent from the batch are
//! additionally reported as removed (always empty for `merge` / `append`,
//! which never delete).
//!
//! This module never mutates state.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::record::{MergeStrategy, MinerRecord};

/// Price threshold below which a same-hashrate record counts as unchanged,
/// in percent.
const UNCHANGED_PCT: f64 = 0.01;

/// An `updated` classification with the old and new values that changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedMiner {
    pub record: MinerRecord,
    pub old_price: f64,
    pub new_price: f64,
    pub old_hashrate: f64,
    pub new_hashrate: f64,
    /// `(new - old) / old * 100`, rounded to one decimal.
    pub price_change_pct: f64,
}

/// Summary counts for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PreviewSummary {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub errors: usize,
}

/// Result of previewing one batch. Pure data; the operator confirms or
/// abandons it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IngestionPreview {
    pub new: Vec<MinerRecord>,
    pub updated: Vec<UpdatedMiner>,
    pub unchanged: Vec<MinerRecord>,
    /// Names dropped from the snapshot under `replace`.
    pub removed: Vec<String>,
    /// Human-readable required-field violations; any entry blocks ingestion.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: PreviewSummary,
}

impl IngestionPreview {
    /// Whether the operator may confirm this preview.
    #[must_use]
    pub fn is_confirmable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Percentage change from `old` to `new`; zero when equal or `old` is zero.
fn price_change_pct(old: f64, new: f64) -> f64 {
    if old == 0.0 || (old - new).abs() < f64::EPSILON {
        0.0
    } else {
        (new - old) / old * 100.0
    }
}

/// Round to one decimal place for display and audit counts.
fn round1(pct: f64) -> f64 {
    (pct * 10.0).round() / 10.0
}

/// Compare `batch` against `snapshot` under `strategy`.
#[must_use]
pub fn preview_ingestion(
    batch: &[MinerRecord],
    snapshot: &[MinerRecord],
    strategy: MergeStrategy,
) -> IngestionPreview {
    let mut preview = IngestionPreview::default();

    for (idx, record) in batch.iter().enumerate() {
        if !record.is_valid() {
            preview.errors.push(format!(
                "row {idx} ({name}): name, price > 0, and hashrate > 0 are required",
                name = if record.name.trim().is_empty() {
                    "<unnamed>"
                } else {
                    record.name.as_str()
                }
            ));
            continue;
        }

        match snapshot.iter().find(|r| r.name == record.name) {
            None => preview.new.push(record.clone()),
            Some(existing) => {
                let pct = price_change_pct(existing.price, record.price);
                let hashrate_same = (existing.hashrate - record.hashrate).abs() < f64::EPSILON;
                if pct.abs() < UNCHANGED_PCT && hashrate_same {
                    preview.unchanged.push(record.clone());
                } else {
                    preview.updated.push(UpdatedMiner {
                        record: record.clone(),
                        old_price: existing.price,
                        new_price: record.price,
                        old_hashrate: existing.hashrate,
                        new_hashrate: record.hashrate,
                        price_change_pct: round1(pct),
                    });
                }
            }
        }
    }

    if strategy.is_replace() {
        let batch_names: BTreeSet<&str> = batch.iter().map(|r| r.name.as_str()).collect();
        preview.removed = snapshot
            .iter()
            .filter(|r| !batch_names.contains(r.name.as_str()))
            .map(|r| r.name.clone())
            .collect();
        if !preview.removed.is_empty() {
            preview.warnings.push(format!(
                "replace will drop {} miner(s) absent from this upload",
                preview.removed.len()
            ));
        }
    }

    preview.summary = PreviewSummary {
        total: batch.len(),
        new: preview.new.len(),
        updated: preview.updated.len(),
        unchanged: preview.unchanged.len(),
        removed: preview.removed.len(),
        errors: preview.errors.len(),
    };
    preview
}
