//! The ledger's mutable state aggregate and its audit trail.
//!
//! All engine state lives in one explicit value, [`LedgerState`], threaded
//! through every engine call — there is no ambient global. Deep copies are
//! structural (`Clone` on value types), never serialize-then-parse, so an
//! audit snapshot can never alias the live maps it was taken from.
//!
//! # Audit trail
//!
//! Every ingestion appends an [`AuditRecord`] carrying upload metadata plus
//! a full pre-mutation [`StateSnapshot`]. Records are append-only and ordered
//! by ingestion time; compaction may prune the oldest, but a retained record
//! is never reordered or mutated — rollback restores *from* the trail without
//! rewriting it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::record::{MergeStrategy, MinerHistory, MinerRecord, MinerSpecs};

/// Per-item time series keyed by miner name.
pub type HistoryMap = BTreeMap<String, MinerHistory>;

/// Deep, independent copy of the mutable state as it existed immediately
/// before one ingestion. Every field defaults to empty so snapshots written
/// by older versions still restore (missing field -> empty container).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub snapshot: Vec<MinerRecord>,
    #[serde(default)]
    pub history: HistoryMap,
    #[serde(default)]
    pub known_names: BTreeSet<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, MinerSpecs>,
    #[serde(default)]
    pub max_prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub previous_prices: BTreeMap<String, f64>,
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique id, assigned at ingestion.
    pub id: String,
    /// Operator-specified data date of the upload.
    pub date: NaiveDate,
    /// Ingestion instant, microseconds since the Unix epoch.
    pub timestamp: i64,
    pub file_name: String,
    /// Records in the ingested batch.
    pub miner_count: usize,
    /// Batch names absent from the pre-mutation known-names set.
    pub new_miner_count: usize,
    /// Updated classification count from the confirmed preview.
    pub updated_count: usize,
    pub strategy: MergeStrategy,
    /// Pre-mutation state. Optional for forward compatibility: a trail
    /// entry without a snapshot is not a valid rollback target.
    #[serde(default)]
    pub snapshot: Option<StateSnapshot>,
}

/// The engine's entire mutable state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerState {
    /// Current snapshot list: one record per distinct name, last write wins.
    #[serde(default)]
    pub snapshot: Vec<MinerRecord>,
    #[serde(default)]
    pub history: HistoryMap,
    /// Monotonically growing; membership decides "new vs. previously seen".
    #[serde(default)]
    pub known_names: BTreeSet<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, MinerSpecs>,
    /// name -> highest price ever ingested; never decreases per name.
    #[serde(default)]
    pub max_prices: BTreeMap<String, f64>,
    /// name -> the price overwritten by the most recent update; absent for
    /// freshly introduced names.
    #[serde(default)]
    pub previous_prices: BTreeMap<String, f64>,
    /// Append-only, ordered by ingestion time.
    #[serde(default)]
    pub audit_trail: Vec<AuditRecord>,
}

impl LedgerState {
    /// Capture a deep pre-mutation snapshot of the six mutable containers.
    ///
    /// The audit trail itself is not part of the snapshot: rollback never
    /// rewrites history.
    #[must_use]
    pub fn capture(&self) -> StateSnapshot {
        StateSnapshot {
            snapshot: self.snapshot.clone(),
            history: self.history.clone(),
            known_names: self.known_names.clone(),
            specs: self.specs.clone(),
            max_prices: self.max_prices.clone(),
            previous_prices: self.previous_prices.clone(),
        }
    }

    /// Replace the six mutable containers wholesale from a snapshot,
    /// leaving the audit trail untouched.
    pub fn restore(&mut self, snapshot: &StateSnapshot) {
        self.snapshot = snapshot.snapshot.clone();
        self.history = snapshot.history.clone();
        self.known_names = snapshot.known_names.clone();
        self.specs = snapshot.specs.clone();
        self.max_prices = snapshot.max_prices.clone();
        self.previous_prices = snapshot.previous_prices.clone();
    }

    /// Find the current snapshot record for `name`.
    #[must_use]
    pub fn find_record(&self, name: &str) -> Option<&MinerRecord> {
        self.snapshot.iter().find(|r| r.name == name)
    }
}

/// Mint a unique audit-record id from the ingestion instant plus a random
/// suffix.
#[must_use]
pub fn make_audit_id(ingested_at_us: i64) -> String {
    let noise: u32 = rand::thread_rng().r#gen();
    format!("audit-{ingested_at_us}-{noise:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::HistoryEntry;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("test date")
    }

    fn record(name: &str, price: f64) -> MinerRecord {
        MinerRecord {
            name: name.into(),
            hashrate: 100.0,
            price,
            daily_earnings: 5.0,
            power_consumption: Some(3000),
            efficiency: Some(30.0),
            algorithm: Some("SHA-256".into()),
            date: date("2024-01-01"),
            upload_timestamp: 1,
            upload_id: "u1".into(),
        }
    }

    #[test]
    fn capture_is_independent_of_live_state() {
        let mut state = LedgerState::default();
        state.snapshot.push(record("A", 50.0));
        state.known_names.insert("A".into());
        state.history.insert(
            "A".into(),
            MinerHistory {
                daily: vec![],
                intraday: vec![HistoryEntry::from_record(&record("A", 50.0))],
            },
        );

        let snap = state.capture();
        state.snapshot[0].price = 999.0;
        state.known_names.insert("B".into());
        state
            .history
            .get_mut("A")
            .expect("history")
            .intraday
            .clear();

        assert!((snap.snapshot[0].price - 50.0).abs() < f64::EPSILON);
        assert!(!snap.known_names.contains("B"));
        assert_eq!(snap.history["A"].intraday.len(), 1);
    }

    #[test]
    fn restore_replaces_maps_but_not_audit_trail() {
        let mut state = LedgerState::default();
        state.snapshot.push(record("A", 50.0));
        let snap = state.capture();

        state.snapshot.push(record("B", 70.0));
        state.max_prices.insert("B".into(), 70.0);
        state.audit_trail.push(AuditRecord {
            id: "audit-1".into(),
            date: date("2024-01-02"),
            timestamp: 2,
            file_name: "sheet.xlsx".into(),
            miner_count: 1,
            new_miner_count: 1,
            updated_count: 0,
            strategy: MergeStrategy::Merge,
            snapshot: Some(snap.clone()),
        });

        state.restore(&snap);
        assert_eq!(state.snapshot.len(), 1);
        assert!(state.max_prices.is_empty());
        assert_eq!(state.audit_trail.len(), 1);
    }

    #[test]
    fn snapshot_with_missing_fields_deserializes_empty() {
        let snap: StateSnapshot = serde_json::from_str("{}").expect("decode");
        assert!(snap.snapshot.is_empty());
        assert!(snap.history.is_empty());
        assert!(snap.known_names.is_empty());
    }

    #[test]
    fn audit_record_without_snapshot_deserializes() {
        let raw = r#"{
            "id": "audit-1", "date": "2024-01-01", "timestamp": 5,
            "file_name": "sheet.csv", "miner_count": 2,
            "new_miner_count": 1, "updated_count": 1, "strategy": "merge"
        }"#;
        let rec: AuditRecord = serde_json::from_str(raw).expect("decode");
        assert!(rec.snapshot.is_none());
    }

    #[test]
    fn audit_ids_do_not_collide_for_one_instant() {
        let a = make_audit_id(42);
        let b = make_audit_id(42);
        assert_ne!(a, b);
    }
}
