//! Single-writer engine facade over the pure engines plus persistence.
//!
//! Every public operation runs to completion under one mutex; a second
//! caller arriving mid-operation gets [`LedgerError::Busy`] instead of
//! interleaved mutations. The contract is enforced here, at the engine
//! boundary, not by the caller's UI.
//!
//! # Persistence contract
//!
//! Mutations apply in memory first, then every state key is rewritten in the
//! store. A store-write failure is returned to the caller and logged, but
//! the in-memory state is *not* reverted: the confirmed ingest stands, and
//! the next successful persist rewrites the full current state, healing the
//! gap. Callers that need durability before acting should treat a
//! [`LedgerError::Storage`] return as "applied but unsaved".

use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::compact::{CompactOutcome, compact};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::ingest::ingest;
use crate::model::record::{MergeStrategy, MinerRecord};
use crate::preview::{IngestionPreview, preview_ingestion};
use crate::rollback::rollback;
use crate::state::{AuditRecord, HistoryMap, LedgerState};
use crate::store::{KvStore, SCHEMA_VERSION, keys};
use crate::{migrate, normalize};

struct Inner {
    state: LedgerState,
    store: Box<dyn KvStore>,
    config: EngineConfig,
}

/// The operator-facing engine: owns the state, the store, and the lock.
pub struct Engine {
    inner: Mutex<Inner>,
}

fn decode<T: DeserializeOwned + Default>(
    raw: Option<Vec<u8>>,
    key: &str,
) -> Result<T, LedgerError> {
    match raw {
        None => Ok(T::default()),
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn encode<T: Serialize>(value: &T, key: &str) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl Inner {
    /// Rewrite every state key. Memory is already current when this runs.
    fn persist(&mut self) -> Result<(), LedgerError> {
        let state = &self.state;
        let documents = [
            (keys::SNAPSHOT, encode(&state.snapshot, keys::SNAPSHOT)?),
            (keys::HISTORY, encode(&state.history, keys::HISTORY)?),
            (
                keys::KNOWN_NAMES,
                encode(&state.known_names, keys::KNOWN_NAMES)?,
            ),
            (keys::SPECS, encode(&state.specs, keys::SPECS)?),
            (
                keys::AUDIT_TRAIL,
                encode(&state.audit_trail, keys::AUDIT_TRAIL)?,
            ),
            (
                keys::MAX_PRICES,
                encode(&state.max_prices, keys::MAX_PRICES)?,
            ),
            (
                keys::PREVIOUS_PRICES,
                encode(&state.previous_prices, keys::PREVIOUS_PRICES)?,
            ),
            (
                keys::SCHEMA_VERSION,
                encode(&SCHEMA_VERSION, keys::SCHEMA_VERSION)?,
            ),
        ];
        for (key, bytes) in documents {
            if let Err(err) = self.store.set(key, &bytes) {
                warn!(key, %err, "state applied in memory but not persisted");
                return Err(err.into());
            }
        }
        Ok(())
    }
}

impl Engine {
    /// Load persisted state from `store` and run the one-time legacy history
    /// migration if its flag is not yet set.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] on store reads, [`LedgerError::Corrupt`] on
    /// undecodable documents.
    pub fn open(mut store: Box<dyn KvStore>, config: EngineConfig) -> Result<Self, LedgerError> {
        let mut state = LedgerState {
            snapshot: decode(store.get(keys::SNAPSHOT)?, keys::SNAPSHOT)?,
            history: HistoryMap::new(),
            known_names: decode(store.get(keys::KNOWN_NAMES)?, keys::KNOWN_NAMES)?,
            specs: decode(store.get(keys::SPECS)?, keys::SPECS)?,
            max_prices: decode(store.get(keys::MAX_PRICES)?, keys::MAX_PRICES)?,
            previous_prices: decode(store.get(keys::PREVIOUS_PRICES)?, keys::PREVIOUS_PRICES)?,
            audit_trail: decode(store.get(keys::AUDIT_TRAIL)?, keys::AUDIT_TRAIL)?,
        };

        let migrated_flag: bool =
            decode(store.get(keys::HISTORY_MIGRATED)?, keys::HISTORY_MIGRATED)?;
        let raw_history: Value = decode(store.get(keys::HISTORY)?, keys::HISTORY)?;
        let decode_current = |raw: Value| -> Result<HistoryMap, LedgerError> {
            if raw.is_null() {
                return Ok(HistoryMap::new());
            }
            serde_json::from_value(raw).map_err(|e| LedgerError::Corrupt {
                key: keys::HISTORY.to_string(),
                reason: e.to_string(),
            })
        };
        if migrated_flag {
            state.history = decode_current(raw_history)?;
        } else {
            match migrate::migrate_legacy(&raw_history)? {
                Some(history) => {
                    info!(items = history.len(), "migrated legacy history shape");
                    state.history = history;
                    store.set(keys::HISTORY, &encode(&state.history, keys::HISTORY)?)?;
                }
                None => state.history = decode_current(raw_history)?,
            }
            store.set(keys::HISTORY_MIGRATED, b"true")?;
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                store,
                config,
            }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, LedgerError> {
        self.inner.try_lock().map_err(|_| LedgerError::Busy)
    }

    /// Consume the engine, handing the store back (e.g. to reopen).
    #[must_use]
    pub fn into_store(self) -> Box<dyn KvStore> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .store
    }

    /// A deep copy of the current state for the presentation layer.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Busy`] while another operation is in flight.
    pub fn current_state(&self) -> Result<LedgerState, LedgerError> {
        Ok(self.lock()?.state.clone())
    }

    /// Normalize raw sheet rows, then diff them against the current
    /// snapshot. Read-only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Busy`] while another operation is in flight.
    pub fn preview_upload(
        &self,
        rows: &[Vec<normalize::RawCell>],
        data_date: NaiveDate,
        batch_instant_us: i64,
        strategy: MergeStrategy,
    ) -> Result<(Vec<MinerRecord>, IngestionPreview), LedgerError> {
        let inner = self.lock()?;
        let batch = normalize::normalize_rows(rows, data_date, batch_instant_us);
        let preview = preview_ingestion(&batch, &inner.state.snapshot, strategy);
        Ok((batch, preview))
    }

    /// Apply a confirmed batch and persist.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for invalid batches (nothing applied),
    /// [`LedgerError::Busy`] under contention, [`LedgerError::Storage`] when
    /// the mutation applied in memory but could not be persisted.
    pub fn ingest_upload(
        &self,
        batch: &[MinerRecord],
        file_name: &str,
        strategy: MergeStrategy,
        data_date: NaiveDate,
        ingested_at_us: i64,
    ) -> Result<AuditRecord, LedgerError> {
        let mut inner = self.lock()?;
        let outcome = ingest(
            &inner.state,
            batch,
            file_name,
            strategy,
            data_date,
            ingested_at_us,
        )?;
        inner.state = outcome.state;
        inner.persist()?;
        Ok(outcome.audit)
    }

    /// Restore state from the audit record `audit_id` and persist.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for missing targets, plus the usual
    /// [`LedgerError::Busy`] / [`LedgerError::Storage`] cases.
    pub fn rollback_to(&self, audit_id: &str) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        inner.state = rollback(&inner.state, audit_id)?;
        inner.persist()
    }

    /// Run the configured retention policy over history and the audit trail,
    /// then persist. Operator-triggered only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Busy`] / [`LedgerError::Storage`].
    pub fn compact_history(&self, now_us: i64) -> Result<CompactOutcome, LedgerError> {
        let mut inner = self.lock()?;
        let (next, outcome) = compact(
            &inner.state,
            inner.config.retention_days,
            inner.config.audit_cap,
            now_us,
        );
        inner.state = next;
        inner.persist()?;
        Ok(outcome)
    }

    /// Clear everything: all persisted keys (including the migration flag)
    /// and the in-memory state.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Busy`] / [`LedgerError::Storage`].
    pub fn reset(&self) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        for key in keys::ALL {
            inner.store.remove(key)?;
        }
        inner.state = LedgerState::default();
        info!("ledger reset");
        Ok(())
    }

    /// Rough persisted footprint, for capacity display.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Busy`] while another operation is in flight.
    pub fn approximate_size_bytes(&self) -> Result<u64, LedgerError> {
        Ok(self.lock()?.store.approximate_size_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::normalize::RawCell;
    use crate::store::{MemoryStore, StoreError};

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("test date")
    }

    fn flat_row(name: &str, hashrate: f64, price: f64) -> Vec<RawCell> {
        vec![
            RawCell::Text(name.to_string()),
            RawCell::Number(hashrate),
            RawCell::Number(price),
        ]
    }

    fn open_empty() -> Engine {
        Engine::open(Box::new(MemoryStore::new()), EngineConfig::default()).expect("open")
    }

    #[test]
    fn preview_then_ingest_round_trip() {
        let engine = open_empty();
        let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
        let (batch, preview) = engine
            .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
            .expect("preview");
        assert!(preview.is_confirmable());
        assert_eq!(preview.summary.new, 1);

        let audit = engine
            .ingest_upload(
                &batch,
                "sheet.xlsx",
                MergeStrategy::Merge,
                date("2024-01-01"),
                1_001,
            )
            .expect("ingest");
        assert_eq!(audit.miner_count, 1);

        let state = engine.current_state().expect("state");
        assert_eq!(state.snapshot.len(), 1);
        assert_eq!(state.audit_trail.len(), 1);
    }

    #[test]
    fn state_survives_reopen_through_store() {
        let mut store: Box<dyn KvStore> = Box::new(MemoryStore::new());
        {
            let engine =
                Engine::open(store, EngineConfig::default()).expect("open");
            let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
            let (batch, _) = engine
                .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
                .expect("preview");
            engine
                .ingest_upload(
                    &batch,
                    "sheet.xlsx",
                    MergeStrategy::Merge,
                    date("2024-01-01"),
                    1_001,
                )
                .expect("ingest");
            store = engine.into_store();
        }
        let engine = Engine::open(store, EngineConfig::default()).expect("reopen");
        let state = engine.current_state().expect("state");
        assert_eq!(state.snapshot.len(), 1);
        assert!(state.known_names.contains("Antminer S19"));
        assert_eq!(state.history["Antminer S19"].intraday.len(), 1);
    }

    #[test]
    fn storage_failure_keeps_memory_state() {
        // Budget fits nothing beyond a few bytes: first persist fails.
        let store = Box::new(MemoryStore::with_capacity_limit(8));
        let engine = Engine::open(store, EngineConfig::default()).expect("open");
        let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
        let (batch, _) = engine
            .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
            .expect("preview");
        let err = engine
            .ingest_upload(
                &batch,
                "sheet.xlsx",
                MergeStrategy::Merge,
                date("2024-01-01"),
                1_001,
            )
            .expect_err("store is too small");
        assert!(matches!(err, LedgerError::Storage(_)));
        // the confirmed ingest stands in memory
        let state = engine.current_state().expect("state");
        assert_eq!(state.snapshot.len(), 1);
    }

    #[test]
    fn reset_clears_store_and_memory() {
        let engine = open_empty();
        let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
        let (batch, _) = engine
            .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
            .expect("preview");
        engine
            .ingest_upload(
                &batch,
                "sheet.xlsx",
                MergeStrategy::Merge,
                date("2024-01-01"),
                1_001,
            )
            .expect("ingest");
        engine.reset().expect("reset");
        let state = engine.current_state().expect("state");
        assert_eq!(state, LedgerState::default());
        assert_eq!(engine.approximate_size_bytes().expect("size"), 0);
    }

    #[test]
    fn legacy_history_migrates_once_on_open() {
        let mut store = Box::new(MemoryStore::new());
        let legacy = serde_json::json!({
            "Antminer S19": [
                { "date": "2024-01-01", "price": 50.0, "hashrate": 95.0 },
                { "date": "2024-01-02", "price": 60.0, "hashrate": 95.0 },
            ]
        });
        store
            .set(
                keys::HISTORY,
                &serde_json::to_vec(&legacy).expect("encode"),
            )
            .expect("seed");

        let engine = Engine::open(store, EngineConfig::default()).expect("open");
        let state = engine.current_state().expect("state");
        let history = &state.history["Antminer S19"];
        assert_eq!(history.intraday.len(), 2);
        assert_eq!(history.daily.len(), 2);

        // Reopen: flag set, shape untouched.
        let store = engine.into_store();
        let engine = Engine::open(store, EngineConfig::default()).expect("reopen");
        let state = engine.current_state().expect("state");
        assert_eq!(state.history["Antminer S19"].intraday.len(), 2);
    }

    /// Store whose first snapshot write signals the test thread and then
    /// parks until released, holding the engine lock mid-ingest.
    struct BlockingStore {
        inner: MemoryStore,
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl KvStore for BlockingStore {
        fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            if key == keys::SNAPSHOT {
                self.entered.send(()).expect("test thread is listening");
                self.release.recv().expect("test thread releases");
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }

        fn approximate_size_bytes(&self) -> u64 {
            self.inner.approximate_size_bytes()
        }
    }

    #[test]
    fn concurrent_call_is_rejected_while_an_operation_is_in_flight() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Engine::open(
            Box::new(BlockingStore {
                inner: MemoryStore::new(),
                entered: entered_tx,
                release: release_rx,
            }),
            EngineConfig::default(),
        )
        .expect("open");

        let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
        let (batch, _) = engine
            .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
            .expect("preview");

        thread::scope(|scope| {
            let ingesting = scope.spawn(|| {
                engine.ingest_upload(
                    &batch,
                    "sheet.xlsx",
                    MergeStrategy::Merge,
                    date("2024-01-01"),
                    1_001,
                )
            });
            entered_rx.recv().expect("ingest reached the store");

            // The ingest thread holds the lock inside persist().
            let err = engine.current_state().expect_err("lock is held");
            assert!(matches!(err, LedgerError::Busy));

            release_tx.send(()).expect("release ingest");
            ingesting.join().expect("join").expect("ingest");
        });

        // Once the operation finishes the engine serves again.
        let state = engine.current_state().expect("state");
        assert_eq!(state.snapshot.len(), 1);
    }

    #[test]
    fn rollback_through_engine() {
        let engine = open_empty();
        let rows = vec![flat_row("Antminer S19", 95.0, 2100.0)];
        let (batch, _) = engine
            .preview_upload(&rows, date("2024-01-01"), 1_000, MergeStrategy::Merge)
            .expect("preview");
        let audit = engine
            .ingest_upload(
                &batch,
                "sheet.xlsx",
                MergeStrategy::Merge,
                date("2024-01-01"),
                1_001,
            )
            .expect("ingest");

        engine.rollback_to(&audit.id).expect("rollback");
        let state = engine.current_state().expect("state");
        assert!(state.snapshot.is_empty());
        assert_eq!(state.audit_trail.len(), 1);

        let err = engine.rollback_to("audit-nope").expect_err("unknown id");
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
