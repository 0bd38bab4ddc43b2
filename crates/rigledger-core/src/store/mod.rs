//! Byte-oriented key/value persistence.
//!
//! The engine persists its state as one JSON document per logical key,
//! through the minimal [`KvStore`] interface: get / set / remove plus an
//! approximate size for capacity display. The store is synchronous and
//! fallible — a capacity-constrained backend may refuse a write.
//!
//! # Logical key layout
//!
//! | key | contents |
//! |---|---|
//! | `snapshot` | current snapshot list |
//! | `history` | per-item daily/intraday series |
//! | `known_names` | known-names set |
//! | `specs` | name -> specs map |
//! | `audit_trail` | audit records, oldest first |
//! | `max_prices` | name -> highest price ever |
//! | `previous_prices` | name -> overwritten price |
//! | `schema_version` | layout version string |
//! | `history_migrated` | one-time legacy-migration flag |

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Logical keys of the persisted state layout.
pub mod keys {
    pub const SNAPSHOT: &str = "snapshot";
    pub const HISTORY: &str = "history";
    pub const KNOWN_NAMES: &str = "known_names";
    pub const SPECS: &str = "specs";
    pub const AUDIT_TRAIL: &str = "audit_trail";
    pub const MAX_PRICES: &str = "max_prices";
    pub const PREVIOUS_PRICES: &str = "previous_prices";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const HISTORY_MIGRATED: &str = "history_migrated";

    /// Every key the full-reset operation clears.
    pub const ALL: &[&str] = &[
        SNAPSHOT,
        HISTORY,
        KNOWN_NAMES,
        SPECS,
        AUDIT_TRAIL,
        MAX_PRICES,
        PREVIOUS_PRICES,
        SCHEMA_VERSION,
        HISTORY_MIGRATED,
    ];
}

/// Current value of the `schema_version` key.
pub const SCHEMA_VERSION: &str = "2";

/// Errors surfaced by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend: {0}")]
    Backend(String),

    /// The backend is out of capacity.
    #[error("store capacity exceeded: {0}")]
    Capacity(String),
}

/// Minimal blocking byte store the engine persists through.
pub trait KvStore: Send {
    /// Read the bytes stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the backend read fails.
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the backend write fails, including capacity
    /// exhaustion.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete `key` if present.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the backend delete fails.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Rough total size of stored values, for capacity display.
    fn approximate_size_bytes(&self) -> u64;
}
