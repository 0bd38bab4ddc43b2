//! rigledger-core: ingestion, merge, diff-preview, versioned-history, and
//! rollback engine for miner price-sheet uploads.
//!
//! A single operator repeatedly uploads vendor price sheets; the engine
//! normalizes rows into [`model::MinerRecord`]s, previews the diff against
//! the current snapshot, applies confirmed batches under a merge strategy,
//! and keeps per-item daily/intraday time series plus an audit trail whose
//! records embed full pre-mutation snapshots — every ingestion can be rolled
//! back.
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::LedgerError`] with machine codes; `anyhow`
//!   only in tests.
//! - **Logging**: `tracing` macros at mutation boundaries.
//! - **State**: one explicit [`state::LedgerState`] value threaded through
//!   every engine call; deep copies are structural `Clone`, never
//!   serialize-then-parse.
//! - **Mutation**: the pure engines (`ingest`, `rollback`, `compact`) take
//!   `&LedgerState` and return the next state; [`engine::Engine`] adds the
//!   single-writer lock and persistence.

pub mod compact;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod preview;
pub mod rollback;
pub mod state;
pub mod store;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ErrorCode, LedgerError};
pub use model::{MergeStrategy, MinerRecord};
pub use preview::IngestionPreview;
pub use state::{AuditRecord, LedgerState};
