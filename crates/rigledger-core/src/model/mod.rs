//! Core value types: miner records, history entries, specs, merge strategy.

pub mod power;
pub mod record;

pub use record::{HistoryEntry, MergeStrategy, MinerHistory, MinerRecord, MinerSpecs};
