//! Rollback: restore live state from an audit record's embedded snapshot.
//!
//! The trail itself is never rewritten — records after the rollback target
//! stay where they are. Rolling back is an ordinary state transition; what
//! the operator did afterwards remains on record.

use tracing::info;

use crate::error::LedgerError;
use crate::state::LedgerState;

/// Replace the live maps wholesale with the snapshot embedded in audit
/// record `audit_id`.
///
/// # Errors
///
/// [`LedgerError::NotFound`] when the id is unknown or the record carries no
/// snapshot; the incoming state is untouched in that case.
pub fn rollback(state: &LedgerState, audit_id: &str) -> Result<LedgerState, LedgerError> {
    let snapshot = state
        .audit_trail
        .iter()
        .find(|r| r.id == audit_id)
        .and_then(|r| r.snapshot.as_ref())
        .ok_or_else(|| LedgerError::NotFound {
            audit_id: audit_id.to_string(),
        })?;

    let mut next = state.clone();
    next.restore(snapshot);
    info!(audit_id, miners = next.snapshot.len(), "rolled back");
    Ok(next)
}
