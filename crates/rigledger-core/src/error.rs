//! Error taxonomy for the ledger engine.
//!
//! The failure classes crossing the engine boundary:
//!
//! - **Validation** — a confirmed batch contains records that violate the
//!   required-field rules, or the preview for it carried errors. Never
//!   partially applied.
//! - **NotFound** — a rollback target (audit id) does not exist or its
//!   embedded snapshot is missing.
//! - **Storage** — the underlying byte store failed. In-memory state is
//!   *not* reverted; see [`crate::engine`] for the persistence contract.
//! - **Parse** — an uploaded file could not be tokenized into rows at all.
//!   Produced by sheet readers ahead of normalization, not by the engine.
//! - **Corrupt** — a persisted document could not be decoded.
//! - **Busy** — another operation holds the single-writer lock.
//!
//! Row-level malformation inside an otherwise valid batch is not an error:
//! such rows are silently dropped by the normalizer before they reach any
//! engine call.

use std::fmt;

use crate::store::StoreError;

/// Machine-readable error codes for operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidBatch,
    AuditRecordNotFound,
    StoreWriteFailed,
    UnparsableUpload,
    EngineBusy,
    CorruptPersistedState,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidBatch => "E1001",
            Self::AuditRecordNotFound => "E2001",
            Self::StoreWriteFailed => "E3001",
            Self::UnparsableUpload => "E4001",
            Self::EngineBusy => "E5001",
            Self::CorruptPersistedState => "E3002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidBatch => "Batch failed validation",
            Self::AuditRecordNotFound => "Audit record not found",
            Self::StoreWriteFailed => "Store write failed",
            Self::UnparsableUpload => "Upload could not be parsed",
            Self::EngineBusy => "Engine busy",
            Self::CorruptPersistedState => "Persisted state is corrupt",
        }
    }

    /// Optional remediation hint surfaced alongside the error.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidBatch => Some("Fix the flagged rows and re-run the preview."),
            Self::AuditRecordNotFound => {
                Some("List the audit trail to find a valid rollback target.")
            }
            Self::StoreWriteFailed => {
                Some("Check store capacity; the next successful save rewrites everything.")
            }
            Self::UnparsableUpload => Some("Upload a .csv or .xlsx export of the price sheet."),
            Self::EngineBusy => Some("Wait for the in-flight operation to finish and retry."),
            Self::CorruptPersistedState => Some("Restore from a backup or reset the store."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The batch (or its preview) contains records violating required-field
    /// rules. Carries one entry per offending row.
    #[error("invalid batch: {}", reasons.join("; "))]
    Validation { reasons: Vec<String> },

    /// Rollback target missing, or present without an embedded snapshot.
    #[error("audit record '{audit_id}' not found or has no snapshot")]
    NotFound { audit_id: String },

    /// Underlying byte store failed.
    #[error("storage: {0}")]
    Storage(#[from] StoreError),

    /// An uploaded file could not be tokenized into rows. Raised by sheet
    /// readers ahead of normalization.
    #[error("unparsable upload: {0}")]
    Parse(String),

    /// Persisted state could not be decoded.
    #[error("corrupt persisted state under key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Another operation is in flight; the engine never interleaves
    /// mutations.
    #[error("engine busy: another operation is in progress")]
    Busy,
}

impl LedgerError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidBatch,
            Self::NotFound { .. } => ErrorCode::AuditRecordNotFound,
            Self::Storage(_) => ErrorCode::StoreWriteFailed,
            Self::Parse(_) => ErrorCode::UnparsableUpload,
            Self::Corrupt { .. } => ErrorCode::CorruptPersistedState,
            Self::Busy => ErrorCode::EngineBusy,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
