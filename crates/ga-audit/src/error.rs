// error.rs — Error types for the audit ledger.
//
// A broken hash chain is not an error: verification reports it as a value
// (`ChainVerification`). These variants cover the ledger failing to do its
// job at all.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Reading, creating, or appending to the ledger file failed.
    #[error("audit ledger I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An event could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A complete line in the ledger is not a valid event record.
    #[error("malformed audit record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// The ledger ends in an unterminated line, left by an interrupted
    /// write. Appending would glue the next record onto it.
    #[error("audit ledger at {path} ends with a torn write; refusing to append")]
    TornWrite { path: PathBuf },
}
