//! # ga-audit
//!
//! Tamper-evident audit ledger for Governed Autonomy.
//!
//! Every tool request, review decision, approval, and execution result is
//! recorded as an [`AuditEvent`] in an append-only JSONL file. Each stored
//! event carries `prevHash` and `hash`, forming a SHA-256 chain that
//! [`verify_hash_chain`] walks to detect edits, insertions, and deletions.
//!
//! Secrets, raw file contents, and oversized payloads are redacted *before*
//! hashing, so the chain covers exactly what is on disk.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use ga_audit::{AuditEvent, AuditEventType, AuditLedger, FileAuditLedger, RedactionOptions, ToolContext};
//!
//! # async fn run() -> Result<(), ga_audit::AuditError> {
//! let ledger = FileAuditLedger::new(".ga/audit.jsonl", RedactionOptions::default());
//! let event = AuditEvent::new(AuditEventType::ToolRequested, "session-1")
//!     .with_tool(ToolContext::new("shell"));
//! ledger.append(event).await?;
//! assert!(ledger.verify_hash_chain().await?.ok);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod error;
pub mod event;
pub mod hasher;
pub mod ledger;
pub mod redaction;

pub use chain::{compute_hash, verify_hash_chain, ChainVerification, HashLink};
pub use error::AuditError;
pub use event::{
    Actor, ActorKind, AuditEvent, AuditEventType, RedactionHint, RedactionReason,
    RedactionStrategy, ToolContext, ToolResult,
};
pub use ga_policy::{ExportFormat, RedactionLevel};
pub use ledger::{AuditLedger, AuditQuery, ExportOptions, FileAuditLedger, LedgerHandle};
pub use redaction::{apply_export_redaction, redact_event, RedactionOptions};
