// ledger.rs — Append-only, hash-chained JSONL audit ledger.
//
// One JSON object per line. Appends are serialized behind an async mutex
// that is held across lazy initialization, hashing, and the write, so two
// concurrent appends can never link to the same predecessor. Each record is
// written with a single `write_all` of the full line.
//
// Readers do not take the lock. A reader that races a writer may see an
// unterminated last line; it is discarded, since the writer has not
// finished it yet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use ga_policy::{ExportFormat, RedactionLevel};

use crate::chain::{self, ChainVerification};
use crate::error::AuditError;
use crate::event::{now_timestamp, AuditEvent, AuditEventType, SCHEMA_VERSION};
use crate::redaction::{apply_export_redaction, redact_event, RedactionOptions};

/// Default number of events `query` returns.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Filters for reading events back. Results are in chronological order and
/// are the *most recent* `limit` matches.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub limit: usize,
    pub since: Option<DateTime<Utc>>,
    pub tool_name: Option<String>,
    pub event_types: Option<Vec<AuditEventType>>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            since: None,
            tool_name: None,
            event_types: None,
        }
    }
}

impl AuditQuery {
    /// Every event in the ledger.
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = AuditEventType>) -> Self {
        self.event_types = Some(types.into_iter().collect());
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(since) = self.since {
            let at_or_after = DateTime::parse_from_rfc3339(&event.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= since)
                .unwrap_or(false);
            if !at_or_after {
                return false;
            }
        }
        if let Some(name) = &self.tool_name {
            if event.tool_name() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub redaction: RedactionLevel,
}

/// An append-only audit ledger.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Redact, stamp, chain, and persist `event`. Returns the stored form.
    async fn append(&self, event: AuditEvent) -> Result<AuditEvent, AuditError>;

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditError>;

    async fn verify_hash_chain(&self) -> Result<ChainVerification, AuditError>;

    /// Render every event for hand-off, redacted per `options`.
    async fn export(&self, options: &ExportOptions) -> Result<String, AuditError>;
}

/// Shared handle for components that audit when a ledger is configured.
pub type LedgerHandle = Arc<dyn AuditLedger>;

#[derive(Debug, Default)]
struct LedgerState {
    initialized: bool,
    last_hash: String,
}

/// A ledger backed by a single JSONL file.
#[derive(Debug)]
pub struct FileAuditLedger {
    path: PathBuf,
    options: RedactionOptions,
    state: Mutex<LedgerState>,
}

impl FileAuditLedger {
    /// Nothing is touched on disk until the first operation.
    pub fn new(path: impl Into<PathBuf>, options: RedactionOptions) -> Self {
        Self {
            path: path.into(),
            options,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Create the parent directory and recover `last_hash` from the last
    /// record. Must be called with the state lock held.
    async fn ensure_initialized(&self, state: &mut LedgerState) -> Result<(), AuditError> {
        if state.initialized {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.io_error(e)),
        };
        if !data.is_empty() && !data.ends_with('\n') {
            tracing::warn!(path = %self.path.display(), "audit ledger ends with a torn write");
            return Err(AuditError::TornWrite {
                path: self.path.clone(),
            });
        }
        let records = parse_records(&data)?;
        if let Some((line, last)) = records.last() {
            state.last_hash = last
                .get("hash")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AuditError::MalformedRecord {
                    line: *line,
                    reason: "record has no hash".to_string(),
                })?;
        }
        state.initialized = true;
        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "audit ledger opened"
        );
        Ok(())
    }

    /// Complete records on disk, with their 1-based line numbers.
    async fn read_records(&self) -> Result<Vec<(usize, Value)>, AuditError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        parse_records(&data)
    }
}

/// Parse newline-terminated records; an unterminated tail is ignored.
fn parse_records(data: &str) -> Result<Vec<(usize, Value)>, AuditError> {
    let complete = match data.rfind('\n') {
        Some(end) => &data[..=end],
        None => "",
    };
    let mut records = Vec::new();
    for (index, line) in complete.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| AuditError::MalformedRecord {
            line: index + 1,
            reason: e.to_string(),
        })?;
        records.push((index + 1, value));
    }
    Ok(records)
}

#[async_trait]
impl AuditLedger for FileAuditLedger {
    async fn append(&self, event: AuditEvent) -> Result<AuditEvent, AuditError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await?;

        let mut event = redact_event(event, &self.options);
        event.version = SCHEMA_VERSION;
        event.timestamp = now_timestamp();
        event.hash = None;
        event.prev_hash = None;
        let link = chain::compute_hash(&event, &state.last_hash)?;
        event.prev_hash = Some(link.prev_hash);
        event.hash = Some(link.hash.clone());

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        state.last_hash = link.hash;
        tracing::debug!(event_type = %event.event_type, session = %event.session_id, "audit event appended");
        Ok(event)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditError> {
        let records = self.read_records().await?;
        let mut events = Vec::new();
        for (line, record) in records.into_iter().rev() {
            if events.len() >= query.limit {
                break;
            }
            let event: AuditEvent =
                serde_json::from_value(record).map_err(|e| AuditError::MalformedRecord {
                    line,
                    reason: e.to_string(),
                })?;
            if query.matches(&event) {
                events.push(event);
            }
        }
        events.reverse();
        Ok(events)
    }

    async fn verify_hash_chain(&self) -> Result<ChainVerification, AuditError> {
        let records: Vec<Value> = self
            .read_records()
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        Ok(chain::verify_records(&records))
    }

    async fn export(&self, options: &ExportOptions) -> Result<String, AuditError> {
        let events = self.query(&AuditQuery::all()).await?;
        let events = apply_export_redaction(events, options.redaction);
        let rendered = match options.format {
            ExportFormat::Json => serde_json::to_string_pretty(&events)?,
            ExportFormat::Jsonl => {
                let lines = events
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?;
                lines.join("\n")
            }
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_records_skips_partial_tail() {
        let data = "{\"a\":1}\n\n{\"b\":2}\n{\"c\":";
        let records = parse_records(data).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].0, 3);
        assert!(parse_records("{\"partial\"").unwrap().is_empty());
    }

    #[test]
    fn malformed_complete_line_is_an_error() {
        let err = parse_records("{\"a\":1}\nnot json\n").unwrap_err();
        assert!(matches!(err, AuditError::MalformedRecord { line: 2, .. }));
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_ledger() {
        let dir = tempdir().unwrap();
        let ledger = FileAuditLedger::new(dir.path().join("none.jsonl"), RedactionOptions::default());
        assert!(ledger.query(&AuditQuery::all()).await.unwrap().is_empty());
        assert!(ledger.verify_hash_chain().await.unwrap().ok);
        assert_eq!(ledger.export(&ExportOptions::default()).await.unwrap(), "");
    }
}
