// chain.rs — Hash chain over audit events.
//
// hash(n) = SHA-256(hash(n-1) ++ canonical_json(event n without hash/prevHash))
//
// The first event links to the empty string. Changing, inserting, or
// removing any event breaks every link after it, and verification reports
// the first index where the stored chain disagrees with the recomputed one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::AuditEvent;
use crate::hasher;

/// Keys excluded from an event's hashed content.
const CHAIN_KEYS: &[&str] = &["hash", "prevHash"];

/// The two chain fields of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLink {
    pub hash: String,
    pub prev_hash: String,
}

/// Result of walking a chain. A broken chain is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Index of the first offending event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
}

impl ChainVerification {
    pub fn valid() -> Self {
        Self {
            ok: true,
            error: None,
            broken_at: None,
        }
    }

    fn broken(index: usize, error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
            broken_at: Some(index),
        }
    }
}

/// Compute the chain link for `event` following `prev_hash`.
pub fn compute_hash(event: &AuditEvent, prev_hash: &str) -> Result<HashLink, serde_json::Error> {
    let value = serde_json::to_value(event)?;
    Ok(compute_record_hash(&value, prev_hash))
}

/// Compute the chain link for a raw JSON record.
pub fn compute_record_hash(record: &Value, prev_hash: &str) -> HashLink {
    let content = match record {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for key in CHAIN_KEYS {
                stripped.remove(*key);
            }
            Value::Object(stripped)
        }
        other => other.clone(),
    };
    let mut input = String::from(prev_hash);
    input.push_str(&hasher::canonical_json(&content));
    HashLink {
        hash: hasher::hash_str(&input),
        prev_hash: prev_hash.to_string(),
    }
}

pub fn verify_hash_chain(events: &[AuditEvent]) -> ChainVerification {
    let mut records = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        match serde_json::to_value(event) {
            Ok(value) => records.push(value),
            Err(e) => {
                return ChainVerification::broken(
                    index,
                    format!("Event at index {index} cannot be serialized: {e}"),
                )
            }
        }
    }
    verify_records(&records)
}

/// Verify a chain of raw JSON records, exactly as stored.
pub fn verify_records(records: &[Value]) -> ChainVerification {
    let mut prev_hash = String::new();
    for (index, record) in records.iter().enumerate() {
        let link = compute_record_hash(record, &prev_hash);
        let stored_prev = record.get("prevHash").and_then(Value::as_str);
        if stored_prev != Some(link.prev_hash.as_str()) {
            let verification = ChainVerification::broken(
                index,
                format!(
                    "Hash chain break at index {index}: expected prevHash={}, found {}",
                    link.prev_hash,
                    stored_prev.unwrap_or("none")
                ),
            );
            tracing::warn!(index, "audit hash chain break");
            return verification;
        }
        let stored_hash = record.get("hash").and_then(Value::as_str);
        if stored_hash != Some(link.hash.as_str()) {
            tracing::warn!(index, "audit hash mismatch");
            return ChainVerification::broken(index, format!("Hash mismatch at index {index}"));
        }
        prev_hash = link.hash;
    }
    ChainVerification::valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditEventType, ToolContext};
    use serde_json::json;

    fn chained(count: usize) -> Vec<AuditEvent> {
        let mut prev = String::new();
        (0..count)
            .map(|i| {
                let mut event = AuditEvent::new(AuditEventType::ToolRequested, "s")
                    .with_tool(ToolContext::new("shell").with_args(json!({"n": i})));
                let link = compute_hash(&event, &prev).unwrap();
                event.prev_hash = Some(link.prev_hash);
                event.hash = Some(link.hash.clone());
                prev = link.hash;
                event
            })
            .collect()
    }

    #[test]
    fn hash_ignores_chain_fields() {
        let mut event = AuditEvent::new(AuditEventType::SessionStart, "s");
        let before = compute_hash(&event, "").unwrap();
        event.hash = Some("x".into());
        event.prev_hash = Some("y".into());
        assert_eq!(compute_hash(&event, "").unwrap(), before);
        assert_ne!(compute_hash(&event, "abc").unwrap().hash, before.hash);
    }

    #[test]
    fn valid_chain_verifies() {
        assert_eq!(verify_hash_chain(&chained(4)), ChainVerification::valid());
        assert!(verify_hash_chain(&[]).ok);
    }

    #[test]
    fn tampering_is_reported_at_the_mutated_index() {
        let mut events = chained(4);
        events[2].session_id = "forged".into();
        let result = verify_hash_chain(&events);
        assert!(!result.ok);
        assert_eq!(result.broken_at, Some(2));
        assert_eq!(result.error.as_deref(), Some("Hash mismatch at index 2"));
    }

    #[test]
    fn removed_event_breaks_the_next_link() {
        let mut events = chained(4);
        events.remove(1);
        let result = verify_hash_chain(&events);
        assert_eq!(result.broken_at, Some(1));
        assert!(result.error.unwrap().starts_with("Hash chain break at index 1"));
    }
}
