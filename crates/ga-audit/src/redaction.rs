// redaction.rs — Keeps secrets and bulk content out of the ledger.
//
// Write-time redaction runs before an event is hashed, so the chain covers
// exactly what was stored. Export-time redaction runs on copies handed to
// someone else and never touches the ledger file.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use ga_policy::RedactionLevel;

use crate::event::{AuditEvent, RedactionHint, RedactionReason, RedactionStrategy};
use crate::hasher;

/// Strings longer than this (in bytes) are stored as their hash.
pub const MAX_STORED_STRING: usize = 4 * 1024;

static SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)token|secret|password|api[-_]?key|bearer\s+").expect("invalid secret regex")
});

/// Keys whose values are always masked, after lowercasing and `-` → `_`.
const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "cookie",
    "password",
    "token",
    "secret",
    "api_key",
    "private_key",
];

/// Keys holding raw file contents.
const CONTENT_KEYS: &[&str] = &["content", "new_string", "old_string"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionOptions {
    /// Mask `tool.args.text` (text typed by UI automation).
    pub redact_ui_typed_text: bool,
}

impl Default for RedactionOptions {
    fn default() -> Self {
        Self {
            redact_ui_typed_text: true,
        }
    }
}

/// Mask a secret: long values keep their first two characters.
pub fn mask(value: &str) -> String {
    if value.chars().count() > 8 {
        let prefix: String = value.chars().take(2).collect();
        format!("{prefix}***")
    } else {
        "***".to_string()
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEYS.contains(&key.as_str()) || key.contains("account_id")
}

/// Redact tool arguments and results before storage, recording a hint for
/// every value changed.
pub fn redact_event(mut event: AuditEvent, options: &RedactionOptions) -> AuditEvent {
    let mut hints = Vec::new();
    if let Some(tool) = event.tool.as_mut() {
        if let Some(args) = tool.args.take() {
            tool.args = Some(redact_value(args, "tool.args", None, options, &mut hints));
        }
        if let Some(mut result) = tool.result.take() {
            if let Some(metadata) = result.metadata.take() {
                result.metadata = Some(redact_value(
                    metadata,
                    "tool.result.metadata",
                    None,
                    options,
                    &mut hints,
                ));
            }
            if let Some(error_type) = result.error_type.take() {
                let redacted = redact_string(
                    error_type,
                    "tool.result.errorType",
                    None,
                    options,
                    &mut hints,
                );
                result.error_type = Some(redacted);
            }
            tool.result = Some(result);
        }
    }
    if !hints.is_empty() {
        tracing::debug!(count = hints.len(), "redacted audit event fields");
        event.redactions.extend(hints);
    }
    event
}

fn redact_value(
    value: Value,
    path: &str,
    key: Option<&str>,
    options: &RedactionOptions,
    hints: &mut Vec<RedactionHint>,
) -> Value {
    if key.is_some_and(is_sensitive_key) && !value.is_null() {
        if let Value::String(s) = &value {
            hints.push(hint(path, RedactionStrategy::Mask, RedactionReason::Secret));
            return Value::String(mask(s));
        }
        hints.push(hint(path, RedactionStrategy::Mask, RedactionReason::Secret));
        return Value::String("***".to_string());
    }
    match value {
        Value::String(s) => Value::String(redact_string(s, path, key, options, hints)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| redact_value(item, &format!("{path}[{i}]"), None, options, hints))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let nested_path = format!("{path}.{k}");
                    let nested = redact_value(v, &nested_path, Some(k.as_str()), options, hints);
                    (k, nested)
                })
                .collect(),
        ),
        scalar => scalar,
    }
}

fn redact_string(
    value: String,
    path: &str,
    key: Option<&str>,
    options: &RedactionOptions,
    hints: &mut Vec<RedactionHint>,
) -> String {
    if options.redact_ui_typed_text && path == "tool.args.text" {
        hints.push(hint(path, RedactionStrategy::Mask, RedactionReason::UiTypedText));
        return mask(&value);
    }
    if key.is_some_and(|k| CONTENT_KEYS.contains(&k)) {
        hints.push(hint(path, RedactionStrategy::Hash, RedactionReason::FileContent));
        return format!("sha256:{}", hasher::hash_str(&value));
    }
    if SECRET_PATTERN.is_match(&value) {
        hints.push(hint(path, RedactionStrategy::Mask, RedactionReason::Secret));
        return mask(&value);
    }
    if value.len() > MAX_STORED_STRING {
        hints.push(hint(path, RedactionStrategy::Hash, RedactionReason::LargePayload));
        return format!("sha256:{}", hasher::hash_str(&value));
    }
    value
}

fn hint(path: &str, strategy: RedactionStrategy, reason: RedactionReason) -> RedactionHint {
    RedactionHint {
        path: path.to_string(),
        strategy,
        reason,
    }
}

/// Redact events for export. `Enterprise` drops tool arguments, result
/// metadata, and event metadata; `Debug` returns the events as stored.
pub fn apply_export_redaction(events: Vec<AuditEvent>, level: RedactionLevel) -> Vec<AuditEvent> {
    match level {
        RedactionLevel::Debug => events,
        RedactionLevel::Enterprise => events
            .into_iter()
            .map(|mut event| {
                if let Some(tool) = event.tool.as_mut() {
                    tool.args = None;
                    if let Some(result) = tool.result.as_mut() {
                        result.metadata = None;
                    }
                }
                event.metadata = None;
                event
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditEventType, ToolContext, ToolResult};
    use serde_json::json;

    fn event_with_args(args: Value) -> AuditEvent {
        AuditEvent::new(AuditEventType::ToolRequested, "s")
            .with_tool(ToolContext::new("web_fetch").with_args(args))
    }

    fn args(event: &AuditEvent) -> &Value {
        event.tool.as_ref().unwrap().args.as_ref().unwrap()
    }

    #[test]
    fn mask_keeps_two_chars_of_long_values() {
        assert_eq!(mask("sk-1234567890"), "sk***");
        assert_eq!(mask("short"), "***");
        assert_eq!(mask("12345678"), "***");
    }

    #[test]
    fn sensitive_keys_and_secret_values_are_masked() {
        let event = event_with_args(json!({
            "url": "https://example.com",
            "headers": {"Authorization": "Bearer abcdefghijk", "X-Account-Id": 1234},
            "note": "my password is hunter2",
        }));
        let redacted = redact_event(event, &RedactionOptions::default());
        let args = args(&redacted);
        assert_eq!(args["url"], "https://example.com");
        assert_eq!(args["headers"]["Authorization"], "Be***");
        assert_eq!(args["headers"]["X-Account-Id"], "***");
        assert_eq!(args["note"], "my***");
        assert_eq!(redacted.redactions.len(), 3);
        assert!(redacted
            .redactions
            .iter()
            .any(|h| h.path == "tool.args.headers.Authorization"));
    }

    #[test]
    fn file_contents_and_large_strings_are_hashed() {
        let big = "x".repeat(MAX_STORED_STRING + 1);
        let event = event_with_args(json!({
            "file_path": "src/lib.rs",
            "new_string": "fn main() {}",
            "blob": big,
        }));
        let redacted = redact_event(event, &RedactionOptions::default());
        let args = args(&redacted);
        assert_eq!(args["file_path"], "src/lib.rs");
        assert_eq!(
            args["new_string"],
            format!("sha256:{}", hasher::hash_str("fn main() {}"))
        );
        assert!(args["blob"].as_str().unwrap().starts_with("sha256:"));
        assert!(redacted
            .redactions
            .iter()
            .any(|h| h.reason == RedactionReason::LargePayload));
    }

    #[test]
    fn ui_typed_text_is_optional() {
        let event = event_with_args(json!({"text": "hello world"}));
        let masked = redact_event(event.clone(), &RedactionOptions::default());
        assert_eq!(args(&masked)["text"], "he***");
        let kept = redact_event(
            event,
            &RedactionOptions {
                redact_ui_typed_text: false,
            },
        );
        assert_eq!(args(&kept)["text"], "hello world");
        assert!(kept.redactions.is_empty());
    }

    #[test]
    fn export_levels() {
        let mut event = event_with_args(json!({"command": "ls"}))
            .with_metadata(json!({"reasons": []}));
        if let Some(tool) = event.tool.as_mut() {
            tool.result = Some(ToolResult::success().with_metadata(json!({"stdout": "a"})));
        }
        let debug = apply_export_redaction(vec![event.clone()], RedactionLevel::Debug);
        assert_eq!(debug[0], event);

        let enterprise = apply_export_redaction(vec![event], RedactionLevel::Enterprise);
        let tool = enterprise[0].tool.as_ref().unwrap();
        assert!(tool.args.is_none());
        assert!(tool.result.as_ref().unwrap().metadata.is_none());
        assert!(tool.result.as_ref().unwrap().success);
        assert!(enterprise[0].metadata.is_none());
    }
}
