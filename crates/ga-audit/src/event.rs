// event.rs — Audit event data model.
//
// One event per line in the ledger, camelCase keys. Events are linked by
// `prevHash`/`hash` (see chain.rs); both are filled in by the ledger at
// append time, never by callers.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use ga_policy::{Provenance, ReviewLevel, ReviewResult};

/// Schema version written into every event.
pub const SCHEMA_VERSION: u32 = 1;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "tool.requested")]
    ToolRequested,
    #[serde(rename = "tool.awaiting_approval")]
    ToolAwaitingApproval,
    #[serde(rename = "tool.approved")]
    ToolApproved,
    #[serde(rename = "tool.denied")]
    ToolDenied,
    #[serde(rename = "tool.execution_started")]
    ToolExecutionStarted,
    #[serde(rename = "tool.execution_finished")]
    ToolExecutionFinished,
    #[serde(rename = "tool.execution_failed")]
    ToolExecutionFailed,
    #[serde(rename = "session.start")]
    SessionStart,
    #[serde(rename = "session.end")]
    SessionEnd,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::ToolRequested => "tool.requested",
            AuditEventType::ToolAwaitingApproval => "tool.awaiting_approval",
            AuditEventType::ToolApproved => "tool.approved",
            AuditEventType::ToolDenied => "tool.denied",
            AuditEventType::ToolExecutionStarted => "tool.execution_started",
            AuditEventType::ToolExecutionFinished => "tool.execution_finished",
            AuditEventType::ToolExecutionFailed => "tool.execution_failed",
            AuditEventType::SessionStart => "session.start",
            AuditEventType::SessionEnd => "session.end",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    User,
    Policy,
    Model,
    System,
}

/// Who caused the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Actor {
    pub fn new(kind: ActorKind) -> Self {
        Self { kind, id: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionStrategy {
    Drop,
    Mask,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionReason {
    Secret,
    Pii,
    UiTypedText,
    FileContent,
    LargePayload,
    Unknown,
}

/// Records that a value at `path` was altered before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionHint {
    /// Dotted location inside the event, e.g. `tool.args.headers.authorization`.
    pub path: String,
    pub strategy: RedactionStrategy,
    pub reason: RedactionReason,
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error_type: None,
            exit_code: None,
            output_bytes: None,
            metadata: None,
        }
    }

    pub fn failure(error_type: impl Into<String>) -> Self {
        Self {
            success: false,
            error_type: Some(error_type.into()),
            ..Self::success()
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_output_bytes(mut self, bytes: u64) -> Self {
        self.output_bytes = Some(bytes);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The tool call an event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolContext {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

impl ToolContext {
    /// A context with a fresh random call id.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            tool_kind: None,
            args: None,
            result: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.tool_kind = Some(kind.into());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_result(mut self, result: ToolResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// A single audit event: one line in the JSONL ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub version: u32,
    pub event_type: AuditEventType,
    /// RFC 3339, UTC, millisecond precision. Restamped by the ledger.
    pub timestamp: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_level: Option<ReviewLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<RedactionHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, session_id: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            event_type,
            timestamp: now_timestamp(),
            session_id: session_id.into(),
            trace_id: None,
            provenance: Vec::new(),
            review_level: None,
            actor: None,
            redactions: Vec::new(),
            tool: None,
            metadata: None,
            prev_hash: None,
            hash: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_provenance(mut self, provenance: impl IntoIterator<Item = Provenance>) -> Self {
        self.provenance = provenance.into_iter().collect();
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_tool(mut self, tool: ToolContext) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Record a review decision: the level, plus reasons and click/PIN
    /// requirements under `metadata`.
    pub fn with_review(mut self, review: &ReviewResult) -> Self {
        self.review_level = Some(review.level);
        let mut metadata = match self.metadata.take() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
            None => Map::new(),
        };
        metadata.insert("reasons".to_string(), Value::from(review.reasons.clone()));
        metadata.insert("requiresClick".to_string(), Value::Bool(review.requires_click));
        metadata.insert("requiresPin".to_string(), Value::Bool(review.requires_pin));
        self.metadata = Some(Value::Object(metadata));
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_ref().map(|t| t.tool_name.as_str())
    }
}

/// Current time in the ledger's timestamp format.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case_and_dotted_types() {
        let event = AuditEvent::new(AuditEventType::ToolRequested, "sess-1")
            .with_provenance([Provenance::ModelSuggestion])
            .with_tool(ToolContext::new("shell").with_call_id("c1").with_args(json!({"command": "ls"})));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "tool.requested");
        assert_eq!(value["sessionId"], "sess-1");
        assert_eq!(value["provenance"], json!(["model_suggestion"]));
        assert_eq!(value["tool"]["toolName"], "shell");
        assert_eq!(value["tool"]["callId"], "c1");
        assert!(value.get("hash").is_none());
        assert!(value.get("redactions").is_none());
    }

    #[test]
    fn review_lands_in_level_and_metadata() {
        let review = ReviewResult {
            level: ReviewLevel::B,
            reasons: vec!["Delete operation detected".into()],
            requires_click: true,
            requires_pin: false,
        };
        let event = AuditEvent::new(AuditEventType::ToolAwaitingApproval, "s")
            .with_metadata(json!({"cwd": "/work"}))
            .with_review(&review);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["reviewLevel"], "B");
        assert_eq!(value["metadata"]["cwd"], "/work");
        assert_eq!(value["metadata"]["requiresClick"], true);
        assert_eq!(value["metadata"]["reasons"][0], "Delete operation detected");
    }

    #[test]
    fn timestamps_are_utc_millis() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
