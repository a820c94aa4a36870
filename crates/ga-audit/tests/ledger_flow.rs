// ledger_flow.rs — File-backed ledger behavior across appends, restarts,
// tampering, and concurrent writers.

use std::sync::Arc;

use ga_audit::{
    AuditError, AuditEvent, AuditEventType, AuditLedger, AuditQuery, ExportFormat, ExportOptions,
    FileAuditLedger, LedgerHandle, RedactionLevel, RedactionOptions, ToolContext, ToolResult,
};
use ga_policy::{Provenance, ReviewLevel, ReviewResult};
use serde_json::{json, Value};
use tempfile::tempdir;

fn requested(tool: &str, args: Value) -> AuditEvent {
    AuditEvent::new(AuditEventType::ToolRequested, "session-1")
        .with_provenance([Provenance::ModelSuggestion])
        .with_tool(ToolContext::new(tool).with_args(args))
}

#[tokio::test]
async fn appended_events_chain_and_read_back() {
    let dir = tempdir().unwrap();
    let ledger = FileAuditLedger::new(dir.path().join("logs/audit.jsonl"), RedactionOptions::default());

    let first = ledger.append(requested("shell", json!({"command": "ls"}))).await.unwrap();
    let second = ledger
        .append(AuditEvent::new(AuditEventType::SessionEnd, "session-1"))
        .await
        .unwrap();

    assert_eq!(first.prev_hash.as_deref(), Some(""));
    assert_eq!(second.prev_hash, first.hash);
    assert_eq!(first.version, 1);

    let events = ledger.query(&AuditQuery::default()).await.unwrap();
    assert_eq!(events, vec![first, second]);
    assert!(ledger.verify_hash_chain().await.unwrap().ok);
}

#[tokio::test]
async fn reopened_ledger_continues_the_chain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let last = {
        let ledger = FileAuditLedger::new(&path, RedactionOptions::default());
        ledger.append(requested("shell", json!({}))).await.unwrap()
    };

    let reopened = FileAuditLedger::new(&path, RedactionOptions::default());
    let next = reopened.append(requested("shell", json!({}))).await.unwrap();
    assert_eq!(next.prev_hash, last.hash);
    assert!(reopened.verify_hash_chain().await.unwrap().ok);
}

#[tokio::test]
async fn tampering_on_disk_is_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let ledger = FileAuditLedger::new(&path, RedactionOptions::default());
    for i in 0..3 {
        ledger
            .append(requested("shell", json!({"command": format!("echo {i}")})))
            .await
            .unwrap();
    }

    let data = std::fs::read_to_string(&path).unwrap();
    let tampered = data.replacen("echo 1", "echo X", 1);
    assert_ne!(data, tampered);
    std::fs::write(&path, tampered).unwrap();

    let result = ledger.verify_hash_chain().await.unwrap();
    assert!(!result.ok);
    assert_eq!(result.broken_at, Some(1));
    assert_eq!(result.error.as_deref(), Some("Hash mismatch at index 1"));
}

#[tokio::test]
async fn secrets_are_redacted_before_hashing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let ledger = FileAuditLedger::new(&path, RedactionOptions::default());
    let stored = ledger
        .append(requested(
            "web_fetch",
            json!({"url": "https://api.example.com", "api_key": "sk-live-0123456789"}),
        ))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("sk-live-0123456789"));
    assert_eq!(stored.tool.unwrap().args.unwrap()["api_key"], "sk***");
    assert_eq!(stored.redactions.len(), 1);
    assert!(ledger.verify_hash_chain().await.unwrap().ok);
}

#[tokio::test]
async fn query_filters_and_limits() {
    let dir = tempdir().unwrap();
    let ledger = FileAuditLedger::new(dir.path().join("audit.jsonl"), RedactionOptions::default());
    let review = ReviewResult {
        level: ReviewLevel::B,
        reasons: vec!["Write operation detected".into()],
        requires_click: true,
        requires_pin: false,
    };
    for i in 0..5 {
        let tool = if i % 2 == 0 { "shell" } else { "edit_file" };
        ledger
            .append(requested(tool, json!({"n": i})).with_review(&review))
            .await
            .unwrap();
    }
    ledger
        .append(
            AuditEvent::new(AuditEventType::ToolExecutionFinished, "session-1")
                .with_tool(ToolContext::new("shell").with_result(ToolResult::success().with_exit_code(0))),
        )
        .await
        .unwrap();

    let shells = ledger
        .query(&AuditQuery::default().tool_name("shell"))
        .await
        .unwrap();
    assert_eq!(shells.len(), 4);

    let latest_two = ledger
        .query(&AuditQuery::default().with_limit(2).event_types([AuditEventType::ToolRequested]))
        .await
        .unwrap();
    assert_eq!(latest_two.len(), 2);
    assert_eq!(latest_two[0].tool.as_ref().unwrap().args.as_ref().unwrap()["n"], 3);
    assert_eq!(latest_two[1].tool.as_ref().unwrap().args.as_ref().unwrap()["n"], 4);
    assert_eq!(latest_two[1].review_level, Some(ReviewLevel::B));

    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    assert!(ledger
        .query(&AuditQuery::all().since(future))
        .await
        .unwrap()
        .is_empty());

    // Queries do not change the ledger.
    let again = ledger.query(&AuditQuery::all()).await.unwrap();
    assert_eq!(again, ledger.query(&AuditQuery::all()).await.unwrap());
}

#[tokio::test]
async fn export_formats_and_redaction() {
    let dir = tempdir().unwrap();
    let ledger = FileAuditLedger::new(dir.path().join("audit.jsonl"), RedactionOptions::default());
    ledger.append(requested("shell", json!({"command": "ls"}))).await.unwrap();
    ledger.append(requested("shell", json!({"command": "pwd"}))).await.unwrap();

    let jsonl = ledger
        .export(&ExportOptions {
            format: ExportFormat::Jsonl,
            redaction: RedactionLevel::Debug,
        })
        .await
        .unwrap();
    assert_eq!(jsonl.lines().count(), 2);
    assert!(jsonl.contains("pwd"));

    let json = ledger
        .export(&ExportOptions {
            format: ExportFormat::Json,
            redaction: RedactionLevel::Enterprise,
        })
        .await
        .unwrap();
    let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 2);
    assert!(parsed[0]["tool"].get("args").is_none());
    assert!(!json.contains("pwd"));
}

#[tokio::test]
async fn torn_tail_is_ignored_by_readers_and_blocks_writers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    {
        let ledger = FileAuditLedger::new(&path, RedactionOptions::default());
        ledger.append(requested("shell", json!({}))).await.unwrap();
    }
    let mut data = std::fs::read_to_string(&path).unwrap();
    data.push_str("{\"version\":1,\"eventType\":\"tool.req");
    std::fs::write(&path, data).unwrap();

    let ledger = FileAuditLedger::new(&path, RedactionOptions::default());
    assert_eq!(ledger.query(&AuditQuery::all()).await.unwrap().len(), 1);
    assert!(ledger.verify_hash_chain().await.unwrap().ok);
    let err = ledger.append(requested("shell", json!({}))).await.unwrap_err();
    assert!(matches!(err, AuditError::TornWrite { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_a_single_chain() {
    let dir = tempdir().unwrap();
    let ledger: LedgerHandle = Arc::new(FileAuditLedger::new(
        dir.path().join("audit.jsonl"),
        RedactionOptions::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..32 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.append(requested("shell", json!({"n": i}))).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let events = ledger.query(&AuditQuery::all()).await.unwrap();
    assert_eq!(events.len(), 32);
    assert!(ledger.verify_hash_chain().await.unwrap().ok);
}
