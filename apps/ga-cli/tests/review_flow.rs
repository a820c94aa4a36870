// review_flow.rs — Profile, review, and record an action against a real git checkout.

use std::path::Path;
use std::process::Command;

use ga_audit::{
    Actor, ActorKind, AuditEvent, AuditEventType, AuditLedger, AuditQuery, FileAuditLedger,
    RedactionOptions, ToolContext,
};
use ga_policy::{
    ActionProfileBuilder, Outcome, ReviewLevel, ReviewLevelGate, SafetyContext, SecurityConfig,
    ShellActionRequest, TrackedFiles,
};
use serde_json::json;
use tempfile::tempdir;

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn tracked_deletes_are_reversible_and_recorded() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    if !git(&root, &["init", "-q"]) {
        eprintln!("git unavailable, skipping");
        return;
    }
    std::fs::write(root.join("tracked.txt"), "keep me").unwrap();
    std::fs::write(root.join("scratch.txt"), "throwaway").unwrap();
    assert!(git(&root, &["add", "tracked.txt"]));

    let ctx = SafetyContext::load(&root).unwrap();
    let tracked = TrackedFiles::snapshot(ctx.target_dir()).unwrap();
    assert_eq!(tracked.len(), 1);

    let builder = ActionProfileBuilder::from_config(&ctx);
    let gate = ReviewLevelGate::new(&ctx).with_git_oracle(&tracked);

    let tracked_rm = builder.build_shell_action_profile(&ShellActionRequest::new("rm tracked.txt", &root));
    let trace = gate.evaluate_with_trace(&tracked_rm);
    assert_eq!(trace.outcome, Some(Outcome::Reversible));
    assert_eq!(trace.result.level, ReviewLevel::B);

    let scratch_rm = builder.build_shell_action_profile(&ShellActionRequest::new("rm scratch.txt", &root));
    let scratch = gate.evaluate_with_trace(&scratch_rm);
    assert_eq!(scratch.outcome, Some(Outcome::Irreversible));

    let ledger = FileAuditLedger::new(ctx.audit_log_path(), RedactionOptions::default());
    let stored = ledger
        .append(
            AuditEvent::new(AuditEventType::ToolRequested, "session-e2e")
                .with_actor(Actor::new(ActorKind::Policy))
                .with_tool(
                    ToolContext::new(tracked_rm.tool_name.clone())
                        .with_kind("shell")
                        .with_args(json!({"command": "rm tracked.txt"})),
                )
                .with_review(&trace.result),
        )
        .await
        .unwrap();

    assert!(ctx.audit_log_path().starts_with(root.join(".ga")));
    assert_eq!(stored.review_level, Some(ReviewLevel::B));
    let events = ledger.query(&AuditQuery::all()).await.unwrap();
    assert_eq!(events, vec![stored]);
    assert!(ledger.verify_hash_chain().await.unwrap().ok);
}
