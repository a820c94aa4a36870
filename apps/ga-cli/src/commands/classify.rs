// classify.rs — `ga classify`: what would the review gate decide?

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use serde_json::json;

use ga_audit::{
    Actor, ActorKind, AuditEvent, AuditEventType, AuditLedger, FileAuditLedger, RedactionOptions,
    ToolContext,
};
use ga_policy::{
    paths, ActionProfile, ActionProfileBuilder, FilesystemPaths, GitOracle, NoGit, Provenance,
    ReviewLevel, ReviewLevelGate, ReviewTrace, SafetyContext, SecurityConfig, ShellActionRequest,
    ToolActionRequest, TrackedFiles,
};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Shell command to classify (put it after `--` if it starts with `-`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required_unless_present = "tool")]
    command: Vec<String>,

    /// Classify a structured tool call instead of a shell command.
    #[arg(long, conflicts_with = "command")]
    tool: Option<String>,

    /// JSON arguments for `--tool`.
    #[arg(long, requires = "tool")]
    args: Option<String>,

    /// Directory the action would run in (defaults to the first workspace root).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Where the action came from; repeatable.
    #[arg(long = "provenance")]
    provenance: Vec<Provenance>,

    /// Print the profile and full evaluation trace as JSON.
    #[arg(long)]
    json: bool,

    /// Append a `tool.requested` event with the decision to the audit ledger.
    #[arg(long)]
    record: bool,

    /// Session id for `--record` (random if omitted).
    #[arg(long)]
    session: Option<String>,
}

#[derive(Serialize)]
struct Classification<'a> {
    profile: &'a ActionProfile,
    review: &'a ReviewTrace,
}

pub async fn execute(args: &ClassifyArgs, ctx: &SafetyContext) -> anyhow::Result<()> {
    let cwd = resolve_cwd(args.cwd.as_deref(), ctx);
    let builder = ActionProfileBuilder::from_config(ctx);

    let (profile, tool_args) = match &args.tool {
        Some(tool) => {
            let raw = args.args.as_deref().unwrap_or("{}");
            let tool_args: serde_json::Value =
                serde_json::from_str(raw).context("--args must be a JSON object")?;
            let request = ToolActionRequest::new(tool.clone(), tool_args.clone(), cwd.clone())
                .with_provenance(args.provenance.iter().copied());
            (builder.build_tool_action_profile(&request), tool_args)
        }
        None => {
            let command = args.command.join(" ");
            let request = ShellActionRequest::new(command.clone(), cwd.clone())
                .with_provenance(args.provenance.iter().copied());
            let tool_args = json!({"command": command, "cwd": cwd});
            (builder.build_shell_action_profile(&request), tool_args)
        }
    };

    let git = git_oracle(ctx.target_dir());
    let trace = ReviewLevelGate::new(ctx)
        .with_git_oracle(git.as_ref())
        .with_path_resolver(&FilesystemPaths)
        .evaluate_with_trace(&profile);

    if args.json {
        let output = Classification {
            profile: &profile,
            review: &trace,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", render(&profile, &trace));
    }

    if args.record {
        let session = args
            .session
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ledger = FileAuditLedger::new(
            ctx.audit_log_path(),
            RedactionOptions {
                redact_ui_typed_text: ctx.config().audit.redact_ui_typed_text,
            },
        );
        let tool_kind = if args.tool.is_some() { "tool" } else { "shell" };
        let event = AuditEvent::new(AuditEventType::ToolRequested, session)
            .with_provenance(profile.provenance.iter().copied())
            .with_actor(Actor::new(ActorKind::Policy).with_id("ga-cli"))
            .with_tool(
                ToolContext::new(profile.tool_name.clone())
                    .with_kind(tool_kind)
                    .with_args(tool_args),
            )
            .with_review(&trace.result);
        let stored = ledger.append(event).await?;
        tracing::info!(
            path = %ledger.path().display(),
            session = %stored.session_id,
            "recorded classification"
        );
        if !args.json {
            println!("Recorded {} in {}", stored.event_type, ledger.path().display());
        }
    }

    Ok(())
}

/// Relative `--cwd` values resolve against the first workspace root.
fn resolve_cwd(cwd: Option<&Path>, ctx: &SafetyContext) -> PathBuf {
    let base = ctx.target_dir();
    match cwd {
        Some(dir) if dir.is_absolute() => paths::normalize(dir),
        Some(dir) => paths::normalize(&base.join(dir)),
        None => base.to_path_buf(),
    }
}

/// Snapshot tracked files when the project is a git repository.
fn git_oracle(repo_root: &Path) -> Box<dyn GitOracle> {
    match TrackedFiles::snapshot(repo_root) {
        Ok(tracked) => Box::new(tracked),
        Err(e) => {
            tracing::debug!(error = %e, "no git snapshot, treating all files as untracked");
            Box::new(NoGit)
        }
    }
}

fn render(profile: &ActionProfile, trace: &ReviewTrace) -> String {
    let result = &trace.result;
    let requirement = match result.level {
        ReviewLevel::A => "no review needed",
        ReviewLevel::B => "click required",
        ReviewLevel::C => "click and PIN required",
    };
    let mut out = String::new();
    out.push_str(&format!("Action:      {}\n", profile.raw_summary));
    out.push_str(&format!("Level:       {} ({})\n", result.level, requirement));
    out.push_str(&format!(
        "Operations:  {}\n",
        profile
            .operations
            .iter()
            .map(|op| op.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out.push_str(&format!("Confidence:  {}\n", profile.parse_confidence));
    if let (Some(domain), Some(outcome), Some(intention)) =
        (trace.domain, trace.outcome, trace.intention)
    {
        out.push_str(&format!("Domain:      {}\n", domain));
        out.push_str(&format!("Outcome:     {}\n", outcome));
        out.push_str(&format!("Intention:   {}\n", intention));
    }
    out.push_str("Reasons:\n");
    for reason in &result.reasons {
        out.push_str(&format!("  - {}\n", reason));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ga_policy::SafetyConfig;

    fn context() -> SafetyContext {
        SafetyContext::new(
            Path::new("/work/app"),
            SafetyConfig::default(),
            Some(PathBuf::from("/home/dev")),
        )
        .unwrap()
    }

    #[test]
    fn relative_cwd_resolves_against_workspace() {
        let ctx = context();
        assert_eq!(resolve_cwd(None, &ctx), PathBuf::from("/work/app"));
        assert_eq!(
            resolve_cwd(Some(Path::new("src/../tests")), &ctx),
            PathBuf::from("/work/app/tests")
        );
        assert_eq!(resolve_cwd(Some(Path::new("/tmp")), &ctx), PathBuf::from("/tmp"));
    }

    #[test]
    fn render_lists_level_and_reasons() {
        let ctx = context();
        let profile = ActionProfileBuilder::from_config(&ctx)
            .build_shell_action_profile(&ShellActionRequest::new("rm -rf /", "/work/app"));
        let trace = ReviewLevelGate::new(&ctx).evaluate_with_trace(&profile);
        let text = render(&profile, &trace);
        assert!(text.contains("Level:       C (click and PIN required)"));
        assert!(text.contains("Domain:      system"));
        assert!(text.contains("unbounded scope"));
    }
}
