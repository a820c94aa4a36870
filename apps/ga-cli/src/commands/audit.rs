// audit.rs — Audit subcommands: tail, verify, export.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Subcommand;

use ga_audit::{
    AuditEvent, AuditLedger, AuditQuery, ExportFormat, ExportOptions, FileAuditLedger,
    RedactionLevel, RedactionOptions,
};
use ga_policy::SafetyContext;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show recent audit events.
    Tail {
        /// Path to audit log (defaults to the `[audit] log` setting).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
        /// Only events whose tool name matches this glob (e.g. `ui.*`).
        #[arg(long)]
        tool: Option<String>,
        /// Only events at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to the `[audit] log` setting).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Export the audit log with export-time redaction applied.
    Export {
        /// Path to audit log (defaults to the `[audit] log` setting).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Output format: jsonl or json (defaults to `[audit] export_format`).
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Redaction level: enterprise or debug (defaults to `[audit] export_redaction`).
        #[arg(long)]
        redaction: Option<RedactionLevel>,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

pub async fn execute(cmd: &AuditCommands, ctx: &SafetyContext) -> anyhow::Result<()> {
    let options = RedactionOptions {
        redact_ui_typed_text: ctx.config().audit.redact_ui_typed_text,
    };
    let open = |log: &Option<PathBuf>| {
        let path = log.clone().unwrap_or_else(|| ctx.audit_log_path());
        FileAuditLedger::new(path, options)
    };

    match cmd {
        AuditCommands::Tail { log, n, tool, since } => {
            let ledger = open(log);
            if !ledger.path().exists() {
                println!("No audit log found at {}", ledger.path().display());
                return Ok(());
            }

            let pattern = tool
                .as_deref()
                .map(glob::Pattern::new)
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --tool pattern: {}", e))?;
            let mut query = AuditQuery::all();
            if let Some(since) = since {
                query = query.since(*since);
            }

            let events: Vec<AuditEvent> = ledger
                .query(&query)
                .await?
                .into_iter()
                .filter(|e| match &pattern {
                    Some(p) => e.tool_name().is_some_and(|name| p.matches(name)),
                    None => true,
                })
                .collect();
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];

            if recent.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!(
                "{:<26} {:<26} {:<6} TOOL",
                "TIMESTAMP", "EVENT", "LEVEL"
            );
            println!("{}", "-".repeat(80));
            for event in recent {
                println!("{}", format_row(event));
            }
        }

        AuditCommands::Verify { log } => {
            let ledger = open(log);
            if !ledger.path().exists() {
                println!("No audit log found at {}", ledger.path().display());
                return Ok(());
            }

            let result = ledger.verify_hash_chain().await?;
            if result.ok {
                let events = ledger.query(&AuditQuery::all()).await?;
                println!(
                    "Audit log verified: {} event(s), hash chain intact.",
                    events.len()
                );
            } else {
                println!(
                    "INTEGRITY VIOLATION at event {}:",
                    result
                        .broken_at
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
                if let Some(error) = &result.error {
                    println!("  {}", error);
                }
                println!();
                println!("The audit log may have been tampered with.");
                anyhow::bail!("Audit log integrity check failed");
            }
        }

        AuditCommands::Export {
            log,
            format,
            redaction,
            output,
        } => {
            let ledger = open(log);
            let audit = &ctx.config().audit;
            let options = ExportOptions {
                format: format.unwrap_or(audit.export_format),
                redaction: redaction.unwrap_or(audit.export_redaction),
            };
            let data = ledger.export(&options).await?;
            match output {
                Some(path) => {
                    std::fs::write(path, &data)?;
                    tracing::info!(path = %path.display(), "audit log exported");
                    println!("Exported audit log to {}", path.display());
                }
                None => print!("{}", data),
            }
        }
    }

    Ok(())
}

fn format_row(event: &AuditEvent) -> String {
    let timestamp = DateTime::parse_from_rfc3339(&event.timestamp)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| event.timestamp.clone());
    format!(
        "{:<26} {:<26} {:<6} {}",
        timestamp,
        event.event_type.as_str(),
        event
            .review_level
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| "-".to_string()),
        event.tool_name().unwrap_or("-"),
    )
}
