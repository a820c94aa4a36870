//! # ga-cli
//!
//! Command-line interface for Governed Autonomy.
//!
//! Lets an operator see what the review gate would decide and inspect the
//! tamper-evident audit ledger:
//! - `ga classify` — profile a command or tool call and show its review level
//! - `ga audit tail/verify/export` — inspect the audit ledger
//! - `ga config show/validate` — inspect `.ga/safety.toml`

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ga_policy::SafetyContext;

/// Governed Autonomy CLI — review levels and audit trail for agent actions.
#[derive(Parser)]
#[command(name = "ga", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Safety config file (defaults to <project-root>/.ga/safety.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the review level for a shell command or tool call.
    Classify(commands::classify::ClassifyArgs),
    /// Inspect the audit ledger.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Inspect the safety configuration.
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ga_cli=info".parse()?)
                .add_directive("ga_audit=info".parse()?)
                .add_directive("ga_policy=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config_path = cli
        .config
        .unwrap_or_else(|| project_root.join(ga_policy::config::CONFIG_FILE));

    // `config validate` reports load errors itself.
    if let Commands::Config { command } = &cli.command {
        return commands::config::execute(command, &project_root, &config_path);
    }

    let ctx = SafetyContext::load_from(&project_root, &config_path)
        .with_context(|| format!("failed to load safety config {}", config_path.display()))?;

    match &cli.command {
        Commands::Classify(args) => commands::classify::execute(args, &ctx).await,
        Commands::Audit { command } => commands::audit::execute(command, &ctx).await,
        Commands::Config { .. } => Ok(()),
    }
}
