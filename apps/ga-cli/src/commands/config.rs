// config.rs — Config subcommands: show, validate.

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;

use ga_policy::{SafetyContext, SecurityConfig};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved safety configuration.
    Show,
    /// Check the safety config for errors.
    Validate,
}

pub fn execute(
    cmd: &ConfigCommands,
    project_root: &Path,
    config_path: &Path,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let ctx = SafetyContext::load_from(project_root, config_path)
                .with_context(|| format!("failed to load safety config {}", config_path.display()))?;
            print!("{}", describe(&ctx));
        }
        ConfigCommands::Validate => match SafetyContext::load_from(project_root, config_path) {
            Ok(_) if config_path.exists() => {
                println!("{}: OK", config_path.display());
            }
            Ok(_) => {
                println!(
                    "No config at {}; built-in defaults are valid.",
                    config_path.display()
                );
            }
            Err(e) => {
                println!("{}: {}", config_path.display(), e);
                anyhow::bail!("Safety config is invalid");
            }
        },
    }
    Ok(())
}

fn describe(ctx: &SafetyContext) -> String {
    let config = ctx.config();
    let source = if ctx.config_path().exists() {
        ctx.config_path().display().to_string()
    } else {
        format!("{} (not found, using defaults)", ctx.config_path().display())
    };
    let pin = if config.security.approval_pin.is_some() {
        "set"
    } else {
        "default"
    };

    let mut out = String::new();
    out.push_str(&format!("Config:           {}\n", source));
    out.push_str(&format!("Project root:     {}\n", ctx.project_root().display()));
    out.push_str(&format!("Profile:          {}\n", ctx.security_profile()));
    out.push_str(&format!("Approval PIN:     {}\n", pin));
    out.push_str("Workspace roots:\n");
    for root in ctx.workspace().roots() {
        out.push_str(&format!("  {}\n", root.display()));
    }
    out.push_str("Critical paths:\n");
    for path in ctx.critical_paths() {
        out.push_str(&format!("  {}\n", path.display()));
    }
    out.push_str("Trusted domains:\n");
    if ctx.trusted_domains().is_empty() {
        out.push_str("  (none)\n");
    }
    for domain in ctx.trusted_domains() {
        out.push_str(&format!("  {}\n", domain));
    }
    out.push_str(&format!("Audit log:        {}\n", ctx.audit_log_path().display()));
    out.push_str(&format!(
        "Typed UI text:    {}\n",
        if config.audit.redact_ui_typed_text {
            "redacted"
        } else {
            "stored"
        }
    ));
    out
}
