// config.rs — Security configuration for the review gate.
//
// Two layers:
//   - `SafetyConfig` is the raw, serde-backed `.ga/safety.toml` file.
//   - `SafetyContext` is the validated, resolved form (home expanded,
//     workspace roots canonicalized) built once at startup. It implements the
//     narrow `SecurityConfig` trait that classifiers and the gate consume.
//
// Example `.ga/safety.toml`:
//
//   [security]
//   profile = "balanced"
//   trusted_domains = ["github.com", "*.crates.io"]
//   approval_pin = "482910"
//
//   [workspace]
//   roots = [".", "../shared-lib"]
//
//   [audit]
//   log = ".ga/audit.jsonl"

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;
use crate::workspace::Workspace;

/// Default config location relative to the project root.
pub const CONFIG_FILE: &str = ".ga/safety.toml";

/// PIN used when the config does not set one.
pub const DEFAULT_APPROVAL_PIN: &str = "000000";

const DEFAULT_CRITICAL_PATHS: &[&str] = &[
    "/", "/etc", "/usr", "/bin", "/sbin", "/var", "/boot", "/dev", "/sys", "~/.ssh", "~/.aws",
    "~/.gnupg", "~/.config",
];

/// How aggressively the risk engine asks for review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProfile {
    Strict,
    #[default]
    Balanced,
    Permissive,
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityProfile::Strict => "strict",
            SecurityProfile::Balanced => "balanced",
            SecurityProfile::Permissive => "permissive",
        };
        f.write_str(name)
    }
}

/// On-disk format of an audit export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Jsonl,
    Json,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jsonl" => Ok(ExportFormat::Jsonl),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{}' (expected jsonl or json)", other)),
        }
    }
}

/// How much stored detail an audit export keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionLevel {
    /// Drop tool arguments, result metadata, and event metadata payloads.
    #[default]
    Enterprise,
    /// Keep everything that was stored.
    Debug,
}

impl FromStr for RedactionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enterprise" => Ok(RedactionLevel::Enterprise),
            "debug" => Ok(RedactionLevel::Debug),
            other => Err(format!(
                "unknown redaction level '{}' (expected enterprise or debug)",
                other
            )),
        }
    }
}

/// The narrow view of configuration the review gate depends on.
pub trait SecurityConfig: Send + Sync {
    fn security_profile(&self) -> SecurityProfile;

    /// Hostnames (or `*.suffix` patterns) treated as trusted network targets.
    fn trusted_domains(&self) -> &[String];

    /// Absolute paths; touching one of them (or anything below) is a
    /// system-domain action.
    fn critical_paths(&self) -> &[PathBuf];

    fn workspace(&self) -> &Workspace;

    /// Directory relative tool paths resolve against.
    fn target_dir(&self) -> &Path;

    fn approval_pin(&self) -> &str;

    fn home_dir(&self) -> Option<&Path>;
}

/// Top-level `.ga/safety.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default)]
    pub profile: SecurityProfile,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    /// Absolute or `~/`-prefixed paths.
    #[serde(default = "default_critical_paths")]
    pub critical_paths: Vec<String>,
    /// Six-digit PIN required for level C approvals.
    #[serde(default)]
    pub approval_pin: Option<String>,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            profile: SecurityProfile::default(),
            trusted_domains: Vec::new(),
            critical_paths: default_critical_paths(),
            approval_pin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    /// Workspace roots; relative entries resolve against the project root.
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            roots: default_roots(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSection {
    /// Ledger file; relative paths resolve against the project root.
    #[serde(default = "default_audit_log")]
    pub log: PathBuf,
    /// Mask text typed by UI automation tools before it is stored.
    #[serde(default = "default_true")]
    pub redact_ui_typed_text: bool,
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default)]
    pub export_redaction: RedactionLevel,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            log: default_audit_log(),
            redact_ui_typed_text: true,
            export_format: ExportFormat::default(),
            export_redaction: RedactionLevel::default(),
        }
    }
}

// Serde default functions
fn default_critical_paths() -> Vec<String> {
    DEFAULT_CRITICAL_PATHS.iter().map(|p| p.to_string()).collect()
}

fn default_roots() -> Vec<String> {
    vec![".".to_string()]
}

fn default_audit_log() -> PathBuf {
    PathBuf::from(".ga/audit.jsonl")
}

fn default_true() -> bool {
    true
}

impl SafetyConfig {
    /// Load config from a TOML file.
    ///
    /// Returns the default config if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no safety config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load config from the standard location under `project_root`.
    pub fn load_from_project(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load(&project_root.join(CONFIG_FILE))
    }

    /// Check every field that can be checked without touching the filesystem.
    pub fn validate(&self, home_dir: Option<&Path>) -> Result<(), ConfigError> {
        if let Some(pin) = &self.security.approval_pin {
            if pin.len() != 6 || !pin.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::InvalidPin);
            }
        }
        for raw in &self.security.critical_paths {
            if raw.starts_with('~') {
                if !(raw == "~" || raw.starts_with("~/")) {
                    return Err(ConfigError::InvalidCriticalPath { path: raw.clone() });
                }
                if home_dir.is_none() {
                    return Err(ConfigError::HomeDirUnavailable { path: raw.clone() });
                }
            } else if !raw.starts_with('/') {
                return Err(ConfigError::InvalidCriticalPath { path: raw.clone() });
            }
        }
        for domain in &self.security.trusted_domains {
            if !is_valid_domain_pattern(domain) {
                return Err(ConfigError::InvalidTrustedDomain {
                    domain: domain.clone(),
                });
            }
        }
        if self.workspace.roots.iter().all(|r| r.trim().is_empty()) {
            return Err(ConfigError::NoWorkspaceRoots);
        }
        Ok(())
    }
}

/// `example.com` or `*.example.com`: dot-separated labels of letters,
/// digits, and inner hyphens.
fn is_valid_domain_pattern(domain: &str) -> bool {
    let host = domain.strip_prefix("*.").unwrap_or(domain);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

/// Validated, resolved security configuration for one project.
#[derive(Debug, Clone)]
pub struct SafetyContext {
    project_root: PathBuf,
    config_path: PathBuf,
    config: SafetyConfig,
    home_dir: Option<PathBuf>,
    workspace: Workspace,
    critical_paths: Vec<PathBuf>,
    trusted_domains: Vec<String>,
    approval_pin: String,
}

impl SafetyContext {
    /// Load and validate `.ga/safety.toml` under `project_root`.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(project_root, &project_root.join(CONFIG_FILE))
    }

    /// Load and validate a config file at an explicit location.
    pub fn load_from(project_root: &Path, config_path: &Path) -> Result<Self, ConfigError> {
        let config = SafetyConfig::load(config_path)?;
        let mut ctx = Self::new(project_root, config, dirs::home_dir())?;
        ctx.config_path = config_path.to_path_buf();
        Ok(ctx)
    }

    /// Build a context from an already-loaded config.
    pub fn new(
        project_root: &Path,
        config: SafetyConfig,
        home_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        config.validate(home_dir.as_deref())?;
        let home = home_dir.as_deref();
        let project_root = canonical_or_normalized(project_root);

        let mut roots = Vec::new();
        for raw in config.workspace.roots.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
            let resolved = paths::resolve(raw, &project_root, home).ok_or_else(|| {
                ConfigError::HomeDirUnavailable {
                    path: raw.to_string(),
                }
            })?;
            roots.push(canonical_or_normalized(&resolved));
        }

        let critical_paths = config
            .security
            .critical_paths
            .iter()
            .map(|raw| {
                paths::resolve(raw, Path::new("/"), home).ok_or_else(|| {
                    ConfigError::HomeDirUnavailable { path: raw.clone() }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let trusted_domains = config
            .security
            .trusted_domains
            .iter()
            .map(|d| d.to_ascii_lowercase())
            .collect();
        let approval_pin = config
            .security
            .approval_pin
            .clone()
            .unwrap_or_else(|| DEFAULT_APPROVAL_PIN.to_string());

        tracing::debug!(
            project_root = %project_root.display(),
            roots = roots.len(),
            profile = %config.security.profile,
            "safety context ready"
        );

        Ok(Self {
            config_path: project_root.join(CONFIG_FILE),
            project_root,
            workspace: Workspace::new(roots),
            critical_paths,
            trusted_domains,
            approval_pin,
            home_dir,
            config,
        })
    }

    /// Re-read the config file this context was loaded from.
    ///
    /// On error the current context is left unchanged.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let config = SafetyConfig::load(&self.config_path)?;
        let mut fresh = Self::new(&self.project_root, config, self.home_dir.clone())?;
        fresh.config_path = std::mem::take(&mut self.config_path);
        *self = fresh;
        tracing::info!(path = %self.config_path.display(), "safety config reloaded");
        Ok(())
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Absolute path of the audit ledger file.
    pub fn audit_log_path(&self) -> PathBuf {
        let log = &self.config.audit.log;
        if log.is_absolute() {
            log.clone()
        } else {
            paths::normalize(&self.project_root.join(log))
        }
    }
}

impl SecurityConfig for SafetyContext {
    fn security_profile(&self) -> SecurityProfile {
        self.config.security.profile
    }

    fn trusted_domains(&self) -> &[String] {
        &self.trusted_domains
    }

    fn critical_paths(&self) -> &[PathBuf] {
        &self.critical_paths
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn target_dir(&self) -> &Path {
        self.workspace
            .roots()
            .first()
            .map(PathBuf::as_path)
            .unwrap_or(&self.project_root)
    }

    fn approval_pin(&self) -> &str {
        &self.approval_pin
    }

    fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }
}

/// Resolve symlinks for paths that exist; keep the lexical form otherwise.
fn canonical_or_normalized(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| paths::normalize(path))
}
