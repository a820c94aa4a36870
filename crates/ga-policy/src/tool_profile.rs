// tool_profile.rs — ActionProfiles for structured (non-shell) tool calls.
//
// Structured tools carry typed arguments, so there is nothing to parse: the
// profile follows directly from the tool name and a few well-known argument
// keys. Tools this module does not know are `{unknown}` with low confidence.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::builder::{normalize_provenance, summarize, ActionProfileBuilder};
use crate::profile::{ActionProfile, OperationClass, ParseConfidence, Provenance};

pub const EDIT_TOOL: &str = "edit_file";
pub const SMART_EDIT_TOOL: &str = "smart_edit_file";
pub const WRITE_FILE_TOOL: &str = "write_file";
pub const FILE_OPS_TOOL: &str = "file_operations";
pub const PROCESS_MANAGER_TOOL: &str = "manage_processes";
pub const WEB_FETCH_TOOL: &str = "web_fetch";
pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const REPL_TOOL: &str = "execute_repl";

/// Read-only file tools; their `path`/`file_path`/`paths` arguments are touched.
const READ_FILE_TOOLS: &[&str] = &["read_file", "read_many_files", "list_files", "glob_files", "grep_search"];

const UI_MUTATING_TOOLS: &[&str] = &[
    "ui.click",
    "ui.type",
    "ui.key",
    "ui.scroll",
    "ui.focus",
    "ui.click_xy",
];

const UI_READ_TOOLS: &[&str] = &[
    "ui.health",
    "ui.capabilities",
    "ui.snapshot",
    "ui.query",
    "ui.describe",
    "ui.wait",
    "ui.assert",
];

const PROCESS_READ_OPERATIONS: &[&str] = &["list", "status", "read", "summarize"];

/// REPL snippets longer than this (in chars) are not reviewed as "understood".
const REPL_CODE_LIMIT: usize = 200;
const REPL_LINE_LIMIT: usize = 3;

/// Host the web search tool contacts.
const SEARCH_HOST: &str = "google.com";

/// A structured tool call proposed for execution.
#[derive(Debug, Clone)]
pub struct ToolActionRequest {
    pub tool_name: String,
    pub args: Value,
    /// Directory relative tool paths resolve against.
    pub cwd: PathBuf,
    /// Where the call came from. Empty means `[unknown]`.
    pub provenance: Vec<Provenance>,
}

impl ToolActionRequest {
    pub fn new(tool_name: impl Into<String>, args: Value, cwd: impl Into<PathBuf>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            cwd: cwd.into(),
            provenance: Vec::new(),
        }
    }

    pub fn with_provenance(mut self, provenance: impl IntoIterator<Item = Provenance>) -> Self {
        self.provenance = provenance.into_iter().collect();
        self
    }
}

#[derive(Default)]
struct ToolEffects {
    operations: BTreeSet<OperationClass>,
    touched: Vec<PathBuf>,
    mutated: Vec<PathBuf>,
    network_targets: Vec<String>,
    unbounded: bool,
    low_confidence: bool,
    summary: Option<String>,
}

impl ToolEffects {
    fn op(&mut self, op: OperationClass) {
        self.operations.insert(op);
    }

    fn touch(&mut self, path: Option<PathBuf>) -> Option<PathBuf> {
        match path {
            Some(path) => {
                if !self.touched.contains(&path) {
                    self.touched.push(path.clone());
                }
                Some(path)
            }
            None => {
                self.low_confidence = true;
                None
            }
        }
    }

    fn mutate(&mut self, path: Option<PathBuf>) -> Option<PathBuf> {
        let path = self.touch(path)?;
        if !self.mutated.contains(&path) {
            self.mutated.push(path.clone());
        }
        Some(path)
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

impl ActionProfileBuilder {
    /// Build the profile of a structured tool call.
    pub fn build_tool_action_profile(&self, request: &ToolActionRequest) -> ActionProfile {
        let tool = request.tool_name.as_str();
        let args = &request.args;
        let cwd = request.cwd.as_path();
        let resolve = |key: &str| self.resolve_tool_path(str_arg(args, key), cwd);

        let mut fx = ToolEffects::default();
        match tool {
            EDIT_TOOL | SMART_EDIT_TOOL | WRITE_FILE_TOOL => {
                fx.op(OperationClass::Write);
                fx.mutate(resolve("file_path"));
                fx.summary = Some(format!("{} {}", tool, str_arg(args, "file_path").unwrap_or("")));
            }
            FILE_OPS_TOOL => {
                let operation = str_arg(args, "operation").unwrap_or("unknown");
                fx.summary = Some(format!("{}:{}", tool, operation));
                match operation {
                    "delete" => {
                        fx.op(OperationClass::Delete);
                        if let Some(path) = fx.mutate(resolve("path")) {
                            fx.unbounded = self.is_protected_tree(&path);
                        }
                    }
                    "move" => {
                        fx.op(OperationClass::Write);
                        fx.op(OperationClass::Delete);
                        fx.mutate(resolve("from"));
                        fx.mutate(resolve("to"));
                    }
                    "copy" => {
                        fx.op(OperationClass::Write);
                        fx.touch(resolve("from"));
                        fx.mutate(resolve("to"));
                    }
                    "mkdir" => {
                        fx.op(OperationClass::Write);
                        fx.touch(resolve("path"));
                    }
                    "list_tree" => {
                        fx.op(OperationClass::Read);
                        fx.touch(resolve("path"));
                    }
                    _ => {
                        fx.op(OperationClass::Unknown);
                        fx.low_confidence = true;
                    }
                }
            }
            PROCESS_MANAGER_TOOL => {
                let operation = str_arg(args, "operation");
                match operation {
                    Some(op) if PROCESS_READ_OPERATIONS.contains(&op) => fx.op(OperationClass::Read),
                    Some(_) => fx.op(OperationClass::Process),
                    None => {
                        fx.op(OperationClass::Unknown);
                        fx.low_confidence = true;
                    }
                }
                fx.summary = Some(format!("{}:{}", tool, operation.unwrap_or("unknown")));
            }
            WEB_FETCH_TOOL => {
                fx.op(OperationClass::Network);
                let url = str_arg(args, "url").unwrap_or("");
                if let Some(host) = url_host(url) {
                    fx.network_targets.push(host);
                }
                fx.summary = Some(format!("{} {}", tool, url));
            }
            WEB_SEARCH_TOOL => {
                fx.op(OperationClass::Network);
                fx.network_targets.push(SEARCH_HOST.to_string());
                fx.summary = Some(format!("{} {}", tool, str_arg(args, "query").unwrap_or("")));
            }
            REPL_TOOL => {
                fx.op(OperationClass::Process);
                let language = str_arg(args, "language").unwrap_or("unknown");
                if language == "shell" {
                    fx.op(OperationClass::Unknown);
                }
                let code = str_arg(args, "code").unwrap_or("");
                if code.chars().count() > REPL_CODE_LIMIT || code.lines().count() > REPL_LINE_LIMIT {
                    fx.low_confidence = true;
                }
                fx.summary = Some(format!("{}:{}", tool, language));
            }
            _ if READ_FILE_TOOLS.contains(&tool) => {
                fx.op(OperationClass::Read);
                for key in ["file_path", "path", "dir_path"] {
                    if args.get(key).is_some() {
                        fx.touch(resolve(key));
                    }
                }
                if let Some(paths) = args.get("paths").and_then(Value::as_array) {
                    for path in paths {
                        fx.touch(self.resolve_tool_path(path.as_str(), cwd));
                    }
                }
            }
            _ if UI_MUTATING_TOOLS.contains(&tool) => fx.op(OperationClass::Ui),
            _ if UI_READ_TOOLS.contains(&tool) => fx.op(OperationClass::Read),
            _ => {
                fx.op(OperationClass::Unknown);
                fx.low_confidence = true;
            }
        }

        if fx.operations.is_empty() {
            fx.op(OperationClass::Unknown);
        }
        let workspace = &self.workspace;
        let outside_workspace = fx.touched.iter().any(|p| !workspace.contains(p));

        let provenance = normalize_provenance(&request.provenance, Provenance::Unknown);

        ActionProfile {
            tool_name: tool.to_string(),
            operations: fx.operations,
            roots: vec![tool.to_string()],
            touched_paths: fx.touched.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
            mutated_paths: fx.mutated.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
            network_targets: fx.network_targets,
            outside_workspace,
            uses_privilege: false,
            has_unbounded_scope_signals: fx.unbounded,
            parse_confidence: if fx.low_confidence {
                ParseConfidence::Low
            } else {
                ParseConfidence::High
            },
            provenance,
            raw_summary: summarize(fx.summary.as_deref().unwrap_or(tool)),
        }
    }

    fn resolve_tool_path(&self, value: Option<&str>, cwd: &Path) -> Option<PathBuf> {
        let trimmed = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.resolve(trimmed, Some(cwd))
    }
}

/// Lowercased host of an absolute URL.
pub(crate) fn url_host(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    let host = if let Some(v6) = authority.strip_prefix('[') {
        v6.split(']').next().unwrap_or(v6)
    } else {
        authority.split(':').next().unwrap_or(authority)
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}
