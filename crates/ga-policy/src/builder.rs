// builder.rs — Turns a proposed shell command into an ActionProfile.
//
// The builder never fails. Anything it cannot parse becomes a low-confidence
// `{unknown}` profile, which the review gate escalates to the strictest
// level. Anything it can parse but not fully analyze (substitutions, loops,
// variable paths) becomes medium confidence.
//
// Everything the builder needs from the environment (workspace roots, the
// home directory) is handed to it up front, so building a profile is pure.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::commands;
use crate::config::SecurityConfig;
use crate::paths;
use crate::profile::{ActionProfile, OperationClass, ParseConfidence, Provenance};
use crate::shell::{self, Invocation, RedirectKind};
use crate::workspace::Workspace;

/// Longest command text kept in `raw_summary`.
const SUMMARY_LIMIT: usize = 200;

/// System directories whose appearance marks an action as reaching outside
/// the workspace, even when the builder cannot tell how they are used.
const SYSTEM_DIRS: &[&str] = &["/etc", "/var", "/usr", "/bin", "/sbin", "/home"];

/// Pseudo-devices that carry no risk to read or write.
const BENIGN_DEVICES: &[&str] = &[
    "/dev/null",
    "/dev/zero",
    "/dev/random",
    "/dev/urandom",
    "/dev/stdin",
    "/dev/stdout",
    "/dev/stderr",
    "/dev/tty",
];

/// Delete targets that wipe a whole tree no matter where they run.
const UNBOUNDED_TOKENS: &[&str] = &["/", "/*", "~", "~/", "~/*", "*", ".*", "./*"];

/// Glob components that match every entry of a directory.
const MATCH_ALL_GLOBS: &[&str] = &["*", ".*", "**", "*.*"];

const PACKAGE_MANAGERS: &[&str] = &[
    "npm", "yarn", "pnpm", "pip", "pip3", "pipx", "gem", "apt", "apt-get", "dnf", "yum", "apk",
    "pacman", "brew",
];

/// `/dev/...` at the start of a word, so `/home/dev/...` is not a device.
static DEVICE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s=<>'\x22(;|&:,])(/dev/[A-Za-z0-9_./\-]*)")
        .expect("invalid device path regex")
});

static URL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z][a-z0-9+.\-]*://(?:[^/\s@'\x22]*@)?(\[[0-9a-f:.]+\]|[a-z0-9.\-_]+)")
        .expect("invalid url regex")
});

/// `[user@]host:path` remote specs used by scp, rsync, and git.
static REMOTE_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[\w.\-]+@)?([A-Za-z0-9][A-Za-z0-9.\-]*):").expect("invalid scp remote regex")
});

/// A shell command proposed for execution.
#[derive(Debug, Clone)]
pub struct ShellActionRequest {
    pub command: String,
    /// Directory the command would run in. Must be absolute.
    pub cwd: PathBuf,
    /// Where the command came from. Empty means `[model_suggestion]`.
    pub provenance: Vec<Provenance>,
}

impl ShellActionRequest {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            provenance: Vec::new(),
        }
    }

    pub fn with_provenance(mut self, provenance: impl IntoIterator<Item = Provenance>) -> Self {
        self.provenance = provenance.into_iter().collect();
        self
    }
}

/// Builds [`ActionProfile`]s for shell commands and structured tool calls.
#[derive(Debug, Clone)]
pub struct ActionProfileBuilder {
    pub(crate) workspace: Workspace,
    pub(crate) home_dir: Option<PathBuf>,
}

impl ActionProfileBuilder {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            home_dir: None,
        }
    }

    /// Use `home` to expand `~`. Without it, `~` paths are unresolvable and
    /// count as outside the workspace.
    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn from_config(config: &dyn SecurityConfig) -> Self {
        Self {
            workspace: config.workspace().clone(),
            home_dir: config.home_dir().map(Path::to_path_buf),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Build the profile of a shell command.
    pub fn build_shell_action_profile(&self, request: &ShellActionRequest) -> ActionProfile {
        let provenance = normalize_provenance(&request.provenance, Provenance::ModelSuggestion);
        let summary = summarize(&request.command);
        let stripped = shell::strip_shell_wrapper(&request.command);

        if stripped.is_empty() {
            return ActionProfile::unparseable("shell", summary, provenance);
        }

        let parsed = match shell::parse(&stripped) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, command = %summary, "shell command not parseable, confidence is low");
                return ActionProfile::unparseable("shell", summary, provenance);
            }
        };

        let mut analysis = ShellAnalysis::new(self, &request.cwd);
        for invocation in &parsed.invocations {
            analysis.invocation(invocation);
        }
        for redirect in &parsed.bare_redirects {
            analysis.redirect(redirect.kind, &redirect.target);
        }
        let roots = parsed.roots();
        analysis
            .operations
            .extend(commands::scan_command_words(&stripped, &roots));
        if DEVICE_PATH
            .captures_iter(&stripped)
            .filter_map(|c| c.get(1))
            .any(|m| !is_benign_device(m.as_str()))
        {
            analysis.operations.insert(OperationClass::Device);
        }

        let mut operations = std::mem::take(&mut analysis.operations);
        if operations.is_empty() {
            operations.insert(OperationClass::Unknown);
        }

        let deletes = operations.contains(&OperationClass::Delete);
        let trimmed = stripped.trim_end();
        let unbounded = deletes
            && (analysis.unbounded || trimmed.ends_with(" /") || trimmed.ends_with(" ~"));

        let outside_workspace = analysis.outside_workspace(&parsed.invocations);
        let confidence = if parsed.uncertain || analysis.uncertain {
            ParseConfidence::Medium
        } else {
            ParseConfidence::High
        };

        let profile = ActionProfile {
            tool_name: "shell".to_string(),
            uses_privilege: operations.contains(&OperationClass::Privileged),
            operations,
            roots,
            touched_paths: to_strings(&analysis.touched),
            mutated_paths: to_strings(&analysis.mutated),
            network_targets: analysis.network_targets,
            outside_workspace,
            has_unbounded_scope_signals: unbounded,
            parse_confidence: confidence,
            provenance,
            raw_summary: summary,
        };
        tracing::debug!(
            roots = ?profile.roots,
            operations = ?profile.operations,
            confidence = %profile.parse_confidence,
            "built shell action profile"
        );
        profile
    }

    /// Resolve a path as written in a command, relative to `cwd`.
    pub(crate) fn resolve(&self, raw: &str, cwd: Option<&Path>) -> Option<PathBuf> {
        let home = self.home_dir.as_deref();
        if raw.starts_with('/') || raw.starts_with('~') {
            return paths::resolve(raw, Path::new("/"), home);
        }
        paths::resolve(raw, cwd?, home)
    }

    /// Whether deleting `raw` (resolved against `cwd`) would wipe the
    /// filesystem root, the home directory, a workspace root, or a directory
    /// containing one of those.
    pub(crate) fn is_unbounded_delete(&self, raw: &str, cwd: Option<&Path>) -> bool {
        if UNBOUNDED_TOKENS.contains(&raw) {
            return true;
        }
        let (base, glob) = split_glob(raw);
        if let Some(glob) = glob {
            if !MATCH_ALL_GLOBS.contains(&glob) {
                return false;
            }
        }
        let base = if base.is_empty() { "." } else { base };
        self.resolve(base, cwd)
            .is_some_and(|target| self.is_protected_tree(&target))
    }

    pub(crate) fn is_protected_tree(&self, target: &Path) -> bool {
        target == Path::new("/")
            || self
                .home_dir
                .as_deref()
                .is_some_and(|home| paths::is_within(home, target))
            || self.workspace.has_root_within(target)
    }
}

pub(crate) fn normalize_provenance(given: &[Provenance], default: Provenance) -> Vec<Provenance> {
    let mut out: Vec<Provenance> = Vec::new();
    for p in given {
        if !out.contains(p) {
            out.push(*p);
        }
    }
    if out.is_empty() {
        out.push(default);
    }
    out
}

pub(crate) fn summarize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SUMMARY_LIMIT {
        return trimmed.to_string();
    }
    let mut summary: String = trimmed.chars().take(SUMMARY_LIMIT).collect();
    summary.push_str("...");
    summary
}

fn to_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.to_string_lossy().into_owned()).collect()
}

fn is_benign_device(path: &str) -> bool {
    BENIGN_DEVICES.contains(&path) || path.starts_with("/dev/fd/")
}

/// Split a path at its first glob component: `src/*.rs` → (`src`, `*.rs`).
fn split_glob(raw: &str) -> (&str, Option<&str>) {
    let mut start = 0;
    for component in raw.split('/') {
        if component.contains(['*', '?', '[']) {
            let base = raw[..start].trim_end_matches('/');
            let base = if base.is_empty() && raw.starts_with('/') { "/" } else { base };
            return (base, Some(component));
        }
        start += component.len() + 1;
    }
    (raw, None)
}

/// Host part of `[user@]host[:port]`, lowercased.
fn host_of(target: &str) -> Option<String> {
    let target = target.rsplit('@').next().unwrap_or(target);
    let host = if let Some(rest) = target.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        target.split([':', '/']).next().unwrap_or(target)
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || host.starts_with('-') || host.starts_with('$') {
        return None;
    }
    Some(host)
}

/// Positional arguments, skipping options and the values of `with_value`
/// options. Everything after `--` is positional.
fn positionals<'a>(args: &'a [String], with_value: &[&str]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            out.extend(iter.map(String::as_str));
            break;
        }
        if arg.len() > 1 && arg.starts_with('-') {
            if with_value.contains(&arg.as_str()) {
                iter.next();
            }
            continue;
        }
        out.push(arg.as_str());
    }
    out
}

/// Value of an option given as `-o value`, `--output value`, or `--output=value`.
fn option_value<'a>(args: &'a [String], names: &[&str]) -> Option<&'a str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if names.contains(&arg.as_str()) {
            return iter.next().map(String::as_str);
        }
        for name in names.iter().filter(|n| n.starts_with("--")) {
            if let Some(value) = arg.strip_prefix(name).and_then(|v| v.strip_prefix('=')) {
                return Some(value);
            }
        }
    }
    None
}

/// Options of a search tool that take a separate value, and the options
/// that supply the pattern or program instead of the first positional.
fn search_options(name: &str) -> (&'static [&'static str], &'static [&'static str]) {
    const GREP: &[&str] = &[
        "-e", "-f", "-m", "-A", "-B", "-C", "-d", "-D", "--regexp", "--file", "--max-count",
        "--context", "--after-context", "--before-context",
    ];
    const RG: &[&str] = &[
        "-e", "-f", "-m", "-A", "-B", "-C", "-g", "-t", "-T", "-r", "-j", "-E", "-M", "--regexp",
        "--file", "--glob", "--type", "--type-not", "--replace", "--max-count",
    ];
    const AWK: &[&str] = &["-F", "-f", "-v", "--field-separator", "--file", "--assign"];
    const JQ: &[&str] = &["-f", "--from-file", "--indent"];
    match name {
        "rg" => (RG, &["-e", "-f", "--regexp", "--file"]),
        "awk" => (AWK, &["-f", "--file"]),
        "jq" => (JQ, &["-f", "--from-file"]),
        _ => (GREP, &["-e", "-f", "--regexp", "--file"]),
    }
}

fn has_flag(args: &[String], flags: &[&str]) -> bool {
    args.iter().any(|a| flags.contains(&a.as_str()))
}

/// Whether any short-option cluster (`-rn`) contains one of `letters`.
fn has_short_flag(args: &[String], letters: &[char]) -> bool {
    args.iter()
        .take_while(|a| *a != "--")
        .filter(|a| a.len() > 1 && a.starts_with('-') && !a.starts_with("--"))
        .any(|a| a[1..].contains(letters))
}

fn sed_in_place(args: &[String]) -> bool {
    args.iter()
        .any(|a| a == "--in-place" || a.starts_with("--in-place=") || a.starts_with("-i"))
}

/// Accumulates what a parsed command line touches.
struct ShellAnalysis<'b> {
    builder: &'b ActionProfileBuilder,
    cwd: Option<PathBuf>,
    operations: BTreeSet<OperationClass>,
    touched: Vec<PathBuf>,
    mutated: Vec<PathBuf>,
    network_targets: Vec<String>,
    unbounded: bool,
    uncertain: bool,
}

impl<'b> ShellAnalysis<'b> {
    fn new(builder: &'b ActionProfileBuilder, cwd: &Path) -> Self {
        Self {
            builder,
            cwd: cwd.is_absolute().then(|| paths::normalize(cwd)),
            operations: BTreeSet::new(),
            touched: Vec::new(),
            mutated: Vec::new(),
            network_targets: Vec::new(),
            unbounded: false,
            uncertain: false,
        }
    }

    fn resolve(&mut self, raw: &str) -> Option<PathBuf> {
        if raw == "-" || raw.contains("://") {
            return None;
        }
        if is_benign_device(raw) {
            return None;
        }
        let resolved = self.builder.resolve(raw, self.cwd.as_deref());
        if resolved.is_none() {
            self.uncertain = true;
        }
        resolved
    }

    fn touch(&mut self, raw: &str) {
        if let Some(path) = self.resolve(raw) {
            if !self.touched.contains(&path) {
                self.touched.push(path);
            }
        }
    }

    fn mutate(&mut self, raw: &str) {
        if let Some(path) = self.resolve(raw) {
            if !self.touched.contains(&path) {
                self.touched.push(path.clone());
            }
            if !self.mutated.contains(&path) {
                self.mutated.push(path);
            }
        }
    }

    fn delete(&mut self, raw: &str) {
        if self.builder.is_unbounded_delete(raw, self.cwd.as_deref()) {
            self.unbounded = true;
        }
        self.mutate(raw);
    }

    fn target(&mut self, raw: &str) {
        if let Some(host) = host_of(raw) {
            if !self.network_targets.contains(&host) {
                self.network_targets.push(host);
            }
        }
    }

    fn redirect(&mut self, kind: RedirectKind, target: &str) {
        if is_benign_device(target) {
            return;
        }
        match kind {
            RedirectKind::Truncate => {
                self.operations.insert(OperationClass::Write);
                self.mutate(target);
            }
            RedirectKind::Append => {
                self.operations.insert(OperationClass::Write);
                self.touch(target);
            }
            RedirectKind::Read => self.touch(target),
        }
    }

    fn change_dir(&mut self, target: Option<&str>) {
        self.cwd = match target {
            None => self.builder.home_dir.clone(),
            Some("-") => None,
            Some(raw) => self.resolve(raw),
        };
        match self.cwd.clone() {
            Some(dir) => {
                if !self.touched.contains(&dir) {
                    self.touched.push(dir);
                }
            }
            None => self.uncertain = true,
        }
    }

    fn touch_cwd(&mut self) {
        self.touch(".");
    }

    fn invocation(&mut self, inv: &Invocation) {
        let name = inv.name.as_str();
        let args = inv.args.as_slice();

        let known = match name {
            "git" => {
                self.operations.extend(commands::git_operations(args));
                true
            }
            _ => match commands::operations_for(name) {
                Some(ops) => {
                    self.operations.extend(ops.iter().copied());
                    true
                }
                None => false,
            },
        };

        self.paths(name, args);
        self.network(name, args, known);

        for redirect in &inv.redirects {
            self.redirect(redirect.kind, &redirect.target);
        }
    }

    fn paths(&mut self, name: &str, args: &[String]) {
        match name {
            "cd" | "pushd" => self.change_dir(positionals(args, &[]).first().copied()),
            "ls" | "du" | "tree" => {
                let files = positionals(args, &["-d", "--max-depth", "-L", "-I", "-I"]);
                if files.is_empty() {
                    self.touch_cwd();
                }
                files.into_iter().for_each(|f| self.touch(f));
            }
            "cat" | "less" | "more" | "head" | "tail" | "wc" | "stat" | "file" | "diff" | "cmp"
            | "uniq" | "cut" | "strings" | "xxd" | "hexdump" | "od" | "nl" | "tac" | "md5sum"
            | "sha1sum" | "sha256sum" | "realpath" | "readlink" => {
                let with_value = ["-n", "-c", "-d", "-f", "-t", "-N", "-j", "-l", "-s"];
                positionals(args, &with_value)
                    .into_iter()
                    .for_each(|f| self.touch(f));
            }
            "sort" => {
                positionals(args, &["-k", "-t", "-o", "-S", "-T"])
                    .into_iter()
                    .for_each(|f| self.touch(f));
                if let Some(out) = option_value(args, &["-o", "--output"]) {
                    self.operations.insert(OperationClass::Write);
                    self.mutate(out);
                }
            }
            "grep" | "egrep" | "fgrep" | "rg" | "awk" | "jq" => {
                let (with_value, pattern_sources) = search_options(name);
                let explicit_pattern = has_flag(args, pattern_sources);
                let files = positionals(args, with_value);
                let skip = usize::from(!explicit_pattern && !files.is_empty());
                let files = &files[skip..];
                let recursive = name == "rg"
                    || has_flag(args, &["--recursive"])
                    || (name != "awk" && name != "jq" && has_short_flag(args, &['r', 'R']));
                if files.is_empty() && recursive {
                    self.touch_cwd();
                }
                files.iter().for_each(|f| self.touch(f));
            }
            "sed" => {
                let in_place = sed_in_place(args);
                if in_place {
                    self.operations.insert(OperationClass::Write);
                }
                let explicit_script = has_flag(args, &["-e", "-f", "--expression", "--file"]);
                let files = positionals(args, &["-e", "-f", "--expression", "--file"]);
                let skip = usize::from(!explicit_script && !files.is_empty());
                for file in &files[skip..] {
                    if in_place {
                        self.mutate(file);
                    } else {
                        self.touch(file);
                    }
                }
            }
            "find" => {
                let starts: Vec<&str> = args
                    .iter()
                    .map(String::as_str)
                    .take_while(|a| !a.starts_with('-') && *a != "(" && *a != "!")
                    .collect();
                let starts = if starts.is_empty() { vec!["."] } else { starts };
                if has_flag(args, &["-delete"]) {
                    self.operations.insert(OperationClass::Delete);
                    starts.into_iter().for_each(|s| self.delete(s));
                } else {
                    starts.into_iter().for_each(|s| self.touch(s));
                }
            }
            "cp" | "install" | "ln" | "rsync" | "scp" => {
                let with_value = ["-t", "-e", "-m", "-o", "-g", "-S", "-P", "-i", "-F", "-l"];
                let local: Vec<&str> = positionals(args, &with_value)
                    .into_iter()
                    .filter(|a| !REMOTE_SPEC.is_match(a))
                    .collect();
                let explicit_dest = option_value(args, &["-t", "--target-directory"]);
                let (sources, dest) = match explicit_dest {
                    Some(dest) => (local.as_slice(), Some(dest)),
                    None => match local.split_last() {
                        Some((dest, sources)) if !sources.is_empty() || name == "ln" => {
                            (sources, Some(*dest))
                        }
                        _ => (local.as_slice(), None),
                    },
                };
                sources.iter().for_each(|s| self.touch(s));
                if let Some(dest) = dest {
                    if name == "rsync" && has_flag(args, &["--delete", "--delete-after", "--delete-before"]) {
                        self.operations.insert(OperationClass::Delete);
                        self.delete(dest);
                    } else {
                        self.mutate(dest);
                    }
                }
            }
            "mv" => positionals(args, &["-t", "-S"])
                .into_iter()
                .for_each(|f| self.mutate(f)),
            "rm" | "rmdir" | "unlink" | "shred" => positionals(args, &["-n", "-s"])
                .into_iter()
                .for_each(|f| self.delete(f)),
            "touch" | "mkdir" => positionals(args, &["-m", "-d", "-r", "-t"])
                .into_iter()
                .for_each(|f| self.touch(f)),
            "chmod" | "chown" | "chgrp" => {
                let files = positionals(args, &[]);
                let skip = usize::from(
                    !args.iter().any(|a| a.starts_with("--reference")) && !files.is_empty(),
                );
                files[skip..].iter().for_each(|f| self.touch(f));
            }
            "tee" => {
                let append = has_flag(args, &["-a", "--append"]);
                for file in positionals(args, &[]) {
                    if append {
                        self.touch(file);
                    } else {
                        self.mutate(file);
                    }
                }
            }
            "truncate" => positionals(args, &["-s", "-r", "--size", "--reference"])
                .into_iter()
                .for_each(|f| self.mutate(f)),
            "dd" => {
                for arg in args {
                    if let Some(input) = arg.strip_prefix("if=") {
                        self.touch(input);
                    } else if let Some(output) = arg.strip_prefix("of=") {
                        self.mutate(output);
                    }
                }
            }
            "fdisk" | "parted" | "wipefs" | "mkswap" => positionals(args, &[])
                .into_iter()
                .for_each(|f| self.mutate(f)),
            _ if name == "mkfs" || name.starts_with("mkfs.") => {
                positionals(args, &["-t", "-L", "-b", "-N"])
                    .into_iter()
                    .for_each(|f| self.mutate(f))
            }
            "mount" | "umount" | "losetup" => positionals(args, &["-t", "-o"])
                .into_iter()
                .for_each(|f| self.touch(f)),
            "curl" => {
                if let Some(out) = option_value(args, &["-o", "--output"]) {
                    self.operations.insert(OperationClass::Write);
                    self.mutate(out);
                }
                if let Some(upload) = option_value(args, &["-T", "--upload-file"]) {
                    self.touch(upload);
                }
            }
            "wget" => {
                if let Some(out) = option_value(args, &["-O", "--output-document"]) {
                    self.operations.insert(OperationClass::Write);
                    self.mutate(out);
                }
                if let Some(dir) = option_value(args, &["-P", "--directory-prefix"]) {
                    self.operations.insert(OperationClass::Write);
                    self.touch(dir);
                }
            }
            "tar" => self.tar(args),
            "zip" => {
                let files = positionals(args, &["-x", "-i"]);
                if let Some((archive, rest)) = files.split_first() {
                    self.mutate(archive);
                    rest.iter().for_each(|f| self.touch(f));
                }
            }
            "unzip" => {
                if let Some(archive) = positionals(args, &["-d", "-x"]).first() {
                    self.touch(archive);
                }
                match option_value(args, &["-d"]) {
                    Some(dest) => self.touch(dest),
                    None => self.touch_cwd(),
                }
            }
            "gzip" | "gunzip" => positionals(args, &["-S"])
                .into_iter()
                .for_each(|f| self.mutate(f)),
            "patch" => {
                if let Some(input) = option_value(args, &["-i", "--input"]) {
                    self.touch(input);
                }
                positionals(args, &["-i", "-p", "-d", "-o"])
                    .into_iter()
                    .for_each(|f| self.mutate(f));
            }
            "git" => self.git_paths(args),
            _ if PACKAGE_MANAGERS.contains(&name) => self.touch_cwd(),
            _ => {}
        }
    }

    fn tar(&mut self, args: &[String]) {
        let Some(mode) = args.first() else { return };
        let flags = mode.trim_start_matches('-');
        let creating = flags.contains('c') || flags.contains('r') || flags.contains('u');
        let extracting = flags.contains('x');
        let mut rest = args[1..].iter().map(String::as_str);
        let archive = if flags.ends_with('f') {
            rest.next()
        } else {
            option_value(args, &["-f", "--file"])
        };
        let others: Vec<&str> = rest.filter(|a| !a.starts_with('-')).collect();
        if let Some(archive) = archive {
            if creating {
                self.mutate(archive);
            } else {
                self.touch(archive);
            }
        }
        if extracting {
            match option_value(args, &["-C", "--directory"]) {
                Some(dir) => self.touch(dir),
                None => self.touch_cwd(),
            }
        } else {
            others.into_iter().for_each(|f| self.touch(f));
        }
    }

    fn git_paths(&mut self, args: &[String]) {
        let Some((sub, rest)) = commands::git_subcommand(args) else {
            return;
        };
        match sub {
            "rm" | "mv" => positionals(rest, &[]).into_iter().for_each(|f| self.mutate(f)),
            // These discard uncommitted or untracked work in the tree.
            "clean" | "checkout" | "restore" => {
                let files = positionals(rest, &["-e", "-b", "-B", "--source", "-s"]);
                if sub == "clean" || files.is_empty() {
                    self.mutate(".");
                } else if sub == "restore" || args.iter().any(|a| a == "--") {
                    files.into_iter().for_each(|f| self.mutate(f));
                }
            }
            "reset" if has_flag(rest, &["--hard", "--merge", "--keep"]) => self.mutate("."),
            "apply" | "am" | "merge" | "rebase" | "pull" | "stash" | "commit" | "add" => {
                self.touch_cwd()
            }
            _ => {}
        }
    }

    fn network(&mut self, name: &str, args: &[String], known: bool) {
        let is_network_command = commands::operations_for(name)
            .is_some_and(|ops| ops.contains(&OperationClass::Network))
            || (name == "git" && commands::git_operations(args).contains(&OperationClass::Network))
            || name == "rsync";

        // Unknown programs handed a URL are assumed to contact it.
        if !is_network_command && known {
            return;
        }

        let mut found = false;
        for arg in args {
            for captures in URL_HOST.captures_iter(arg) {
                if let Some(host) = captures.get(1) {
                    self.target(host.as_str().trim_start_matches('[').trim_end_matches(']'));
                    found = true;
                }
            }
        }
        if !is_network_command {
            if found {
                self.operations.insert(OperationClass::Network);
            }
            return;
        }

        match name {
            "ssh" => {
                let with_value = [
                    "-p", "-i", "-l", "-o", "-F", "-J", "-L", "-R", "-D", "-b", "-c", "-E", "-e",
                    "-I", "-m", "-O", "-Q", "-S", "-W", "-w",
                ];
                if let Some(host) = positionals(args, &with_value).first() {
                    self.target(host);
                }
            }
            "scp" | "sftp" | "rsync" | "git" => {
                for arg in args {
                    if arg.contains("://") {
                        continue;
                    }
                    if let Some(host) = REMOTE_SPEC.captures(arg).and_then(|c| c.get(1)) {
                        self.target(host.as_str());
                        found = true;
                    }
                }
                if name == "rsync" && found {
                    self.operations.insert(OperationClass::Network);
                }
                if name == "sftp" {
                    if let Some(host) = positionals(args, &["-P", "-i", "-o", "-F"]).first() {
                        self.target(host);
                    }
                }
            }
            "ping" | "nc" | "netcat" | "telnet" | "ftp" => {
                let with_value = ["-c", "-i", "-W", "-w", "-s", "-t", "-I", "-p", "-q"];
                if let Some(host) = positionals(args, &with_value).first() {
                    self.target(host);
                }
            }
            "dig" | "nslookup" => {
                for arg in positionals(args, &["-p", "-t", "-c", "-q"]) {
                    self.target(arg.trim_start_matches('@'));
                }
            }
            "curl" | "wget" => {
                let with_value = [
                    "-o", "-O", "-H", "-d", "-X", "-u", "-A", "-e", "-T", "-F", "-x", "-b", "-c",
                    "-P", "-m", "--data", "--header", "--request", "--user", "--output",
                    "--output-document", "--max-time", "--proxy",
                ];
                for arg in positionals(args, &with_value) {
                    if !arg.contains("://") {
                        self.target(arg);
                    }
                }
            }
            _ => {}
        }
    }

    /// Whether the action reaches outside every workspace root.
    fn outside_workspace(&self, invocations: &[Invocation]) -> bool {
        let workspace = &self.builder.workspace;
        if self.touched.iter().any(|p| !workspace.contains(p)) {
            return true;
        }
        let words = invocations.iter().flat_map(|inv| {
            inv.args
                .iter()
                .chain(inv.redirects.iter().map(|r| &r.target))
        });
        for word in words {
            let word = word.split_once('=').map_or(word.as_str(), |(_, v)| v);
            if word.starts_with('/') {
                let path = paths::normalize(Path::new(word));
                let system = path == Path::new("/")
                    || SYSTEM_DIRS.iter().any(|dir| paths::is_within(&path, Path::new(dir)));
                if system && !workspace.contains(&path) {
                    return true;
                }
            }
            if word == "~" || word.starts_with("~/") {
                match self.builder.home_dir.as_deref() {
                    None => return true,
                    Some(home) if !workspace.has_root_within(home) => return true,
                    Some(_) => {}
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ActionProfileBuilder {
        ActionProfileBuilder::new(Workspace::new([PathBuf::from("/home/dev/project")]))
            .with_home_dir("/home/dev")
    }

    fn profile(command: &str) -> ActionProfile {
        builder().build_shell_action_profile(&ShellActionRequest::new(
            command,
            "/home/dev/project",
        ))
    }

    fn ops(list: &[OperationClass]) -> BTreeSet<OperationClass> {
        list.iter().copied().collect()
    }

    #[test]
    fn read_only_command_stays_in_workspace() {
        let p = profile("free -h");
        assert_eq!(p.operations, ops(&[OperationClass::Read]));
        assert_eq!(p.roots, vec!["free"]);
        assert!(!p.outside_workspace);
        assert!(!p.has_unbounded_scope_signals);
        assert_eq!(p.parse_confidence, ParseConfidence::High);
        assert_eq!(p.provenance, vec![Provenance::ModelSuggestion]);
    }

    #[test]
    fn recursive_delete_of_subdirectory_is_bounded() {
        let p = profile("rm -rf ./node_modules");
        assert_eq!(p.operations, ops(&[OperationClass::Delete]));
        assert_eq!(p.mutated_paths, vec!["/home/dev/project/node_modules"]);
        assert!(!p.has_unbounded_scope_signals);
        assert!(!p.outside_workspace);
    }

    #[test]
    fn delete_of_root_home_or_workspace_is_unbounded() {
        for command in ["rm -rf /", "rm -rf ~", "rm -rf *", "rm -rf .", "rm -rf ~/*", "rm -rf ../project"] {
            assert!(profile(command).has_unbounded_scope_signals, "{}", command);
        }
        assert!(!profile("rm -f *.log").has_unbounded_scope_signals);
        assert!(profile("rm -rf /").outside_workspace);
    }

    #[test]
    fn device_write_is_classified() {
        let p = profile("dd if=/dev/zero of=/dev/sda");
        assert!(p.operations.contains(&OperationClass::Device));
        assert_eq!(p.mutated_paths, vec!["/dev/sda"]);
        assert!(p.outside_workspace);
    }

    #[test]
    fn benign_devices_are_ignored() {
        let p = profile("ls src 2>/dev/null");
        assert_eq!(p.operations, ops(&[OperationClass::Read]));
        assert_eq!(p.touched_paths, vec!["/home/dev/project/src"]);
    }

    #[test]
    fn privilege_is_detected_through_wrappers() {
        let p = profile("sudo rm -rf /etc/config");
        assert!(p.uses_privilege);
        assert_eq!(p.roots, vec!["sudo", "rm"]);
        assert!(p.outside_workspace);
        assert_eq!(p.mutated_paths, vec!["/etc/config"]);
    }

    #[test]
    fn redirection_implies_write() {
        let p = profile("echo hello > notes.txt");
        assert!(p.operations.contains(&OperationClass::Write));
        assert_eq!(p.mutated_paths, vec!["/home/dev/project/notes.txt"]);

        let p = profile("echo hello >> notes.txt");
        assert!(p.mutated_paths.is_empty());
        assert_eq!(p.touched_paths, vec!["/home/dev/project/notes.txt"]);
    }

    #[test]
    fn package_install_writes_and_uses_network() {
        let p = profile("npm install lodash");
        assert_eq!(p.operations, ops(&[OperationClass::Write, OperationClass::Network]));
        assert!(!p.outside_workspace);
    }

    #[test]
    fn git_subcommands_override_read() {
        assert_eq!(profile("git status").operations, ops(&[OperationClass::Read]));
        let p = profile("git push origin main");
        assert_eq!(p.operations, ops(&[OperationClass::Write, OperationClass::Network]));
        let p = profile("git clean -fdx");
        assert!(p.operations.contains(&OperationClass::Delete));
        assert_eq!(p.mutated_paths, vec!["/home/dev/project"]);
    }

    #[test]
    fn network_targets_are_extracted() {
        let p = profile("curl -fsSL https://Example.com:8443/install.sh -o install.sh");
        assert_eq!(p.network_targets, vec!["example.com"]);
        assert_eq!(p.mutated_paths, vec!["/home/dev/project/install.sh"]);

        assert_eq!(profile("ssh deploy@build.internal uptime").network_targets, vec!["build.internal"]);
        assert_eq!(profile("ping -c 3 localhost").network_targets, vec!["localhost"]);
        assert_eq!(
            profile("scp dist.tgz ops@10.0.0.5:/srv/").network_targets,
            vec!["10.0.0.5"]
        );
    }

    #[test]
    fn cd_changes_resolution_base() {
        let p = profile("cd /tmp && rm -rf build");
        assert_eq!(p.mutated_paths, vec!["/tmp/build"]);
        assert!(p.outside_workspace);
    }

    #[test]
    fn search_tools_keep_files_after_boolean_flags() {
        let p = profile("grep -v x ~/.ssh/id_rsa");
        assert_eq!(p.touched_paths, vec!["/home/dev/.ssh/id_rsa"]);
        assert!(p.outside_workspace);

        let p = profile("grep -F -i needle notes.txt");
        assert_eq!(p.touched_paths, vec!["/home/dev/project/notes.txt"]);

        let p = profile("grep -e needle -m 5 notes.txt");
        assert_eq!(p.touched_paths, vec!["/home/dev/project/notes.txt"]);

        let p = profile("awk -F : '{print $1}' /etc/passwd");
        assert_eq!(p.touched_paths, vec!["/etc/passwd"]);

        let p = profile("awk -v n=2 -f prog.awk data.csv");
        assert_eq!(
            p.touched_paths,
            vec!["/home/dev/project/data.csv"]
        );

        let p = profile("rg -g '*.rs' -t rust unwrap src");
        assert_eq!(p.touched_paths, vec!["/home/dev/project/src"]);
    }

    #[test]
    fn recursive_search_without_files_reads_cwd() {
        assert_eq!(profile("grep -rn TODO").touched_paths, vec!["/home/dev/project"]);
        assert_eq!(profile("rg TODO").touched_paths, vec!["/home/dev/project"]);
        assert!(profile("grep -n TODO").touched_paths.is_empty());
    }

    #[test]
    fn home_directory_named_dev_is_not_a_device() {
        let p = profile("cat /home/dev/.aws/credentials");
        assert_eq!(p.operations, ops(&[OperationClass::Read]));

        let p = profile("cat notes.txt > /dev/sdb");
        assert!(p.operations.contains(&OperationClass::Device));
    }

    #[test]
    fn home_paths_outside_workspace() {
        let p = profile("cat ~/.ssh/id_rsa");
        assert_eq!(p.touched_paths, vec!["/home/dev/.ssh/id_rsa"]);
        assert!(p.outside_workspace);
    }

    #[test]
    fn malformed_commands_are_low_confidence() {
        for command in ["ls &&", "echo 'unterminated", "", "   ", "echo ${PS1@P}"] {
            let p = profile(command);
            assert_eq!(p.parse_confidence, ParseConfidence::Low, "{:?}", command);
            assert_eq!(p.operations, ops(&[OperationClass::Unknown]));
            assert!(p.roots.is_empty());
        }
    }

    #[test]
    fn dynamic_constructs_are_medium_confidence() {
        assert_eq!(profile("rm -rf \"$TARGET\"").parse_confidence, ParseConfidence::Medium);
        assert_eq!(profile("echo $(date)").parse_confidence, ParseConfidence::Medium);
    }

    #[test]
    fn unknown_command_is_unknown_operation() {
        let p = profile("frobnicate --all");
        assert_eq!(p.operations, ops(&[OperationClass::Unknown]));
        assert_eq!(p.parse_confidence, ParseConfidence::High);
    }

    #[test]
    fn explicit_provenance_is_kept_and_deduplicated() {
        let request = ShellActionRequest::new("ls", "/home/dev/project").with_provenance([
            Provenance::LocalUser,
            Provenance::LocalUser,
            Provenance::ToolOutput,
        ]);
        let p = builder().build_shell_action_profile(&request);
        assert_eq!(p.provenance, vec![Provenance::LocalUser, Provenance::ToolOutput]);
    }

    #[test]
    fn summary_is_truncated() {
        let long = format!("echo {}", "x".repeat(400));
        let p = profile(&long);
        assert!(p.raw_summary.ends_with("..."));
        assert_eq!(p.raw_summary.chars().count(), SUMMARY_LIMIT + 3);
    }
}
