// domain.rs — Where an action lands: workspace, localhost, trusted or
// untrusted network, or the system itself.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::profile::{ActionProfile, OperationClass};

/// Target domain of an action, ordered from most to least trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Workspace,
    Localhost,
    Trusted,
    Untrusted,
    System,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Workspace => "workspace",
            Domain::Localhost => "localhost",
            Domain::Trusted => "trusted",
            Domain::Untrusted => "untrusted",
            Domain::System => "system",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PRIVILEGED_ROOTS: &[&str] = &["sudo", "su", "doas", "pkexec"];
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

static SUMMARY_URL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:[^/\s@]*@)?(\[[0-9a-f:.]+\]|[a-z0-9.\-_]+)")
        .expect("invalid summary url regex")
});

/// Classify the domain of `profile`. The first matching rule wins:
///
/// 1. privileged root (`sudo`, `su`, `doas`) → system
/// 2. a touched path at or below a critical path → system
/// 3. every touched path inside the workspace → workspace
/// 4. network operation → the least trusted of its targets
/// 5. touched paths outside the workspace → untrusted
/// 6. nothing touched → workspace
pub fn classify_domain(profile: &ActionProfile, config: &dyn SecurityConfig) -> Domain {
    if profile.uses_privilege
        || profile
            .roots
            .iter()
            .any(|r| PRIVILEGED_ROOTS.contains(&r.as_str()))
    {
        return Domain::System;
    }

    let touched: Vec<PathBuf> = profile.touched_paths.iter().map(PathBuf::from).collect();
    if touched
        .iter()
        .any(|p| is_critical_path(p, config.critical_paths()))
    {
        return Domain::System;
    }

    let workspace = config.workspace();
    if !touched.is_empty() && touched.iter().all(|p| workspace.contains(p)) {
        return Domain::Workspace;
    }

    if profile.has(OperationClass::Network) {
        return classify_network(profile, config.trusted_domains());
    }

    if !touched.is_empty() {
        return Domain::Untrusted;
    }
    Domain::Workspace
}

/// `/` is critical only as itself; every other critical path covers its subtree.
pub fn is_critical_path(path: &Path, critical: &[PathBuf]) -> bool {
    critical.iter().any(|c| {
        if c == Path::new("/") {
            path == c
        } else {
            path.starts_with(c)
        }
    })
}

fn classify_network(profile: &ActionProfile, trusted: &[String]) -> Domain {
    let mut targets: Vec<String> = profile.network_targets.clone();
    if targets.is_empty() {
        targets = SUMMARY_URL_HOST
            .captures_iter(&profile.raw_summary)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim_matches(['[', ']']).to_ascii_lowercase())
            .collect();
    }
    if targets.is_empty() {
        tracing::debug!(summary = %profile.raw_summary, "network action without a resolvable target");
        return Domain::Untrusted;
    }
    targets
        .iter()
        .map(|host| classify_host(host, trusted))
        .max()
        .unwrap_or(Domain::Untrusted)
}

/// Domain of a single network host.
pub fn classify_host(host: &str, trusted: &[String]) -> Domain {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if LOCAL_HOSTS.contains(&host.as_str()) {
        return Domain::Localhost;
    }
    if trusted.iter().any(|pattern| host_matches(&host, pattern)) {
        return Domain::Trusted;
    }
    Domain::Untrusted
}

/// Host equality, a subdomain on a label boundary, or a `*.` glob.
fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    if pattern.contains('*') {
        return glob::Pattern::new(&pattern).is_ok_and(|p| p.matches(host));
    }
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SafetyConfig, SafetyContext};
    use crate::profile::{ParseConfidence, Provenance};
    use std::collections::BTreeSet;

    fn context(trusted: &[&str]) -> SafetyContext {
        let mut config = SafetyConfig::default();
        config.security.trusted_domains = trusted.iter().map(|d| d.to_string()).collect();
        SafetyContext::new(Path::new("/work/app"), config, Some(PathBuf::from("/home/dev"))).unwrap()
    }

    fn profile(ops: &[OperationClass], touched: &[&str], targets: &[&str]) -> ActionProfile {
        ActionProfile {
            tool_name: "shell".into(),
            operations: ops.iter().copied().collect::<BTreeSet<_>>(),
            roots: vec!["x".into()],
            touched_paths: touched.iter().map(|s| s.to_string()).collect(),
            mutated_paths: Vec::new(),
            network_targets: targets.iter().map(|s| s.to_string()).collect(),
            outside_workspace: false,
            uses_privilege: false,
            has_unbounded_scope_signals: false,
            parse_confidence: ParseConfidence::High,
            provenance: vec![Provenance::ModelSuggestion],
            raw_summary: "x".into(),
        }
    }

    #[test]
    fn paths_decide_first() {
        let ctx = context(&[]);
        let read = [OperationClass::Read];
        assert_eq!(classify_domain(&profile(&read, &["/etc/hosts"], &[]), &ctx), Domain::System);
        assert_eq!(
            classify_domain(&profile(&read, &["/home/dev/.ssh/id_ed25519"], &[]), &ctx),
            Domain::System
        );
        assert_eq!(
            classify_domain(&profile(&read, &["/work/app/src"], &[]), &ctx),
            Domain::Workspace
        );
        assert_eq!(classify_domain(&profile(&read, &["/tmp/x"], &[]), &ctx), Domain::Untrusted);
        assert_eq!(classify_domain(&profile(&read, &[], &[]), &ctx), Domain::Workspace);
    }

    #[test]
    fn root_is_critical_only_as_itself() {
        let critical = vec![PathBuf::from("/"), PathBuf::from("/etc")];
        assert!(is_critical_path(Path::new("/"), &critical));
        assert!(is_critical_path(Path::new("/etc/passwd"), &critical));
        assert!(!is_critical_path(Path::new("/tmp/x"), &critical));
        assert!(!is_critical_path(Path::new("/etcetera"), &critical));
    }

    #[test]
    fn privileged_roots_are_system() {
        let ctx = context(&[]);
        let mut p = profile(&[OperationClass::Privileged], &[], &[]);
        p.roots = vec!["sudo".into(), "ls".into()];
        assert_eq!(classify_domain(&p, &ctx), Domain::System);
    }

    #[test]
    fn network_targets_least_trusted_wins() {
        let ctx = context(&["github.com", "*.crates.io"]);
        let net = [OperationClass::Network];
        assert_eq!(classify_domain(&profile(&net, &[], &["localhost"]), &ctx), Domain::Localhost);
        assert_eq!(
            classify_domain(&profile(&net, &[], &["api.github.com"]), &ctx),
            Domain::Trusted
        );
        assert_eq!(
            classify_domain(&profile(&net, &[], &["static.crates.io"]), &ctx),
            Domain::Trusted
        );
        assert_eq!(
            classify_domain(&profile(&net, &[], &["evilgithub.com"]), &ctx),
            Domain::Untrusted
        );
        assert_eq!(
            classify_domain(&profile(&net, &[], &["github.com", "evil.example"]), &ctx),
            Domain::Untrusted
        );
        assert_eq!(classify_domain(&profile(&net, &[], &[]), &ctx), Domain::Untrusted);
    }

    #[test]
    fn summary_url_fallback() {
        let ctx = context(&["github.com"]);
        let mut p = profile(&[OperationClass::Network], &[], &[]);
        p.raw_summary = "fetch https://github.com/org/repo".into();
        assert_eq!(classify_domain(&p, &ctx), Domain::Trusted);
    }
}
