// gate.rs — The review-level gate.
//
// Combines the classifiers and the risk engine into a review level, then
// applies the invariants no security profile can relax. With the default
// git oracle and path resolver the gate is pure: the same profile and config
// always give the same result.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::domain::{classify_domain, Domain};
use crate::intention::{classify_intention, Intention};
use crate::outcome::{classify_outcome, GitOracle, NoGit, Outcome};
use crate::paths::{LexicalPaths, PathResolver};
use crate::profile::{ActionProfile, OperationClass, ParseConfidence, Provenance};
use crate::risk::{RiskDecision, RiskEngine, RiskFactors};

pub const LOW_CONFIDENCE_REASON: &str =
    "Parse confidence is low: cannot safely reason about action";
pub const SAFE_REASON: &str = "Action is read-only, bounded, and reversible";

/// Review level, in increasing strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReviewLevel {
    /// Runs without interruption.
    A,
    /// Needs a click.
    B,
    /// Needs a click and the approval PIN.
    C,
}

impl ReviewLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewLevel::A => "A",
            ReviewLevel::B => "B",
            ReviewLevel::C => "C",
        }
    }
}

impl fmt::Display for ReviewLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RiskDecision> for ReviewLevel {
    fn from(decision: RiskDecision) -> Self {
        match decision {
            RiskDecision::Log => ReviewLevel::A,
            RiskDecision::Confirm => ReviewLevel::B,
            RiskDecision::Pin => ReviewLevel::C,
        }
    }
}

/// The gate's verdict for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub level: ReviewLevel,
    /// Human-readable reasons, in the order they were found.
    pub reasons: Vec<String>,
    pub requires_click: bool,
    pub requires_pin: bool,
}

impl ReviewResult {
    fn new(level: ReviewLevel, reasons: Vec<String>) -> Self {
        Self {
            level,
            reasons,
            requires_click: level != ReviewLevel::A,
            requires_pin: level == ReviewLevel::C,
        }
    }
}

/// A single step in the gate's evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// Which check was performed (e.g., "parse_confidence", "risk_engine").
    pub check: String,
    /// What the check found (e.g., "passed", "escalated: B -> C").
    pub outcome: String,
    /// Whether this step decided the final level on its own.
    pub terminal: bool,
}

impl EvaluationStep {
    fn new(check: &str, outcome: impl Into<String>, terminal: bool) -> Self {
        Self {
            check: check.to_string(),
            outcome: outcome.into(),
            terminal,
        }
    }
}

/// A review result with the classifications and steps behind it.
///
/// Classifications are `None` when the gate stopped before computing them
/// (low parse confidence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTrace {
    pub result: ReviewResult,
    pub domain: Option<Domain>,
    pub outcome: Option<Outcome>,
    pub intention: Option<Intention>,
    pub risk: Option<RiskDecision>,
    pub steps: Vec<EvaluationStep>,
}

/// Decides the minimum review level for an [`ActionProfile`].
pub struct ReviewLevelGate<'a> {
    config: &'a dyn SecurityConfig,
    git: &'a dyn GitOracle,
    paths: &'a dyn PathResolver,
}

impl<'a> ReviewLevelGate<'a> {
    /// A gate that assumes nothing is git-tracked and takes paths as written.
    pub fn new(config: &'a dyn SecurityConfig) -> Self {
        Self {
            config,
            git: &NoGit,
            paths: &LexicalPaths,
        }
    }

    pub fn with_git_oracle(mut self, git: &'a dyn GitOracle) -> Self {
        self.git = git;
        self
    }

    /// Resolve touched paths (symlinks) before classifying them.
    pub fn with_path_resolver(mut self, paths: &'a dyn PathResolver) -> Self {
        self.paths = paths;
        self
    }

    pub fn evaluate(&self, profile: &ActionProfile) -> ReviewResult {
        self.evaluate_with_trace(profile).result
    }

    /// Evaluate and record every check along the way.
    pub fn evaluate_with_trace(&self, profile: &ActionProfile) -> ReviewTrace {
        let mut steps = Vec::new();

        // Step 1: parse confidence
        if profile.parse_confidence == ParseConfidence::Low {
            tracing::warn!(
                tool = %profile.tool_name,
                summary = %profile.raw_summary,
                "low parse confidence, requiring PIN"
            );
            steps.push(EvaluationStep::new("parse_confidence", "failed: low", true));
            return ReviewTrace {
                result: ReviewResult::new(ReviewLevel::C, vec![LOW_CONFIDENCE_REASON.to_string()]),
                domain: None,
                outcome: None,
                intention: None,
                risk: None,
                steps,
            };
        }
        steps.push(EvaluationStep::new(
            "parse_confidence",
            format!("passed: {}", profile.parse_confidence),
            false,
        ));

        let resolved = self.resolve_paths(profile, &mut steps);
        let profile = &*resolved;

        // Step 2: classifiers and the risk table
        let domain = classify_domain(profile, self.config);
        let outcome = classify_outcome(profile, self.config.workspace(), self.git);
        let intention = classify_intention(&profile.provenance);
        let factors = RiskFactors {
            outcome,
            intention,
            domain,
            read_only: profile.is_read_only(),
        };
        let engine = RiskEngine::new(self.config.security_profile());
        let risk = engine.evaluate(&factors);
        let mut level = ReviewLevel::from(risk);
        steps.push(EvaluationStep::new(
            "classify",
            format!("domain={domain}, outcome={outcome}, intention={intention}"),
            false,
        ));
        steps.push(EvaluationStep::new(
            "risk_engine",
            format!("{} ({}) -> {}", risk, engine.profile(), level),
            false,
        ));
        let mut reasons = collect_reasons(profile, domain, outcome);

        // Medium confidence never runs unattended.
        if profile.parse_confidence == ParseConfidence::Medium {
            reasons.push(
                "Parse confidence is medium: some effects could not be analyzed".to_string(),
            );
            level = raise(&mut steps, "medium_confidence", level, ReviewLevel::B);
        }

        // Step 3: unbounded scope
        if profile.has_unbounded_scope_signals {
            level = raise(&mut steps, "unbounded_scope", level, ReviewLevel::C);
        }

        // Step 4: remote web users may only read
        if profile.provenance.contains(&Provenance::WebRemoteUser) && !profile.is_read_only() {
            reasons.push("Action from web remote user (non-read)".to_string());
            level = raise(&mut steps, "web_remote_user", level, ReviewLevel::C);
        }

        // Step 5: outside the workspace; evaluated last so earlier reasons stay
        if profile.outside_workspace {
            level = raise(&mut steps, "outside_workspace", level, ReviewLevel::C);
        }

        if level > ReviewLevel::A && intention == Intention::Autonomous {
            reasons.push("Autonomous action: not requested by the user".to_string());
        }
        if reasons.is_empty() {
            reasons.push(SAFE_REASON.to_string());
        }

        tracing::debug!(
            tool = %profile.tool_name,
            level = %level,
            %domain,
            %outcome,
            "review level decided"
        );

        ReviewTrace {
            result: ReviewResult::new(level, reasons),
            domain: Some(domain),
            outcome: Some(outcome),
            intention: Some(intention),
            risk: Some(risk),
            steps,
        }
    }
}

impl ReviewLevelGate<'_> {
    /// Add the real location of every touched path that resolves elsewhere.
    /// The written forms stay, so resolution can only raise the level.
    fn resolve_paths<'p>(
        &self,
        profile: &'p ActionProfile,
        steps: &mut Vec<EvaluationStep>,
    ) -> Cow<'p, ActionProfile> {
        let touched = self.relocated(&profile.touched_paths);
        if touched.is_empty() {
            return Cow::Borrowed(profile);
        }
        let mutated = self.relocated(&profile.mutated_paths);
        let workspace = self.config.workspace();

        let mut resolved = profile.clone();
        for path in &touched {
            if !workspace.contains(Path::new(path)) {
                resolved.outside_workspace = true;
            }
        }
        extend_unique(&mut resolved.touched_paths, touched.iter().cloned());
        extend_unique(&mut resolved.mutated_paths, mutated);
        tracing::debug!(paths = ?touched, "touched paths resolve through symlinks");
        steps.push(EvaluationStep::new(
            "resolve_paths",
            format!("{} path(s) resolve elsewhere: {}", touched.len(), touched.join(", ")),
            false,
        ));
        Cow::Owned(resolved)
    }

    fn relocated(&self, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|raw| {
                let written = Path::new(raw);
                let real = self.paths.resolve(written);
                (real != written).then(|| real.to_string_lossy().into_owned())
            })
            .collect()
    }
}

fn extend_unique(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

/// Raise `level` to at least `floor`, recording the step either way.
fn raise(
    steps: &mut Vec<EvaluationStep>,
    check: &str,
    level: ReviewLevel,
    floor: ReviewLevel,
) -> ReviewLevel {
    if level < floor {
        steps.push(EvaluationStep::new(check, format!("escalated: {level} -> {floor}"), false));
        floor
    } else {
        steps.push(EvaluationStep::new(check, format!("already at {level}"), false));
        level
    }
}

fn network_targets(profile: &ActionProfile) -> String {
    if profile.network_targets.is_empty() {
        "unknown".to_string()
    } else {
        profile.network_targets.join(", ")
    }
}

fn collect_reasons(profile: &ActionProfile, domain: Domain, outcome: Outcome) -> Vec<String> {
    let mut reasons = Vec::new();
    match domain {
        Domain::System => reasons.push("Action targets system paths or privileges".to_string()),
        Domain::Untrusted if profile.has(OperationClass::Network) => reasons.push(format!(
            "Network operation with untrusted target: {}",
            network_targets(profile)
        )),
        _ if profile.has(OperationClass::Network) => reasons.push(format!(
            "Network operation: {}",
            network_targets(profile)
        )),
        _ => {}
    }
    if profile.has_unbounded_scope_signals {
        reasons.push("Delete operation with unbounded scope (/, ~, wildcards)".to_string());
    }
    if profile.uses_privilege || profile.has(OperationClass::Privileged) {
        reasons.push("Privileged operation (sudo/doas/su)".to_string());
    }
    if profile.has(OperationClass::Delete) {
        reasons.push("Delete operation detected".to_string());
    }
    if profile.has(OperationClass::Device) {
        reasons.push("Action involves device-level operations".to_string());
    }
    if profile.has(OperationClass::Write) {
        reasons.push("Write operation detected".to_string());
    }
    if profile.has(OperationClass::Process) {
        reasons.push("Process operation detected".to_string());
    }
    if profile.has(OperationClass::Ui) {
        reasons.push("UI automation requires user review".to_string());
    }
    if profile.has(OperationClass::Unknown) {
        reasons.push("Command semantics are unknown; require user review".to_string());
    }
    if profile.outside_workspace {
        reasons.push("Action touches paths outside workspace".to_string());
    }
    if outcome == Outcome::Irreversible {
        reasons.push("Outcome is irreversible".to_string());
    }
    reasons
}
