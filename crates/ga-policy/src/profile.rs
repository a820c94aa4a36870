// profile.rs — The ActionProfile and the vocabulary shared by every classifier.
//
// An ActionProfile is the deterministic, structured summary of a proposed
// action. It is built once per action (by the builder) and then read by the
// domain/outcome classifiers, the risk engine, and the review gate. Nothing
// downstream ever looks at the raw command text except through this struct.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A class of effect an action may have.
///
/// Ordered so that `BTreeSet<OperationClass>` serializes deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Read,
    Write,
    Delete,
    Network,
    Privileged,
    Process,
    Device,
    Ui,
    Unknown,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Read => "read",
            OperationClass::Write => "write",
            OperationClass::Delete => "delete",
            OperationClass::Network => "network",
            OperationClass::Privileged => "privileged",
            OperationClass::Process => "process",
            OperationClass::Device => "device",
            OperationClass::Ui => "ui",
            OperationClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much the builder trusts its own analysis of the action.
///
/// `Low` means the builder could not reason about the action at all; the
/// review gate treats it as maximally dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseConfidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for ParseConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseConfidence::Low => "low",
            ParseConfidence::Medium => "medium",
            ParseConfidence::High => "high",
        })
    }
}

/// Where a proposed action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Typed by the user at the local terminal.
    LocalUser,
    /// Sent by the user through a remote (web) surface.
    WebRemoteUser,
    /// Proposed by the model on its own.
    ModelSuggestion,
    /// Derived from a file in the workspace.
    WorkspaceFile,
    /// Derived from fetched web content.
    WebContent,
    /// Derived from the output of an earlier tool call.
    ToolOutput,
    Unknown,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::LocalUser => "local_user",
            Provenance::WebRemoteUser => "web_remote_user",
            Provenance::ModelSuggestion => "model_suggestion",
            Provenance::WorkspaceFile => "workspace_file",
            Provenance::WebContent => "web_content",
            Provenance::ToolOutput => "tool_output",
            Provenance::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_user" => Ok(Provenance::LocalUser),
            "web_remote_user" => Ok(Provenance::WebRemoteUser),
            "model_suggestion" => Ok(Provenance::ModelSuggestion),
            "workspace_file" => Ok(Provenance::WorkspaceFile),
            "web_content" => Ok(Provenance::WebContent),
            "tool_output" => Ok(Provenance::ToolOutput),
            "unknown" => Ok(Provenance::Unknown),
            other => Err(format!("unknown provenance '{}'", other)),
        }
    }
}

/// Deterministic summary of a proposed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProfile {
    /// The tool that would run the action ("shell", "edit", "web_fetch", ...).
    pub tool_name: String,
    /// Effects the action may have. Never empty; `Unknown` is the fallback.
    pub operations: BTreeSet<OperationClass>,
    /// Top-level command names, in first-seen order, including commands
    /// hidden behind wrappers such as `sudo` or `bash -c`.
    pub roots: Vec<String>,
    /// Absolute, lexically normalized paths the action reads or changes.
    pub touched_paths: Vec<String>,
    /// Subset of `touched_paths` the action overwrites, truncates, or deletes.
    pub mutated_paths: Vec<String>,
    /// Hostnames the action contacts.
    pub network_targets: Vec<String>,
    pub outside_workspace: bool,
    pub uses_privilege: bool,
    pub has_unbounded_scope_signals: bool,
    pub parse_confidence: ParseConfidence,
    pub provenance: Vec<Provenance>,
    /// Short human-readable description of the action.
    pub raw_summary: String,
}

impl ActionProfile {
    /// A profile for an action the builder cannot reason about.
    pub fn unparseable(
        tool_name: impl Into<String>,
        raw_summary: impl Into<String>,
        provenance: Vec<Provenance>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            operations: BTreeSet::from([OperationClass::Unknown]),
            roots: Vec::new(),
            touched_paths: Vec::new(),
            mutated_paths: Vec::new(),
            network_targets: Vec::new(),
            outside_workspace: false,
            uses_privilege: false,
            has_unbounded_scope_signals: false,
            parse_confidence: ParseConfidence::Low,
            provenance,
            raw_summary: raw_summary.into(),
        }
    }

    pub fn has(&self, op: OperationClass) -> bool {
        self.operations.contains(&op)
    }

    /// True when every operation is `Read`.
    pub fn is_read_only(&self) -> bool {
        self.operations.iter().all(|op| *op == OperationClass::Read)
    }

    /// True when the action may write, delete, or touch devices.
    pub fn is_mutating(&self) -> bool {
        self.has(OperationClass::Write)
            || self.has(OperationClass::Delete)
            || self.has(OperationClass::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_profile_is_low_and_unknown() {
        let profile = ActionProfile::unparseable("shell", "ls &&", vec![Provenance::ModelSuggestion]);
        assert_eq!(profile.parse_confidence, ParseConfidence::Low);
        assert_eq!(profile.operations, BTreeSet::from([OperationClass::Unknown]));
        assert!(profile.roots.is_empty());
        assert!(!profile.is_read_only());
    }

    #[test]
    fn operations_serialize_in_stable_order() {
        let mut profile = ActionProfile::unparseable("shell", "x", vec![]);
        profile.operations = BTreeSet::from([OperationClass::Network, OperationClass::Write]);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["operations"], serde_json::json!(["write", "network"]));
        assert_eq!(json["parse_confidence"], "low");
    }

    #[test]
    fn provenance_parses_from_wire_names() {
        assert_eq!("web_remote_user".parse::<Provenance>(), Ok(Provenance::WebRemoteUser));
        assert!("root".parse::<Provenance>().is_err());
    }
}
