//! # ga-policy
//!
//! Deterministic review gating for Governed Autonomy.
//!
//! Every action an agent proposes (a shell command or a structured tool
//! call) is reduced to an [`ActionProfile`] by the [`ActionProfileBuilder`].
//! The [`ReviewLevelGate`] classifies the profile's [`Domain`], [`Outcome`],
//! and [`Intention`], asks the [`RiskEngine`] for a decision under the
//! configured [`SecurityProfile`], and returns a [`ReviewLevel`]:
//!
//! - **A**: run without interruption.
//! - **B**: a human must click to approve.
//! - **C**: a human must click and enter the approval PIN.
//!
//! ## Key invariants
//!
//! - **Fail safe**: a command the builder cannot parse is low confidence,
//!   and low confidence is always level C.
//! - **No relaxing**: unbounded deletes, non-read actions from remote web
//!   users, and anything outside the workspace are level C under every
//!   security profile.
//! - **Pure**: the same profile and config always yield the same result.
//!   Filesystem knowledge is injected: a [`GitOracle`] for tracked files
//!   and a [`PathResolver`] (such as [`FilesystemPaths`]) for symlinks.

pub mod approval;
pub mod builder;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod gate;
pub mod intention;
pub mod outcome;
pub mod paths;
pub mod profile;
pub mod risk;
pub mod shell;
pub mod tool_profile;
pub mod workspace;

pub use approval::{authorize, ApprovalResponse};
pub use builder::{ActionProfileBuilder, ShellActionRequest};
pub use config::{
    ExportFormat, RedactionLevel, SafetyConfig, SafetyContext, SecurityConfig, SecurityProfile,
};
pub use domain::{classify_domain, Domain};
pub use error::{ApprovalError, ConfigError, GitError, ShellParseError};
pub use gate::{EvaluationStep, ReviewLevel, ReviewLevelGate, ReviewResult, ReviewTrace};
pub use intention::{classify_intention, Intention};
pub use outcome::{classify_outcome, GitOracle, NoGit, Outcome, TrackedFiles};
pub use paths::{FilesystemPaths, LexicalPaths, PathResolver};
pub use profile::{ActionProfile, OperationClass, ParseConfidence, Provenance};
pub use risk::{RiskDecision, RiskEngine, RiskFactors};
pub use tool_profile::ToolActionRequest;
pub use workspace::Workspace;
