// error.rs — Error types for the policy subsystem.
//
// Classification itself never fails: malformed or unanalyzable input yields
// a low-confidence profile instead of an error. The errors here cover the
// two places that can legitimately fail: loading the security configuration
// at startup, and checking a human's approval response against a review.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the security configuration.
///
/// All of these are fatal at startup: the agent must not run with a
/// configuration it could not fully understand.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The approval PIN is not exactly six ASCII digits.
    #[error("approval PIN must be exactly 6 digits")]
    InvalidPin,

    /// A critical path is empty or not absolute after `~` expansion.
    #[error("critical path '{path}' must be absolute (or start with '~/')")]
    InvalidCriticalPath { path: String },

    /// A trusted domain entry is not a plausible hostname or host pattern.
    #[error("trusted domain '{domain}' is not a valid hostname pattern")]
    InvalidTrustedDomain { domain: String },

    /// The configuration lists no workspace roots.
    #[error("at least one workspace root is required")]
    NoWorkspaceRoots,

    /// A path uses `~` but the home directory could not be determined.
    #[error("'{path}' uses '~' but the home directory could not be determined")]
    HomeDirUnavailable { path: String },
}

/// Errors raised when a human's response does not satisfy a review decision.
///
/// These are fatal for the single action under review, never for the
/// session: the caller may prompt again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// The review requires an explicit confirmation click that was not given.
    #[error("action requires explicit confirmation")]
    ConfirmationRequired,

    /// The review requires a PIN and none was supplied.
    #[error("action requires the approval PIN")]
    PinRequired,

    /// The supplied PIN does not match the configured approval PIN.
    #[error("approval PIN does not match")]
    PinMismatch,
}

impl ApprovalError {
    /// Whether re-prompting the user could resolve the error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApprovalError::PinMismatch
                | ApprovalError::PinRequired
                | ApprovalError::ConfirmationRequired
        )
    }
}

/// Errors raised while snapshotting git-tracked files.
#[derive(Debug, Error)]
pub enum GitError {
    /// `git` could not be spawned at all (not installed, bad cwd).
    #[error("failed to run git in {path}: {source}")]
    SpawnFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `git` ran but reported failure (e.g. not a repository).
    #[error("git ls-files failed in {path}: {stderr}")]
    CommandFailed { path: PathBuf, stderr: String },
}

/// Reasons a shell command could not be parsed structurally.
///
/// The profile builder never surfaces these as errors: any of them turns
/// the profile into a low-confidence `{unknown}` profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellParseError {
    #[error("unterminated {quote} quote")]
    UnterminatedQuote { quote: char },

    #[error("unterminated {kind} substitution")]
    UnterminatedSubstitution { kind: &'static str },

    #[error("here-document '{delimiter}' is never terminated")]
    UnterminatedHeredoc { delimiter: String },

    #[error("empty command segment near '{near}'")]
    EmptySegment { near: String },

    #[error("redirect '{op}' has no target")]
    MissingRedirectTarget { op: String },

    #[error("unbalanced parentheses")]
    UnbalancedParens,

    #[error("prompt-string transformation (${{...@P}}) is not allowed")]
    PromptTransform,

    #[error("command nesting exceeds {max} levels")]
    TooDeep { max: usize },
}
