// outcome.rs — Can the action be undone?
//
// An action is reversible when it destroys nothing, or when everything it
// destroys is tracked by git inside the workspace (so `git checkout` brings
// it back). Git knowledge comes through the `GitOracle` trait; the default
// `NoGit` oracle knows nothing is tracked, which errs toward irreversible.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::GitError;
use crate::profile::{ActionProfile, OperationClass};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Reversible,
    Irreversible,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Reversible => f.write_str("reversible"),
            Outcome::Irreversible => f.write_str("irreversible"),
        }
    }
}

/// Answers "is this file tracked by git?".
pub trait GitOracle: Send + Sync {
    fn is_tracked(&self, path: &Path) -> bool;
}

impl<F> GitOracle for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_tracked(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Oracle for environments without git: nothing is tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGit;

impl GitOracle for NoGit {
    fn is_tracked(&self, _path: &Path) -> bool {
        false
    }
}

/// Snapshot of `git ls-files` for one repository, taken once.
///
/// Only files are tracked; a directory never counts as tracked, since
/// deleting it may take untracked content with it.
#[derive(Debug, Clone, Default)]
pub struct TrackedFiles {
    files: BTreeSet<PathBuf>,
}

impl TrackedFiles {
    /// Run `git ls-files -z` in `repo_root` and record absolute paths.
    pub fn snapshot(repo_root: &Path) -> Result<Self, GitError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repo_root)
            .args(["ls-files", "-z"])
            .output()
            .map_err(|source| GitError::SpawnFailed {
                path: repo_root.to_path_buf(),
                source,
            })?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                path: repo_root.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let files: BTreeSet<PathBuf> = output
            .stdout
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| repo_root.join(String::from_utf8_lossy(entry).as_ref()))
            .collect();
        tracing::debug!(repo = %repo_root.display(), files = files.len(), "git tracked-file snapshot");
        Ok(Self { files })
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: paths.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl GitOracle for TrackedFiles {
    fn is_tracked(&self, path: &Path) -> bool {
        self.files.contains(path)
    }
}

/// Classify whether `profile` could be undone.
pub fn classify_outcome(
    profile: &ActionProfile,
    workspace: &Workspace,
    git: &dyn GitOracle,
) -> Outcome {
    if profile.touched_paths.is_empty() {
        return Outcome::Reversible;
    }
    if profile.has_unbounded_scope_signals {
        return Outcome::Irreversible;
    }
    if profile.has(OperationClass::Device) {
        return Outcome::Irreversible;
    }
    if profile.is_mutating()
        && profile
            .touched_paths
            .iter()
            .any(|p| !workspace.contains(Path::new(p)))
    {
        return Outcome::Irreversible;
    }
    let recoverable = |p: &String| {
        let path = Path::new(p);
        workspace.contains(path) && git.is_tracked(path)
    };
    if profile.mutated_paths.iter().all(recoverable) {
        Outcome::Reversible
    } else {
        Outcome::Irreversible
    }
}
