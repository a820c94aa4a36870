// paths.rs — Path helpers shared by the profile builder and classifiers.
//
// The free functions are purely lexical. Symlinks in workspace roots are
// resolved once, at startup, by the configuration layer; symlinks in the
// paths an action touches are resolved by the review gate through a
// `PathResolver`, which is the only place here allowed to hit the filesystem.

use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` or `~/` against `home`.
///
/// Returns `None` when the path needs a home directory and none is known.
/// `~user` forms are left untouched (they are not the current user's home).
pub fn expand_home(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    if raw == "~" {
        return home.map(Path::to_path_buf);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.map(|h| h.join(rest));
    }
    Some(PathBuf::from(raw))
}

/// Normalize a path lexically: drop `.` components and fold `..` into the
/// parent. A `..` at the filesystem root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve `raw` (as written in a command) to an absolute, normalized path.
///
/// Relative paths are joined to `cwd`. Returns `None` when the path cannot
/// be resolved statically: a `~` with no known home, or a leading variable
/// such as `$HOME/x` whose value is unknown at classification time.
pub fn resolve(raw: &str, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if raw.is_empty() || raw.starts_with('$') {
        return None;
    }
    let expanded = expand_home(raw, home)?;
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    Some(normalize(&joined))
}

/// True when `path` equals `root` or lies beneath it (component-wise, so
/// `/work/app2` is not inside `/work/app`).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Maps a lexically normalized absolute path to the path it really names.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> PathBuf;
}

impl<F> PathResolver for F
where
    F: Fn(&Path) -> PathBuf + Send + Sync,
{
    fn resolve(&self, path: &Path) -> PathBuf {
        self(path)
    }
}

/// Takes every path as written. Keeps review free of filesystem access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalPaths;

impl PathResolver for LexicalPaths {
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Follows symlinks on the local filesystem.
///
/// The longest existing prefix of the path is canonicalized and the
/// remaining (not yet created) components are appended to it, so a file an
/// action is about to create under a symlinked directory still resolves to
/// the link target. A path with no existing prefix comes back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemPaths;

impl PathResolver for FilesystemPaths {
    fn resolve(&self, path: &Path) -> PathBuf {
        let mut missing = Vec::new();
        let mut current = path;
        loop {
            if let Ok(canonical) = current.canonicalize() {
                let mut resolved = canonical;
                for name in missing.iter().rev() {
                    resolved.push(name);
                }
                return resolved;
            }
            match (current.parent(), current.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    current = parent;
                }
                _ => return path.to_path_buf(),
            }
        }
    }
}
