// workspace.rs — The set of directories an agent is allowed to work in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// Absolute workspace roots. Paths inside any root are "in the workspace".
///
/// Roots are expected to be absolute and already canonicalized (the config
/// layer does this once at startup); containment checks are lexical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    roots: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut normalized: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = paths::normalize(&root);
            if !normalized.contains(&root) {
                normalized.push(root);
            }
        }
        Self { roots: normalized }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// True when `path` lies inside (or is) any workspace root.
    pub fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| paths::is_within(path, root))
    }

    /// True when `path` is exactly one of the workspace roots.
    pub fn is_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| root == path)
    }

    /// True when some workspace root lies inside `dir`.
    pub fn has_root_within(&self, dir: &Path) -> bool {
        self.roots.iter().any(|root| paths::is_within(root, dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_and_roots() {
        let ws = Workspace::new([PathBuf::from("/work/app/"), PathBuf::from("/work/app")]);
        assert_eq!(ws.roots().len(), 1);
        assert!(ws.contains(Path::new("/work/app/src/main.rs")));
        assert!(!ws.contains(Path::new("/work/other")));
        assert!(ws.is_root(Path::new("/work/app")));
        assert!(ws.has_root_within(Path::new("/work")));
        assert!(!ws.has_root_within(Path::new("/home/dev")));
    }
}
