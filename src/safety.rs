use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Workspace-relative directories that are never written to.
pub const DEFAULT_FORBIDDEN_DIRS: &[&str] = &[".git", ".venv", "venv", "node_modules", "__pycache__"];

/// Workspace safety checks to prevent editing files outside the target workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical path to workspace root
    workspace_root: PathBuf,
    /// Absolute paths to forbidden directories inside the workspace
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize workspace root {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the default forbidden directories.
    ///
    /// The workspace root will be canonicalized to handle symlinks correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Self::with_forbidden(workspace_root, DEFAULT_FORBIDDEN_DIRS)
    }

    /// Create a guard with custom workspace-relative forbidden directories.
    pub fn with_forbidden<S: AsRef<str>>(
        workspace_root: impl AsRef<Path>,
        forbidden: &[S],
    ) -> Result<Self, SafetyError> {
        let root = workspace_root.as_ref();
        let workspace_root = root.canonicalize().map_err(|source| SafetyError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;
        let forbidden_paths = forbidden
            .iter()
            .map(|dir| workspace_root.join(dir.as_ref()))
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check if a path is safe to edit.
    ///
    /// Returns the resolved absolute path if safe. The path does not need to
    /// exist: its deepest existing ancestor is canonicalized and the remaining
    /// components are applied lexically, so an escaping path is rejected
    /// whether or not it exists.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        // Resolve relative paths against workspace root
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let resolved = resolve_existing_prefix(&absolute);
        self.check_resolved(&resolved)?;

        Ok(resolved)
    }

    /// Re-validate a previously-validated path.
    ///
    /// Call this immediately before write to close the TOCTOU window:
    /// the path is re-resolved and re-checked against workspace
    /// and forbidden boundaries.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let resolved = resolve_existing_prefix(path);
        self.check_resolved(&resolved)?;
        Ok(resolved)
    }

    fn check_resolved(&self, resolved: &Path) -> Result<(), SafetyError> {
        // Check if inside workspace
        if !resolved.starts_with(&self.workspace_root) {
            tracing::warn!(path = %resolved.display(), "rejected path outside workspace");
            return Err(SafetyError::OutsideWorkspace {
                path: resolved.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        // Check against forbidden paths
        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(forbidden) {
                tracing::warn!(path = %resolved.display(), "rejected path in forbidden directory");
                return Err(SafetyError::ForbiddenPath {
                    path: resolved.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Whether `path` lies inside the workspace, without forbidden-dir checks.
    pub fn contains(&self, path: &Path) -> bool {
        resolve_existing_prefix(path).starts_with(&self.workspace_root)
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Canonicalize the deepest existing ancestor of `path` and apply the
/// remaining components lexically.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        let Ok(mut resolved) = ancestor.canonicalize() else {
            continue;
        };
        let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
        for component in rest.components() {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        return resolved;
    }
    path.to_path_buf()
}
