use crate::discovery::{DEFAULT_APP_MARKERS, DEFAULT_MODULE_DIRS, DEFAULT_MODULE_FILES};
use crate::safety::DEFAULT_FORBIDDEN_DIRS;
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PARSE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Root every read and write must stay inside.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Directories holding Django apps, relative to `workspace_root` unless
    /// absolute. Earlier entries win on duplicate app names.
    #[serde(default = "default_apps_dirs")]
    pub apps_dirs: Vec<PathBuf>,
    #[serde(default = "default_app_markers")]
    pub app_markers: Vec<String>,
    #[serde(default = "default_module_files")]
    pub module_files: Vec<String>,
    #[serde(default = "default_module_dirs")]
    pub module_dirs: Vec<String>,
    /// Per-file parse limit in milliseconds; 0 disables the limit.
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_forbidden_dirs")]
    pub forbidden_dirs: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            apps_dirs: default_apps_dirs(),
            app_markers: default_app_markers(),
            module_files: default_module_files(),
            module_dirs: default_module_dirs(),
            parse_timeout_ms: default_parse_timeout_ms(),
            strict: false,
            forbidden_dirs: default_forbidden_dirs(),
        }
    }
}

impl EngineConfig {
    /// Config rooted at `workspace_root` with every other key defaulted.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }

    pub fn parse_timeout(&self) -> Option<Duration> {
        (self.parse_timeout_ms > 0).then(|| Duration::from_millis(self.parse_timeout_ms))
    }

    /// Apps directories joined onto the workspace root.
    pub fn resolved_apps_dirs(&self) -> Vec<PathBuf> {
        self.apps_dirs
            .iter()
            .map(|dir| resolve_against(&self.workspace_root, dir))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.workspace_root.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "workspace_root",
            });
        }
        if self.apps_dirs.is_empty() {
            issues.push(ValidationIssue::MissingField { field: "apps_dirs" });
        }
        if self.app_markers.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "app_markers",
            });
        }

        for dir in &self.apps_dirs {
            if !dir.is_absolute() && escapes(dir) {
                issues.push(ValidationIssue::InvalidValue {
                    field: "apps_dirs",
                    message: format!("{} climbs above workspace_root", dir.display()),
                });
            }
        }

        for (field, names) in [
            ("app_markers", &self.app_markers),
            ("module_files", &self.module_files),
        ] {
            for name in names {
                if name.trim().is_empty() || name.contains(['/', '\\']) {
                    issues.push(ValidationIssue::InvalidValue {
                        field,
                        message: format!("'{name}' must be a plain file name"),
                    });
                }
            }
        }

        for (field, dirs) in [
            ("module_dirs", &self.module_dirs),
            ("forbidden_dirs", &self.forbidden_dirs),
        ] {
            for dir in dirs {
                let path = Path::new(dir);
                if dir.trim().is_empty() || path.is_absolute() || escapes(path) {
                    issues.push(ValidationIssue::InvalidValue {
                        field,
                        message: format!("'{dir}' must be a relative path without '..'"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Join a relative `path` onto `root`, dropping `.` components.
pub(crate) fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .fold(root.to_path_buf(), |acc, c| acc.join(c))
}

fn escapes(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_apps_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_app_markers() -> Vec<String> {
    to_strings(DEFAULT_APP_MARKERS)
}

fn default_module_files() -> Vec<String> {
    to_strings(DEFAULT_MODULE_FILES)
}

fn default_module_dirs() -> Vec<String> {
    to_strings(DEFAULT_MODULE_DIRS)
}

fn default_parse_timeout_ms() -> u64 {
    DEFAULT_PARSE_TIMEOUT_MS
}

fn default_forbidden_dirs() -> Vec<String> {
    to_strings(DEFAULT_FORBIDDEN_DIRS)
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField { field: &'static str },
    InvalidValue { field: &'static str, message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "config field '{field}' must not be empty")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid value for '{field}': {message}")
            }
        }
    }
}
