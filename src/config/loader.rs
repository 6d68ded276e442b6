use crate::config::schema::{EngineConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides `workspace_root`.
pub const ENV_WORKSPACE: &str = "DJANGO_PATCHER_WORKSPACE";
/// Overrides `apps_dirs`; comma-separated.
pub const ENV_APPS_DIR: &str = "DJANGO_PROJECT_APPS_DIR";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<EngineConfig, ConfigError> {
    let mut config: EngineConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    expand_paths(&mut config);
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

/// Load a config file. A relative `workspace_root` inside it is taken
/// relative to the file's directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = load_from_str(&contents).map_err(|error| error.with_path(path))?;
    if config.workspace_root.is_relative() {
        if let Some(dir) = path.parent() {
            config.workspace_root = dir.join(&config.workspace_root);
        }
    }
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Apply `DJANGO_PATCHER_WORKSPACE` / `DJANGO_PROJECT_APPS_DIR` from the
/// process environment.
pub fn apply_env(config: EngineConfig) -> Result<EngineConfig, ConfigError> {
    apply_env_with(config, |key| std::env::var(key).ok())
}

/// Apply environment overrides read through `lookup`, then re-validate.
pub fn apply_env_with(
    mut config: EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EngineConfig, ConfigError> {
    if let Some(root) = lookup(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
        config.workspace_root = PathBuf::from(root.trim());
    }
    if let Some(dirs) = lookup(ENV_APPS_DIR) {
        let dirs: Vec<PathBuf> = dirs
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .collect();
        if !dirs.is_empty() {
            config.apps_dirs = dirs;
        }
    }
    expand_paths(&mut config);
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

fn expand_paths(config: &mut EngineConfig) {
    config.workspace_root = expand_home(&config.workspace_root);
    for dir in &mut config.apps_dirs {
        *dir = expand_home(dir);
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_input_uses_defaults() {
        let config = load_from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.parse_timeout_ms, 2000);
        assert!(!config.strict);
    }

    #[test]
    fn parses_all_keys() {
        let config = load_from_str(
            r#"
workspace_root = "/srv/project"
apps_dirs = ["apps", "/opt/shared_apps"]
app_markers = ["apps.py"]
module_files = ["models.py"]
module_dirs = ["tasks"]
parse_timeout_ms = 0
strict = true
forbidden_dirs = [".git"]
"#,
        )
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/srv/project"));
        assert_eq!(
            config.resolved_apps_dirs(),
            vec![
                PathBuf::from("/srv/project/apps"),
                PathBuf::from("/opt/shared_apps")
            ]
        );
        assert_eq!(config.parse_timeout(), None);
        assert!(config.strict);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = load_from_str("workspace = \"/srv\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn validation_collects_issues() {
        let err = load_from_str(
            r#"
apps_dirs = []
module_dirs = ["../outside"]
app_markers = ["sub/apps.py"]
"#,
        )
        .unwrap_err();
        let ConfigError::Validation { source, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(source.issues.len(), 3);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_WORKSPACE, "/srv/other"),
            (ENV_APPS_DIR, "apps, legacy_apps ,"),
        ]);
        let config = apply_env_with(EngineConfig::default(), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/srv/other"));
        assert_eq!(
            config.apps_dirs,
            vec![PathBuf::from("apps"), PathBuf::from("legacy_apps")]
        );
    }

    #[test]
    fn missing_env_keeps_config() {
        let config = apply_env_with(EngineConfig::for_workspace("/srv"), |_| None).unwrap();
        assert_eq!(config, EngineConfig::for_workspace("/srv"));
    }

    #[test]
    fn load_from_path_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("django-patcher.toml");
        fs::write(&path, "strict = \"yes\"").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("django-patcher.toml"));

        fs::write(&path, "apps_dirs = [\"apps\"]").unwrap();
        let config = load_from_path(&path).unwrap();
        assert_eq!(config.workspace_root, dir.path().join("."));
    }
}
