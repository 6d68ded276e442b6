//! Django app discovery.
//!
//! An app is a directory directly under one of the configured apps
//! directories that contains an app marker file (`apps.py` or `models.py`
//! by default). Discovery only reads the filesystem.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const DEFAULT_APP_MARKERS: &[&str] = &["apps.py", "models.py"];

/// Conventional single-file modules scanned for entities.
pub const DEFAULT_MODULE_FILES: &[&str] = &[
    "models.py",
    "views.py",
    "viewsets.py",
    "serializers.py",
    "urls.py",
    "tasks.py",
];

/// Conventional packages whose modules are scanned for entities.
pub const DEFAULT_MODULE_DIRS: &[&str] = &[
    "models",
    "views",
    "serializers",
    "tasks",
    "management/commands",
];

/// Minimum similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: String,
    pub path: PathBuf,
    /// The configured apps directory the app was found in.
    pub apps_dir: PathBuf,
}

/// A Python module inside an app package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFile {
    /// File stem (`send_digest` for `tasks/send_digest.py`).
    pub name: String,
    pub path: PathBuf,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(
        "App '{app_name}' not found{}",
        .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default()
    )]
    AppNotFound {
        app_name: String,
        suggestion: Option<String>,
    },

    #[error("{relative_path} not found for app {app_name}")]
    FileNotFound {
        app_name: String,
        relative_path: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppDiscovery {
    apps_dirs: Vec<PathBuf>,
    markers: Vec<String>,
    module_files: Vec<String>,
    module_dirs: Vec<String>,
}

impl AppDiscovery {
    /// Discovery over the given apps directories with the default layout.
    pub fn new(apps_dirs: Vec<PathBuf>) -> Self {
        Self {
            apps_dirs,
            markers: to_strings(DEFAULT_APP_MARKERS),
            module_files: to_strings(DEFAULT_MODULE_FILES),
            module_dirs: to_strings(DEFAULT_MODULE_DIRS),
        }
    }

    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_layout(mut self, module_files: Vec<String>, module_dirs: Vec<String>) -> Self {
        self.module_files = module_files;
        self.module_dirs = module_dirs;
        self
    }

    pub fn apps_dirs(&self) -> &[PathBuf] {
        &self.apps_dirs
    }

    fn is_app_dir(&self, dir: &Path) -> bool {
        dir.is_dir() && self.markers.iter().any(|m| dir.join(m).is_file())
    }

    /// All apps across the configured directories, sorted by name.
    ///
    /// When two apps directories contain an app of the same name, the one
    /// in the earlier directory wins.
    pub fn list_apps(&self) -> Result<Vec<AppDescriptor>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut apps = Vec::new();

        for apps_dir in &self.apps_dirs {
            if !apps_dir.is_dir() {
                tracing::debug!(dir = %apps_dir.display(), "skipping missing apps directory");
                continue;
            }

            for entry in WalkDir::new(apps_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| DiscoveryError::Io {
                    path: apps_dir.clone(),
                    source: e.into(),
                })?;
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                if !self.is_app_dir(entry.path()) || !seen.insert(name.to_string()) {
                    continue;
                }
                apps.push(AppDescriptor {
                    name: name.to_string(),
                    path: entry.path().to_path_buf(),
                    apps_dir: apps_dir.clone(),
                });
            }
        }

        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    /// Directory of the named app.
    pub fn find_app_directory(&self, app_name: &str) -> Result<AppDescriptor, DiscoveryError> {
        if is_single_component(app_name) {
            for apps_dir in &self.apps_dirs {
                let path = apps_dir.join(app_name);
                if self.is_app_dir(&path) {
                    return Ok(AppDescriptor {
                        name: app_name.to_string(),
                        path,
                        apps_dir: apps_dir.clone(),
                    });
                }
            }
        }

        Err(DiscoveryError::AppNotFound {
            app_name: app_name.to_string(),
            suggestion: self.suggest(app_name),
        })
    }

    /// Confirm that `app_name` names an existing app before any work on it.
    pub fn validate_app_exists(&self, app_name: &str) -> Result<AppDescriptor, DiscoveryError> {
        let app = self.find_app_directory(app_name);
        if let Err(err) = &app {
            tracing::debug!(app = app_name, error = %err, "app validation failed");
        }
        app
    }

    /// A file inside the named app.
    ///
    /// `relative_path` must stay inside the app directory; absolute paths
    /// and `..` components are treated as not found.
    pub fn find_app_file(&self, app_name: &str, relative_path: &str) -> Result<PathBuf, DiscoveryError> {
        let app = self.find_app_directory(app_name)?;
        let stays_inside = Path::new(relative_path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        let target = app.path.join(relative_path);
        if stays_inside && target.is_file() {
            return Ok(target);
        }

        Err(DiscoveryError::FileNotFound {
            app_name: app_name.to_string(),
            relative_path: relative_path.to_string(),
        })
    }

    /// Python modules of an app sub-package, `__init__.py` excluded.
    ///
    /// A missing sub-directory yields an empty list.
    pub fn list_module_files(&self, app_dir: &Path, subdir: &str) -> Result<Vec<ModuleFile>, DiscoveryError> {
        let dir = app_dir.join(subdir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| DiscoveryError::Io {
                path: dir.clone(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("py")
                || entry.file_name() == "__init__.py"
            {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            files.push(ModuleFile {
                name,
                path: path.to_path_buf(),
            });
        }
        Ok(files)
    }

    /// Every source file a listing of `app` scans, in a stable order.
    pub fn source_files(&self, app: &AppDescriptor) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for module in &self.module_files {
            let path = app.path.join(module);
            if path.is_file() && seen.insert(path.clone()) {
                files.push(path);
            }
        }
        for dir in &self.module_dirs {
            for module in self.list_module_files(&app.path, dir)? {
                if seen.insert(module.path.clone()) {
                    files.push(module.path);
                }
            }
        }

        Ok(files)
    }

    fn suggest(&self, app_name: &str) -> Option<String> {
        let apps = self.list_apps().ok()?;
        apps.into_iter()
            .map(|app| (strsim::jaro_winkler(app_name, &app.name), app.name))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, name)| name)
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
