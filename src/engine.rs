//! Listing and modification pipelines over one configured workspace.

use crate::config::schema::resolve_against;
use crate::config::EngineConfig;
use crate::discovery::{AppDescriptor, AppDiscovery};
use crate::edit::{ModificationRequest, ModificationResult, PreparedEdit, SourcePatcher};
use crate::error::{EngineError, ErrorKind, Result};
use crate::pool;
use crate::position::{self, ResolvedSpan, SourceSpan};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::ts::{extract, EntityDescriptor, EntityKind, ParseError, TreeSitterError};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A file that contributed no entities, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file_path: PathBuf,
    /// 1-based line of the first syntax error; absent for whole-file failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
    pub kind: ErrorKind,
}

impl From<ParseError> for Diagnostic {
    fn from(error: ParseError) -> Self {
        Self {
            file_path: error.file_path,
            line: Some(error.line),
            message: error.message,
            kind: ErrorKind::Parse,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub entities: Vec<EntityDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Listing {
    fn extend(&mut self, other: Listing) {
        self.entities.extend(other.entities);
        self.diagnostics.extend(other.diagnostics);
    }
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    discovery: AppDiscovery,
    patcher: SourcePatcher,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(|source| {
            EngineError::Config(crate::config::ConfigError::Validation { path: None, source })
        })?;

        let guard = WorkspaceGuard::with_forbidden(&config.workspace_root, &config.forbidden_dirs)?;
        let mut apps_dirs = Vec::new();
        for dir in &config.apps_dirs {
            let dir = resolve_against(guard.workspace_root(), dir);
            if !guard.contains(&dir) {
                return Err(SafetyError::OutsideWorkspace {
                    path: dir,
                    workspace: guard.workspace_root().to_path_buf(),
                }
                .into());
            }
            apps_dirs.push(dir);
        }

        let discovery = AppDiscovery::new(apps_dirs)
            .with_markers(config.app_markers.clone())
            .with_layout(config.module_files.clone(), config.module_dirs.clone());
        let patcher = SourcePatcher::new(guard)
            .strict(config.strict)
            .parse_timeout(config.parse_timeout());

        Ok(Self {
            config,
            discovery,
            patcher,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn discovery(&self) -> &AppDiscovery {
        &self.discovery
    }

    pub fn workspace_root(&self) -> &Path {
        self.patcher.guard().workspace_root()
    }

    fn parse_timeout(&self) -> Option<Duration> {
        self.config.parse_timeout()
    }

    pub fn list_apps(&self) -> Result<Vec<AppDescriptor>> {
        Ok(self.discovery.list_apps()?)
    }

    pub fn validate_app_exists(&self, app_name: &str) -> Result<AppDescriptor> {
        Ok(self.discovery.validate_app_exists(app_name)?)
    }

    pub fn find_app_file(&self, app_name: &str, relative_path: &str) -> Result<PathBuf> {
        Ok(self.discovery.find_app_file(app_name, relative_path)?)
    }

    /// Source files a listing of `app_name` scans.
    pub fn list_files(&self, app_name: &str) -> Result<Vec<PathBuf>> {
        let app = self.validate_app_exists(app_name)?;
        Ok(self.discovery.source_files(&app)?)
    }

    /// Entities of every source file in the app, in file then source order.
    ///
    /// Files are parsed in parallel. A file that cannot be read or parsed
    /// contributes one diagnostic and no entities; it never fails the listing.
    pub fn list_entities(&self, app_name: &str, kind: Option<EntityKind>) -> Result<Listing> {
        let files = self.list_files(app_name)?;
        tracing::debug!(app = app_name, files = files.len(), "listing entities");

        let timeout = self.parse_timeout();
        let per_file: Vec<Listing> = files
            .par_iter()
            .map(|path| list_file(path, timeout))
            .collect();

        let mut listing = Listing::default();
        for file in per_file {
            listing.extend(file);
        }
        if let Some(kind) = kind {
            listing.entities.retain(|e| e.kind == kind);
        }
        Ok(listing)
    }

    /// Entities of a single file inside the workspace.
    pub fn inspect_file(&self, path: impl AsRef<Path>) -> Result<Listing> {
        let path = self.patcher.guard().validate_path(path)?;
        let source = read_file(&path)?;
        let extraction =
            pool::with_parser(self.parse_timeout(), |parser| extract(parser, &path, &source))??;
        Ok(Listing {
            entities: extraction.entities,
            diagnostics: extraction.diagnostics.into_iter().map(Diagnostic::from).collect(),
        })
    }

    pub fn modify(&self, request: &ModificationRequest) -> Result<ModificationResult> {
        Ok(self.patcher.apply(request)?)
    }

    /// Compute a modification without writing it.
    pub fn preview(&self, request: &ModificationRequest) -> Result<PreparedEdit> {
        Ok(self.patcher.preview(request)?)
    }

    /// Resolve `span` against the current contents of `path`.
    pub fn resolve(&self, path: impl AsRef<Path>, span: &SourceSpan) -> Result<ResolvedSpan> {
        let path = self.patcher.guard().validate_path(path)?;
        let source = read_file(&path)?;
        Ok(position::resolve(&source, span)?)
    }
}

fn read_file(path: &Path) -> std::result::Result<String, TreeSitterError> {
    fs::read_to_string(path).map_err(|source| TreeSitterError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn list_file(path: &Path, timeout: Option<Duration>) -> Listing {
    let outcome = read_file(path).and_then(|source| {
        pool::with_parser(timeout, |parser| extract(parser, path, &source)).and_then(|r| r)
    });

    match outcome {
        Ok(extraction) => {
            for diagnostic in &extraction.diagnostics {
                tracing::warn!(
                    file = %diagnostic.file_path.display(),
                    line = diagnostic.line,
                    "{}",
                    diagnostic.message
                );
            }
            Listing {
                entities: extraction.entities,
                diagnostics: extraction.diagnostics.into_iter().map(Diagnostic::from).collect(),
            }
        }
        Err(err) => {
            tracing::warn!(file = %path.display(), error = %err, "skipping file");
            Listing {
                entities: Vec::new(),
                diagnostics: vec![Diagnostic {
                    file_path: path.to_path_buf(),
                    line: None,
                    message: err.to_string(),
                    kind: err.kind(),
                }],
            }
        }
    }
}
