use crate::error::ErrorKind;
use crate::lock::PathLocks;
use crate::pool;
use crate::position::{LineIndex, Position, RangeError, ResolvedSpan, SourceSpan};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::ts::{EntityDescriptor, TreeSitterError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A position-addressed replacement: the text inside `span` becomes
/// `replacement`. A zero-width span inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRequest {
    pub file_path: PathBuf,
    #[serde(flatten)]
    pub span: SourceSpan,
    pub replacement: String,
    /// What the span must currently contain for the edit to go ahead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<EditVerification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationResult {
    pub success: bool,
    /// Length of the written text in code points.
    pub new_length: usize,
    /// xxh3-64 of the written bytes as 16 hex digits.
    pub content_hash: String,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    /// Get hash value regardless of variant.
    pub fn hash(&self) -> u64 {
        match self {
            EditVerification::Hash(h) => *h,
            EditVerification::ExactMatch(text) => xxh3_64(text.as_bytes()),
        }
    }
}

impl ModificationRequest {
    pub fn new(file_path: impl Into<PathBuf>, span: SourceSpan, replacement: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            span,
            replacement: replacement.into(),
            expected: None,
        }
    }

    /// Replace a whole entity as reported by a listing.
    pub fn from_entity(entity: &EntityDescriptor, replacement: impl Into<String>) -> Self {
        Self::new(entity.file_path.clone(), entity.span, replacement)
    }

    /// Require the span to currently hold `text` (hashed when large).
    pub fn expecting(mut self, text: &str) -> Self {
        self.expected = Some(EditVerification::from_text(text));
        self
    }
}

/// xxh3-64 of `content`, formatted as 16 lowercase hex digits.
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    format!("{:016x}", xxh3_64(content.as_ref()))
}

/// `text[..start] + replacement + text[end..]` over a resolved span.
pub fn splice(text: &str, span: &ResolvedSpan, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() - span.bytes.len() + replacement.len());
    out.push_str(&text[..span.bytes.start]);
    out.push_str(replacement);
    out.push_str(&text[span.bytes.end..]);
    out
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Path(#[from] SafetyError),

    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid range in {}: {source}", path.display())]
    Range {
        path: PathBuf,
        #[source]
        source: RangeError,
    },

    #[error("before-text verification failed at {}:{span}", path.display())]
    Conflict {
        path: PathBuf,
        span: SourceSpan,
        expected: EditVerification,
        found: String,
    },

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("parser failed on {}: {source}", path.display())]
    Parser {
        path: PathBuf,
        #[source]
        source: TreeSitterError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::Path(_) => ErrorKind::PathViolation,
            PatchError::NotFound { .. } => ErrorKind::NotFound,
            PatchError::Read { .. } => ErrorKind::Io,
            PatchError::Range { .. } => ErrorKind::Range,
            PatchError::Conflict { .. } => ErrorKind::Conflict,
            PatchError::Parse { .. } => ErrorKind::Parse,
            PatchError::Parser { source, .. } => source.kind(),
            PatchError::Write { .. } => ErrorKind::Write,
        }
    }
}

/// A modification computed but not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEdit {
    /// Canonical path of the target.
    pub path: PathBuf,
    pub original: String,
    pub updated: String,
    pub span: ResolvedSpan,
}

impl PreparedEdit {
    pub fn result(&self) -> ModificationResult {
        ModificationResult {
            success: true,
            new_length: self.updated.chars().count(),
            content_hash: content_hash(&self.updated),
        }
    }
}

/// Applies [`ModificationRequest`]s inside one workspace.
///
/// Every write goes through the workspace guard twice (on entry and right
/// before the rename) and is serialized per canonical path.
#[derive(Debug)]
pub struct SourcePatcher {
    guard: WorkspaceGuard,
    locks: PathLocks,
    strict: bool,
    parse_timeout: Option<Duration>,
}

impl SourcePatcher {
    pub fn new(guard: WorkspaceGuard) -> Self {
        Self {
            guard,
            locks: PathLocks::new(),
            strict: false,
            parse_timeout: None,
        }
    }

    /// Reject edits into files that do not parse, or whose start does not
    /// fall on a line start, the end of the file, or the start of a node.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn parse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.parse_timeout = timeout;
        self
    }

    pub fn guard(&self) -> &WorkspaceGuard {
        &self.guard
    }

    /// Apply the request, writing the file atomically.
    ///
    /// On any error the target is left untouched.
    pub fn apply(&self, request: &ModificationRequest) -> Result<ModificationResult, PatchError> {
        let path = self.guard.validate_path(&request.file_path)?;
        self.locks.with_lock(&path, || -> Result<ModificationResult, PatchError> {
            let prepared = self.prepare_at(path.clone(), request)?;
            self.write(&prepared)?;
            tracing::debug!(
                file = %prepared.path.display(),
                span = %request.span,
                "applied modification"
            );
            Ok(prepared.result())
        })
    }

    /// Compute the edit without writing it.
    pub fn preview(&self, request: &ModificationRequest) -> Result<PreparedEdit, PatchError> {
        let path = self.guard.validate_path(&request.file_path)?;
        self.locks
            .with_lock(&path, || self.prepare_at(path.clone(), request))
    }

    fn prepare_at(&self, path: PathBuf, request: &ModificationRequest) -> Result<PreparedEdit, PatchError> {
        let original = read_source(&path)?;
        let index = LineIndex::new(&original);
        let span = index.resolve(&request.span).map_err(|source| PatchError::Range {
            path: path.clone(),
            source,
        })?;

        if let Some(expected) = &request.expected {
            let found = &original[span.bytes.clone()];
            if !expected.matches(found) {
                return Err(PatchError::Conflict {
                    path,
                    span: request.span,
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }

        if self.strict {
            self.check_strict(&path, &original, &index, &span, request.span.start())?;
        }

        let updated = splice(&original, &span, &request.replacement);
        Ok(PreparedEdit {
            path,
            original,
            updated,
            span,
        })
    }

    fn check_strict(
        &self,
        path: &Path,
        text: &str,
        index: &LineIndex<'_>,
        span: &ResolvedSpan,
        start: Position,
    ) -> Result<(), PatchError> {
        let at = span.bytes.start;
        let (error, on_node) = pool::with_parser(self.parse_timeout, |parser| {
            parser
                .parse_with_source(text)
                .map(|parsed| (parsed.first_error(), parsed.has_node_starting_at(at)))
        })
        .and_then(|parsed| parsed)
        .map_err(|source| PatchError::Parser {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(error) = error {
            return Err(PatchError::Parse {
                path: path.to_path_buf(),
                line: index.position(error.byte_start).line,
                message: error.message,
            });
        }

        let aligned = at == text.len() || index.position(at).col == 0 || on_node;
        if !aligned {
            return Err(PatchError::Range {
                path: path.to_path_buf(),
                source: RangeError::Unaligned { start },
            });
        }
        Ok(())
    }

    fn write(&self, prepared: &PreparedEdit) -> Result<(), PatchError> {
        let path = self.guard.revalidate(&prepared.path)?;
        atomic_write(&path, prepared.updated.as_bytes()).map_err(|source| PatchError::Write {
            path: path.clone(),
            source,
        })
    }
}

fn read_source(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PatchError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PatchError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Atomic file write: tempfile + fsync + rename.
///
/// This ensures crash safety - either the full write succeeds or nothing changes.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    // Bump mtime so autoreloaders notice even same-size rewrites; the rename
    // keeps it, so a failure here still leaves the target untouched.
    filetime::set_file_handle_times(temp.as_file(), None, Some(filetime::FileTime::now()))?;
    temp.as_file().sync_all()?;

    // Carry over permissions; NamedTempFile creates 0600.
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
