//! Crate-wide error taxonomy.
//!
//! Each module reports failures through its own error enum; [`EngineError`]
//! aggregates them and [`ErrorKind`] is the stable classification callers
//! (and the CLI's JSON output) match on.

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::edit::PatchError;
use crate::position::RangeError;
use crate::safety::SafetyError;
use crate::ts::TreeSitterError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// App or file does not exist.
    NotFound,
    /// Source does not parse.
    Parse,
    /// Coordinates do not resolve against the text.
    Range,
    /// Target resolves outside the workspace or into a forbidden directory.
    PathViolation,
    /// Temp file creation, fsync or rename failed.
    Write,
    ParseTimeout,
    /// Before-text verification failed.
    Conflict,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Parse => "Parse",
            ErrorKind::Range => "Range",
            ErrorKind::PathViolation => "PathViolation",
            ErrorKind::Write => "Write",
            ErrorKind::ParseTimeout => "ParseTimeout",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Config => "Config",
            ErrorKind::Io => "Io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Parser(#[from] TreeSitterError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Discovery(DiscoveryError::Io { .. }) => ErrorKind::Io,
            EngineError::Discovery(_) => ErrorKind::NotFound,
            EngineError::Patch(e) => e.kind(),
            EngineError::Parser(e) => e.kind(),
            EngineError::Range(_) => ErrorKind::Range,
            EngineError::Safety(SafetyError::Canonicalize { .. }) => ErrorKind::Config,
            EngineError::Safety(_) => ErrorKind::PathViolation,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
