use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSitterError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("parsing exceeded the configured limit of {} ms", limit.as_millis())]
    ParseTimeout { limit: Duration },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TreeSitterError {
    pub fn kind(&self) -> crate::error::ErrorKind {
        use crate::error::ErrorKind;
        match self {
            TreeSitterError::ParseTimeout { .. } => ErrorKind::ParseTimeout,
            TreeSitterError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            TreeSitterError::Io { .. } => ErrorKind::Io,
            TreeSitterError::LanguageSet | TreeSitterError::ParseFailed => ErrorKind::Parse,
        }
    }
}
