//! Django Patcher: source introspection and position-addressed patching
//! for Django app trees.
//!
//! The crate parses the Python modules of Django apps with tree-sitter,
//! reports their top-level entities (models, views, serializers, URL
//! patterns, tasks and management commands) with exact source spans, and
//! applies coordinate-addressed text replacements back onto those files.
//!
//! # Architecture
//!
//! Edits splice text; they never regenerate source from a syntax tree. The
//! extractor and the patcher share one coordinate convention through
//! [`position::LineIndex`], so a span reported by a listing can be fed
//! straight back into a [`ModificationRequest`].
//!
//! # Safety
//!
//! - Every target path is checked against the workspace root before any
//!   read and again immediately before the write
//! - Atomic file writes (tempfile + fsync + rename)
//! - Writes to the same file are serialized
//! - Optional before-text verification
//!
//! # Example
//!
//! ```no_run
//! use django_patcher::{Engine, EngineConfig, ModificationRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::for_workspace("/srv/project"))?;
//! let listing = engine.list_entities("blog", None)?;
//!
//! if let Some(model) = listing.entities.iter().find(|e| e.name == "Post") {
//!     let request = ModificationRequest::from_entity(model, "class Post(models.Model):\n    pass");
//!     let result = engine.modify(&request)?;
//!     println!("wrote {} ({})", model.file_path.display(), result.content_hash);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod edit;
pub mod engine;
pub mod error;
pub mod lock;
pub mod pool;
pub mod position;
pub mod safety;
pub mod ts;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, EngineConfig};
pub use discovery::{AppDescriptor, AppDiscovery, DiscoveryError};
pub use edit::{
    content_hash, EditVerification, ModificationRequest, ModificationResult, PatchError,
    SourcePatcher,
};
pub use engine::{Diagnostic, Engine, Listing};
pub use error::{EngineError, ErrorKind};
pub use position::{RangeError, ResolvedSpan, SourceSpan};
pub use safety::{SafetyError, WorkspaceGuard};
pub use ts::{EntityDescriptor, EntityKind, TreeSitterError};
