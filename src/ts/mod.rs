//! Tree-sitter integration for Python source introspection.
//!
//! This module parses Python files into concrete syntax trees and turns their
//! top-level definitions into [`EntityDescriptor`]s with exact spans, without
//! ever regenerating source from the tree.

pub mod classify;
pub mod errors;
pub mod extract;
pub mod parser;

pub use classify::{classify, DefinitionKind, EntityKind};
pub use errors::TreeSitterError;
pub use extract::{
    extract, Choice, EntityDescriptor, Extraction, FieldInfo, MetaValue, ParseError, RouteInfo,
};
pub use parser::{ParsedSource, PythonParser};
