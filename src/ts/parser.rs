use crate::ts::errors::TreeSitterError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::time::{Duration, Instant};
use tree_sitter::{Node, ParseOptions, ParseState, Parser, Point, Tree};

/// Longest snippet quoted in a syntax error message.
const SNIPPET_CHARS: usize = 40;

/// Tree-sitter parser wrapper for Python source code.
pub struct PythonParser {
    parser: Parser,
    timeout: Option<Duration>,
}

impl PythonParser {
    /// Create a parser with no time limit.
    pub fn new() -> Result<Self, TreeSitterError> {
        Self::with_timeout(None)
    }

    /// Create a parser that gives up once parsing runs longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        let ts_lang = SupportLang::Python.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TreeSitterError::LanguageSet)?;

        Ok(Self { parser, timeout })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, TreeSitterError> {
        let Some(limit) = self.timeout else {
            return self
                .parser
                .parse(source, None)
                .ok_or(TreeSitterError::ParseFailed);
        };

        let bytes = source.as_bytes();
        let started = Instant::now();
        let mut timed_out = false;
        let mut progress = |_: &ParseState| {
            timed_out = started.elapsed() > limit;
            timed_out
        };
        let options = ParseOptions::new().progress_callback(&mut progress);

        let tree = self.parser.parse_with_options(
            &mut |offset: usize, _: Point| bytes.get(offset..).unwrap_or_default(),
            None,
            Some(options),
        );

        match tree {
            Some(tree) => Ok(tree),
            None if timed_out => {
                // A cancelled parse leaves state behind that would otherwise
                // be resumed by the next call.
                self.parser.reset();
                Err(TreeSitterError::ParseTimeout { limit })
            }
            None => Err(TreeSitterError::ParseFailed),
        }
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl ParsedSource<'_> {
    /// Get the root node of the tree.
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// First ERROR or MISSING node in document order.
    pub fn first_error(&self) -> Option<ErrorNode> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }
        find_first_error(root, self.source)
    }

    /// Whether a named node (other than the module itself) starts at `byte`.
    pub fn has_node_starting_at(&self, byte: usize) -> bool {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let found = root
            .named_children(&mut cursor)
            .any(|child| starts_at(child, byte));
        found
    }
}

/// Information about an ERROR or MISSING node in the parse tree.
#[derive(Debug, Clone)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    pub message: String,
}

fn find_first_error(node: Node<'_>, source: &str) -> Option<ErrorNode> {
    if node.is_missing() {
        return Some(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            message: format!("missing `{}`", node.kind()),
        });
    }

    if node.is_error() {
        let snippet: String = source[node.byte_range()]
            .trim()
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(SNIPPET_CHARS)
            .collect();
        let message = if snippet.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near `{snippet}`")
        };
        return Some(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            message,
        });
    }

    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| find_first_error(child, source))
}

fn starts_at(node: Node<'_>, byte: usize) -> bool {
    if node.start_byte() == byte {
        return true;
    }
    if node.start_byte() > byte || node.end_byte() <= byte {
        return false;
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children.into_iter().any(|child| starts_at(child, byte))
}
