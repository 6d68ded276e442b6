//! Document coordinates and offset resolution.
//!
//! Every span this crate produces or accepts uses one convention:
//!
//! - lines are 1-indexed
//! - columns are 0-indexed and count Unicode scalar values (code points)
//! - `\n`, `\r\n` and a lone `\r` each count as one line break and never
//!   contribute columns to the line they terminate
//!
//! [`LineIndex`] is the only place that converts between byte offsets,
//! code-point offsets and `(line, column)` pairs. The entity extractor uses
//! it to report spans and the patcher uses it to resolve them, so the two
//! can never disagree about what a coordinate means. The text is never
//! rewritten to normalize line endings; only counting is uniform.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// A single `(line, column)` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// Half-open range in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceSpan {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Zero-width span at a single position (pure insertion point).
    pub fn point(line: usize, col: usize) -> Self {
        Self::new(line, col, line, col)
    }

    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_col)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_col)
    }

    pub fn is_empty(&self) -> bool {
        self.start() == self.end()
    }

    /// Check the span's shape without looking at any text.
    pub fn validate(&self) -> Result<(), RangeError> {
        if self.start_line == 0 || self.end_line == 0 {
            return Err(RangeError::ZeroLine);
        }
        if self.end() < self.start() {
            return Err(RangeError::Inverted {
                start: self.start(),
                end: self.end(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("line numbers start at 1, got line 0")]
    ZeroLine,

    #[error("line {line} is beyond the end of the text ({line_count} lines)")]
    LineOutOfRange { line: usize, line_count: usize },

    #[error("column {col} is beyond the end of line {line} ({line_len} code points)")]
    ColumnOutOfRange {
        line: usize,
        col: usize,
        line_len: usize,
    },

    #[error("span end {}:{} precedes start {}:{}", end.line, end.col, start.line, start.col)]
    Inverted { start: Position, end: Position },

    #[error("edit start {}:{} does not fall on a syntax boundary", start.line, start.col)]
    Unaligned { start: Position },
}

/// Absolute offsets of a resolved span, in both code points and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpan {
    /// Code-point offsets into the text.
    pub chars: Range<usize>,
    /// Byte offsets into the text (always on char boundaries).
    pub bytes: Range<usize>,
}

impl ResolvedSpan {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start_byte: usize,
    start_char: usize,
    /// Byte offset where the line's content ends (its terminator starts).
    end_byte: usize,
    len_chars: usize,
}

/// Line table over a borrowed text.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    lines: Vec<Line>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut start_byte = 0;
        let mut start_char = 0;
        let mut chars = 0;

        let mut iter = text.char_indices().peekable();
        while let Some((byte, ch)) = iter.next() {
            if ch != '\n' && ch != '\r' {
                chars += 1;
                continue;
            }

            lines.push(Line {
                start_byte,
                start_char,
                end_byte: byte,
                len_chars: chars - start_char,
            });

            let mut next_byte = byte + 1;
            chars += 1;
            if ch == '\r' && matches!(iter.peek(), Some(&(_, '\n'))) {
                iter.next();
                next_byte += 1;
                chars += 1;
            }
            start_byte = next_byte;
            start_char = chars;
        }

        lines.push(Line {
            start_byte,
            start_char,
            end_byte: text.len(),
            len_chars: chars - start_char,
        });

        Self { text, lines }
    }

    /// Number of lines; an empty text has one (empty) line.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Length of a 1-based line in code points, excluding its terminator.
    pub fn line_len(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(|l| l.len_chars)
    }

    /// Convert a byte offset (as reported by the parser) into a position.
    ///
    /// Offsets that fall inside a line terminator clamp to the end of that
    /// line's content.
    pub fn position(&self, byte: usize) -> Position {
        let byte = byte.min(self.text.len());
        let idx = self
            .lines
            .partition_point(|l| l.start_byte <= byte)
            .saturating_sub(1);
        let line = self.lines[idx];
        let end = byte.min(line.end_byte);
        let col = self
            .text
            .get(line.start_byte..end)
            .map(|s| s.chars().count())
            .unwrap_or(line.len_chars);

        Position::new(idx + 1, col)
    }

    /// Convert a parser byte range into a span.
    pub fn span(&self, bytes: Range<usize>) -> SourceSpan {
        let start = self.position(bytes.start);
        let end = self.position(bytes.end);
        SourceSpan::new(start.line, start.col, end.line, end.col)
    }

    /// Resolve a single position to `(char_offset, byte_offset)`.
    pub fn offset(&self, pos: Position) -> Result<(usize, usize), RangeError> {
        if pos.line == 0 {
            return Err(RangeError::ZeroLine);
        }
        let line = self
            .lines
            .get(pos.line - 1)
            .ok_or(RangeError::LineOutOfRange {
                line: pos.line,
                line_count: self.lines.len(),
            })?;

        if pos.col > line.len_chars {
            return Err(RangeError::ColumnOutOfRange {
                line: pos.line,
                col: pos.col,
                line_len: line.len_chars,
            });
        }

        let content = &self.text[line.start_byte..line.end_byte];
        let byte_in_line = content
            .char_indices()
            .nth(pos.col)
            .map(|(b, _)| b)
            .unwrap_or(content.len());

        Ok((line.start_char + pos.col, line.start_byte + byte_in_line))
    }

    /// Resolve a span to absolute offsets.
    pub fn resolve(&self, span: &SourceSpan) -> Result<ResolvedSpan, RangeError> {
        let (start_char, start_byte) = self.offset(span.start())?;
        let (end_char, end_byte) = self.offset(span.end())?;

        if end_char < start_char {
            return Err(RangeError::Inverted {
                start: span.start(),
                end: span.end(),
            });
        }

        Ok(ResolvedSpan {
            chars: start_char..end_char,
            bytes: start_byte..end_byte,
        })
    }
}

/// Resolve `span` against `text` using the crate-wide coordinate convention.
pub fn resolve(text: &str, span: &SourceSpan) -> Result<ResolvedSpan, RangeError> {
    LineIndex::new(text).resolve(span)
}
