//! Thread-local parser pooling.
//!
//! Each thread (including every rayon worker used by listings) lazily creates
//! one Python parser and reuses it for subsequent files. The time limit is
//! applied per call, so callers with different limits can share the pool.

use crate::ts::{PythonParser, TreeSitterError};
use std::cell::RefCell;
use std::time::Duration;

thread_local! {
    static PYTHON_PARSER: RefCell<Option<PythonParser>> = const { RefCell::new(None) };
}

/// Execute function with the pooled parser instance for this thread.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use django_patcher::pool::with_parser;
/// use std::time::Duration;
///
/// let has_errors = with_parser(Some(Duration::from_secs(2)), |parser| {
///     parser.parse_with_source("class Foo:\n    pass\n").map(|p| p.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(timeout: Option<Duration>, f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut PythonParser) -> R,
{
    PYTHON_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(PythonParser::new()?);
        }
        let parser = slot.as_mut().expect("parser was just initialized above");
        parser.set_timeout(timeout);
        Ok(f(parser))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_parser_across_calls() {
        let first = with_parser(None, |p| p.parse("x = 1\n").is_ok()).unwrap();
        let second = with_parser(Some(Duration::from_secs(1)), |p| p.timeout()).unwrap();
        assert!(first);
        assert_eq!(second, Some(Duration::from_secs(1)));
    }
}
