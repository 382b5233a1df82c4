//! Source locations attached to AST nodes and diagnostics.

use std::fmt;

/// Position of a node in its script, as reported by the parser.
///
/// Only the start is tracked precisely; `len` is informational and is
/// widened by [`Span::to`] when nodes are combined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, byte-based).
    pub col: u32,
    /// Length in bytes.
    pub len: u32,
}

impl Span {
    /// Span covering `len` bytes starting at `line:col`.
    #[inline]
    pub fn new(line: u32, col: u32, len: u32) -> Self {
        Self { line, col, len }
    }

    /// Zero-length span at a position.
    #[inline]
    pub fn point(line: u32, col: u32) -> Self {
        Self { line, col, len: 0 }
    }

    /// Whether the span was never set by a parser.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }

    /// Span starting at `self` and reaching the end of `end`.
    ///
    /// Spans on different lines keep the start position and sum lengths.
    pub fn to(self, end: Span) -> Span {
        if self.line != end.line {
            return Span::new(self.line, self.col, self.len + end.len);
        }
        let start = self.col.min(end.col);
        let stop = (self.col + self.len).max(end.col + end.len);
        Span::new(self.line, start, stop - start)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("<unknown>");
        }
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_line_colon_col() {
        assert_eq!(Span::new(3, 15, 5).to_string(), "3:15");
        assert_eq!(Span::default().to_string(), "<unknown>");
    }

    #[test]
    fn to_on_same_line_covers_both() {
        let merged = Span::new(1, 5, 3).to(Span::new(1, 10, 3));
        assert_eq!(merged, Span::new(1, 5, 8));
    }

    #[test]
    fn to_across_lines_keeps_start() {
        let merged = Span::new(1, 5, 3).to(Span::new(4, 1, 2));
        assert_eq!((merged.line, merged.col, merged.len), (1, 5, 5));
    }
}
