//! Byte offsets to line and column, for pointing diagnostics at source.

use super::Span;

/// 1-based line and column. Columns count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

/// The line a span starts on, with the span clipped to that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Excerpt<'a> {
    pub at: Position,
    pub text: &'a str,
    /// Marked bytes starting at `at.col`; at least 1.
    pub width: usize,
}

pub struct SourceMap<'a> {
    source: &'a str,
    newlines: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let newlines = source.match_indices('\n').map(|(i, _)| i).collect();
        SourceMap { source, newlines }
    }

    pub fn position(&self, offset: usize) -> Position {
        // a newline belongs to the line it ends
        let line = self.newlines.partition_point(|&nl| nl < offset);
        let start = self.line_start(line);
        Position { line: line + 1, col: offset.saturating_sub(start) + 1 }
    }

    fn line_start(&self, index: usize) -> usize {
        match index {
            0 => 0,
            i => self.newlines[i - 1] + 1,
        }
    }

    /// Text of a 1-based line without its line ending; empty past the end.
    pub fn line(&self, line: usize) -> &'a str {
        if line == 0 || line > self.newlines.len() + 1 {
            return "";
        }
        let start = self.line_start(line - 1);
        let end = self.newlines.get(line - 1).copied().unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches('\r')
    }

    pub fn excerpt(&self, span: Span) -> Excerpt<'a> {
        let at = self.position(span.start);
        let text = self.line(at.line);
        let room = text.len().saturating_sub(at.col - 1).max(1);
        let width = span.end.saturating_sub(span.start).clamp(1, room);
        Excerpt { at, text, width }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: usize, col: usize) -> Position {
        Position { line, col }
    }

    #[test]
    fn positions_in_a_function() {
        let src = "fn main() {\n  return 1;\n}";
        let map = SourceMap::new(src);
        assert_eq!(map.position(0), pos(1, 1));
        assert_eq!(map.position(11), pos(1, 12)); // the newline itself
        assert_eq!(map.position(14), pos(2, 3));
        assert_eq!(map.position(24), pos(3, 1));
    }

    #[test]
    fn lines_drop_their_endings() {
        let src = "var a;\r\nvar b;\nfn main() {}\n";
        let map = SourceMap::new(src);
        assert_eq!(map.line(1), "var a;");
        assert_eq!(map.line(2), "var b;");
        assert_eq!(map.line(3), "fn main() {}");
        assert_eq!(map.line(4), "");
        assert_eq!(map.line(0), "");
        assert_eq!(map.line(9), "");
    }

    #[test]
    fn empty_source() {
        let map = SourceMap::new("");
        assert_eq!(map.position(0), pos(1, 1));
        assert_eq!(map.line(1), "");
        assert_eq!(map.excerpt(Span { start: 0, end: 0 }).width, 1);
    }

    #[test]
    fn excerpt_marks_the_span() {
        let src = "var a;\nvar bb = a + 1;";
        let map = SourceMap::new(src);
        let ex = map.excerpt(Span { start: 16, end: 21 });
        assert_eq!(ex.at, pos(2, 10));
        assert_eq!(ex.text, "var bb = a + 1;");
        assert_eq!(&ex.text[ex.at.col - 1..][..ex.width], "a + 1");
    }

    #[test]
    fn excerpt_clips_multiline_spans() {
        let src = "fn f() {\n  return 2;\n}";
        let ex = SourceMap::new(src).excerpt(Span { start: 7, end: src.len() });
        assert_eq!(ex.at, pos(1, 8));
        assert_eq!(ex.width, 1);
    }
}
