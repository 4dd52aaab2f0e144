use itertools::{multipeek, MultiPeek};
use std::str::CharIndices;

/// Sentinel returned when peeking past the end of the source.
pub const EOF_CHAR: char = '\0';

/// Wrapper for source code that keeps a cursor position.
///
/// Allows forward lookup via peeking.
pub(crate) struct Cursor<'a> {
    /// Keep reference to the source so the lexer can
    /// slice fragments from it.
    original: &'a str,

    /// Iterator over UTF-8 encoded source code.
    ///
    /// `MultiPeek` buffers characters for arbitrary lookahead. Peeking
    /// advances an internal peek cursor; it is restored to the current
    /// position by `next()` or `reset_peek()`. The `first` and `second`
    /// helpers reset it themselves so callers never see a stale cursor.
    chars: MultiPeek<CharIndices<'a>>,

    /// Byte offset of the next character to be consumed.
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            original: source,
            chars: multipeek(source.char_indices()),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    #[inline]
    pub(crate) fn original(&self) -> &'a str {
        self.original
    }

    /// Byte offset of the next character.
    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// Line and column of the next character.
    #[inline]
    pub(crate) fn line_column(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    /// Advance the cursor and return the consumed character.
    pub(crate) fn bump(&mut self) -> Option<char> {
        let (index, c) = self.chars.next()?;
        self.offset = index + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the next character if it equals `expected`.
    pub(crate) fn eat(&mut self, expected: char) -> bool {
        if self.first() == expected {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume characters while the predicate holds.
    pub(crate) fn eat_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while !self.at_end() && predicate(self.first()) {
            self.bump();
        }
    }

    /// Peek the next character without consuming it.
    pub(crate) fn first(&mut self) -> char {
        self.chars.reset_peek();
        let c = self.chars.peek().map(|(_, c)| *c).unwrap_or(EOF_CHAR);
        self.chars.reset_peek();
        c
    }

    /// Peek the character after the next one.
    pub(crate) fn second(&mut self) -> char {
        self.chars.reset_peek();
        self.chars.peek();
        let c = self.chars.peek().map(|(_, c)| *c).unwrap_or(EOF_CHAR);
        self.chars.reset_peek();
        c
    }

    /// Peek two characters ahead of the next one.
    pub(crate) fn third(&mut self) -> char {
        self.chars.reset_peek();
        self.chars.peek();
        self.chars.peek();
        let c = self.chars.peek().map(|(_, c)| *c).unwrap_or(EOF_CHAR);
        self.chars.reset_peek();
        c
    }

    /// Indicates if the cursor is at the end of the source.
    #[inline]
    pub(crate) fn at_end(&self) -> bool {
        self.offset >= self.original.len()
    }

    /// Slice the source from `start` up to the cursor.
    #[inline]
    pub(crate) fn slice_from(&self, start: usize) -> &'a str {
        &self.original[start..self.offset]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cursor_line_column() {
        let mut cursor = Cursor::new("ab\nc");
        assert_eq!(cursor.line_column(), (1, 1));
        assert_eq!(cursor.first(), 'a');
        assert_eq!(cursor.second(), 'b');
        assert_eq!(cursor.third(), '\n');

        cursor.bump();
        cursor.bump();
        assert_eq!(cursor.line_column(), (1, 3));
        assert_eq!(cursor.bump(), Some('\n'));
        assert_eq!(cursor.line_column(), (2, 1));
        assert_eq!(cursor.offset(), 3);

        assert_eq!(cursor.bump(), Some('c'));
        assert!(cursor.at_end());
        assert_eq!(cursor.first(), EOF_CHAR);
        assert_eq!(cursor.bump(), None);
    }

    #[test]
    fn test_cursor_multibyte() {
        let mut cursor = Cursor::new("é;");
        cursor.bump();
        assert_eq!(cursor.offset(), 2);
        assert_eq!(cursor.slice_from(0), "é");
        assert!(cursor.eat(';'));
        assert!(cursor.at_end());
    }
}
