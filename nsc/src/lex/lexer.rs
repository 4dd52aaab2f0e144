//! Lexical analysis (tokenizer)
use std::{error, fmt, str::FromStr};

use super::{
    cursor::Cursor,
    tokens::{Keyword, Span, Token, TokenKind},
};
use crate::{
    diagnostics::DiagCode,
    source::{encode_char, FileId, Pos},
};

/// Lexical analyzer.
///
/// Produces tokens lazily. After a [`LexError`] the lexer has already
/// skipped to the next line, so the caller can keep pulling tokens.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    file: FileId,
    token_start: usize,
    token_pos: Pos,
    /// End-of-file has been handed out.
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source_code: &'a str, file: FileId) -> Self {
        Self {
            cursor: Cursor::new(source_code),
            file,
            token_start: 0,
            token_pos: Pos {
                file,
                line: 1,
                column: 1,
            },
            done: false,
        }
    }

    #[inline]
    pub fn source_code(&self) -> &'a str {
        self.cursor.original()
    }

    /// Restart lexing from the beginning of the source.
    pub fn reset(&mut self) {
        *self = Lexer::new(self.cursor.original(), self.file);
    }

    #[rustfmt::skip]
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        use TokenKind as T;

        self.skip_trivia()?;
        self.start_token();

        let c = match self.cursor.bump() {
            Some(c) => c,
            None => {
                self.done = true;
                return Ok(self.make_token(T::EOF));
            }
        };

        let kind = match c {
            '+' => if self.cursor.eat('+') { T::PlusPlus } else if self.cursor.eat('=') { T::PlusEq } else { T::Plus },
            '-' => if self.cursor.eat('-') { T::MinusMinus } else if self.cursor.eat('=') { T::MinusEq } else { T::Minus },
            '*' => if self.cursor.eat('=') { T::StarEq } else { T::Star },
            '/' => if self.cursor.eat('=') { T::SlashEq } else { T::Slash },
            '%' => if self.cursor.eat('=') { T::PercentEq } else { T::Percent },
            '=' => if self.cursor.eat('=') { T::EqEq } else { T::Eq },
            '!' => if self.cursor.eat('=') { T::NotEq } else { T::Bang },
            '^' => if self.cursor.eat('=') { T::CaretEq } else { T::Caret },
            '&' => if self.cursor.eat('&') { T::AmpAmp } else if self.cursor.eat('=') { T::AmpEq } else { T::Amp },
            '|' => if self.cursor.eat('|') { T::PipePipe } else if self.cursor.eat('=') { T::PipeEq } else { T::Pipe },
            '<' => {
                if self.cursor.eat('<') {
                    if self.cursor.eat('=') { T::ShlEq } else { T::Shl }
                } else if self.cursor.eat('=') {
                    T::LessEq
                } else {
                    T::Less
                }
            }
            '>' => {
                if self.cursor.eat('>') {
                    if self.cursor.eat('>') {
                        if self.cursor.eat('=') { T::UShrEq } else { T::UShr }
                    } else if self.cursor.eat('=') {
                        T::ShrEq
                    } else {
                        T::Shr
                    }
                } else if self.cursor.eat('=') {
                    T::GreaterEq
                } else {
                    T::Greater
                }
            }
            '~' => T::Tilde,
            '?' => T::Question,
            ':' => T::Colon,
            ';' => T::Semicolon,
            ',' => T::Comma,
            '(' => T::LeftParen,
            ')' => T::RightParen,
            '{' => T::LeftBrace,
            '}' => T::RightBrace,
            '[' => T::LeftBracket,
            ']' => T::RightBracket,
            '.' if self.cursor.first().is_ascii_digit() => return self.consume_number(c),
            '.' => T::Dot,
            '0'..='9' => return self.consume_number(c),
            '"' => return self.consume_string(),
            '#' => return self.consume_directive(),
            c if is_ident_start(c) => return Ok(self.consume_ident()),
            _ => return Err(self.recover(LexErrorKind::UnknownCharacter(c))),
        };

        Ok(self.make_token(kind))
    }

    /// Prime the lexer state for recording a new token.
    fn start_token(&mut self) {
        let (line, column) = self.cursor.line_column();
        self.token_start = self.cursor.offset();
        self.token_pos = Pos {
            file: self.file,
            line,
            column,
        };
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        self.make_token_span(kind, Span::new(self.token_start, self.cursor.offset()))
    }

    fn make_token_span(&self, kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            span,
            pos: self.token_pos,
        }
    }

    /// Skip the rest of the current line and build the error.
    #[inline(never)]
    #[cold]
    fn recover(&mut self, kind: LexErrorKind) -> LexError {
        self.cursor.eat_while(|c| c != '\n');
        LexError {
            kind,
            pos: self.token_pos,
        }
    }

    /// Consume whitespace and comments until the start of the next token.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.cursor.first(), self.cursor.second()) {
                (' ' | '\t' | '\r' | '\n', _) => {
                    self.cursor.bump();
                }
                ('/', '/') => self.cursor.eat_while(|c| c != '\n'),
                ('/', '*') => {
                    self.start_token();
                    self.cursor.bump();
                    self.cursor.bump();
                    loop {
                        if self.cursor.at_end() {
                            return Err(LexError {
                                kind: LexErrorKind::UnterminatedComment,
                                pos: self.token_pos,
                            });
                        }
                        if self.cursor.first() == '*' && self.cursor.second() == '/' {
                            self.cursor.bump();
                            self.cursor.bump();
                            break;
                        }
                        self.cursor.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Integer literals in decimal, `0x` hex and `0b` binary notation,
    /// and float literals like `1.5`, `1.`, `.5` and `2f`.
    fn consume_number(&mut self, first: char) -> Result<Token, LexError> {
        let mut kind = TokenKind::IntLit;

        if first == '0' && matches!(self.cursor.first(), 'x' | 'X') {
            self.cursor.bump();
            let digits = self.cursor.offset();
            self.cursor.eat_while(|c| c.is_ascii_hexdigit());
            if self.cursor.offset() == digits {
                return Err(self.malformed_number("missing hexadecimal digits"));
            }
        } else if first == '0' && matches!(self.cursor.first(), 'b' | 'B') {
            self.cursor.bump();
            let digits = self.cursor.offset();
            self.cursor.eat_while(|c| c == '0' || c == '1');
            if self.cursor.offset() == digits {
                return Err(self.malformed_number("missing binary digits"));
            }
        } else {
            if first == '.' {
                kind = TokenKind::FloatLit;
                self.cursor.eat_while(|c| c.is_ascii_digit());
            } else {
                self.cursor.eat_while(|c| c.is_ascii_digit());
                if self.cursor.first() == '.' {
                    self.cursor.bump();
                    kind = TokenKind::FloatLit;
                    self.cursor.eat_while(|c| c.is_ascii_digit());
                }
            }
            if matches!(self.cursor.first(), 'f' | 'F') {
                self.cursor.bump();
                kind = TokenKind::FloatLit;
            }
        }

        // A numeral running straight into identifier characters, like `12ab`.
        if is_ident_continue(self.cursor.first()) {
            self.cursor.eat_while(is_ident_continue);
            return Err(self.malformed_number("unexpected characters in numeric literal"));
        }

        let fragment = self.cursor.slice_from(self.token_start);
        let valid = match kind {
            TokenKind::FloatLit => parse_float(fragment).is_some(),
            _ => parse_int(fragment).is_some(),
        };
        if !valid {
            return Err(self.malformed_number("numeric literal out of range"));
        }

        Ok(self.make_token(kind))
    }

    fn malformed_number(&mut self, detail: &str) -> LexError {
        let fragment = self.cursor.slice_from(self.token_start).to_owned();
        self.recover(LexErrorKind::MalformedNumber(format!("{}: {}", detail, fragment)))
    }

    fn consume_string(&mut self) -> Result<Token, LexError> {
        loop {
            match self.cursor.first() {
                '\n' => return Err(self.recover(LexErrorKind::UnterminatedString)),
                _ if self.cursor.at_end() => return Err(self.recover(LexErrorKind::UnterminatedString)),
                '"' => {
                    self.cursor.bump();
                    break;
                }
                '\\' => {
                    self.cursor.bump();
                    match self.cursor.first() {
                        'n' | 't' | '"' | '\\' => {
                            self.cursor.bump();
                        }
                        'x' => {
                            self.cursor.bump();
                            for _ in 0..2 {
                                if self.cursor.first().is_ascii_hexdigit() {
                                    self.cursor.bump();
                                } else {
                                    return Err(self.recover(LexErrorKind::InvalidEscape('x')));
                                }
                            }
                        }
                        c => return Err(self.recover(LexErrorKind::InvalidEscape(c))),
                    }
                }
                _ => {
                    self.cursor.bump();
                }
            }
        }

        Ok(self.make_token(TokenKind::StringLit))
    }

    fn consume_ident(&mut self) -> Token {
        self.cursor.eat_while(is_ident_continue);

        // If a valid keyword can be parsed from the source fragment, then
        // the token is a reserved keyword instead of a user defined identifier.
        let token_kind = Keyword::from_str(self.cursor.slice_from(self.token_start))
            .map(TokenKind::Keyword)
            .unwrap_or(TokenKind::Ident);
        self.make_token(token_kind)
    }

    /// `#include "name"` and `#define NAME value`.
    fn consume_directive(&mut self) -> Result<Token, LexError> {
        let word_start = self.cursor.offset();
        self.cursor.eat_while(is_ident_continue);
        let word = self.cursor.slice_from(word_start);

        match word {
            "include" => {
                self.cursor.eat_while(|c| c == ' ' || c == '\t');
                if !self.cursor.eat('"') {
                    return Err(self.recover(LexErrorKind::MalformedDirective(
                        "expected quoted name after #include".to_owned(),
                    )));
                }
                let name_start = self.cursor.offset();
                self.cursor.eat_while(|c| c != '"' && c != '\n');
                let name_end = self.cursor.offset();
                if !self.cursor.eat('"') {
                    return Err(self.recover(LexErrorKind::MalformedDirective(
                        "unterminated #include name".to_owned(),
                    )));
                }
                Ok(self.make_token_span(TokenKind::Include, Span::new(name_start, name_end)))
            }
            "define" => {
                self.cursor.eat_while(|c| c == ' ' || c == '\t');
                let value_start = self.cursor.offset();
                self.cursor.eat_while(|c| c != '\n');
                let line = self.cursor.slice_from(value_start);
                let value = match line.find("//") {
                    Some(comment) => &line[..comment],
                    None => line,
                };
                let value_end = value_start + value.trim_end().len();
                if value_end == value_start {
                    return Err(LexError {
                        kind: LexErrorKind::MalformedDirective("empty #define".to_owned()),
                        pos: self.token_pos,
                    });
                }
                Ok(self.make_token_span(TokenKind::Define, Span::new(value_start, value_end)))
            }
            other => {
                let detail = format!("unknown directive #{}", other);
                Err(self.recover(LexErrorKind::MalformedDirective(detail)))
            }
        }
    }
}

/// Implement `Lexer` as an iterator for consuming
/// tokens lazily.
///
/// The end-of-file token is yielded once, then the iterator is exhausted.
impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            None
        } else {
            Some(self.next_token())
        }
    }
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Value of an integer literal fragment.
///
/// Hexadecimal and binary literals may use all 32 bits. Decimal literals
/// go up to 2147483648 so that `-2147483648` can be written.
pub fn parse_int(text: &str) -> Option<i32> {
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (bin, 2)
    } else {
        let value: u64 = text.parse().ok()?;
        return if value <= 1 << 31 {
            Some(value as u32 as i32)
        } else {
            None
        };
    };
    u32::from_str_radix(digits, radix).ok().map(|value| value as i32)
}

/// Value of a float literal fragment.
pub fn parse_float(text: &str) -> Option<f32> {
    let text = text.trim_end_matches(|c| c == 'f' || c == 'F');
    let mut normalized = String::with_capacity(text.len() + 2);
    if text.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(text);
    if text.ends_with('.') {
        normalized.push('0');
    }
    normalized.parse::<f32>().ok().filter(|value| value.is_finite())
}

/// Decode the escapes in the body of a string literal, without its quotes,
/// into the bytes the runtime sees.
///
/// The lexer has already validated every escape sequence.
pub fn unescape(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            encode_char(c, &mut out);
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    out.push(byte);
                }
            }
            Some(other) => encode_char(other, &mut out),
            None => {}
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexErrorKind {
    UnknownCharacter(char),
    UnterminatedString,
    UnterminatedComment,
    MalformedNumber(String),
    InvalidEscape(char),
    MalformedDirective(String),
}

impl LexError {
    pub fn code(&self) -> DiagCode {
        match self.kind {
            LexErrorKind::UnknownCharacter(_) => DiagCode::UnknownCharacter,
            LexErrorKind::UnterminatedString => DiagCode::UnterminatedString,
            LexErrorKind::UnterminatedComment => DiagCode::UnterminatedComment,
            LexErrorKind::MalformedNumber(_) => DiagCode::MalformedNumber,
            LexErrorKind::InvalidEscape(_) => DiagCode::InvalidEscape,
            LexErrorKind::MalformedDirective(_) => DiagCode::MalformedDirective,
        }
    }
}

impl error::Error for LexError {}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnknownCharacter(c) => write!(f, "unknown character {:?}", c),
            LexErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            LexErrorKind::UnterminatedComment => write!(f, "unterminated block comment"),
            LexErrorKind::MalformedNumber(detail) => write!(f, "malformed number, {}", detail),
            LexErrorKind::InvalidEscape(c) => write!(f, "invalid escape sequence '\\{}'", c),
            LexErrorKind::MalformedDirective(detail) => write!(f, "malformed directive, {}", detail),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, FileId::default())
            .filter_map(Result::ok)
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_operators_longest_match() {
        use TokenKind as T;
        assert_eq!(
            kinds("a >>>= b >> c >>> d <<= e"),
            vec![T::Ident, T::UShrEq, T::Ident, T::Shr, T::Ident, T::UShr, T::Ident, T::ShlEq, T::Ident, T::EOF]
        );
        assert_eq!(kinds("i++ + --j"), vec![T::Ident, T::PlusPlus, T::Plus, T::MinusMinus, T::Ident, T::EOF]);
        assert_eq!(kinds("a&&b||!c"), vec![T::Ident, T::AmpAmp, T::Ident, T::PipePipe, T::Bang, T::Ident, T::EOF]);
    }

    #[test]
    fn test_numbers() {
        use TokenKind as T;
        assert_eq!(
            kinds("12 0x1F 0b101 1.5 1. .5 2f 3.0F"),
            vec![T::IntLit, T::IntLit, T::IntLit, T::FloatLit, T::FloatLit, T::FloatLit, T::FloatLit, T::FloatLit, T::EOF]
        );
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0xFFFFFFFF"), Some(-1));
        assert_eq!(parse_int("2147483648"), Some(i32::MIN));
        assert_eq!(parse_int("2147483649"), None);
        assert_eq!(parse_float("1."), Some(1.0));
        assert_eq!(parse_float(".5"), Some(0.5));
        assert_eq!(parse_float("2f"), Some(2.0));
    }

    #[test]
    fn test_keywords_and_comments() {
        use Keyword as K;
        use TokenKind as T;
        let source = "// line comment\nint /* block\ncomment */ main OBJECT_SELF";
        assert_eq!(
            kinds(source),
            vec![T::Keyword(K::Int), T::Ident, T::Keyword(K::ObjectSelf), T::EOF]
        );
    }

    #[test]
    fn test_positions() {
        let tokens: Vec<Token> = Lexer::new("int a;\n  a = 1;", FileId::default())
            .filter_map(Result::ok)
            .collect();
        let positions: Vec<(u32, u32)> = tokens.iter().map(|t| (t.pos.line, t.pos.column)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 5), (1, 6), (2, 3), (2, 5), (2, 7), (2, 8), (2, 9)]);
    }

    #[test]
    fn test_directives() {
        let source = "#include \"nw_i0_math\"\n#define ENGINE_STRUCTURE_0 effect // comment\n";
        let tokens: Vec<Token> = Lexer::new(source, FileId::default())
            .filter_map(Result::ok)
            .collect();
        assert_eq!(tokens[0].kind, TokenKind::Include);
        assert_eq!(tokens[0].span.fragment(source), "nw_i0_math");
        assert_eq!(tokens[1].kind, TokenKind::Define);
        assert_eq!(tokens[1].span.fragment(source), "ENGINE_STRUCTURE_0 effect");
        assert_eq!(tokens[2].kind, TokenKind::EOF);
    }

    #[test]
    fn test_string_escapes() {
        let source = r#""a\tb\n\"q\"\\ \x41""#;
        let mut lexer = Lexer::new(source, FileId::default());
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::StringLit);
        let fragment = token.span.fragment(source);
        assert_eq!(unescape(&fragment[1..fragment.len() - 1]), b"a\tb\n\"q\"\\ A");
    }

    #[test]
    fn test_string_bytes() {
        // Escaped and literal high bytes stay single bytes.
        assert_eq!(unescape(r"\xE9t\xe9"), vec![0xE9, b't', 0xE9]);
        assert_eq!(unescape("caf\u{E9}"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(unescape(r"\x00"), vec![0]);
    }

    #[test]
    fn test_recovery_resumes_on_next_line() {
        let source = "string s = \"open;\nint x = 12ab;\nint y = 1; $\nfloat z;";
        let mut errors = vec![];
        let mut idents = vec![];
        for result in Lexer::new(source, FileId::default()) {
            match result {
                Ok(token) if token.kind == TokenKind::Ident => idents.push(token.span.fragment(source)),
                Ok(_) => {}
                Err(err) => errors.push(err),
            }
        }

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].kind, LexErrorKind::UnterminatedString);
        assert_eq!(errors[0].pos.line, 1);
        assert!(matches!(errors[1].kind, LexErrorKind::MalformedNumber(_)));
        assert_eq!(errors[1].pos.line, 2);
        assert_eq!(errors[2].kind, LexErrorKind::UnknownCharacter('$'));
        assert_eq!(idents, vec!["s", "x", "y", "z"]);
    }

    #[test]
    fn test_unterminated_comment() {
        let mut lexer = Lexer::new("int a; /* never closed", FileId::default());
        let results: Vec<_> = lexer.by_ref().collect();
        assert!(matches!(
            results.iter().find_map(|r| r.as_ref().err()).map(|e| &e.kind),
            Some(LexErrorKind::UnterminatedComment)
        ));
        assert!(matches!(results.last(), Some(Ok(Token { kind: TokenKind::EOF, .. }))));
    }

    #[test]
    fn test_reset() {
        let mut lexer = Lexer::new("a b", FileId::default());
        assert_eq!(lexer.by_ref().count(), 3);
        lexer.reset();
        assert_eq!(lexer.count(), 3);
    }
}
