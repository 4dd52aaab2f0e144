//! Buffered stream of tokens for look ahead.
use super::ParseError;
use crate::{
    lex::{Span, Token, TokenKind},
    source::{Pos, SourceMap},
};

/// Cursor over the expanded token stream of a compile unit.
///
/// Tokens may come from several files, so fragments are sliced
/// through the source map. Reading past the end keeps returning
/// the final end-of-file token.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    cursor: usize,
    sources: &'a SourceMap,
    eof: Token,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token], sources: &'a SourceMap) -> Self {
        let eof = tokens
            .last()
            .filter(|token| token.kind == TokenKind::EOF)
            .copied()
            .unwrap_or(Token {
                kind: TokenKind::EOF,
                span: Span::default(),
                pos: Pos::default(),
            });
        Self {
            tokens,
            cursor: 0,
            sources,
            eof,
        }
    }

    /// Slice the source code of a token.
    #[inline]
    pub fn fragment(&self, token: &Token) -> &'a str {
        self.sources.fragment(token)
    }

    /// Return the current token without advancing the cursor.
    #[inline]
    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Look ahead `n` tokens past the current one.
    #[inline]
    pub fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.cursor + n).unwrap_or(&self.eof)
    }

    #[inline]
    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::EOF
    }

    /// Consumes the current token regardless of type.
    pub fn next_token(&mut self) -> Token {
        let token = *self.peek();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    /// Consumes the current token if it matches the given token type.
    ///
    /// Does not consume the token if the types do not match.
    pub fn match_token(&mut self, token_kind: TokenKind) -> bool {
        if self.peek_kind() == token_kind {
            self.next_token();
            true
        } else {
            false
        }
    }

    /// Return the current token and advance the cursor.
    ///
    /// The consumed token must match the given token type, otherwise
    /// a parse error is returned and the cursor stays in place.
    pub fn consume(&mut self, token_kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek_kind() == token_kind {
            Ok(self.next_token())
        } else {
            Err(self.unexpected(&token_kind.to_string()))
        }
    }

    /// Error describing the current token as unexpected.
    #[inline(never)]
    #[cold]
    pub fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Ident => format!("identifier '{}'", self.fragment(token)),
            kind => kind.to_string(),
        };
        ParseError::unexpected(format!("expected {}, found {}", expected, found), token.pos)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        lex::Lexer,
        source::{FileId, Origin, SourceFile},
    };
    use std::sync::Arc;

    #[test]
    fn test_stream_end() {
        let mut sources = SourceMap::new();
        let file = sources.add(SourceFile {
            name: "main".into(),
            text: Arc::from("a ;"),
            origin: Origin::Entry,
            parent: None,
        });
        let tokens: Vec<Token> = Lexer::new("a ;", FileId::default()).filter_map(Result::ok).collect();
        assert_eq!(file, FileId::default());

        let mut stream = TokenStream::new(&tokens, &sources);
        assert_eq!(stream.fragment(stream.peek()), "a");
        assert!(stream.consume(TokenKind::Semicolon).is_err());
        assert!(stream.match_token(TokenKind::Ident));
        assert!(stream.match_token(TokenKind::Semicolon));
        assert!(stream.at_end());
        assert_eq!(stream.next_token().kind, TokenKind::EOF);
        assert_eq!(stream.next_token().kind, TokenKind::EOF);
    }
}
