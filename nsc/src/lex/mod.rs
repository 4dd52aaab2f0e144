//! Source text to tokens.
mod cursor;
mod lexer;
mod tokens;

pub use self::{
    cursor::EOF_CHAR,
    lexer::{parse_float, parse_int, unescape, LexError, LexErrorKind, Lexer},
    tokens::{Keyword, Span, Token, TokenKind},
};

use crate::source::FileId;

/// Print the token stream of a source, one token per line.
pub fn debug_print_lexer(source: &str) {
    println!("Source Byte Count: {}", source.len());

    for result in Lexer::new(source, FileId::default()) {
        match result {
            Ok(token) => {
                let fragment = match token.span.fragment(source) {
                    "\n" => "\\n",
                    "\t" => "\\t",
                    fragment => fragment,
                };
                println!(
                    "{:4}:{:<3} {:<10} {:?}",
                    token.pos.line, token.pos.column, fragment, token.kind
                );
            }
            Err(err) => println!("{}:{} {}", err.pos.line, err.pos.column, err),
        }
    }
}
