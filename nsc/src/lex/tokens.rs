use std::{fmt, str::FromStr};

use crate::source::Pos;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub pos: Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `#include "name"`, span covers the name without quotes.
    Include,
    /// `#define NAME value`, span covers the rest of the line.
    Define,

    Ident,
    /// Identifier in the set of reserved words.
    Keyword(Keyword),

    IntLit,
    FloatLit,
    /// String literal, span includes the quotes.
    StringLit,

    Plus,             // `+`
    Minus,            // `-`
    Star,             // `*`
    Slash,            // `/`
    Percent,          // `%`
    PlusPlus,         // `++`
    MinusMinus,       // `--`
    Eq,               // `=`
    PlusEq,           // `+=`
    MinusEq,          // `-=`
    StarEq,           // `*=`
    SlashEq,          // `/=`
    PercentEq,        // `%=`
    AmpEq,            // `&=`
    PipeEq,           // `|=`
    CaretEq,          // `^=`
    ShlEq,            // `<<=`
    ShrEq,            // `>>=`
    UShrEq,           // `>>>=`
    EqEq,             // `==`
    NotEq,            // `!=`
    Less,             // `<`
    Greater,          // `>`
    LessEq,           // `<=`
    GreaterEq,        // `>=`
    Shl,              // `<<`
    Shr,              // `>>`
    UShr,             // `>>>`
    Amp,              // `&`
    Pipe,             // `|`
    Caret,            // `^`
    Tilde,            // `~`
    Bang,             // `!`
    AmpAmp,           // `&&`
    PipePipe,         // `||`
    Question,         // `?`
    Colon,            // `:`
    Semicolon,        // `;`
    Comma,            // `,`
    Dot,              // `.`
    LeftParen,        // `(`
    RightParen,       // `)`
    LeftBrace,        // `{`
    RightBrace,       // `}`
    LeftBracket,      // `[`
    RightBracket,     // `]`

    /// End-of-file
    EOF,
}

impl fmt::Display for TokenKind {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TokenKind as T;
        let symbol = match self {
            T::Include      => "#include",
            T::Define       => "#define",
            T::Ident        => "identifier",
            T::Keyword(kw)  => return write!(f, "'{}'", kw),
            T::IntLit       => "integer literal",
            T::FloatLit     => "float literal",
            T::StringLit    => "string literal",
            T::Plus         => "'+'",
            T::Minus        => "'-'",
            T::Star         => "'*'",
            T::Slash        => "'/'",
            T::Percent      => "'%'",
            T::PlusPlus     => "'++'",
            T::MinusMinus   => "'--'",
            T::Eq           => "'='",
            T::PlusEq       => "'+='",
            T::MinusEq      => "'-='",
            T::StarEq       => "'*='",
            T::SlashEq      => "'/='",
            T::PercentEq    => "'%='",
            T::AmpEq        => "'&='",
            T::PipeEq       => "'|='",
            T::CaretEq      => "'^='",
            T::ShlEq        => "'<<='",
            T::ShrEq        => "'>>='",
            T::UShrEq       => "'>>>='",
            T::EqEq         => "'=='",
            T::NotEq        => "'!='",
            T::Less         => "'<'",
            T::Greater      => "'>'",
            T::LessEq       => "'<='",
            T::GreaterEq    => "'>='",
            T::Shl          => "'<<'",
            T::Shr          => "'>>'",
            T::UShr         => "'>>>'",
            T::Amp          => "'&'",
            T::Pipe         => "'|'",
            T::Caret        => "'^'",
            T::Tilde        => "'~'",
            T::Bang         => "'!'",
            T::AmpAmp       => "'&&'",
            T::PipePipe     => "'||'",
            T::Question     => "'?'",
            T::Colon        => "':'",
            T::Semicolon    => "';'",
            T::Comma        => "','",
            T::Dot          => "'.'",
            T::LeftParen    => "'('",
            T::RightParen   => "')'",
            T::LeftBrace    => "'{'",
            T::RightBrace   => "'}'",
            T::LeftBracket  => "'['",
            T::RightBracket => "']'",
            T::EOF          => "end of file",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Struct,
    Const,
    Void,
    Int,
    Float,
    String,
    Object,
    Vector,
    Action,
    ObjectSelf,
    ObjectInvalid,
}

impl Keyword {
    /// Keywords that start a type.
    pub fn is_type(self) -> bool {
        use Keyword as K;
        matches!(
            self,
            K::Void | K::Int | K::Float | K::String | K::Object | K::Vector | K::Action | K::Struct
        )
    }
}

impl fmt::Display for Keyword {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Keyword as K;
        match self {
            K::If            => write!(f, "if"),
            K::Else          => write!(f, "else"),
            K::While         => write!(f, "while"),
            K::Do            => write!(f, "do"),
            K::For           => write!(f, "for"),
            K::Switch        => write!(f, "switch"),
            K::Case          => write!(f, "case"),
            K::Default       => write!(f, "default"),
            K::Break         => write!(f, "break"),
            K::Continue      => write!(f, "continue"),
            K::Return        => write!(f, "return"),
            K::Struct        => write!(f, "struct"),
            K::Const         => write!(f, "const"),
            K::Void          => write!(f, "void"),
            K::Int           => write!(f, "int"),
            K::Float         => write!(f, "float"),
            K::String        => write!(f, "string"),
            K::Object        => write!(f, "object"),
            K::Vector        => write!(f, "vector"),
            K::Action        => write!(f, "action"),
            K::ObjectSelf    => write!(f, "OBJECT_SELF"),
            K::ObjectInvalid => write!(f, "OBJECT_INVALID"),
        }
    }
}

impl FromStr for Keyword {
    type Err = ();

    #[rustfmt::skip]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Keyword as K;
        match s {
            "if"             => Ok(K::If),
            "else"           => Ok(K::Else),
            "while"          => Ok(K::While),
            "do"             => Ok(K::Do),
            "for"            => Ok(K::For),
            "switch"         => Ok(K::Switch),
            "case"           => Ok(K::Case),
            "default"        => Ok(K::Default),
            "break"          => Ok(K::Break),
            "continue"       => Ok(K::Continue),
            "return"         => Ok(K::Return),
            "struct"         => Ok(K::Struct),
            "const"          => Ok(K::Const),
            "void"           => Ok(K::Void),
            "int"            => Ok(K::Int),
            "float"          => Ok(K::Float),
            "string"         => Ok(K::String),
            "object"         => Ok(K::Object),
            "vector"         => Ok(K::Vector),
            "action"         => Ok(K::Action),
            "OBJECT_SELF"    => Ok(K::ObjectSelf),
            "OBJECT_INVALID" => Ok(K::ObjectInvalid),
            _                => Err(()),
        }
    }
}

/// Chunk of source code, encoded as a byte range.
///
/// The end is exclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Slice a fragment of source code.
    ///
    /// Returns an empty string if the span is out of bounds.
    pub fn fragment<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_span_fragment() {
        const CODE: &str = "int nValue = 0x1F;";

        let spans = &[
            Span::new(0, 3),   // int
            Span::new(4, 10),  // nValue
            Span::new(11, 12), // =
            Span::new(13, 17), // 0x1F
        ];

        assert_eq!(spans[0].fragment(CODE), "int");
        assert_eq!(spans[1].fragment(CODE), "nValue");
        assert_eq!(spans[2].fragment(CODE), "=");
        assert_eq!(spans[3].fragment(CODE), "0x1F");
        assert_eq!(Span::new(10, 400).fragment(CODE), "");
    }

    #[test]
    fn test_keyword_roundtrip() {
        for word in ["if", "struct", "action", "OBJECT_SELF", "OBJECT_INVALID"] {
            let keyword = Keyword::from_str(word).unwrap();
            assert_eq!(keyword.to_string(), word);
        }
        assert!(Keyword::from_str("object_self").is_err());
        assert!(Keyword::from_str("location").is_err());
    }
}
