//! Tokens to syntax tree.
//!
//! Recursive descent with precedence climbing for expressions. Syntax
//! errors are recorded as diagnostics; the parser then skips to the next
//! `;` or `}` and carries on, so one run reports every malformed statement.
mod ast;
mod expr;
mod item;
mod stmt;
mod stream;

pub use self::{ast::*, item::ENGINE_STRUCTURE_PREFIX, stream::TokenStream};

use smol_str::SmolStr;
use std::{
    collections::{BTreeMap, HashSet},
    error, fmt,
};

use crate::{
    diagnostics::{DiagCode, Diagnostic, Stage},
    lex::{Token, TokenKind},
    source::{Pos, SourceMap},
};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub code: DiagCode,
    pub message: String,
    pub pos: Pos,
}

impl ParseError {
    pub fn unexpected(message: impl ToString, pos: Pos) -> Self {
        Self {
            code: DiagCode::UnexpectedToken,
            message: message.to_string(),
            pos,
        }
    }
}

impl error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Diagnostic::error(Stage::Parse, err.code, err.message).at(err.pos)
    }
}

/// Where a function was declared and defined.
#[derive(Debug, Default, Clone)]
pub struct PrototypeEntry {
    /// Every bodiless declaration, in source order.
    pub prototypes: Vec<Pos>,
    pub definition: Option<Pos>,
}

/// Provisional function table built while parsing.
#[derive(Debug, Default, Clone)]
pub struct PrototypeTable {
    entries: BTreeMap<SmolStr, PrototypeEntry>,
}

impl PrototypeTable {
    pub fn get(&self, name: &str) -> Option<&PrototypeEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &PrototypeEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record_prototype(&mut self, name: &SmolStr, pos: Pos) {
        self.entries.entry(name.clone()).or_default().prototypes.push(pos);
    }

    fn record_definition(&mut self, name: &SmolStr, pos: Pos) {
        let entry = self.entries.entry(name.clone()).or_default();
        if entry.definition.is_none() {
            entry.definition = Some(pos);
        }
    }
}

#[derive(Debug)]
pub struct ParseOutput {
    pub program: Program,
    pub prototypes: PrototypeTable,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of node ids handed out.
    pub node_count: u32,
}

pub struct Parser<'a> {
    stream: TokenStream<'a>,
    next_id: u32,
    /// Names of engine structure types, from the engine table and
    /// from `#define ENGINE_STRUCTURE_n` directives.
    engine_types: HashSet<SmolStr>,
    diagnostics: Vec<Diagnostic>,
    prototypes: PrototypeTable,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], sources: &'a SourceMap) -> Self {
        Self {
            stream: TokenStream::new(tokens, sources),
            next_id: 0,
            engine_types: HashSet::new(),
            diagnostics: vec![],
            prototypes: PrototypeTable::default(),
        }
    }

    pub fn with_engine_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.engine_types.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn parse(mut self) -> ParseOutput {
        let program = self.parse_program();
        log::trace!(
            "parsed {} items, {} nodes, {} diagnostics",
            program.items.len(),
            self.next_id,
            self.diagnostics.len()
        );
        ParseOutput {
            program,
            prototypes: self.prototypes,
            diagnostics: self.diagnostics,
            node_count: self.next_id,
        }
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn report(&mut self, err: ParseError) {
        self.diagnostics.push(err.into());
    }

    /// Skip ahead to the end of the malformed statement.
    ///
    /// A `;` is consumed. A `}` is consumed only at the top level, so
    /// inside a block it still closes that block.
    fn synchronize(&mut self, top_level: bool) {
        loop {
            match self.stream.peek_kind() {
                TokenKind::EOF => return,
                TokenKind::Semicolon => {
                    self.stream.next_token();
                    return;
                }
                TokenKind::RightBrace => {
                    if top_level {
                        self.stream.next_token();
                    }
                    return;
                }
                _ => {
                    self.stream.next_token();
                }
            }
        }
    }

    fn ident(&mut self) -> Result<(SmolStr, Pos), ParseError> {
        let token = self.stream.consume(TokenKind::Ident)?;
        Ok((SmolStr::new(self.stream.fragment(&token)), token.pos))
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

    pub(super) fn parse(source: &str) -> ParseOutput {
        let mut sources = SourceMap::new();
        sources.add(SourceFile {
            name: "test".into(),
            text: Arc::from(source),
            origin: Origin::Entry,
            parent: None,
        });
        let tokens: Vec<Token> = Lexer::new(source, FileId::default())
            .filter_map(Result::ok)
            .collect();
        Parser::new(&tokens, &sources)
            .with_engine_types(["effect", "location"])
            .parse()
    }

    #[test]
    fn test_prototype_table() {
        let output = parse("int Add(int a, int b);\nint Add(int a, int b) { return a + b; }\nvoid main() {}");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let add = output.prototypes.get("Add").unwrap();
        assert_eq!(add.prototypes.len(), 1);
        assert_eq!(add.definition.map(|pos| pos.line), Some(2));
        assert!(output.prototypes.get("main").unwrap().prototypes.is_empty());
    }

    #[test]
    fn test_recovers_and_reports_each_error() {
        let source = "void main()\n{\n    int a = ;\n    a = 1 +;\n    a = 2;\n}\nint b = 3;";
        let output = parse(source);
        assert_eq!(output.diagnostics.len(), 2, "{:?}", output.diagnostics);
        assert_eq!(output.diagnostics[0].line, 3);
        assert_eq!(output.diagnostics[1].line, 4);

        // Both the function and the trailing global survive.
        assert_eq!(output.program.items.len(), 2);
        match &output.program.items[0] {
            Item::Function(def) => assert_eq!(def.body.stmts.len(), 1),
            other => panic!("expected function, found {:?}", other),
        }
    }

    #[test]
    fn test_non_trailing_default() {
        let output = parse("void F(int a = 1, int b);");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, DiagCode::NonTrailingDefault);
    }

    #[test]
    fn test_precedence() {
        let output = parse("int a = 1 + 2 * 3 << 1 == 14 && 1 | 2;");
        assert!(output.diagnostics.is_empty());
        let init = match &output.program.items[0] {
            Item::Global(decl) => decl.vars[0].init.as_ref().unwrap(),
            other => panic!("expected global, found {:?}", other),
        };
        // ((((1 + (2 * 3)) << 1) == 14) && (1 | 2))
        match &init.kind {
            ExprKind::Binary { op: BinOp::LogAnd, lhs, rhs } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::BitOr, .. }));
                match &lhs.kind {
                    ExprKind::Binary { op: BinOp::Eq, lhs, .. } => {
                        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinOp::Shl, .. }))
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_engine_types_and_defines() {
        let output = parse("#define ENGINE_STRUCTURE_3 talent\ntalent t;\neffect e;\nlocation l;");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(output.program.items.len(), 4);
        match &output.program.items[1] {
            Item::Global(decl) => assert_eq!(decl.ty, TypeSpec::Engine("talent".into())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_struct_and_vector() {
        let source = "struct pair { int a, b; vector v; };\nstruct pair p;\nvector v = [1.0, -2.0, 3.5];";
        let output = parse(source);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        match &output.program.items[0] {
            Item::Struct(decl) => assert_eq!(decl.fields.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        match &output.program.items[2] {
            Item::Global(decl) => match &decl.vars[0].init.as_ref().unwrap().kind {
                ExprKind::Literal(Literal::Vector(v)) => assert_eq!(*v, [1.0, -2.0, 3.5]),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
