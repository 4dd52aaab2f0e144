//! Top level declarations.
use smol_str::SmolStr;

use super::{
    ast::*,
    ParseError, Parser,
};
use crate::{
    diagnostics::DiagCode,
    include::normalize,
    lex::{Keyword, TokenKind},
    source::Pos,
};

/// Prefix of the `#define` that declares an engine structure type.
pub const ENGINE_STRUCTURE_PREFIX: &str = "ENGINE_STRUCTURE_";

impl<'a> Parser<'a> {
    pub(super) fn parse_program(&mut self) -> Program {
        let mut items = vec![];
        while !self.stream.at_end() {
            match self.parse_item() {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(err) => {
                    self.report(err);
                    self.synchronize(true);
                }
            }
        }
        Program { items }
    }

    fn parse_item(&mut self) -> Result<Option<Item>, ParseError> {
        use TokenKind as T;

        match self.stream.peek_kind() {
            T::Include => {
                let token = self.stream.next_token();
                Ok(Some(Item::Include(IncludeDirective {
                    name: normalize(self.stream.fragment(&token)),
                    pos: token.pos,
                })))
            }
            T::Define => {
                let token = self.stream.next_token();
                Ok(Some(Item::Define(self.parse_define(self.stream.fragment(&token), token.pos))))
            }
            T::Semicolon => {
                self.stream.next_token();
                Ok(None)
            }
            T::Keyword(Keyword::Struct) if self.stream.peek_nth(2).kind == T::LeftBrace => {
                self.parse_struct().map(|decl| Some(Item::Struct(decl)))
            }
            T::Keyword(Keyword::Const) => {
                let pos = self.stream.next_token().pos;
                let ty = self.parse_type()?;
                let (name, name_pos) = self.ident()?;
                self.parse_var_decl(true, ty, name, name_pos, pos)
                    .map(|decl| Some(Item::Global(decl)))
            }
            _ => {
                let pos = self.stream.peek().pos;
                let ty = self.parse_type()?;
                let (name, name_pos) = self.ident()?;
                if self.stream.peek_kind() == T::LeftParen {
                    self.parse_function(ty, name, pos).map(Some)
                } else {
                    self.parse_var_decl(false, ty, name, name_pos, pos)
                        .map(|decl| Some(Item::Global(decl)))
                }
            }
        }
    }

    fn parse_define(&mut self, text: &str, pos: Pos) -> Define {
        let mut parts = text.splitn(2, char::is_whitespace);
        let name = SmolStr::new(parts.next().unwrap_or(""));
        let value = SmolStr::new(parts.next().unwrap_or("").trim());

        if name.starts_with(ENGINE_STRUCTURE_PREFIX) && !value.is_empty() {
            self.engine_types.insert(value.clone());
        }

        Define { name, value, pos }
    }

    /// `struct name { fields };`
    fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        let pos = self.stream.consume(TokenKind::Keyword(Keyword::Struct))?.pos;
        let (name, _) = self.ident()?;
        self.stream.consume(TokenKind::LeftBrace)?;

        let mut fields = vec![];
        while !self.stream.match_token(TokenKind::RightBrace) {
            let ty = self.parse_type()?;
            loop {
                let (field, field_pos) = self.ident()?;
                fields.push(FieldDecl {
                    ty: ty.clone(),
                    name: field,
                    pos: field_pos,
                });
                if !self.stream.match_token(TokenKind::Comma) {
                    break;
                }
            }
            self.stream.consume(TokenKind::Semicolon)?;
        }
        self.stream.consume(TokenKind::Semicolon)?;

        Ok(StructDecl { name, fields, pos })
    }

    fn parse_function(&mut self, ret: TypeSpec, name: SmolStr, pos: Pos) -> Result<Item, ParseError> {
        let params = self.parse_params()?;
        let decl = FunctionDecl { ret, name, params, pos };

        if self.stream.match_token(TokenKind::Semicolon) {
            self.prototypes.record_prototype(&decl.name, pos);
            Ok(Item::Prototype(decl))
        } else {
            self.prototypes.record_definition(&decl.name, pos);
            let body = self.parse_block()?;
            Ok(Item::Function(FunctionDef { decl, body }))
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.stream.consume(TokenKind::LeftParen)?;

        let mut params = vec![];
        if self.stream.peek_kind() == TokenKind::Keyword(Keyword::Void)
            && self.stream.peek_nth(1).kind == TokenKind::RightParen
        {
            self.stream.next_token();
        }

        if !self.stream.match_token(TokenKind::RightParen) {
            loop {
                let pos = self.stream.peek().pos;
                let ty = self.parse_type()?;
                let (name, _) = self.ident()?;
                let default = if self.stream.match_token(TokenKind::Eq) {
                    Some(self.parse_conditional()?)
                } else {
                    None
                };
                params.push(Param {
                    id: self.node_id(),
                    ty,
                    name,
                    default,
                    pos,
                });
                if !self.stream.match_token(TokenKind::Comma) {
                    break;
                }
            }
            self.stream.consume(TokenKind::RightParen)?;
        }

        // Defaults must form a trailing suffix of the parameter list.
        let mut seen_default = false;
        for param in &params {
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default {
                self.report(ParseError {
                    code: DiagCode::NonTrailingDefault,
                    message: format!(
                        "parameter '{}' without a default follows a parameter with one",
                        param.name
                    ),
                    pos: param.pos,
                });
            }
        }

        Ok(params)
    }

    /// Remainder of a declaration after its type and first name.
    pub(super) fn parse_var_decl(
        &mut self,
        is_const: bool,
        ty: TypeSpec,
        first: SmolStr,
        first_pos: Pos,
        pos: Pos,
    ) -> Result<VarDecl, ParseError> {
        let mut vars = vec![];
        let (mut name, mut name_pos) = (first, first_pos);
        loop {
            let init = if self.stream.match_token(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            vars.push(Declarator {
                id: self.node_id(),
                name,
                init,
                pos: name_pos,
            });

            if !self.stream.match_token(TokenKind::Comma) {
                break;
            }
            let next = self.ident()?;
            name = next.0;
            name_pos = next.1;
        }
        self.stream.consume(TokenKind::Semicolon)?;

        Ok(VarDecl {
            is_const,
            ty,
            vars,
            pos,
        })
    }

    /// Whether the current token starts a type.
    pub(super) fn at_type(&self) -> bool {
        match self.stream.peek_kind() {
            TokenKind::Keyword(keyword) => keyword.is_type(),
            TokenKind::Ident => {
                let token = self.stream.peek();
                self.engine_types.contains(self.stream.fragment(token))
                    && self.stream.peek_nth(1).kind == TokenKind::Ident
            }
            _ => false,
        }
    }

    pub(super) fn parse_type(&mut self) -> Result<TypeSpec, ParseError> {
        use Keyword as K;

        let token = *self.stream.peek();
        let ty = match token.kind {
            TokenKind::Keyword(K::Void) => TypeSpec::Void,
            TokenKind::Keyword(K::Int) => TypeSpec::Int,
            TokenKind::Keyword(K::Float) => TypeSpec::Float,
            TokenKind::Keyword(K::String) => TypeSpec::String,
            TokenKind::Keyword(K::Object) => TypeSpec::Object,
            TokenKind::Keyword(K::Vector) => TypeSpec::Vector,
            TokenKind::Keyword(K::Action) => TypeSpec::Action,
            TokenKind::Keyword(K::Struct) => {
                self.stream.next_token();
                let (name, _) = self.ident()?;
                return Ok(TypeSpec::Struct(name));
            }
            TokenKind::Ident if self.engine_types.contains(self.stream.fragment(&token)) => {
                TypeSpec::Engine(SmolStr::new(self.stream.fragment(&token)))
            }
            _ => return Err(self.stream.unexpected("type")),
        };
        self.stream.next_token();
        Ok(ty)
    }
}
