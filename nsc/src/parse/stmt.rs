use super::{ast::*, ParseError, Parser};
use crate::lex::{Keyword, TokenKind};

impl<'a> Parser<'a> {
    /// `{ statements }`
    ///
    /// A malformed statement is reported and skipped; the block keeps going.
    pub(super) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.stream.consume(TokenKind::LeftBrace)?;

        let mut stmts = vec![];
        loop {
            match self.stream.peek_kind() {
                TokenKind::RightBrace => {
                    self.stream.next_token();
                    break;
                }
                TokenKind::EOF => return Err(self.stream.unexpected("'}'")),
                _ => match self.parse_stmt() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(err) => {
                        self.report(err);
                        self.synchronize(false);
                    }
                },
            }
        }

        Ok(Block { stmts })
    }

    pub(super) fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        use Keyword as K;
        use TokenKind as T;

        let pos = self.stream.peek().pos;
        let kind = match self.stream.peek_kind() {
            T::LeftBrace => StmtKind::Block(self.parse_block()?),
            T::Semicolon => {
                self.stream.next_token();
                StmtKind::Empty
            }
            T::Keyword(K::If) => {
                self.stream.next_token();
                let cond = self.parse_paren_expr()?;
                let then = Box::new(self.parse_stmt()?);
                let els = if self.stream.match_token(T::Keyword(K::Else)) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                StmtKind::If { cond, then, els }
            }
            T::Keyword(K::While) => {
                self.stream.next_token();
                let cond = self.parse_paren_expr()?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::While { cond, body }
            }
            T::Keyword(K::Do) => {
                self.stream.next_token();
                let body = Box::new(self.parse_stmt()?);
                self.stream.consume(T::Keyword(K::While))?;
                let cond = self.parse_paren_expr()?;
                self.stream.consume(T::Semicolon)?;
                StmtKind::DoWhile { body, cond }
            }
            T::Keyword(K::For) => {
                self.stream.next_token();
                self.stream.consume(T::LeftParen)?;
                let init = self.parse_optional_expr(T::Semicolon)?;
                self.stream.consume(T::Semicolon)?;
                let cond = self.parse_optional_expr(T::Semicolon)?;
                self.stream.consume(T::Semicolon)?;
                let step = self.parse_optional_expr(T::RightParen)?;
                self.stream.consume(T::RightParen)?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::For {
                    init,
                    cond,
                    step,
                    body,
                }
            }
            T::Keyword(K::Switch) => {
                self.stream.next_token();
                let value = self.parse_paren_expr()?;
                let body = self.parse_block()?;
                StmtKind::Switch { value, body }
            }
            T::Keyword(K::Case) => {
                self.stream.next_token();
                let label = self.parse_conditional()?;
                self.stream.consume(T::Colon)?;
                StmtKind::Case(label)
            }
            T::Keyword(K::Default) => {
                self.stream.next_token();
                self.stream.consume(T::Colon)?;
                StmtKind::Default
            }
            T::Keyword(K::Return) => {
                self.stream.next_token();
                let value = self.parse_optional_expr(T::Semicolon)?;
                self.stream.consume(T::Semicolon)?;
                StmtKind::Return(value)
            }
            T::Keyword(K::Break) => {
                self.stream.next_token();
                self.stream.consume(T::Semicolon)?;
                StmtKind::Break
            }
            T::Keyword(K::Continue) => {
                self.stream.next_token();
                self.stream.consume(T::Semicolon)?;
                StmtKind::Continue
            }
            _ if self.at_type() => {
                let ty = self.parse_type()?;
                let (name, name_pos) = self.ident()?;
                StmtKind::Var(self.parse_var_decl(false, ty, name, name_pos, pos)?)
            }
            _ => {
                let expr = self.parse_expr()?;
                self.stream.consume(T::Semicolon)?;
                StmtKind::Expr(expr)
            }
        };

        Ok(Stmt { kind, pos })
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.stream.consume(TokenKind::LeftParen)?;
        let expr = self.parse_expr()?;
        self.stream.consume(TokenKind::RightParen)?;
        Ok(expr)
    }

    /// Expression unless the next token is `terminator`.
    fn parse_optional_expr(&mut self, terminator: TokenKind) -> Result<Option<Expr>, ParseError> {
        if self.stream.peek_kind() == terminator {
            Ok(None)
        } else {
            self.parse_expr().map(Some)
        }
    }
}
