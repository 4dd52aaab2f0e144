use smol_str::SmolStr;

use super::{ast::*, ParseError, Parser};
use crate::{
    constants::{OBJECT_INVALID, OBJECT_SELF},
    lex::{parse_float, parse_int, unescape, Keyword, TokenKind},
    source::Pos,
};

/// Binding power of binary operators, higher binds tighter.
#[rustfmt::skip]
fn binary_op(kind: TokenKind) -> Option<(BinOp, u8)> {
    use TokenKind as T;
    let op = match kind {
        T::PipePipe  => (BinOp::LogOr, 1),
        T::AmpAmp    => (BinOp::LogAnd, 2),
        T::Pipe      => (BinOp::BitOr, 3),
        T::Caret     => (BinOp::BitXor, 4),
        T::Amp       => (BinOp::BitAnd, 5),
        T::EqEq      => (BinOp::Eq, 6),
        T::NotEq     => (BinOp::Ne, 6),
        T::Less      => (BinOp::Lt, 7),
        T::Greater   => (BinOp::Gt, 7),
        T::LessEq    => (BinOp::Le, 7),
        T::GreaterEq => (BinOp::Ge, 7),
        T::Shl       => (BinOp::Shl, 8),
        T::Shr       => (BinOp::Shr, 8),
        T::UShr      => (BinOp::UShr, 8),
        T::Plus      => (BinOp::Add, 9),
        T::Minus     => (BinOp::Sub, 9),
        T::Star      => (BinOp::Mul, 10),
        T::Slash     => (BinOp::Div, 10),
        T::Percent   => (BinOp::Mod, 10),
        _            => return None,
    };
    Some(op)
}

/// Assignment operators and the binary operator a compound form applies.
#[rustfmt::skip]
fn assign_op(kind: TokenKind) -> Option<Option<BinOp>> {
    use TokenKind as T;
    let op = match kind {
        T::Eq        => None,
        T::PlusEq    => Some(BinOp::Add),
        T::MinusEq   => Some(BinOp::Sub),
        T::StarEq    => Some(BinOp::Mul),
        T::SlashEq   => Some(BinOp::Div),
        T::PercentEq => Some(BinOp::Mod),
        T::AmpEq     => Some(BinOp::BitAnd),
        T::PipeEq    => Some(BinOp::BitOr),
        T::CaretEq   => Some(BinOp::BitXor),
        T::ShlEq     => Some(BinOp::Shl),
        T::ShrEq     => Some(BinOp::Shr),
        T::UShrEq    => Some(BinOp::UShr),
        _            => return None,
    };
    Some(op)
}

impl<'a> Parser<'a> {
    #[inline]
    pub(super) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn make(&mut self, kind: ExprKind, pos: Pos) -> Expr {
        Expr {
            id: self.node_id(),
            kind,
            pos,
        }
    }

    /// Right associative.
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_conditional()?;

        match assign_op(self.stream.peek_kind()) {
            Some(op) => {
                let pos = self.stream.next_token().pos;
                let value = self.parse_assignment()?;
                Ok(self.make(
                    ExprKind::Assign {
                        op,
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    pos,
                ))
            }
            None => Ok(target),
        }
    }

    /// `cond ? then : else`, right associative.
    pub(super) fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(1)?;

        if self.stream.peek_kind() != TokenKind::Question {
            return Ok(cond);
        }
        let pos = self.stream.next_token().pos;
        let then = self.parse_assignment()?;
        self.stream.consume(TokenKind::Colon)?;
        let els = self.parse_conditional()?;

        Ok(self.make(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            pos,
        ))
    }

    /// Precedence climbing over left associative binary operators.
    fn parse_binary(&mut self, min_power: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, power)) = binary_op(self.stream.peek_kind()) {
            if power < min_power {
                break;
            }
            let pos = self.stream.next_token().pos;
            let rhs = self.parse_binary(power + 1)?;
            lhs = self.make(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        use TokenKind as T;

        let op = match self.stream.peek_kind() {
            T::Minus => UnaryOp::Neg,
            T::Bang => UnaryOp::Not,
            T::Tilde => UnaryOp::BitNot,
            T::PlusPlus | T::MinusMinus => {
                let token = self.stream.next_token();
                let target = self.parse_unary()?;
                return Ok(self.make(
                    ExprKind::IncDec {
                        increment: token.kind == T::PlusPlus,
                        prefix: true,
                        target: Box::new(target),
                    },
                    token.pos,
                ));
            }
            _ => return self.parse_postfix(),
        };

        let pos = self.stream.next_token().pos;
        let operand = self.parse_unary()?;
        Ok(self.make(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        use TokenKind as T;

        let mut expr = self.parse_primary()?;
        loop {
            match self.stream.peek_kind() {
                T::PlusPlus | T::MinusMinus => {
                    let token = self.stream.next_token();
                    expr = self.make(
                        ExprKind::IncDec {
                            increment: token.kind == T::PlusPlus,
                            prefix: false,
                            target: Box::new(expr),
                        },
                        token.pos,
                    );
                }
                T::Dot => {
                    self.stream.next_token();
                    let (field, pos) = self.ident()?;
                    expr = self.make(
                        ExprKind::Field {
                            base: Box::new(expr),
                            field,
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.stream.consume(TokenKind::LeftParen)?;
        let mut args = vec![];
        if self.stream.match_token(TokenKind::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.stream.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.stream.consume(TokenKind::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        use TokenKind as T;

        let token = *self.stream.peek();
        let fragment = self.stream.fragment(&token);
        let kind = match token.kind {
            T::IntLit => ExprKind::Literal(Literal::Int(
                parse_int(fragment).ok_or_else(|| self.stream.unexpected("integer literal"))?,
            )),
            T::FloatLit => ExprKind::Literal(Literal::Float(
                parse_float(fragment).ok_or_else(|| self.stream.unexpected("float literal"))?,
            )),
            T::StringLit => {
                let body = fragment.get(1..fragment.len().saturating_sub(1)).unwrap_or("");
                ExprKind::Literal(Literal::String(unescape(body)))
            }
            T::Keyword(Keyword::ObjectSelf) => ExprKind::Literal(Literal::Object(OBJECT_SELF)),
            T::Keyword(Keyword::ObjectInvalid) => ExprKind::Literal(Literal::Object(OBJECT_INVALID)),
            T::Ident if self.stream.peek_nth(1).kind == T::LeftParen => {
                self.stream.next_token();
                let args = self.parse_args()?;
                return Ok(self.make(
                    ExprKind::Call {
                        name: SmolStr::new(fragment),
                        args,
                    },
                    token.pos,
                ));
            }
            T::Ident => ExprKind::Ident(SmolStr::new(fragment)),
            T::LeftParen => {
                self.stream.next_token();
                let inner = self.parse_expr()?;
                self.stream.consume(T::RightParen)?;
                return Ok(inner);
            }
            T::LeftBracket => return self.parse_vector(),
            _ => return Err(self.stream.unexpected("expression")),
        };
        self.stream.next_token();

        Ok(self.make(kind, token.pos))
    }

    /// `[x, y, z]` with numeric literal components. Missing
    /// trailing components are zero.
    fn parse_vector(&mut self) -> Result<Expr, ParseError> {
        let pos = self.stream.consume(TokenKind::LeftBracket)?.pos;

        let mut components = [0.0f32; 3];
        let mut count = 0;
        while self.stream.peek_kind() != TokenKind::RightBracket {
            if count > 0 {
                self.stream.consume(TokenKind::Comma)?;
            }
            if count == components.len() {
                return Err(self.stream.unexpected("']'"));
            }
            components[count] = self.parse_vector_component()?;
            count += 1;
        }
        self.stream.consume(TokenKind::RightBracket)?;

        Ok(self.make(ExprKind::Literal(Literal::Vector(components)), pos))
    }

    fn parse_vector_component(&mut self) -> Result<f32, ParseError> {
        let negative = self.stream.match_token(TokenKind::Minus);
        let token = *self.stream.peek();
        let fragment = self.stream.fragment(&token);
        let value = match token.kind {
            TokenKind::FloatLit => parse_float(fragment),
            TokenKind::IntLit => parse_int(fragment).map(|value| value as f32),
            _ => None,
        }
        .ok_or_else(|| self.stream.unexpected("numeric vector component"))?;
        self.stream.next_token();

        Ok(if negative { -value } else { value })
    }
}
