//! Constant expression evaluation.
use super::types::Type;
use crate::parse::{BinOp, Expr, ExprKind, Literal, UnaryOp};

/// Compile time value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    String(Vec<u8>),
    Object(i32),
    Vector([f32; 3]),
}

impl ConstValue {
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Int(_) => Type::Int,
            ConstValue::Float(_) => Type::Float,
            ConstValue::String(_) => Type::String,
            ConstValue::Object(_) => Type::Object,
            ConstValue::Vector(_) => Type::Vector,
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Int(value) => ConstValue::Int(*value),
            Literal::Float(value) => ConstValue::Float(*value),
            Literal::String(value) => ConstValue::String(value.clone()),
            Literal::Object(value) => ConstValue::Object(*value),
            Literal::Vector(value) => ConstValue::Vector(*value),
        }
    }

    /// Integer or float zero.
    pub fn is_zero(&self) -> bool {
        match self {
            ConstValue::Int(value) => *value == 0,
            ConstValue::Float(value) => *value == 0.0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    DivisionByZero,
    /// Operator does not apply to these operand types.
    Unsupported,
}

#[inline]
fn truth(value: bool) -> ConstValue {
    ConstValue::Int(value as i32)
}

/// Fold a binary operator over two constants.
///
/// Integer arithmetic wraps like the runtime does.
pub fn fold_binary(op: BinOp, lhs: &ConstValue, rhs: &ConstValue) -> Result<ConstValue, FoldError> {
    use ConstValue as V;

    match (lhs, rhs) {
        (V::Int(a), V::Int(b)) => fold_int(op, *a, *b),
        (V::Float(a), V::Float(b)) => fold_float(op, *a, *b, false),
        (V::Int(a), V::Float(b)) => fold_float(op, *a as f32, *b, true),
        (V::Float(a), V::Int(b)) => fold_float(op, *a, *b as f32, true),
        (V::String(a), V::String(b)) => match op {
            BinOp::Add => Ok(V::String([a.as_slice(), b.as_slice()].concat())),
            BinOp::Eq => Ok(truth(a == b)),
            BinOp::Ne => Ok(truth(a != b)),
            _ => Err(FoldError::Unsupported),
        },
        (V::Object(a), V::Object(b)) => match op {
            BinOp::Eq => Ok(truth(a == b)),
            BinOp::Ne => Ok(truth(a != b)),
            _ => Err(FoldError::Unsupported),
        },
        (V::Vector(a), V::Vector(b)) => match op {
            BinOp::Add => Ok(V::Vector([a[0] + b[0], a[1] + b[1], a[2] + b[2]])),
            BinOp::Sub => Ok(V::Vector([a[0] - b[0], a[1] - b[1], a[2] - b[2]])),
            BinOp::Eq => Ok(truth(a == b)),
            BinOp::Ne => Ok(truth(a != b)),
            _ => Err(FoldError::Unsupported),
        },
        (V::Vector(a), V::Float(b)) => match op {
            BinOp::Mul => Ok(V::Vector([a[0] * b, a[1] * b, a[2] * b])),
            BinOp::Div if *b == 0.0 => Err(FoldError::DivisionByZero),
            BinOp::Div => Ok(V::Vector([a[0] / b, a[1] / b, a[2] / b])),
            _ => Err(FoldError::Unsupported),
        },
        (V::Float(a), V::Vector(b)) => match op {
            BinOp::Mul => Ok(V::Vector([a * b[0], a * b[1], a * b[2]])),
            _ => Err(FoldError::Unsupported),
        },
        _ => Err(FoldError::Unsupported),
    }
}

#[rustfmt::skip]
fn fold_int(op: BinOp, a: i32, b: i32) -> Result<ConstValue, FoldError> {
    use BinOp as B;
    let value = match op {
        B::Add    => a.wrapping_add(b),
        B::Sub    => a.wrapping_sub(b),
        B::Mul    => a.wrapping_mul(b),
        B::Div    => if b == 0 { return Err(FoldError::DivisionByZero) } else { a.wrapping_div(b) },
        B::Mod    => if b == 0 { return Err(FoldError::DivisionByZero) } else { a.wrapping_rem(b) },
        B::Shl    => a.wrapping_shl(b as u32),
        B::Shr    => a.wrapping_shr(b as u32),
        B::UShr   => (a as u32).wrapping_shr(b as u32) as i32,
        B::BitAnd => a & b,
        B::BitOr  => a | b,
        B::BitXor => a ^ b,
        B::LogAnd => (a != 0 && b != 0) as i32,
        B::LogOr  => (a != 0 || b != 0) as i32,
        B::Eq     => (a == b) as i32,
        B::Ne     => (a != b) as i32,
        B::Lt     => (a < b) as i32,
        B::Gt     => (a > b) as i32,
        B::Le     => (a <= b) as i32,
        B::Ge     => (a >= b) as i32,
    };
    Ok(ConstValue::Int(value))
}

/// Mixed int and float operands only take part in arithmetic.
#[rustfmt::skip]
fn fold_float(op: BinOp, a: f32, b: f32, mixed: bool) -> Result<ConstValue, FoldError> {
    use BinOp as B;
    match op {
        B::Add => Ok(ConstValue::Float(a + b)),
        B::Sub => Ok(ConstValue::Float(a - b)),
        B::Mul => Ok(ConstValue::Float(a * b)),
        B::Div if b == 0.0 => Err(FoldError::DivisionByZero),
        B::Div => Ok(ConstValue::Float(a / b)),
        _ if mixed => Err(FoldError::Unsupported),
        B::Eq  => Ok(truth(a == b)),
        B::Ne  => Ok(truth(a != b)),
        B::Lt  => Ok(truth(a < b)),
        B::Gt  => Ok(truth(a > b)),
        B::Le  => Ok(truth(a <= b)),
        B::Ge  => Ok(truth(a >= b)),
        _      => Err(FoldError::Unsupported),
    }
}

pub fn fold_unary(op: UnaryOp, value: &ConstValue) -> Result<ConstValue, FoldError> {
    match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(a)) => Ok(ConstValue::Int(a.wrapping_neg())),
        (UnaryOp::Neg, ConstValue::Float(a)) => Ok(ConstValue::Float(-a)),
        (UnaryOp::Not, ConstValue::Int(a)) => Ok(truth(*a == 0)),
        (UnaryOp::BitNot, ConstValue::Int(a)) => Ok(ConstValue::Int(!a)),
        _ => Err(FoldError::Unsupported),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstEvalError {
    /// Refers to a runtime value or has side effects.
    NotConst,
    DivisionByZero,
    TypeError,
}

impl From<FoldError> for ConstEvalError {
    fn from(err: FoldError) -> Self {
        match err {
            FoldError::DivisionByZero => ConstEvalError::DivisionByZero,
            FoldError::Unsupported => ConstEvalError::TypeError,
        }
    }
}

/// Constant expression evaluator.
///
/// A simple tree walker over the subset of expressions that can be
/// evaluated without a scope: literals, named constants and operators.
/// Used where no analyzed scope exists yet, such as default parameter
/// values during symbol collection and the engine definition script.
pub struct ConstEval<'a> {
    /// Evaluator may only read named constants, never runtime values.
    lookup: &'a dyn Fn(&str) -> Option<ConstValue>,
}

impl<'a> ConstEval<'a> {
    #[inline]
    pub fn new(lookup: &'a dyn Fn(&str) -> Option<ConstValue>) -> Self {
        Self { lookup }
    }

    /// Entry point for the evaluator.
    pub fn eval_expr(&self, expr: &Expr) -> Result<ConstValue, ConstEvalError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(ConstValue::from_literal(literal)),
            ExprKind::Ident(name) => (self.lookup)(name).ok_or(ConstEvalError::NotConst),
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                Ok(fold_binary(*op, &lhs, &rhs)?)
            }
            ExprKind::Unary { op, operand } => Ok(fold_unary(*op, &self.eval_expr(operand)?)?),
            ExprKind::Conditional { cond, then, els } => match self.eval_expr(cond)? {
                ConstValue::Int(0) => self.eval_expr(els),
                ConstValue::Int(_) => self.eval_expr(then),
                _ => Err(ConstEvalError::TypeError),
            },
            _ => Err(ConstEvalError::NotConst),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ConstValue as V;

    #[test]
    fn test_fold_int_wraps() {
        assert_eq!(fold_binary(BinOp::Add, &V::Int(i32::MAX), &V::Int(1)), Ok(V::Int(i32::MIN)));
        assert_eq!(fold_binary(BinOp::Div, &V::Int(i32::MIN), &V::Int(-1)), Ok(V::Int(i32::MIN)));
        assert_eq!(fold_binary(BinOp::UShr, &V::Int(-1), &V::Int(28)), Ok(V::Int(0xF)));
        assert_eq!(fold_binary(BinOp::Shr, &V::Int(-16), &V::Int(2)), Ok(V::Int(-4)));
        assert_eq!(fold_binary(BinOp::Mod, &V::Int(7), &V::Int(0)), Err(FoldError::DivisionByZero));
    }

    #[test]
    fn test_fold_mixed() {
        assert_eq!(fold_binary(BinOp::Mul, &V::Int(2), &V::Float(1.5)), Ok(V::Float(3.0)));
        assert_eq!(fold_binary(BinOp::Lt, &V::Int(2), &V::Float(1.5)), Err(FoldError::Unsupported));
        assert_eq!(
            fold_binary(BinOp::Add, &V::String("ab".into()), &V::String("c".into())),
            Ok(V::String("abc".into()))
        );
        assert_eq!(
            fold_binary(BinOp::Mul, &V::Vector([1.0, 2.0, 3.0]), &V::Float(2.0)),
            Ok(V::Vector([2.0, 4.0, 6.0]))
        );
        assert_eq!(fold_binary(BinOp::Sub, &V::String("a".into()), &V::Int(1)), Err(FoldError::Unsupported));
    }

    #[test]
    fn test_fold_unary() {
        assert_eq!(fold_unary(UnaryOp::Neg, &V::Int(i32::MIN)), Ok(V::Int(i32::MIN)));
        assert_eq!(fold_unary(UnaryOp::Not, &V::Int(5)), Ok(V::Int(0)));
        assert_eq!(fold_unary(UnaryOp::BitNot, &V::Int(0)), Ok(V::Int(-1)));
        assert_eq!(fold_unary(UnaryOp::Not, &V::Float(0.0)), Err(FoldError::Unsupported));
    }
}
