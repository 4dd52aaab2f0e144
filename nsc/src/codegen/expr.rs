use super::{Generator, Op, Slot};
use crate::{
    constants::*,
    error::{NscError, NscResult},
    parse::{BinOp, Expr, ExprKind, UnaryOp},
    sema::{Callee, ConstValue, Type, VarId},
};

#[rustfmt::skip]
fn opcode(op: BinOp) -> u8 {
    use BinOp as B;
    match op {
        B::LogAnd => OP_LOGANDII,
        B::LogOr  => OP_LOGORII,
        B::BitOr  => OP_INCORII,
        B::BitXor => OP_EXCORII,
        B::BitAnd => OP_BOOLANDII,
        B::Eq     => OP_EQUAL,
        B::Ne     => OP_NEQUAL,
        B::Ge     => OP_GEQ,
        B::Gt     => OP_GT,
        B::Lt     => OP_LT,
        B::Le     => OP_LEQ,
        B::Shl    => OP_SHLEFT,
        B::Shr    => OP_SHRIGHT,
        B::UShr   => OP_USHRIGHT,
        B::Add    => OP_ADD,
        B::Sub    => OP_SUB,
        B::Mul    => OP_MUL,
        B::Div    => OP_DIV,
        B::Mod    => OP_MOD,
    }
}

#[rustfmt::skip]
fn qualifier(lhs: &Type, rhs: &Type) -> Option<u8> {
    use Type as Ty;
    let qualifier = match (lhs, rhs) {
        (Ty::Int,    Ty::Int)    => QUAL_II,
        (Ty::Float,  Ty::Float)  => QUAL_FF,
        (Ty::Object, Ty::Object) => QUAL_OO,
        (Ty::String, Ty::String) => QUAL_SS,
        (Ty::Int,    Ty::Float)  => QUAL_IF,
        (Ty::Float,  Ty::Int)    => QUAL_FI,
        (Ty::Vector, Ty::Vector) => QUAL_VV,
        (Ty::Vector, Ty::Float)  => QUAL_VF,
        (Ty::Float,  Ty::Vector) => QUAL_FV,
        (Ty::Engine(a, _), Ty::Engine(b, _)) if a == b => QUAL_ENGINE_BASE + a,
        _ => return None,
    };
    Some(qualifier)
}

impl<'a> Generator<'a> {
    pub(super) fn expr(&mut self, expr: &Expr) -> NscResult<()> {
        if let Some(value) = self.analysis.const_of(expr.id) {
            return self.constant(value);
        }

        match &expr.kind {
            ExprKind::Literal(literal) => self.constant(&ConstValue::from_literal(literal)),
            ExprKind::Ident(_) => {
                let var = self.var_ref(expr)?;
                let size = self.analysis.size_of(&self.analysis.var(var).ty);
                self.load(var, 0, size)
            }
            ExprKind::Binary { op: op @ (BinOp::LogAnd | BinOp::LogOr), lhs, rhs } => {
                // When the left operand decides, it is paired with itself
                // instead of the right one, so the result is still 0 or 1.
                let (eval_rhs, join) = (self.new_label(), self.new_label());
                let dup = Op::CpTopSp {
                    offset: -CELL_SIZE,
                    size: CELL_SIZE as u16,
                };
                self.expr(lhs)?;
                let depth = self.frame.depth;
                self.emit(dup.clone())?;
                if *op == BinOp::LogAnd {
                    self.emit(Op::Jnz(eval_rhs))?;
                } else {
                    self.emit(Op::Jz(eval_rhs))?;
                }
                self.emit(dup)?;
                self.emit(Op::Jmp(join))?;

                self.frame.depth = depth;
                self.mark(eval_rhs)?;
                self.expr(rhs)?;
                self.mark(join)?;
                self.emit(Op::Binary {
                    opcode: opcode(*op),
                    qualifier: QUAL_II,
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                let (lhs, rhs) = (self.type_of(lhs)?, self.type_of(rhs)?);
                self.binary(*op, &lhs, &rhs)
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                match (op, self.type_of(operand)?) {
                    (UnaryOp::Neg, Type::Float) => self.emit(Op::Neg(TYPE_FLOAT)),
                    (UnaryOp::Neg, _) => self.emit(Op::Neg(TYPE_INT)),
                    (UnaryOp::Not, _) => self.emit(Op::NotI),
                    (UnaryOp::BitNot, _) => self.emit(Op::Comp),
                }
            }
            ExprKind::IncDec { increment, prefix, target } => {
                let var = self.var_ref(target)?;
                if *prefix {
                    self.step(var, *increment)?;
                    self.load(var, 0, CELL_SIZE)
                } else {
                    self.load(var, 0, CELL_SIZE)?;
                    self.step(var, *increment)
                }
            }
            ExprKind::Call { args, .. } => self.call(expr, args),
            ExprKind::Assign { op, target, value } => {
                let (var, offset, ty) = self
                    .place(target)?
                    .ok_or_else(|| NscError::internal("assignment target has no storage"))?;
                let size = self.analysis.size_of(&ty);
                if let Some(op) = op {
                    self.load(var, offset, size)?;
                    self.expr(value)?;
                    let value_ty = self.type_of(value)?;
                    self.binary(*op, &ty, &value_ty)?;
                } else {
                    self.expr(value)?;
                }
                self.store(var, offset, size)
            }
            ExprKind::Field { base, field } => {
                if let Some((var, offset, ty)) = self.place(expr)? {
                    let size = self.analysis.size_of(&ty);
                    return self.load(var, offset, size);
                }
                // Computed value: keep only the field.
                let base_ty = self.type_of(base)?;
                let (offset, ty) = self
                    .analysis
                    .structs
                    .field(&base_ty, field)
                    .ok_or_else(|| NscError::internal(format!("{} has no field '{}'", base_ty, field)))?;
                self.expr(base)?;
                self.emit(Op::Destruct {
                    size: self.analysis.size_of(&base_ty) as u16,
                    keep_offset: offset as u16,
                    keep_size: self.analysis.size_of(&ty) as u16,
                })
            }
            ExprKind::Conditional { cond, then, els } => {
                let (els_label, end) = (self.new_label(), self.new_label());
                self.expr(cond)?;
                self.emit(Op::Jz(els_label))?;
                let depth = self.frame.depth;
                self.expr(then)?;
                self.emit(Op::Jmp(end))?;
                self.frame.depth = depth;
                self.mark(els_label)?;
                self.expr(els)?;
                self.mark(end)
            }
        }
    }

    /// Evaluate an expression and discard its value.
    pub(super) fn expr_stmt(&mut self, expr: &Expr) -> NscResult<()> {
        self.expr(expr)?;
        let size = self.analysis.size_of(&self.type_of(expr)?);
        if size > 0 {
            self.emit(Op::MovSp(-size))?;
        }
        Ok(())
    }

    fn binary(&mut self, op: BinOp, lhs: &Type, rhs: &Type) -> NscResult<()> {
        let opcode = opcode(op);
        let comparison = matches!(op, BinOp::Eq | BinOp::Ne);
        match (lhs, rhs) {
            (Type::Vector, Type::Vector) | (Type::Struct(_), Type::Struct(_)) if comparison => self.emit(Op::BinaryTT {
                opcode,
                size: self.analysis.size_of(lhs) as u16,
            }),
            _ => {
                let qualifier = qualifier(lhs, rhs).ok_or_else(|| {
                    NscError::internal(format!("no encoding for {} {} {}", lhs, op.symbol(), rhs))
                })?;
                self.emit(Op::Binary { opcode, qualifier })
            }
        }
    }

    fn var_ref(&self, expr: &Expr) -> NscResult<VarId> {
        self.analysis
            .refs
            .get(&expr.id)
            .copied()
            .ok_or_else(|| NscError::internal(format!("identifier {} was not resolved", expr.id.0)))
    }

    /// Variable, byte offset and type of a variable or a field of one.
    fn place(&self, expr: &Expr) -> NscResult<Option<(VarId, i32, Type)>> {
        match &expr.kind {
            ExprKind::Ident(_) => match self.analysis.refs.get(&expr.id) {
                Some(var) => Ok(Some((*var, 0, self.analysis.var(*var).ty.clone()))),
                None => Ok(None),
            },
            ExprKind::Field { base, field } => match self.place(base)? {
                Some((var, offset, ty)) => {
                    let (field_offset, field_ty) = self
                        .analysis
                        .structs
                        .field(&ty, field)
                        .ok_or_else(|| NscError::internal(format!("{} has no field '{}'", ty, field)))?;
                    Ok(Some((var, offset + field_offset, field_ty)))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn load(&mut self, var: VarId, offset: i32, size: i32) -> NscResult<()> {
        let size = size as u16;
        match self.slot(var)? {
            Slot::Stack(bottom) => self.emit(Op::CpTopSp {
                offset: bottom + offset - self.frame.depth,
                size,
            }),
            Slot::Global(global) => self.emit(Op::CpTopBp {
                offset: global + offset - self.globals_size,
                size,
            }),
        }
    }

    /// Copy the value on top of the stack into a variable, leaving it there.
    pub(super) fn store(&mut self, var: VarId, offset: i32, size: i32) -> NscResult<()> {
        let size_bytes = size as u16;
        match self.slot(var)? {
            Slot::Stack(bottom) => self.emit(Op::CpDownSp {
                offset: bottom + offset - self.frame.depth,
                size: size_bytes,
            }),
            Slot::Global(global) => self.emit(Op::CpDownBp {
                offset: global + offset - self.globals_size,
                size: size_bytes,
            }),
        }
    }

    /// Increment or decrement an integer variable in place.
    fn step(&mut self, var: VarId, increment: bool) -> NscResult<()> {
        let op = match (self.slot(var)?, increment) {
            (Slot::Stack(bottom), true) => Op::IncISp(bottom - self.frame.depth),
            (Slot::Stack(bottom), false) => Op::DecISp(bottom - self.frame.depth),
            (Slot::Global(global), true) => Op::IncIBp(global - self.globals_size),
            (Slot::Global(global), false) => Op::DecIBp(global - self.globals_size),
        };
        self.emit(op)
    }

    fn call(&mut self, expr: &Expr, args: &[Expr]) -> NscResult<()> {
        let callee = self
            .analysis
            .calls
            .get(&expr.id)
            .copied()
            .ok_or_else(|| NscError::internal(format!("call {} was not resolved", expr.id.0)))?;

        match callee {
            Callee::User(func) => {
                let analysis = self.analysis;
                let info = analysis.function(func);
                if info.ret != Type::Void {
                    self.reserve(&info.ret)?;
                }

                // Last argument first; omitted trailing arguments take their defaults.
                let mut params_size = 0;
                for (index, param) in info.params.iter().enumerate().rev() {
                    match (args.get(index), &param.default) {
                        (Some(arg), _) => self.expr(arg)?,
                        (None, Some(default)) => self.constant(default)?,
                        (None, None) => {
                            return Err(NscError::internal(format!(
                                "missing argument {} to '{}'",
                                index, info.name
                            )))
                        }
                    }
                    params_size += analysis.size_of(&param.ty);
                }

                let label = self.func_label(func);
                self.call_op(Op::Jsr(label), -params_size);
                Ok(())
            }
            Callee::Engine(ordinal) => {
                let engine = self.engine;
                let func = engine
                    .function_by_ordinal(ordinal)
                    .ok_or_else(|| NscError::internal(format!("no engine function {}", ordinal)))?;

                // Only the supplied arguments; the engine fills in defaults.
                let mut pushed = 0;
                for (index, arg) in args.iter().enumerate().rev() {
                    let is_action = func.params.get(index).map(|param| param.ty == Type::Action);
                    if is_action == Some(true) {
                        self.stored_action(arg)?;
                    } else {
                        self.expr(arg)?;
                        pushed += self.analysis.size_of(&self.type_of(arg)?);
                    }
                }

                let ret = self.analysis.size_of(&func.ret);
                self.call_op(
                    Op::Action {
                        ordinal,
                        argc: args.len() as u8,
                    },
                    ret - pushed,
                );
                Ok(())
            }
        }
    }

    /// Deferred call passed to an action parameter.
    ///
    /// The engine resumes at the instruction after the jump with the saved
    /// globals and frame restored, runs the call and returns.
    fn stored_action(&mut self, call: &Expr) -> NscResult<()> {
        let after = self.new_label();
        let depth = self.frame.depth;

        self.emit(Op::StoreState {
            bp: self.globals_size as u32,
            sp: (self.frame.params_size + depth) as u32,
        })?;
        self.emit(Op::Jmp(after))?;
        self.expr(call)?;
        self.pop_to(depth)?;
        self.emit(Op::Retn)?;

        self.frame.depth = depth;
        self.mark(after)
    }
}

#[cfg(test)]
mod test {
    use super::super::test::generate_source;
    use super::*;
    use crate::codegen::{Constant, Label};

    fn main_ops(source: &str) -> Vec<Op> {
        let code = generate_source(source);
        let main = code.routines.iter().find(|routine| routine.name == "main").unwrap();
        main.ops[1..].to_vec()
    }

    #[test]
    fn test_default_elision() {
        let ops = main_ops("void Show(int a, int b = 7) {}\nvoid main() { PrintFloat(1.5); Show(1); }");
        assert_eq!(
            &ops[..4],
            &[
                Op::Const(Constant::Float(1.5)),
                Op::Action { ordinal: 2, argc: 1 },
                Op::Const(Constant::Int(7)),
                Op::Const(Constant::Int(1)),
            ]
        );
        assert!(matches!(ops[4], Op::Jsr(_)));
    }

    #[test]
    fn test_locals_and_assignment() {
        let ops = main_ops("void main() { int a = 1; int b; b = a + 2; }");
        assert_eq!(
            ops,
            vec![
                Op::RsAdd(TYPE_INT),
                Op::Const(Constant::Int(1)),
                Op::CpDownSp { offset: -8, size: 4 },
                Op::MovSp(-4),
                Op::RsAdd(TYPE_INT),
                Op::CpTopSp { offset: -8, size: 4 },
                Op::Const(Constant::Int(2)),
                Op::Binary { opcode: OP_ADD, qualifier: QUAL_II },
                Op::CpDownSp { offset: -8, size: 4 },
                Op::MovSp(-4),
                Op::MovSp(-8),
                Op::Mark(Label(2)),
                Op::Retn,
            ]
        );
    }

    #[test]
    fn test_short_circuit() {
        let ops = main_ops("void main() { int a; int b = a && Random(2); }");
        assert!(ops.contains(&Op::Binary { opcode: OP_LOGANDII, qualifier: QUAL_II }));
        assert!(ops.iter().any(|op| matches!(op, Op::Jnz(_))));
    }

    #[test]
    fn test_short_circuit_yields_truth_value() {
        let ops = main_ops("void main() { int a = 5; int b = a || Random(2); }");
        assert_eq!(
            &ops[4..],
            &[
                Op::RsAdd(TYPE_INT),
                Op::CpTopSp { offset: -8, size: 4 },
                Op::CpTopSp { offset: -4, size: 4 },
                Op::Jz(Label(3)),
                Op::CpTopSp { offset: -4, size: 4 },
                Op::Jmp(Label(4)),
                Op::Mark(Label(3)),
                Op::Const(Constant::Int(2)),
                Op::Action { ordinal: 0, argc: 1 },
                Op::Mark(Label(4)),
                Op::Binary { opcode: OP_LOGORII, qualifier: QUAL_II },
                Op::CpDownSp { offset: -8, size: 4 },
                Op::MovSp(-4),
                Op::MovSp(-8),
                Op::Mark(Label(2)),
                Op::Retn,
            ]
        );
    }

    #[test]
    fn test_stored_action() {
        let ops = main_ops("void main() { int n = 3; DelayCommand(1.0, PrintString(\"x\")); }");
        assert_eq!(
            &ops[4..11],
            &[
                Op::StoreState { bp: 0, sp: 4 },
                Op::Jmp(Label(3)),
                Op::Const(Constant::String("x".into())),
                Op::Action { ordinal: 1, argc: 1 },
                Op::Retn,
                Op::Mark(Label(3)),
                Op::Const(Constant::Float(1.0)),
            ]
        );
        assert_eq!(ops[11], Op::Action { ordinal: 4, argc: 2 });
    }

    #[test]
    fn test_field_access() {
        let ops = main_ops("void main() { vector v; float f = v.y; }");
        assert!(ops.contains(&Op::CpTopSp { offset: -12, size: 4 }));
    }
}
