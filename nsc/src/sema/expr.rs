use super::{
    consteval::{fold_binary, fold_unary, ConstValue},
    Analyzer, Callee, Type,
};
use crate::{
    diagnostics::DiagCode,
    parse::{BinOp, Expr, ExprKind, UnaryOp},
};

/// Longest string constant the `CONST` operand can carry.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Result type of a binary operator, if it applies to the operands.
#[rustfmt::skip]
pub fn binary_result(op: BinOp, lhs: &Type, rhs: &Type) -> Option<Type> {
    use BinOp as B;
    use Type as Ty;

    match (op, lhs, rhs) {
        (B::Add | B::Sub | B::Mul | B::Div, Ty::Int,   Ty::Int)   => Some(Ty::Int),
        (B::Add | B::Sub | B::Mul | B::Div, Ty::Float, Ty::Float)
        | (B::Add | B::Sub | B::Mul | B::Div, Ty::Int,   Ty::Float)
        | (B::Add | B::Sub | B::Mul | B::Div, Ty::Float, Ty::Int)   => Some(Ty::Float),
        (B::Add,                            Ty::String, Ty::String) => Some(Ty::String),
        (B::Add | B::Sub,                   Ty::Vector, Ty::Vector) => Some(Ty::Vector),
        (B::Mul | B::Div,                   Ty::Vector, Ty::Float)  => Some(Ty::Vector),
        (B::Mul,                            Ty::Float,  Ty::Vector) => Some(Ty::Vector),
        (B::Mod | B::Shl | B::Shr | B::UShr
        | B::BitAnd | B::BitOr | B::BitXor
        | B::LogAnd | B::LogOr,             Ty::Int,    Ty::Int)    => Some(Ty::Int),
        (B::Eq | B::Ne, lhs, rhs) if lhs == rhs && lhs.is_storable()  => Some(Ty::Int),
        (B::Lt | B::Gt | B::Le | B::Ge,     Ty::Int,    Ty::Int)
        | (B::Lt | B::Gt | B::Le | B::Ge,   Ty::Float,  Ty::Float)  => Some(Ty::Int),
        _ => None,
    }
}

impl<'a> Analyzer<'a> {
    /// Check an expression and record its type.
    ///
    /// Returns `None` when an error was already reported for it, so
    /// enclosing expressions stay quiet.
    pub(super) fn expr(&mut self, expr: &Expr) -> Option<Type> {
        let ty = self.expr_kind(expr)?;
        self.analysis.types.insert(expr.id, ty.clone());
        Some(ty)
    }

    fn fold(&mut self, expr: &Expr, value: ConstValue) {
        if let ConstValue::String(bytes) = &value {
            if bytes.len() > MAX_STRING_LEN {
                self.error(
                    DiagCode::StringTooLong,
                    expr.pos,
                    format!("string constant of {} bytes exceeds {} bytes", bytes.len(), MAX_STRING_LEN),
                );
                return;
            }
        }
        self.analysis.consts.insert(expr.id, value);
    }

    fn expr_kind(&mut self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Literal(literal) => {
                let value = ConstValue::from_literal(literal);
                let ty = value.ty();
                self.fold(expr, value);
                Some(ty)
            }
            ExprKind::Ident(name) => {
                if let Some(var) = self.scopes.lookup(name).or_else(|| self.globals.get(name).copied()) {
                    self.analysis.refs.insert(expr.id, var);
                    let info = self.analysis.var(var);
                    let ty = info.ty.clone();
                    if let Some(value) = info.const_value.clone() {
                        self.fold(expr, value);
                    }
                    Some(ty)
                } else if let Some(value) = self.engine.constant(name).cloned() {
                    let ty = value.ty();
                    self.fold(expr, value);
                    Some(ty)
                } else {
                    self.error(DiagCode::UndefinedSymbol, expr.pos, format!("undefined symbol '{}'", name));
                    None
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.expr(lhs);
                let rhs_ty = self.expr(rhs);
                let (lhs_ty, rhs_ty) = (lhs_ty?, rhs_ty?);

                let ty = match binary_result(*op, &lhs_ty, &rhs_ty) {
                    Some(ty) => ty,
                    None => {
                        self.error(
                            DiagCode::TypeMismatch,
                            expr.pos,
                            format!("operator '{}' cannot be applied to {} and {}", op.symbol(), lhs_ty, rhs_ty),
                        );
                        return None;
                    }
                };

                if self.divides_by_zero(*op, rhs) {
                    return Some(ty);
                }

                if let (Some(a), Some(b)) = (self.analysis.const_of(lhs.id), self.analysis.const_of(rhs.id)) {
                    if let Ok(value) = fold_binary(*op, a, b) {
                        self.fold(expr, value);
                    }
                }
                Some(ty)
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.expr(operand)?;
                let valid = match op {
                    UnaryOp::Neg => matches!(ty, Type::Int | Type::Float),
                    UnaryOp::Not | UnaryOp::BitNot => ty == Type::Int,
                };
                if !valid {
                    self.error(DiagCode::TypeMismatch, expr.pos, format!("invalid operand type {}", ty));
                    return None;
                }
                if let Some(value) = self.analysis.const_of(operand.id) {
                    if let Ok(value) = fold_unary(*op, value) {
                        self.fold(expr, value);
                    }
                }
                Some(ty)
            }
            ExprKind::IncDec { target, .. } => {
                let ty = self.lvalue(target)?;
                if !matches!(target.kind, ExprKind::Ident(_)) {
                    self.error(DiagCode::NotAnLvalue, target.pos, "increment target must be a variable");
                    return None;
                }
                if ty != Type::Int {
                    self.error(DiagCode::TypeMismatch, target.pos, format!("cannot increment {}", ty));
                    return None;
                }
                Some(Type::Int)
            }
            ExprKind::Call { name, args } => self.call(expr, name, args),
            ExprKind::Assign { op, target, value } => {
                let target_ty = self.lvalue(target);
                let value_ty = self.expr(value);
                let (target_ty, value_ty) = (target_ty?, value_ty?);

                match op {
                    None if target_ty != value_ty => {
                        self.error(
                            DiagCode::TypeMismatch,
                            value.pos,
                            format!("cannot assign {} to {}", value_ty, target_ty),
                        );
                        None
                    }
                    None => Some(target_ty),
                    Some(op) => {
                        if binary_result(*op, &target_ty, &value_ty).as_ref() != Some(&target_ty) {
                            self.error(
                                DiagCode::TypeMismatch,
                                expr.pos,
                                format!("operator '{}=' cannot be applied to {} and {}", op.symbol(), target_ty, value_ty),
                            );
                            return None;
                        }
                        self.divides_by_zero(*op, value);
                        Some(target_ty)
                    }
                }
            }
            ExprKind::Field { base, field } => {
                let base_ty = self.expr(base)?;
                match self.analysis.structs.field(&base_ty, field) {
                    Some((offset, ty)) => {
                        if let Some(ConstValue::Vector(v)) = self.analysis.const_of(base.id) {
                            let component = v[(offset / crate::constants::CELL_SIZE) as usize];
                            self.fold(expr, ConstValue::Float(component));
                        }
                        Some(ty)
                    }
                    None if matches!(base_ty, Type::Vector | Type::Struct(_)) => {
                        self.error(DiagCode::UnknownField, expr.pos, format!("{} has no field '{}'", base_ty, field));
                        None
                    }
                    None => {
                        self.error(DiagCode::TypeMismatch, expr.pos, format!("{} has no fields", base_ty));
                        None
                    }
                }
            }
            ExprKind::Conditional { cond, then, els } => {
                let cond_ty = self.expr(cond);
                let then_ty = self.expr(then);
                let els_ty = self.expr(els);
                let (cond_ty, then_ty, els_ty) = (cond_ty?, then_ty?, els_ty?);

                if cond_ty != Type::Int {
                    self.error(DiagCode::TypeMismatch, cond.pos, format!("condition must be int, found {}", cond_ty));
                    return None;
                }
                if then_ty != els_ty {
                    self.error(
                        DiagCode::TypeMismatch,
                        expr.pos,
                        format!("conditional branches have different types {} and {}", then_ty, els_ty),
                    );
                    return None;
                }
                if let Some(ConstValue::Int(value)) = self.analysis.const_of(cond.id) {
                    let chosen = if *value != 0 { then } else { els };
                    if let Some(folded) = self.analysis.const_of(chosen.id).cloned() {
                        self.fold(expr, folded);
                    }
                }
                Some(then_ty)
            }
        }
    }

    /// Report a constant zero divisor. Returns whether one was found.
    fn divides_by_zero(&mut self, op: BinOp, divisor: &Expr) -> bool {
        if !matches!(op, BinOp::Div | BinOp::Mod) {
            return false;
        }
        match self.analysis.const_of(divisor.id) {
            Some(value) if value.is_zero() => {
                self.error(DiagCode::DivisionByZero, divisor.pos, "division by zero");
                true
            }
            _ => false,
        }
    }

    /// Check an assignment target and return its type.
    ///
    /// Only non-constant variables and fields of them can be written.
    fn lvalue(&mut self, target: &Expr) -> Option<Type> {
        let mut root = target;
        while let ExprKind::Field { base, .. } = &root.kind {
            root = base;
        }
        if !matches!(root.kind, ExprKind::Ident(_)) {
            self.error(DiagCode::NotAnLvalue, target.pos, "expression cannot be assigned to");
            return None;
        }

        let ty = self.expr(target)?;
        let writable = match self.analysis.refs.get(&root.id) {
            Some(var) => !self.analysis.var(*var).is_const,
            None => false,
        };
        if !writable {
            self.error(DiagCode::NotAnLvalue, target.pos, "constant cannot be assigned to");
            return None;
        }
        Some(ty)
    }

    fn call(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Option<Type> {
        let arg_types: Vec<Option<Type>> = args.iter().map(|arg| self.expr(arg)).collect();

        let (callee, ret, params) = if let Some(id) = self.analysis.function_by_name(name) {
            let info = self.analysis.function(id);
            let params: Vec<(Type, bool)> = info.params.iter().map(|p| (p.ty.clone(), p.default.is_some())).collect();
            let (ret, defined) = (info.ret.clone(), info.defined);
            if !defined {
                self.error(
                    DiagCode::MissingFunctionBody,
                    expr.pos,
                    format!("'{}' is declared but never defined", name),
                );
            }
            (Callee::User(id), ret, params)
        } else if let Some(func) = self.engine.function(name) {
            let params = func.params.iter().map(|p| (p.ty.clone(), p.default.is_some())).collect();
            (Callee::Engine(func.ordinal), func.ret.clone(), params)
        } else {
            self.error(DiagCode::UndefinedSymbol, expr.pos, format!("undefined function '{}'", name));
            return None;
        };

        let required = params.iter().take_while(|(_, has_default)| !has_default).count();
        if args.len() < required || args.len() > params.len() {
            let expected = if required == params.len() {
                format!("{}", required)
            } else {
                format!("{} to {}", required, params.len())
            };
            self.error(
                DiagCode::ArityMismatch,
                expr.pos,
                format!("'{}' takes {} arguments, {} given", name, expected, args.len()),
            );
        }

        for ((arg, arg_ty), (param_ty, _)) in args.iter().zip(&arg_types).zip(&params) {
            if *param_ty == Type::Action {
                if !matches!(arg.kind, ExprKind::Call { .. }) {
                    self.error(
                        DiagCode::InvalidActionArgument,
                        arg.pos,
                        "action argument must be a function call",
                    );
                }
                continue;
            }
            if let Some(arg_ty) = arg_ty {
                if arg_ty != param_ty {
                    self.error(
                        DiagCode::TypeMismatch,
                        arg.pos,
                        format!("argument is {}, '{}' expects {}", arg_ty, name, param_ty),
                    );
                }
            }
        }

        self.analysis.calls.insert(expr.id, callee);
        Some(ret)
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{analyze, codes};
    use super::*;
    use crate::parse::Item;

    fn global_const(source: &str) -> Option<ConstValue> {
        let (program, output) = analyze(source);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let init = program
            .items
            .iter()
            .rev()
            .find_map(|item| match item {
                Item::Global(decl) => decl.vars[0].init.as_ref(),
                _ => None,
            })
            .unwrap();
        output.analysis.const_of(init.id).cloned()
    }

    #[test]
    fn test_folding() {
        assert_eq!(global_const("int a = 1 + 2;"), Some(ConstValue::Int(3)));
        assert_eq!(global_const("float f = 1 + 0.5 * 2.0;"), Some(ConstValue::Float(2.0)));
        assert_eq!(global_const("string s = \"a\" + \"b\";"), Some(ConstValue::String("ab".into())));
        assert_eq!(global_const("const int K = 3;\nint a = K << 2 | 1;"), Some(ConstValue::Int(13)));
        assert_eq!(global_const("int a = TRUE ? 7 : 9;"), Some(ConstValue::Int(7)));
        assert_eq!(global_const("float f = [1.0, 2.0, 3.0].y;"), Some(ConstValue::Float(2.0)));
        assert_eq!(global_const("int n;\nint a = n + 1;"), None);
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(binary_result(BinOp::Add, &Type::String, &Type::String), Some(Type::String));
        assert_eq!(binary_result(BinOp::Sub, &Type::String, &Type::String), None);
        assert_eq!(binary_result(BinOp::Mul, &Type::Float, &Type::Vector), Some(Type::Vector));
        assert_eq!(binary_result(BinOp::Div, &Type::Float, &Type::Vector), None);
        assert_eq!(binary_result(BinOp::Eq, &Type::Object, &Type::Object), Some(Type::Int));
        assert_eq!(binary_result(BinOp::Lt, &Type::Int, &Type::Float), None);
        assert_eq!(binary_result(BinOp::Mod, &Type::Float, &Type::Float), None);
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(codes("int a = \"x\";"), vec![DiagCode::TypeMismatch]);
        assert_eq!(codes("int a = 1 / 0;"), vec![DiagCode::DivisionByZero]);
        assert_eq!(codes("void main() { float f = 2.0; f /= 0.0; }"), vec![DiagCode::DivisionByZero]);
        assert_eq!(codes("int a = b;"), vec![DiagCode::UndefinedSymbol]);
        assert_eq!(codes("int a = -\"x\" + 1;"), vec![DiagCode::TypeMismatch]);
        assert_eq!(codes("const int K = 1;\nvoid main() { K = 2; }"), vec![DiagCode::NotAnLvalue]);
        assert_eq!(codes("void main() { 1 = 2; }"), vec![DiagCode::NotAnLvalue]);
        assert_eq!(codes("void main() { float f; f++; }"), vec![DiagCode::TypeMismatch]);
        assert_eq!(codes("int n;\nconst int K = n;"), vec![DiagCode::NonConstantInitializer]);
    }

    #[test]
    fn test_fields() {
        let source = "struct pair { int a; vector v; };\nvoid main() { struct pair p; p.a = 1; p.v.x = 2.0; float f = p.v.z; }";
        assert_eq!(codes(source), vec![]);
        assert_eq!(
            codes("struct pair { int a; };\nvoid main() { struct pair p; p.b = 1; }"),
            vec![DiagCode::UnknownField]
        );
        assert_eq!(codes("void main() { int n; n.x = 1; }"), vec![DiagCode::TypeMismatch]);
    }

    #[test]
    fn test_calls() {
        assert_eq!(codes("void main() { PrintFloat(1.0); PrintFloat(1.0, 4, 2); }"), vec![]);
        assert_eq!(codes("void main() { PrintFloat(); }"), vec![DiagCode::ArityMismatch]);
        assert_eq!(codes("void main() { PrintString(1); }"), vec![DiagCode::TypeMismatch]);
        assert_eq!(codes("void main() { Frobnicate(); }"), vec![DiagCode::UndefinedSymbol]);
        assert_eq!(
            codes("void main() { DelayCommand(1.0, ClearAllActions()); }"),
            vec![]
        );
        assert_eq!(
            codes("void main() { int n; DelayCommand(1.0, n); }"),
            vec![DiagCode::InvalidActionArgument]
        );
        assert_eq!(
            codes("void F();\nvoid main() { F(); }"),
            vec![DiagCode::MissingFunctionBody]
        );
        assert_eq!(codes("void main() { effect e = EffectHeal(5); }"), vec![]);
    }

    #[test]
    fn test_string_too_long() {
        let long = "a".repeat(MAX_STRING_LEN + 1);
        assert_eq!(
            codes(&format!("void main() {{ PrintString(\"{}\"); }}", long)),
            vec![DiagCode::StringTooLong]
        );

        let half = "b".repeat(MAX_STRING_LEN / 2 + 1);
        assert_eq!(
            codes(&format!("string s = \"{}\" + \"{}\";", half, half)),
            vec![DiagCode::StringTooLong]
        );

        let exact = "c".repeat(MAX_STRING_LEN);
        assert_eq!(codes(&format!("string s = \"{}\";", exact)), vec![]);
    }
}
