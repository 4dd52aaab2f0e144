use smol_str::SmolStr;

use super::{flow, Analyzer, ConstValue, FuncCtx, FuncId, Type, VarInfo, VarKind};
use crate::{
    diagnostics::DiagCode,
    parse::{Expr, FunctionDef, Stmt, StmtKind, VarDecl},
    source::Pos,
};

/// Labels seen so far in one switch body.
struct SwitchCtx {
    ty: Option<Type>,
    labels: Vec<ConstValue>,
    has_default: bool,
}

impl<'a> Analyzer<'a> {
    pub(super) fn function_body(&mut self, def: &FunctionDef, id: FuncId) {
        let info = self.analysis.function(id).clone();

        // Parameters share the scope of the outermost block.
        self.scopes.push();
        for (param, resolved) in def.decl.params.iter().zip(&info.params) {
            let var = self.new_var(VarInfo {
                name: param.name.clone(),
                ty: resolved.ty.clone(),
                kind: VarKind::Param,
                is_const: false,
                const_value: None,
                pos: param.pos,
            });
            if self.scopes.declare(param.name.clone(), var).is_err() {
                self.error(DiagCode::Redefinition, param.pos, format!("parameter '{}' is already defined", param.name));
            }
            self.analysis.decls.insert(param.id, var);
        }

        self.func = Some(FuncCtx {
            ret: info.ret.clone(),
            loops: 0,
            breakables: 0,
        });
        self.stmt_list(&def.body.stmts, None);
        self.func = None;
        self.scopes.pop();

        if info.ret != Type::Void && flow::block_falls_through(&def.body.stmts, &self.analysis.consts) {
            self.error(
                DiagCode::MissingReturn,
                def.decl.pos,
                format!("not every path through '{}' returns a value", info.name),
            );
        }
    }

    pub(super) fn var_decl(&mut self, decl: &VarDecl, kind: VarKind) {
        let ty = match self.resolve_type(&decl.ty, decl.pos) {
            Some(ty) if ty.is_storable() => Some(ty),
            Some(ty) => {
                self.error(DiagCode::TypeMismatch, decl.pos, format!("variables cannot have type {}", ty));
                None
            }
            None => None,
        };

        for var in &decl.vars {
            let mut const_value = None;
            if let Some(init) = &var.init {
                let value_ty = self.expr(init);
                if let (Some(ty), Some(value_ty)) = (&ty, &value_ty) {
                    if ty != value_ty {
                        self.error(
                            DiagCode::TypeMismatch,
                            init.pos,
                            format!("cannot initialize {} '{}' with {}", ty, var.name, value_ty),
                        );
                    }
                }
                if decl.is_const {
                    const_value = self.analysis.const_of(init.id).cloned();
                    if const_value.is_none() && value_ty.is_some() {
                        self.error(
                            DiagCode::NonConstantInitializer,
                            init.pos,
                            format!("constant '{}' needs a constant value", var.name),
                        );
                    }
                }
            } else if decl.is_const {
                self.error(
                    DiagCode::NonConstantInitializer,
                    var.pos,
                    format!("constant '{}' needs a value", var.name),
                );
            }

            // Unresolved types still declare the name to avoid follow-up errors.
            let id = self.new_var(VarInfo {
                name: var.name.clone(),
                ty: ty.clone().unwrap_or(Type::Int),
                kind,
                is_const: decl.is_const,
                const_value,
                pos: var.pos,
            });
            self.analysis.decls.insert(var.id, id);
            self.declare(var.name.clone(), id, kind, var.pos);
        }
    }

    fn declare(&mut self, name: SmolStr, id: super::VarId, kind: VarKind, pos: Pos) {
        match kind {
            VarKind::Global => {
                if self.globals.contains_key(&name) {
                    self.error(DiagCode::Redefinition, pos, format!("global '{}' is already defined", name));
                } else {
                    self.globals.insert(name, id);
                    self.analysis.globals.push(id);
                }
            }
            VarKind::Param | VarKind::Local => {
                if self.scopes.declare(name.clone(), id).is_err() {
                    self.error(
                        DiagCode::Redefinition,
                        pos,
                        format!("'{}' is already defined in this scope", name),
                    );
                }
            }
        }
    }

    /// Statements of one block, in order.
    ///
    /// `switch` is set when the block is the body of a switch, the only
    /// place `case` and `default` labels may appear.
    fn stmt_list(&mut self, stmts: &[Stmt], mut switch: Option<&mut SwitchCtx>) {
        let mut reachable = true;
        let mut reported = false;
        let mut skippable: Vec<(SmolStr, Pos)> = vec![];

        for stmt in stmts {
            match (&stmt.kind, switch.as_deref_mut()) {
                (StmtKind::Case(label), Some(ctx)) => {
                    self.case_label(label, ctx);
                    self.report_skipped(&mut skippable);
                    reachable = true;
                    reported = false;
                    continue;
                }
                (StmtKind::Default, Some(ctx)) => {
                    if ctx.has_default {
                        self.error(DiagCode::DuplicateSwitchLabel, stmt.pos, "duplicate 'default' label");
                    }
                    ctx.has_default = true;
                    self.report_skipped(&mut skippable);
                    reachable = true;
                    reported = false;
                    continue;
                }
                (StmtKind::Var(decl), Some(_)) => {
                    skippable.extend(decl.vars.iter().map(|var| (var.name.clone(), var.pos)));
                }
                _ => {}
            }

            if !reachable && !reported && !matches!(stmt.kind, StmtKind::Empty) {
                self.warning(DiagCode::UnreachableCode, stmt.pos, "statement is never executed");
                reported = true;
            }

            self.stmt(stmt);

            if reachable {
                reachable = match stmt.kind {
                    StmtKind::Break | StmtKind::Continue => false,
                    _ => flow::falls_through(stmt, &self.analysis.consts),
                };
            }
        }
    }

    fn report_skipped(&mut self, skippable: &mut Vec<(SmolStr, Pos)>) {
        for (name, pos) in skippable.drain(..) {
            self.error(
                DiagCode::DeclarationSkippedByCase,
                pos,
                format!("declaration of '{}' is skipped by a later case label", name),
            );
        }
    }

    fn case_label(&mut self, label: &Expr, ctx: &mut SwitchCtx) {
        let ty = match self.expr(label) {
            Some(ty) => ty,
            None => return,
        };
        let value = match self.analysis.const_of(label.id) {
            Some(value) => value.clone(),
            None => {
                self.error(DiagCode::NonConstantCaseLabel, label.pos, "case label is not a constant");
                return;
            }
        };
        if let Some(switch_ty) = &ctx.ty {
            if *switch_ty != ty {
                self.error(
                    DiagCode::TypeMismatch,
                    label.pos,
                    format!("case label is {}, switch value is {}", ty, switch_ty),
                );
                return;
            }
        }
        if ctx.labels.contains(&value) {
            self.error(DiagCode::DuplicateSwitchLabel, label.pos, "duplicate case label");
            return;
        }
        ctx.labels.push(value);
    }

    /// Statement that introduces its own scope, such as a loop body.
    fn nested_stmt(&mut self, stmt: &Stmt) {
        self.scopes.push();
        self.stmt(stmt);
        self.scopes.pop();
    }

    fn condition(&mut self, cond: &Expr) {
        if let Some(ty) = self.expr(cond) {
            if ty != Type::Int {
                self.error(DiagCode::TypeMismatch, cond.pos, format!("condition must be int, found {}", ty));
            }
        }
    }

    fn enter_loop(&mut self, is_loop: bool) {
        if let Some(func) = &mut self.func {
            func.breakables += 1;
            if is_loop {
                func.loops += 1;
            }
        }
    }

    fn leave_loop(&mut self, is_loop: bool) {
        if let Some(func) = &mut self.func {
            func.breakables -= 1;
            if is_loop {
                func.loops -= 1;
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => {
                self.scopes.push();
                self.stmt_list(&block.stmts, None);
                self.scopes.pop();
            }
            StmtKind::Var(decl) => self.var_decl(decl, VarKind::Local),
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
            StmtKind::If { cond, then, els } => {
                self.condition(cond);
                self.nested_stmt(then);
                if let Some(els) = els {
                    self.nested_stmt(els);
                }
            }
            StmtKind::While { cond, body } => {
                self.condition(cond);
                self.enter_loop(true);
                self.nested_stmt(body);
                self.leave_loop(true);
            }
            StmtKind::DoWhile { body, cond } => {
                self.enter_loop(true);
                self.nested_stmt(body);
                self.leave_loop(true);
                self.condition(cond);
            }
            StmtKind::For { init, cond, step, body } => {
                if let Some(init) = init {
                    self.expr(init);
                }
                if let Some(cond) = cond {
                    self.condition(cond);
                }
                if let Some(step) = step {
                    self.expr(step);
                }
                self.enter_loop(true);
                self.nested_stmt(body);
                self.leave_loop(true);
            }
            StmtKind::Switch { value, body } => {
                let ty = self.expr(value);
                let ty = match ty {
                    Some(ty @ (Type::Int | Type::String)) => Some(ty),
                    Some(ty) => {
                        self.error(
                            DiagCode::TypeMismatch,
                            value.pos,
                            format!("switch value must be int or string, found {}", ty),
                        );
                        None
                    }
                    None => None,
                };
                let mut ctx = SwitchCtx {
                    ty,
                    labels: vec![],
                    has_default: false,
                };
                self.enter_loop(false);
                self.scopes.push();
                self.stmt_list(&body.stmts, Some(&mut ctx));
                self.scopes.pop();
                self.leave_loop(false);
            }
            StmtKind::Case(_) | StmtKind::Default => {
                self.error(DiagCode::MisplacedJump, stmt.pos, "label is not directly inside a switch");
            }
            StmtKind::Return(value) => self.return_stmt(value.as_ref(), stmt.pos),
            StmtKind::Break => {
                if self.func.as_ref().map(|func| func.breakables).unwrap_or(0) == 0 {
                    self.error(DiagCode::MisplacedJump, stmt.pos, "'break' outside of a loop or switch");
                }
            }
            StmtKind::Continue => {
                if self.func.as_ref().map(|func| func.loops).unwrap_or(0) == 0 {
                    self.error(DiagCode::MisplacedJump, stmt.pos, "'continue' outside of a loop");
                }
            }
            StmtKind::Empty => {}
        }
    }

    fn return_stmt(&mut self, value: Option<&Expr>, pos: Pos) {
        let ret = match &self.func {
            Some(func) => func.ret.clone(),
            None => return,
        };
        match value {
            Some(value) => {
                let ty = self.expr(value);
                if ret == Type::Void {
                    self.error(DiagCode::TypeMismatch, value.pos, "void function cannot return a value");
                } else if let Some(ty) = ty {
                    if ty != ret {
                        self.error(
                            DiagCode::TypeMismatch,
                            value.pos,
                            format!("returning {} from a function declared {}", ty, ret),
                        );
                    }
                }
            }
            None if ret != Type::Void => {
                self.error(DiagCode::TypeMismatch, pos, format!("function must return a {} value", ret));
            }
            None => {}
        }
    }
}
