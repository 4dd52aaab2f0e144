use super::{Generator, JumpTarget, Label, Op};
use crate::{
    constants::*,
    error::{NscError, NscResult},
    parse::{Expr, Stmt, StmtKind},
    sema::Type,
};

impl<'a> Generator<'a> {
    /// Statements of a block; locals are popped at its end.
    pub(super) fn block(&mut self, stmts: &[Stmt]) -> NscResult<()> {
        let depth = self.frame.depth;
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        self.pop_to(depth)
    }

    /// Statement with its own scope, such as a loop body.
    fn nested(&mut self, stmt: &Stmt) -> NscResult<()> {
        let depth = self.frame.depth;
        self.stmt(stmt)?;
        self.pop_to(depth)
    }

    fn stmt(&mut self, stmt: &Stmt) -> NscResult<()> {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(&block.stmts),
            StmtKind::Var(decl) => {
                for var in &decl.vars {
                    self.declare_var(var)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => self.expr_stmt(expr),
            StmtKind::If { cond, then, els } => {
                let els_label = self.new_label();
                self.expr(cond)?;
                self.emit(Op::Jz(els_label))?;
                self.nested(then)?;
                match els {
                    Some(els) => {
                        let end = self.new_label();
                        self.emit(Op::Jmp(end))?;
                        self.mark(els_label)?;
                        self.nested(els)?;
                        self.mark(end)
                    }
                    None => self.mark(els_label),
                }
            }
            StmtKind::While { cond, body } => {
                let (top, end) = (self.new_label(), self.new_label());
                self.mark(top)?;
                self.expr(cond)?;
                self.emit(Op::Jz(end))?;
                self.loop_body(body, end, Some(top))?;
                self.emit(Op::Jmp(top))?;
                self.mark(end)
            }
            StmtKind::DoWhile { body, cond } => {
                let (top, next, end) = (self.new_label(), self.new_label(), self.new_label());
                self.mark(top)?;
                self.loop_body(body, end, Some(next))?;
                self.mark(next)?;
                self.expr(cond)?;
                self.emit(Op::Jnz(top))?;
                self.mark(end)
            }
            StmtKind::For { init, cond, step, body } => {
                if let Some(init) = init {
                    self.expr_stmt(init)?;
                }
                let (top, next, end) = (self.new_label(), self.new_label(), self.new_label());
                self.mark(top)?;
                if let Some(cond) = cond {
                    self.expr(cond)?;
                    self.emit(Op::Jz(end))?;
                }
                self.loop_body(body, end, Some(next))?;
                self.mark(next)?;
                if let Some(step) = step {
                    self.expr_stmt(step)?;
                }
                self.emit(Op::Jmp(top))?;
                self.mark(end)
            }
            StmtKind::Switch { value, body } => self.switch(value, &body.stmts),
            StmtKind::Case(_) | StmtKind::Default => {
                Err(NscError::internal("case label outside of a switch body"))
            }
            StmtKind::Return(value) => self.return_stmt(value.as_ref()),
            StmtKind::Break => {
                let (label, depth) = match self.frame.targets.last() {
                    Some(target) => (target.brk, target.depth),
                    None => return Err(NscError::internal("break outside of a loop")),
                };
                self.jump_out(label, depth)
            }
            StmtKind::Continue => {
                let (label, depth) = match self
                    .frame
                    .targets
                    .iter()
                    .rev()
                    .find_map(|target| target.cont.map(|cont| (cont, target.depth)))
                {
                    Some(found) => found,
                    None => return Err(NscError::internal("continue outside of a loop")),
                };
                self.jump_out(label, depth)
            }
            StmtKind::Empty => Ok(()),
        }
    }

    fn loop_body(&mut self, body: &Stmt, brk: Label, cont: Option<Label>) -> NscResult<()> {
        self.frame.targets.push(JumpTarget {
            brk,
            cont,
            depth: self.frame.depth,
        });
        self.nested(body)?;
        self.frame.targets.pop();
        Ok(())
    }

    /// Pop down to the target depth and jump. Code after the jump is
    /// generated at the depth it would have had.
    fn jump_out(&mut self, label: Label, depth: i32) -> NscResult<()> {
        let saved = self.frame.depth;
        self.pop_to(depth)?;
        self.emit(Op::Jmp(label))?;
        self.frame.depth = saved;
        Ok(())
    }

    /// Compare the value against every case label in turn, then run the
    /// body with the value still on the stack.
    fn switch(&mut self, value: &Expr, stmts: &[Stmt]) -> NscResult<()> {
        let qualifier = match self.type_of(value)? {
            Type::String => QUAL_SS,
            _ => QUAL_II,
        };
        self.expr(value)?;
        let depth = self.frame.depth;
        let brk = self.new_label();

        let mut labels = Vec::with_capacity(stmts.len());
        let mut default = None;
        for stmt in stmts {
            let label = match &stmt.kind {
                StmtKind::Case(expr) => {
                    let label = self.new_label();
                    let constant = self
                        .analysis
                        .const_of(expr.id)
                        .ok_or_else(|| NscError::internal("case label was not folded"))?;
                    self.emit(Op::CpTopSp {
                        offset: -CELL_SIZE,
                        size: CELL_SIZE as u16,
                    })?;
                    self.constant(constant)?;
                    self.emit(Op::Binary {
                        opcode: OP_EQUAL,
                        qualifier,
                    })?;
                    self.emit(Op::Jnz(label))?;
                    Some(label)
                }
                StmtKind::Default => {
                    let label = self.new_label();
                    default = Some(label);
                    Some(label)
                }
                _ => None,
            };
            labels.push(label);
        }
        self.emit(Op::Jmp(default.unwrap_or(brk)))?;

        self.frame.targets.push(JumpTarget { brk, cont: None, depth });
        for (stmt, label) in stmts.iter().zip(labels) {
            match label {
                Some(label) => self.mark(label)?,
                None => self.stmt(stmt)?,
            }
        }
        self.pop_to(depth)?;
        self.frame.targets.pop();

        self.mark(brk)?;
        self.emit(Op::MovSp(-CELL_SIZE))
    }

    fn return_stmt(&mut self, value: Option<&Expr>) -> NscResult<()> {
        let saved = self.frame.depth;
        let ret_label = self
            .frame
            .ret_label
            .ok_or_else(|| NscError::internal("return outside of a function"))?;

        if let (Some(value), Some((bottom, size))) = (value, self.frame.ret) {
            self.expr(value)?;
            self.emit(Op::CpDownSp {
                offset: bottom - self.frame.depth,
                size: size as u16,
            })?;
        }
        self.pop_to(0)?;
        self.emit(Op::Jmp(ret_label))?;

        self.frame.depth = saved;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::test::generate_source;
    use super::*;

    fn ops_of(source: &str, name: &str) -> Vec<Op> {
        let code = generate_source(source);
        let routine = code.routines.iter().find(|routine| routine.name == name).unwrap();
        routine.ops[1..].to_vec()
    }

    #[test]
    fn test_return_value() {
        let ops = ops_of("int Twice(int n) { int m = n * 2; return m; }\nvoid main() { Twice(1); }", "Twice");
        // n at -4, m at 0.
        assert_eq!(
            ops,
            vec![
                Op::RsAdd(TYPE_INT),
                Op::CpTopSp { offset: -8, size: 4 },
                Op::Const(crate::codegen::Constant::Int(2)),
                Op::Binary { opcode: OP_MUL, qualifier: QUAL_II },
                Op::CpDownSp { offset: -8, size: 4 },
                Op::MovSp(-4),
                Op::CpTopSp { offset: -4, size: 4 },
                Op::CpDownSp { offset: -16, size: 4 },
                Op::MovSp(-8),
                Op::Jmp(Label(4)),
                Op::MovSp(-4),
                Op::Mark(Label(4)),
                Op::MovSp(-4),
                Op::Retn,
            ]
        );
    }

    #[test]
    fn test_loops_balance() {
        // Every label is checked for a consistent depth while generating.
        generate_source(
            "void main() {
                int i;
                for (i = 0; i < 3; i++) { int a = i; if (a == 1) continue; if (a == 2) break; }
                while (i > 0) { int b; i--; }
                do { string s = \"x\"; if (i) break; } while (0);
            }",
        );
    }

    #[test]
    fn test_switch_dispatch() {
        let ops = ops_of(
            "void main() { int n = Random(3); switch (n) { case 1: PrintString(\"a\"); break; default: break; } }",
            "main",
        );
        let equal = ops
            .iter()
            .filter(|op| matches!(op, Op::Binary { opcode: OP_EQUAL, qualifier: QUAL_II }))
            .count();
        assert_eq!(equal, 1);
        assert!(ops.contains(&Op::MovSp(-4)));
    }
}
