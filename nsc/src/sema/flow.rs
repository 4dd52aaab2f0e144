//! Reachability of statement ends, for missing return checks.
use std::collections::HashMap;

use super::ConstValue;
use crate::parse::{Block, Expr, NodeId, Stmt, StmtKind};

/// Folded values of the analyzed expressions.
pub type Consts = HashMap<NodeId, ConstValue>;

/// Whether control can reach the end of the statement.
pub fn falls_through(stmt: &Stmt, consts: &Consts) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => false,
        StmtKind::Block(block) => block_falls_through(&block.stmts, consts),
        StmtKind::If { then, els, .. } => match els {
            Some(els) => falls_through(then, consts) || falls_through(els, consts),
            None => true,
        },
        StmtKind::While { cond, body } => !is_const_true(Some(cond), consts) || contains_break(body),
        StmtKind::For { cond, body, .. } => !is_const_true(cond.as_ref(), consts) || contains_break(body),
        StmtKind::DoWhile { body, cond } => {
            if is_const_true(Some(cond), consts) {
                contains_break(body)
            } else {
                falls_through(body, consts) || contains_break(body) || contains_continue(body)
            }
        }
        StmtKind::Switch { body, .. } => switch_falls_through(body, consts),
        _ => true,
    }
}

/// A sequence falls through unless one of its statements does not.
///
/// A `case` or `default` label after a terminating statement makes the
/// code below it reachable again.
pub fn block_falls_through(stmts: &[Stmt], consts: &Consts) -> bool {
    let mut reachable = true;
    for stmt in stmts {
        match stmt.kind {
            StmtKind::Case(_) | StmtKind::Default => reachable = true,
            _ if reachable => reachable = falls_through(stmt, consts),
            _ => {}
        }
    }
    reachable
}

fn switch_falls_through(body: &Block, consts: &Consts) -> bool {
    let has_default = body.stmts.iter().any(|stmt| matches!(stmt.kind, StmtKind::Default));
    let breaks = body.stmts.iter().any(contains_break);
    !has_default || breaks || block_falls_through(&body.stmts, consts)
}

/// Condition that folds to a non-zero integer, or an omitted `for` condition.
fn is_const_true(cond: Option<&Expr>, consts: &Consts) -> bool {
    match cond {
        None => true,
        Some(cond) => matches!(consts.get(&cond.id), Some(ConstValue::Int(value)) if *value != 0),
    }
}

/// `break` that targets the enclosing statement.
///
/// Does not look into nested loops or switches, which own their breaks.
pub fn contains_break(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Break => true,
        StmtKind::Block(block) => block.stmts.iter().any(contains_break),
        StmtKind::If { then, els, .. } => {
            contains_break(then) || els.as_deref().map(contains_break).unwrap_or(false)
        }
        _ => false,
    }
}

/// `continue` that targets the enclosing loop.
///
/// Switches pass `continue` through to their loop.
pub fn contains_continue(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Continue => true,
        StmtKind::Block(block) => block.stmts.iter().any(contains_continue),
        StmtKind::Switch { body, .. } => body.stmts.iter().any(contains_continue),
        StmtKind::If { then, els, .. } => {
            contains_continue(then) || els.as_deref().map(contains_continue).unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{diagnostics::DiagCode, parse::Item, sema::test::analyze};

    fn body_falls_through(source: &str) -> bool {
        let (program, output) = analyze(source);
        match program.items.first() {
            Some(Item::Function(def)) => block_falls_through(&def.body.stmts, &output.analysis.consts),
            other => panic!("expected function, found {:?}", other),
        }
    }

    #[test]
    fn test_if_else() {
        assert!(!body_falls_through("int f(int a) { if (a) return 1; else return 2; }"));
        assert!(body_falls_through("int f(int a) { if (a) return 1; }"));
        assert!(!body_falls_through("int f(int a) { if (a) { return 1; } return 2; }"));
    }

    #[test]
    fn test_loops() {
        assert!(!body_falls_through("int f() { while (1) { } }"));
        assert!(body_falls_through("int f() { while (1) { break; } }"));
        assert!(!body_falls_through("int f() { for (;;) { if (1) continue; } }"));
        // Break inside a nested loop belongs to that loop.
        assert!(!body_falls_through("int f() { for (;;) { while (1) break; } }"));
        assert!(!body_falls_through("int f() { do { return 1; } while (1); }"));
        assert!(body_falls_through("int f(int a) { while (a) return 1; }"));
    }

    #[test]
    fn test_folded_conditions() {
        assert!(!body_falls_through("int f() { while (TRUE) { return 1; } }"));
        assert!(!body_falls_through("int f() { for (; 2 > 1;) { } }"));
        assert!(!body_falls_through("int f(int a) { do { if (a) continue; } while (1); }"));
        assert!(body_falls_through("int f() { do { break; } while (TRUE); }"));
        assert!(body_falls_through("int f() { while (FALSE) { return 1; } }"));

        let (_, output) = analyze("const int LOOP = 1;\nint f() { while (LOOP) { return 1; } }");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(
            analyze("int f(int a) { do { a--; } while (a); }").1.diagnostics.iter().map(|d| d.code).collect::<Vec<_>>(),
            vec![DiagCode::MissingReturn]
        );
    }
}
