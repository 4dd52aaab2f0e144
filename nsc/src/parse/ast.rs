//! Abstract syntax tree.
//!
//! Every node owns its children. Expressions, declarators and parameters
//! carry a [`NodeId`] that the analyzer uses to key its side tables.
use smol_str::SmolStr;

use crate::source::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(def) => Some(def),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub enum Item {
    Include(IncludeDirective),
    Define(Define),
    Struct(StructDecl),
    Prototype(FunctionDecl),
    Function(FunctionDef),
    Global(VarDecl),
}

#[derive(Debug)]
pub struct IncludeDirective {
    pub name: SmolStr,
    pub pos: Pos,
}

/// `#define NAME value`, only meaningful in engine definition scripts.
#[derive(Debug)]
pub struct Define {
    pub name: SmolStr,
    pub value: SmolStr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    Void,
    Int,
    Float,
    String,
    Object,
    Vector,
    Action,
    Struct(SmolStr),
    /// Named engine structure such as `effect` or `location`.
    Engine(SmolStr),
}

#[derive(Debug)]
pub struct StructDecl {
    pub name: SmolStr,
    pub fields: Vec<FieldDecl>,
    pub pos: Pos,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub ty: TypeSpec,
    pub name: SmolStr,
    pub pos: Pos,
}

#[derive(Debug)]
pub struct Param {
    pub id: NodeId,
    pub ty: TypeSpec,
    pub name: SmolStr,
    pub default: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub ret: TypeSpec,
    pub name: SmolStr,
    pub params: Vec<Param>,
    pub pos: Pos,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub decl: FunctionDecl,
    pub body: Block,
}

/// One declaration statement, possibly declaring several names.
#[derive(Debug)]
pub struct VarDecl {
    pub is_const: bool,
    pub ty: TypeSpec,
    pub vars: Vec<Declarator>,
    pub pos: Pos,
}

#[derive(Debug)]
pub struct Declarator {
    pub id: NodeId,
    pub name: SmolStr,
    pub init: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug)]
pub enum StmtKind {
    Block(Block),
    Var(VarDecl),
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Expr>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        value: Expr,
        body: Block,
    },
    Case(Expr),
    Default,
    Return(Option<Expr>),
    Break,
    Continue,
    /// Lone `;`.
    Empty,
}

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(Literal),
    Ident(SmolStr),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `++x`, `x++`, `--x` and `x--`.
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Call {
        name: SmolStr,
        args: Vec<Expr>,
    },
    /// Plain assignment when `op` is `None`, compound otherwise.
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: SmolStr,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    /// Bytes after escape decoding.
    String(Vec<u8>),
    /// `OBJECT_SELF` or `OBJECT_INVALID`.
    Object(i32),
    Vector([f32; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        use BinOp as B;
        match self {
            B::Add => "+",
            B::Sub => "-",
            B::Mul => "*",
            B::Div => "/",
            B::Mod => "%",
            B::Shl => "<<",
            B::Shr => ">>",
            B::UShr => ">>>",
            B::BitAnd => "&",
            B::BitOr => "|",
            B::BitXor => "^",
            B::LogAnd => "&&",
            B::LogOr => "||",
            B::Eq => "==",
            B::Ne => "!=",
            B::Lt => "<",
            B::Gt => ">",
            B::Le => "<=",
            B::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}
