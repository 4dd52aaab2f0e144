//! Semantic analysis.
//!
//! Two passes over the expanded program. The first collects every
//! structure, prototype and definition so functions may be called before
//! they appear. The second resolves names, checks types and folds
//! constants. Results go into side tables keyed by [`NodeId`]; the syntax
//! tree itself is never changed.
mod consteval;
mod engine;
mod expr;
mod flow;
mod scope;
mod stmt;
mod types;

pub use self::{
    consteval::{fold_binary, fold_unary, ConstEval, ConstEvalError, ConstValue, FoldError},
    engine::{EngineFunction, EngineParam, EngineTable},
    flow::{block_falls_through, falls_through},
    scope::ScopeStack,
    types::{StructDef, StructTable, Type},
};

use smol_str::SmolStr;
use std::collections::HashMap;

use crate::{
    diagnostics::{DiagCode, Diagnostic, Stage},
    parse::{FunctionDecl, Item, NodeId, Program, TypeSpec},
    source::Pos,
};

/// Index of a variable in [`Analysis::vars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

/// Index of a user function in [`Analysis::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Global,
    Param,
    Local,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: SmolStr,
    pub ty: Type,
    pub kind: VarKind,
    pub is_const: bool,
    pub const_value: Option<ConstValue>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct FuncParam {
    pub name: SmolStr,
    pub ty: Type,
    pub default: Option<ConstValue>,
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: SmolStr,
    pub ret: Type,
    pub params: Vec<FuncParam>,
    /// A body has been seen.
    pub defined: bool,
    pub pos: Pos,
}

impl FuncInfo {
    /// Number of leading parameters without a default.
    pub fn required(&self) -> usize {
        self.params.iter().take_while(|param| param.default.is_none()).count()
    }
}

/// Resolved target of a call expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    User(FuncId),
    Engine(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// `void main()`
    Main,
    /// `int StartingConditional()`
    StartingConditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub func: FuncId,
    pub kind: EntryKind,
}

/// Side tables produced by the analyzer.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Type of every successfully checked expression.
    pub types: HashMap<NodeId, Type>,
    /// Folded value of every constant expression.
    pub consts: HashMap<NodeId, ConstValue>,
    /// Identifier expressions to the variable they name.
    pub refs: HashMap<NodeId, VarId>,
    /// Declarators and parameters to the variable they introduce.
    pub decls: HashMap<NodeId, VarId>,
    pub calls: HashMap<NodeId, Callee>,
    pub vars: Vec<VarInfo>,
    /// Global variables in declaration order.
    pub globals: Vec<VarId>,
    pub functions: Vec<FuncInfo>,
    pub func_names: HashMap<SmolStr, FuncId>,
    /// Item index of each function's definition.
    pub definitions: HashMap<FuncId, usize>,
    pub structs: StructTable,
    pub entry: Option<EntryPoint>,
}

impl Analysis {
    #[inline]
    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id)
    }

    #[inline]
    pub fn const_of(&self, id: NodeId) -> Option<&ConstValue> {
        self.consts.get(&id)
    }

    #[inline]
    pub fn var(&self, id: VarId) -> &VarInfo {
        &self.vars[id.0 as usize]
    }

    #[inline]
    pub fn function(&self, id: FuncId) -> &FuncInfo {
        &self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.func_names.get(name).copied()
    }

    /// Size of a value on the stack, in bytes.
    #[inline]
    pub fn size_of(&self, ty: &Type) -> i32 {
        self.structs.size_of(ty)
    }
}

#[derive(Debug)]
pub struct AnalyzeOutput {
    pub analysis: Analysis,
    pub diagnostics: Vec<Diagnostic>,
}

/// State of the function body being checked.
struct FuncCtx {
    ret: Type,
    /// Enclosing loops, targets of `continue`.
    loops: u32,
    /// Enclosing loops and switches, targets of `break`.
    breakables: u32,
}

pub struct Analyzer<'a> {
    engine: &'a EngineTable,
    analysis: Analysis,
    diagnostics: Vec<Diagnostic>,
    scopes: ScopeStack,
    /// Globals declared so far.
    globals: HashMap<SmolStr, VarId>,
    /// Constant globals folded during the first pass, for default values.
    early_consts: HashMap<SmolStr, ConstValue>,
    func: Option<FuncCtx>,
}

impl<'a> Analyzer<'a> {
    pub fn new(engine: &'a EngineTable) -> Self {
        Self {
            engine,
            analysis: Analysis::default(),
            diagnostics: vec![],
            scopes: ScopeStack::new(),
            globals: HashMap::new(),
            early_consts: HashMap::new(),
            func: None,
        }
    }

    pub fn analyze(mut self, program: &Program) -> AnalyzeOutput {
        self.collect(program);
        self.check(program);
        self.check_entry();

        log::trace!(
            "analyzed {} functions, {} globals, {} diagnostics",
            self.analysis.functions.len(),
            self.analysis.globals.len(),
            self.diagnostics.len()
        );
        AnalyzeOutput {
            analysis: self.analysis,
            diagnostics: self.diagnostics,
        }
    }

    fn error(&mut self, code: DiagCode, pos: Pos, message: impl ToString) {
        self.diagnostics
            .push(Diagnostic::error(Stage::Analyze, code, message).at(pos));
    }

    fn warning(&mut self, code: DiagCode, pos: Pos, message: impl ToString) {
        self.diagnostics
            .push(Diagnostic::warning(Stage::Analyze, code, message).at(pos));
    }

    fn resolve_type(&mut self, spec: &TypeSpec, pos: Pos) -> Option<Type> {
        match spec {
            TypeSpec::Void => Some(Type::Void),
            TypeSpec::Int => Some(Type::Int),
            TypeSpec::Float => Some(Type::Float),
            TypeSpec::String => Some(Type::String),
            TypeSpec::Object => Some(Type::Object),
            TypeSpec::Vector => Some(Type::Vector),
            TypeSpec::Action => Some(Type::Action),
            TypeSpec::Struct(name) => {
                if self.analysis.structs.contains(name) {
                    Some(Type::Struct(name.clone()))
                } else {
                    self.error(DiagCode::UnknownType, pos, format!("unknown structure '{}'", name));
                    None
                }
            }
            TypeSpec::Engine(name) => {
                let ty = self.engine.engine_type(name);
                if ty.is_none() {
                    self.error(
                        DiagCode::UnknownType,
                        pos,
                        format!("engine type '{}' is not declared by engine table {}", name, self.engine.version()),
                    );
                }
                ty
            }
        }
    }

    fn new_var(&mut self, info: VarInfo) -> VarId {
        let id = VarId(self.analysis.vars.len() as u32);
        self.analysis.vars.push(info);
        id
    }

    // ------------------------------------------------------------------
    // First pass

    fn collect(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Struct(decl) => {
                    if self.analysis.structs.contains(&decl.name) {
                        self.error(DiagCode::Redefinition, decl.pos, format!("structure '{}' is already defined", decl.name));
                        continue;
                    }
                    let mut fields: Vec<(SmolStr, Type)> = vec![];
                    for field in &decl.fields {
                        let ty = match self.resolve_type(&field.ty, field.pos) {
                            Some(ty) => ty,
                            None => continue,
                        };
                        if !ty.is_storable() {
                            self.error(DiagCode::TypeMismatch, field.pos, format!("field '{}' cannot have type {}", field.name, ty));
                        } else if fields.iter().any(|(name, _)| *name == field.name) {
                            self.error(DiagCode::Redefinition, field.pos, format!("field '{}' is already defined", field.name));
                        } else {
                            fields.push((field.name.clone(), ty));
                        }
                    }
                    self.analysis.structs.insert(decl.name.clone(), fields);
                }
                Item::Global(decl) if decl.is_const => {
                    for var in &decl.vars {
                        if let Some(value) = var.init.as_ref().and_then(|init| self.eval_early(init).ok()) {
                            self.early_consts.insert(var.name.clone(), value);
                        }
                    }
                }
                _ => {}
            }
        }

        for (index, item) in program.items.iter().enumerate() {
            match item {
                Item::Prototype(decl) => self.declare_function(decl, None),
                Item::Function(def) => self.declare_function(&def.decl, Some(index)),
                _ => {}
            }
        }
    }

    fn eval_early(&self, expr: &crate::parse::Expr) -> Result<ConstValue, ConstEvalError> {
        let lookup = |name: &str| {
            self.early_consts
                .get(name)
                .or_else(|| self.engine.constant(name))
                .cloned()
        };
        ConstEval::new(&lookup).eval_expr(expr)
    }

    fn declare_function(&mut self, decl: &FunctionDecl, definition: Option<usize>) {
        if self.engine.function(&decl.name).is_some() {
            self.error(
                DiagCode::Redefinition,
                decl.pos,
                format!("'{}' is already declared as an engine function", decl.name),
            );
            return;
        }

        let ret = match self.resolve_type(&decl.ret, decl.pos) {
            Some(Type::Action) => {
                self.error(DiagCode::TypeMismatch, decl.pos, "functions cannot return action");
                return;
            }
            Some(ty) => ty,
            None => return,
        };

        let mut params = vec![];
        for param in &decl.params {
            let ty = match self.resolve_type(&param.ty, param.pos) {
                Some(ty) if ty.is_storable() => ty,
                Some(ty) => {
                    self.error(DiagCode::TypeMismatch, param.pos, format!("parameter '{}' cannot have type {}", param.name, ty));
                    return;
                }
                None => return,
            };
            let default = match &param.default {
                Some(expr) => match self.eval_early(expr) {
                    Ok(value) if value.ty() == ty => Some(value),
                    Ok(value) => {
                        self.error(
                            DiagCode::TypeMismatch,
                            expr.pos,
                            format!("default value of '{}' is {}, expected {}", param.name, value.ty(), ty),
                        );
                        None
                    }
                    Err(ConstEvalError::DivisionByZero) => {
                        self.error(DiagCode::DivisionByZero, expr.pos, "division by zero in default value");
                        None
                    }
                    Err(ConstEvalError::TypeError) => {
                        self.error(DiagCode::TypeMismatch, expr.pos, "invalid operand types in default value");
                        None
                    }
                    Err(ConstEvalError::NotConst) => {
                        self.error(
                            DiagCode::NonConstantDefault,
                            expr.pos,
                            format!("default value of '{}' is not a constant", param.name),
                        );
                        None
                    }
                },
                None => None,
            };
            params.push(FuncParam {
                name: param.name.clone(),
                ty,
                default,
            });
        }

        if let Some(&id) = self.analysis.func_names.get(&decl.name) {
            let existing = &self.analysis.functions[id.0 as usize];
            let same = existing.ret == ret
                && existing.params.len() == params.len()
                && existing.params.iter().zip(&params).all(|(a, b)| a.ty == b.ty);
            if !same {
                self.error(
                    DiagCode::SignatureMismatch,
                    decl.pos,
                    format!("'{}' does not match its earlier declaration", decl.name),
                );
                return;
            }

            if let Some(index) = definition {
                if existing.defined {
                    self.error(DiagCode::Redefinition, decl.pos, format!("function '{}' is already defined", decl.name));
                    return;
                }
                self.analysis.definitions.insert(id, index);
            }

            let existing = &mut self.analysis.functions[id.0 as usize];
            existing.defined |= definition.is_some();
            for (param, new) in existing.params.iter_mut().zip(params) {
                if param.default.is_none() {
                    param.default = new.default;
                }
            }
        } else {
            let id = FuncId(self.analysis.functions.len() as u32);
            self.analysis.functions.push(FuncInfo {
                name: decl.name.clone(),
                ret,
                params,
                defined: definition.is_some(),
                pos: decl.pos,
            });
            self.analysis.func_names.insert(decl.name.clone(), id);
            if let Some(index) = definition {
                self.analysis.definitions.insert(id, index);
            }
        }
    }

    // ------------------------------------------------------------------
    // Second pass

    fn check(&mut self, program: &Program) {
        for (index, item) in program.items.iter().enumerate() {
            match item {
                Item::Global(decl) => self.var_decl(decl, VarKind::Global),
                Item::Function(def) => {
                    let id = match self.analysis.func_names.get(&def.decl.name) {
                        Some(&id) if self.analysis.definitions.get(&id) == Some(&index) => id,
                        _ => continue,
                    };
                    self.function_body(def, id);
                }
                _ => {}
            }
        }
    }

    fn check_entry(&mut self) {
        let main = self.analysis.function_by_name("main");
        let conditional = self.analysis.function_by_name("StartingConditional");

        if let (Some(main), Some(conditional)) = (main, conditional) {
            let (main, conditional) = (self.analysis.function(main), self.analysis.function(conditional));
            if main.defined && conditional.defined {
                let pos = conditional.pos;
                self.error(
                    DiagCode::InvalidEntryPoint,
                    pos,
                    "a script cannot define both 'main' and 'StartingConditional'",
                );
                return;
            }
        }

        let candidates = [
            (main, EntryKind::Main, Type::Void, "void main()"),
            (conditional, EntryKind::StartingConditional, Type::Int, "int StartingConditional()"),
        ];
        for (func, kind, ret, signature) in candidates {
            let func = match func {
                Some(func) => func,
                None => continue,
            };
            let info = self.analysis.function(func);
            let pos = info.pos;
            if info.ret != ret || !info.params.is_empty() {
                self.error(DiagCode::InvalidEntryPoint, pos, format!("entry point must be declared '{}'", signature));
            } else if !info.defined {
                let name = info.name.clone();
                self.error(DiagCode::MissingFunctionBody, pos, format!("entry point '{}' has no body", name));
            } else if self.analysis.entry.is_none() {
                self.analysis.entry = Some(EntryPoint { func, kind });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        lex::{Lexer, Token},
        parse::Parser,
        source::{FileId, Origin, SourceFile, SourceMap},
    };
    use std::sync::Arc;

    pub(crate) const ENGINE: &str = r#"
#define ENGINE_STRUCTURE_0 effect
int TRUE = 1;
int FALSE = 0;
int Random(int nMaxInteger);
void PrintString(string sString);
void PrintFloat(float fFloat, int nWidth=18, int nDecimals=9);
void AssignCommand(object oActionSubject, action aActionToAssign);
void DelayCommand(float fSeconds, action aActionToDelay);
void ClearAllActions(int nClearCombatState=FALSE);
effect EffectHeal(int nDamageToHeal);
"#;

    pub(crate) fn analyze(source: &str) -> (Program, AnalyzeOutput) {
        let engine = EngineTable::from_source("test", ENGINE).unwrap();
        let mut sources = SourceMap::new();
        sources.add(SourceFile {
            name: "test".into(),
            text: Arc::from(source),
            origin: Origin::Entry,
            parent: None,
        });
        let tokens: Vec<Token> = Lexer::new(source, FileId::default())
            .filter_map(Result::ok)
            .collect();
        let parsed = Parser::new(&tokens, &sources)
            .with_engine_types(engine.type_names().cloned())
            .parse();
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let output = Analyzer::new(&engine).analyze(&parsed.program);
        (parsed.program, output)
    }

    pub(crate) fn codes(source: &str) -> Vec<DiagCode> {
        analyze(source).1.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_prototype_then_definition() {
        let (_, output) = analyze(
            "int Add(int a, int b = 2);\nvoid main() { int x = Add(1); }\nint Add(int a, int b) { return a + b; }",
        );
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let add = output.analysis.function_by_name("Add").unwrap();
        let info = output.analysis.function(add);
        assert!(info.defined);
        assert_eq!(info.required(), 1);
        assert_eq!(info.params[1].default, Some(ConstValue::Int(2)));
        assert_eq!(
            output.analysis.entry,
            Some(EntryPoint {
                func: output.analysis.function_by_name("main").unwrap(),
                kind: EntryKind::Main
            })
        );
    }

    #[test]
    fn test_signature_checks() {
        assert_eq!(
            codes("int F(int a);\nfloat F(int a) { return 1.0; }"),
            vec![DiagCode::SignatureMismatch]
        );
        assert_eq!(
            codes("void F() {}\nvoid F() {}"),
            vec![DiagCode::Redefinition]
        );
        assert_eq!(codes("void Random() {}"), vec![DiagCode::Redefinition]);
        assert_eq!(codes("int x;\nvoid F(int a = x);"), vec![DiagCode::NonConstantDefault]);
        assert_eq!(codes("const int K = 4;\nvoid F(int a = K * 2);"), vec![]);
    }

    #[test]
    fn test_entry_points() {
        assert_eq!(
            codes("void main() {}\nint StartingConditional() { return 1; }"),
            vec![DiagCode::InvalidEntryPoint]
        );
        assert_eq!(codes("int main() { return 0; }"), vec![DiagCode::InvalidEntryPoint]);
        assert_eq!(codes("void main();"), vec![DiagCode::MissingFunctionBody]);

        let (_, output) = analyze("int StartingConditional() { return TRUE; }");
        assert_eq!(output.analysis.entry.map(|e| e.kind), Some(EntryKind::StartingConditional));

        let (_, output) = analyze("int nGlobal = 3;");
        assert!(output.diagnostics.is_empty());
        assert!(output.analysis.entry.is_none());
    }

    #[test]
    fn test_unknown_types() {
        assert_eq!(codes("struct missing m;"), vec![DiagCode::UnknownType]);
        assert_eq!(
            codes("struct a { int x; };\nstruct a { int y; };"),
            vec![DiagCode::Redefinition]
        );
    }
}
