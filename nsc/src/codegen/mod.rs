//! Analyzed syntax tree to instruction lists.
//!
//! Each routine is a flat list of [`Op`]s with symbolic labels. The
//! generator tracks the stack depth of every instruction statically:
//! variables are addressed relative to the stack pointer, globals relative
//! to the base pointer, and every label must be reached at the same depth
//! from every jump.
mod expr;
mod ops;
mod stmt;

pub use self::ops::{Constant, Label, Op};

use smol_str::SmolStr;
use std::collections::{HashMap, VecDeque};

use crate::{
    constants::*,
    error::{NscError, NscResult},
    parse::{Declarator, Expr, Item, Program},
    sema::{Analysis, ConstValue, EngineTable, EntryKind, EntryPoint, FuncId, Type, VarId},
};

/// Instructions of one function, starting with the mark of its label.
#[derive(Debug, Clone)]
pub struct Routine {
    pub name: SmolStr,
    pub label: Label,
    pub ops: Vec<Op>,
}

/// Routines of a compile unit in link order.
#[derive(Debug, Clone)]
pub struct Code {
    pub routines: Vec<Routine>,
    /// Bytes of global storage.
    pub globals_size: i32,
    /// Label of the entry function.
    pub entry: Option<Label>,
}

/// Name of the routine that starts execution.
pub const LOADER_NAME: &str = "#loader";
/// Name of the routine that initializes globals.
pub const GLOBALS_NAME: &str = "#globals";

pub fn generate(program: &Program, analysis: &Analysis, engine: &EngineTable) -> NscResult<Code> {
    Generator::new(program, analysis, engine).run()
}

/// Where a jump statement goes.
struct JumpTarget {
    brk: Label,
    /// Switches pass `continue` on to the enclosing loop.
    cont: Option<Label>,
    /// Depth at both labels.
    depth: i32,
}

/// Stack bookkeeping of the routine being generated.
#[derive(Default)]
struct Frame {
    /// Bytes pushed since entry, not counting parameters.
    depth: i32,
    params_size: i32,
    /// Bottom and size of the return slot reserved by the caller.
    ret: Option<(i32, i32)>,
    ret_label: Option<Label>,
    /// Bottom of each variable living on this frame.
    locals: HashMap<VarId, i32>,
    targets: Vec<JumpTarget>,
    labels: HashMap<Label, i32>,
}

enum Slot {
    /// Bottom of the variable relative to the frame.
    Stack(i32),
    /// Offset within global storage.
    Global(i32),
}

struct Generator<'a> {
    program: &'a Program,
    analysis: &'a Analysis,
    engine: &'a EngineTable,
    next_label: u32,
    func_labels: HashMap<FuncId, Label>,
    /// Functions referenced but not yet generated.
    queue: VecDeque<FuncId>,
    globals: HashMap<VarId, i32>,
    globals_size: i32,
    ops: Vec<Op>,
    frame: Frame,
}

impl<'a> Generator<'a> {
    fn new(program: &'a Program, analysis: &'a Analysis, engine: &'a EngineTable) -> Self {
        Self {
            program,
            analysis,
            engine,
            next_label: 0,
            func_labels: HashMap::new(),
            queue: VecDeque::new(),
            globals: HashMap::new(),
            globals_size: 0,
            ops: vec![],
            frame: Frame::default(),
        }
    }

    fn run(mut self) -> NscResult<Code> {
        for &var in &self.analysis.globals {
            let info = self.analysis.var(var);
            if info.is_const {
                continue;
            }
            self.globals.insert(var, self.globals_size);
            self.globals_size += self.analysis.size_of(&info.ty);
        }

        let entry = match self.analysis.entry {
            Some(entry) => Some((entry, self.func_label(entry.func))),
            None => None,
        };
        let globals_label = if self.globals_size > 0 { Some(self.new_label()) } else { None };

        let mut routines = vec![self.loader(entry, globals_label)];
        if let Some(label) = globals_label {
            routines.push(self.globals_routine(label, entry)?);
        }

        let mut functions = vec![];
        while let Some(func) = self.queue.pop_front() {
            let index = *self
                .analysis
                .definitions
                .get(&func)
                .ok_or_else(|| NscError::internal(format!("function {} has no definition", func.0)))?;
            functions.push((index, self.function(func, index)?));
        }

        // Definition order, with the entry function last.
        let entry_func = entry.map(|(entry, _)| entry.func);
        functions.sort_by_key(|(index, routine)| {
            let is_entry = entry_func.map(|func| self.func_labels.get(&func) == Some(&routine.label));
            (is_entry == Some(true), *index)
        });
        routines.extend(functions.into_iter().map(|(_, routine)| routine));

        log::trace!(
            "generated {} routines, {} bytes of globals",
            routines.len(),
            self.globals_size
        );

        Ok(Code {
            routines,
            globals_size: self.globals_size,
            entry: entry.map(|(_, label)| label),
        })
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Label of a user function, queueing it for generation on first use.
    fn func_label(&mut self, func: FuncId) -> Label {
        if let Some(label) = self.func_labels.get(&func) {
            return *label;
        }
        let label = self.new_label();
        self.func_labels.insert(func, label);
        self.queue.push_back(func);
        label
    }

    fn loader(&mut self, entry: Option<(EntryPoint, Label)>, globals: Option<Label>) -> Routine {
        let label = self.new_label();
        let mut ops = vec![Op::Mark(label)];
        if let Some((EntryPoint { kind: EntryKind::StartingConditional, .. }, _)) = entry {
            ops.push(Op::RsAdd(TYPE_INT));
        }
        match (globals, entry) {
            (Some(globals), _) => ops.push(Op::Jsr(globals)),
            (None, Some((_, entry))) => ops.push(Op::Jsr(entry)),
            (None, None) => {}
        }
        ops.push(Op::Retn);

        Routine {
            name: LOADER_NAME.into(),
            label,
            ops,
        }
    }

    /// Reserve global storage and point the base pointer at its top, then
    /// run the initializers and the entry function.
    ///
    /// Initializers may call functions that read other globals, so they
    /// only run once the base pointer is set.
    fn globals_routine(&mut self, label: Label, entry: Option<(EntryPoint, Label)>) -> NscResult<Routine> {
        self.begin(label, 0, None);

        let program = self.program;
        let globals: Vec<&Declarator> = program
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Global(decl) if !decl.is_const => Some(decl.vars.iter()),
                _ => None,
            })
            .flatten()
            .collect();

        for decl in &globals {
            let var = self.decl_var(decl.id)?;
            let ty = self.analysis.var(var).ty.clone();
            self.reserve(&ty)?;
        }
        self.check_depth(self.globals_size, GLOBALS_NAME)?;
        self.emit(Op::SaveBp)?;

        for decl in &globals {
            if let Some(init) = &decl.init {
                let var = self.decl_var(decl.id)?;
                let size = self.analysis.size_of(&self.analysis.var(var).ty);
                self.expr(init)?;
                self.store(var, 0, size)?;
                self.emit(Op::MovSp(-size))?;
            }
        }

        if let Some((entry, entry_label)) = entry {
            match entry.kind {
                EntryKind::Main => self.call_op(Op::Jsr(entry_label), 0),
                EntryKind::StartingConditional => {
                    self.emit(Op::RsAdd(TYPE_INT))?;
                    self.call_op(Op::Jsr(entry_label), 0);
                    // Result goes to the slot the loader reserved below this frame.
                    let offset = -CELL_SIZE - self.frame.depth;
                    self.emit(Op::CpDownSp { offset, size: CELL_SIZE as u16 })?;
                    self.emit(Op::MovSp(-CELL_SIZE))?;
                }
            }
        }
        self.emit(Op::RestoreBp)?;

        if self.globals_size > 0 {
            self.emit(Op::MovSp(-self.globals_size))?;
        }
        self.emit(Op::Retn)?;
        self.check_depth(0, GLOBALS_NAME)?;

        Ok(self.finish(GLOBALS_NAME.into(), label))
    }

    fn function(&mut self, func: FuncId, index: usize) -> NscResult<Routine> {
        let program = self.program;
        let def = match program.items.get(index) {
            Some(Item::Function(def)) => def,
            _ => return Err(NscError::internal(format!("item {} is not a function", index))),
        };
        let info = self.analysis.function(func);
        let label = self.func_label(func);

        // Arguments are pushed last to first, so the first parameter is on top.
        let mut locals = HashMap::new();
        let mut bottom = 0;
        for param in &def.decl.params {
            let var = self.decl_var(param.id)?;
            bottom -= self.analysis.size_of(&self.analysis.var(var).ty);
            locals.insert(var, bottom);
        }
        let params_size = -bottom;
        let ret_size = self.analysis.size_of(&info.ret);
        let ret = if ret_size > 0 {
            Some((-(params_size + ret_size), ret_size))
        } else {
            None
        };

        self.begin(label, params_size, ret);
        self.frame.locals = locals;
        let ret_label = self.new_label();
        self.frame.ret_label = Some(ret_label);

        self.block(&def.body.stmts)?;
        self.mark(ret_label)?;
        self.check_depth(0, &info.name)?;
        if params_size > 0 {
            self.ops.push(Op::MovSp(-params_size));
        }
        self.ops.push(Op::Retn);

        log::trace!("function {} at label {}", info.name, label.0);
        Ok(self.finish(info.name.clone(), label))
    }

    fn begin(&mut self, label: Label, params_size: i32, ret: Option<(i32, i32)>) {
        self.frame = Frame {
            params_size,
            ret,
            ..Frame::default()
        };
        self.ops = vec![Op::Mark(label)];
    }

    fn finish(&mut self, name: SmolStr, label: Label) -> Routine {
        Routine {
            name,
            label,
            ops: std::mem::take(&mut self.ops),
        }
    }

    // ------------------------------------------------------------------
    // Emission and depth tracking

    fn emit(&mut self, op: Op) -> NscResult<()> {
        let effect = op
            .stack_effect()
            .ok_or_else(|| NscError::internal(format!("{:?} needs an explicit stack effect", op)))?;
        self.frame.depth += effect;
        match &op {
            Op::Jmp(label) | Op::Jz(label) | Op::Jnz(label) => self.bind(*label)?,
            Op::Mark(_) => return Err(NscError::internal("labels are placed with mark")),
            _ => {}
        }
        self.ops.push(op);
        Ok(())
    }

    /// Emit a call whose stack effect depends on the callee.
    fn call_op(&mut self, op: Op, effect: i32) {
        self.frame.depth += effect;
        self.ops.push(op);
    }

    fn mark(&mut self, label: Label) -> NscResult<()> {
        self.bind(label)?;
        self.ops.push(Op::Mark(label));
        Ok(())
    }

    /// Every jump to a label and its mark must agree on the depth.
    fn bind(&mut self, label: Label) -> NscResult<()> {
        let depth = self.frame.depth;
        let expected = *self.frame.labels.entry(label).or_insert(depth);
        if expected != depth {
            return Err(NscError::internal(format!(
                "label {} reached at stack depth {} and {}",
                label.0, expected, depth
            )));
        }
        Ok(())
    }

    fn check_depth(&self, expected: i32, routine: &str) -> NscResult<()> {
        if self.frame.depth != expected {
            return Err(NscError::internal(format!(
                "stack depth {} at exit of '{}', expected {}",
                self.frame.depth, routine, expected
            )));
        }
        Ok(())
    }

    /// Pop everything above `depth`.
    fn pop_to(&mut self, depth: i32) -> NscResult<()> {
        match self.frame.depth - depth {
            0 => Ok(()),
            n if n > 0 => self.emit(Op::MovSp(-n)),
            n => Err(NscError::internal(format!("stack underflow by {} bytes", -n))),
        }
    }

    // ------------------------------------------------------------------
    // Variables

    fn decl_var(&self, id: crate::parse::NodeId) -> NscResult<VarId> {
        self.analysis
            .decls
            .get(&id)
            .copied()
            .ok_or_else(|| NscError::internal(format!("declaration {} was not analyzed", id.0)))
    }

    fn type_of(&self, expr: &Expr) -> NscResult<Type> {
        self.analysis
            .type_of(expr.id)
            .cloned()
            .ok_or_else(|| NscError::internal(format!("expression {} has no type", expr.id.0)))
    }

    fn slot(&self, var: VarId) -> NscResult<Slot> {
        if let Some(bottom) = self.frame.locals.get(&var) {
            Ok(Slot::Stack(*bottom))
        } else if let Some(offset) = self.globals.get(&var) {
            Ok(Slot::Global(*offset))
        } else {
            Err(NscError::internal(format!(
                "variable '{}' has no storage",
                self.analysis.var(var).name
            )))
        }
    }

    /// Reserve stack space for a variable and run its initializer.
    fn declare_var(&mut self, decl: &Declarator) -> NscResult<()> {
        let var = self.decl_var(decl.id)?;
        let ty = self.analysis.var(var).ty.clone();
        let size = self.analysis.size_of(&ty);
        let bottom = self.frame.depth;

        self.reserve(&ty)?;
        if let Some(init) = &decl.init {
            self.expr(init)?;
            self.emit(Op::CpDownSp {
                offset: -2 * size,
                size: size as u16,
            })?;
            self.emit(Op::MovSp(-size))?;
        }
        self.frame.locals.insert(var, bottom);
        Ok(())
    }

    /// Push an uninitialized value of a type.
    fn reserve(&mut self, ty: &Type) -> NscResult<()> {
        match ty {
            Type::Int => self.emit(Op::RsAdd(TYPE_INT)),
            Type::Float => self.emit(Op::RsAdd(TYPE_FLOAT)),
            Type::String => self.emit(Op::RsAdd(TYPE_STRING)),
            Type::Object => self.emit(Op::RsAdd(TYPE_OBJECT)),
            Type::Engine(index, _) => self.emit(Op::RsAdd(TYPE_ENGINE_BASE + index)),
            Type::Vector => {
                for _ in 0..VECTOR_CELLS {
                    self.emit(Op::RsAdd(TYPE_FLOAT))?;
                }
                Ok(())
            }
            Type::Struct(name) => {
                let def = self
                    .analysis
                    .structs
                    .get(name)
                    .ok_or_else(|| NscError::internal(format!("unknown structure '{}'", name)))?;
                for (_, field) in &def.fields {
                    self.reserve(field)?;
                }
                Ok(())
            }
            Type::Void | Type::Action => Err(NscError::internal(format!("cannot reserve {}", ty))),
        }
    }

    fn constant(&mut self, value: &ConstValue) -> NscResult<()> {
        match value {
            ConstValue::Int(value) => self.emit(Op::Const(Constant::Int(*value))),
            ConstValue::Float(value) => self.emit(Op::Const(Constant::Float(*value))),
            ConstValue::String(value) => self.emit(Op::Const(Constant::String(value.clone()))),
            ConstValue::Object(value) => self.emit(Op::Const(Constant::Object(*value))),
            ConstValue::Vector(components) => {
                for component in components {
                    self.emit(Op::Const(Constant::Float(*component)))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::sema::test::{analyze, ENGINE};

    pub(crate) fn generate_source(source: &str) -> Code {
        let engine = EngineTable::from_source("test", ENGINE).unwrap();
        let (program, output) = analyze(source);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        generate(&program, &output.analysis, &engine).unwrap()
    }

    fn routine<'c>(code: &'c Code, name: &str) -> &'c [Op] {
        &code
            .routines
            .iter()
            .find(|routine| routine.name == name)
            .unwrap_or_else(|| panic!("no routine {}", name))
            .ops[1..]
    }

    #[test]
    fn test_globals_only_unit() {
        let code = generate_source("int a = 1 + 2;");
        assert_eq!(code.globals_size, 4);
        assert_eq!(code.entry, None);
        assert_eq!(code.routines.len(), 2);
        assert_eq!(
            routine(&code, GLOBALS_NAME),
            &[
                Op::RsAdd(TYPE_INT),
                Op::SaveBp,
                Op::Const(Constant::Int(3)),
                Op::CpDownBp { offset: -4, size: 4 },
                Op::MovSp(-4),
                Op::RestoreBp,
                Op::MovSp(-4),
                Op::Retn,
            ]
        );
    }

    #[test]
    fn test_empty_unit() {
        let code = generate_source("");
        assert_eq!(code.routines.len(), 1);
        assert_eq!(routine(&code, LOADER_NAME), &[Op::Retn]);
    }

    #[test]
    fn test_main_without_globals() {
        let code = generate_source("void main() { ClearAllActions(); }");
        let names: Vec<&str> = code.routines.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![LOADER_NAME, "main"]);
        assert_eq!(routine(&code, LOADER_NAME), &[Op::Jsr(code.entry.unwrap()), Op::Retn]);
        assert_eq!(
            routine(&code, "main"),
            &[
                Op::Action { ordinal: 5, argc: 0 },
                Op::Mark(Label(2)),
                Op::Retn,
            ]
        );
    }

    #[test]
    fn test_starting_conditional_with_globals() {
        let code = generate_source("int g = 2;\nint StartingConditional() { return g; }");
        let entry = code.entry.unwrap();
        let ops = routine(&code, GLOBALS_NAME);
        assert_eq!(
            &ops[..5],
            &[
                Op::RsAdd(TYPE_INT),
                Op::SaveBp,
                Op::Const(Constant::Int(2)),
                Op::CpDownBp { offset: -4, size: 4 },
                Op::MovSp(-4),
            ]
        );
        assert_eq!(
            &ops[5..],
            &[
                Op::RsAdd(TYPE_INT),
                Op::Jsr(entry),
                Op::CpDownSp { offset: -16, size: 4 },
                Op::MovSp(-4),
                Op::RestoreBp,
                Op::MovSp(-4),
                Op::Retn,
            ]
        );
        let loader = routine(&code, LOADER_NAME);
        assert_eq!(loader[0], Op::RsAdd(TYPE_INT));
    }

    #[test]
    fn test_initializer_calls_run_after_savebp() {
        let code = generate_source("int a = 3;\nint Twice() { return a * 2; }\nint b = Twice();");
        assert_eq!(code.globals_size, 8);

        let ops = routine(&code, GLOBALS_NAME);
        let save = ops.iter().position(|op| *op == Op::SaveBp).unwrap();
        let call = ops.iter().position(|op| matches!(op, Op::Jsr(_))).unwrap();
        assert_eq!(&ops[..save], &[Op::RsAdd(TYPE_INT), Op::RsAdd(TYPE_INT)]);
        assert!(save < call);
        assert_eq!(ops[call + 1], Op::CpDownBp { offset: -4, size: 4 });

        // The callee reads the first global through the base pointer.
        assert!(routine(&code, "Twice").contains(&Op::CpTopBp { offset: -8, size: 4 }));
    }

    #[test]
    fn test_link_order_and_reachability() {
        let code = generate_source(
            "void Unused() {}\nint B() { return 1; }\nint A() { return B(); }\nvoid main() { A(); }",
        );
        let names: Vec<&str> = code.routines.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![LOADER_NAME, "B", "A", "main"]);
    }
}
