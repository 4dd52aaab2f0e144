//! Engine function signature table.
//!
//! Built once from an engine definition script and shared by every
//! compile unit. The script declares engine structure types with
//! `#define ENGINE_STRUCTURE_n name`, named constants as initialized
//! globals, and engine functions as bodiless prototypes. A prototype's
//! position among the prototypes is its ordinal.
use smol_str::SmolStr;
use std::{collections::HashMap, fs, path::Path, sync::Arc};

use super::{
    consteval::{ConstEval, ConstValue},
    types::Type,
};
use crate::{
    constants::MAX_ENGINE_TYPES,
    error::{NscError, NscResult},
    lex::{Lexer, Token},
    parse::{Item, Parser, TypeSpec, ENGINE_STRUCTURE_PREFIX},
    source::{decode, FileId, Origin, Pos, SourceFile, SourceMap},
};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineParam {
    pub name: SmolStr,
    pub ty: Type,
    pub default: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineFunction {
    pub ordinal: u16,
    pub name: SmolStr,
    pub ret: Type,
    pub params: Vec<EngineParam>,
}

impl EngineFunction {
    /// Number of leading parameters without a default.
    pub fn required(&self) -> usize {
        self.params.iter().take_while(|param| param.default.is_none()).count()
    }
}

#[derive(Debug, Clone)]
pub struct EngineTable {
    version: SmolStr,
    /// FNV-1a 64 of the definition script.
    checksum: u64,
    types: Vec<Option<SmolStr>>,
    functions: Vec<EngineFunction>,
    by_name: HashMap<SmolStr, u16>,
    constants: HashMap<SmolStr, ConstValue>,
}

#[inline(never)]
#[cold]
fn table_error(pos: Pos, message: impl std::fmt::Display) -> NscError {
    NscError::EngineTable(format!("{}: {}", pos, message))
}

impl EngineTable {
    pub fn from_file(version: impl Into<SmolStr>, path: impl AsRef<Path>) -> NscResult<Arc<Self>> {
        let source = decode(&fs::read(path)?);
        Self::from_source(version, &source).map(Arc::new)
    }

    pub fn from_source(version: impl Into<SmolStr>, source: &str) -> NscResult<Self> {
        let version = version.into();
        let mut sources = SourceMap::new();
        sources.add(SourceFile {
            name: "nwscript".into(),
            text: Arc::from(source),
            origin: Origin::Entry,
            parent: None,
        });

        let mut tokens: Vec<Token> = vec![];
        for result in Lexer::new(source, FileId::default()) {
            match result {
                Ok(token) => tokens.push(token),
                Err(err) => return Err(table_error(err.pos, &err)),
            }
        }

        let output = Parser::new(&tokens, &sources).parse();
        if let Some(diag) = output.diagnostics.first() {
            return Err(NscError::EngineTable(format!(
                "{}:{}: {}",
                diag.line, diag.column, diag.message
            )));
        }

        let mut table = EngineTable {
            version,
            checksum: nsc_includes::fnv1a(source.as_bytes()),
            types: vec![None; MAX_ENGINE_TYPES],
            functions: vec![],
            by_name: HashMap::new(),
            constants: HashMap::new(),
        };

        for item in &output.program.items {
            match item {
                Item::Define(define) => {
                    if let Some(slot) = define.name.strip_prefix(ENGINE_STRUCTURE_PREFIX) {
                        let index = slot
                            .parse::<usize>()
                            .ok()
                            .filter(|index| *index < MAX_ENGINE_TYPES)
                            .ok_or_else(|| table_error(define.pos, format!("invalid engine structure slot '{}'", slot)))?;
                        table.types[index] = Some(define.value.clone());
                    }
                }
                Item::Global(decl) => {
                    let ty = table.resolve(&decl.ty, decl.pos)?;
                    for var in &decl.vars {
                        let init = var
                            .init
                            .as_ref()
                            .ok_or_else(|| table_error(var.pos, format!("constant '{}' has no value", var.name)))?;
                        let value = table.eval(init)?;
                        if value.ty() != ty {
                            return Err(table_error(
                                var.pos,
                                format!("constant '{}' is declared {} but has a {} value", var.name, ty, value.ty()),
                            ));
                        }
                        table.constants.insert(var.name.clone(), value);
                    }
                }
                Item::Prototype(decl) => {
                    if table.by_name.contains_key(&decl.name) {
                        return Err(table_error(decl.pos, format!("engine function '{}' declared twice", decl.name)));
                    }
                    let ordinal = u16::try_from(table.functions.len())
                        .map_err(|_| table_error(decl.pos, "too many engine functions"))?;
                    let ret = table.resolve(&decl.ret, decl.pos)?;
                    let mut params = vec![];
                    for param in &decl.params {
                        let ty = table.resolve(&param.ty, param.pos)?;
                        let default = match &param.default {
                            Some(expr) => Some(table.eval(expr)?),
                            None => None,
                        };
                        params.push(EngineParam {
                            name: param.name.clone(),
                            ty,
                            default,
                        });
                    }
                    table.by_name.insert(decl.name.clone(), ordinal);
                    table.functions.push(EngineFunction {
                        ordinal,
                        name: decl.name.clone(),
                        ret,
                        params,
                    });
                }
                Item::Function(def) => {
                    return Err(table_error(def.decl.pos, "engine functions cannot have a body"));
                }
                Item::Struct(decl) => {
                    return Err(table_error(decl.pos, "structures are not allowed here"));
                }
                Item::Include(include) => {
                    return Err(table_error(include.pos, "includes are not allowed here"));
                }
            }
        }

        log::debug!(
            "engine table {}: {} functions, {} constants, checksum {:016X}",
            table.version,
            table.functions.len(),
            table.constants.len(),
            table.checksum
        );

        Ok(table)
    }

    fn resolve(&self, spec: &TypeSpec, pos: Pos) -> NscResult<Type> {
        match spec {
            TypeSpec::Void => Ok(Type::Void),
            TypeSpec::Int => Ok(Type::Int),
            TypeSpec::Float => Ok(Type::Float),
            TypeSpec::String => Ok(Type::String),
            TypeSpec::Object => Ok(Type::Object),
            TypeSpec::Vector => Ok(Type::Vector),
            TypeSpec::Action => Ok(Type::Action),
            TypeSpec::Engine(name) => self
                .engine_type(name)
                .ok_or_else(|| table_error(pos, format!("unknown engine type '{}'", name))),
            TypeSpec::Struct(name) => Err(table_error(pos, format!("structure type '{}' is not allowed here", name))),
        }
    }

    fn eval(&self, expr: &crate::parse::Expr) -> NscResult<ConstValue> {
        let lookup = |name: &str| self.constants.get(name).cloned();
        ConstEval::new(&lookup)
            .eval_expr(expr)
            .map_err(|err| table_error(expr.pos, format!("expected a constant value ({:?})", err)))
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn function(&self, name: &str) -> Option<&EngineFunction> {
        self.by_name.get(name).and_then(|ordinal| self.function_by_ordinal(*ordinal))
    }

    #[inline]
    pub fn function_by_ordinal(&self, ordinal: u16) -> Option<&EngineFunction> {
        self.functions.get(ordinal as usize)
    }

    pub fn functions(&self) -> &[EngineFunction] {
        &self.functions
    }

    pub fn constant(&self, name: &str) -> Option<&ConstValue> {
        self.constants.get(name)
    }

    /// Declared engine structure names.
    pub fn type_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.types.iter().flatten()
    }

    pub fn type_index(&self, name: &str) -> Option<u8> {
        self.types
            .iter()
            .position(|slot| slot.as_deref() == Some(name))
            .map(|index| index as u8)
    }

    pub fn engine_type(&self, name: &str) -> Option<Type> {
        self.type_index(name).map(|index| Type::Engine(index, SmolStr::new(name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = r#"
#define ENGINE_STRUCTURE_0 effect
#define ENGINE_STRUCTURE_2 location

int TRUE = 1;
int FALSE = 0;
float PI = 3.14159;
int MASK_ALL = 0xFF | TRUE << 8;
string EMPTY = "";

int Random(int nMaxInteger);
void PrintString(string sString);
void ClearAllActions(int nClearCombatState=FALSE);
void DelayCommand(float fSeconds, action aActionToDelay);
location GetLocation(object oObject);
effect EffectHeal(int nAmount, object oTarget=OBJECT_SELF);
"#;

    #[test]
    fn test_load_table() {
        let table = EngineTable::from_source("test", SCRIPT).unwrap();
        assert_eq!(table.version(), "test");
        assert_eq!(table.checksum(), nsc_includes::fnv1a(SCRIPT.as_bytes()));
        assert_eq!(table.functions().len(), 6);

        let clear = table.function("ClearAllActions").unwrap();
        assert_eq!(clear.ordinal, 2);
        assert_eq!(clear.required(), 0);
        assert_eq!(clear.params[0].default, Some(ConstValue::Int(0)));

        let delay = table.function_by_ordinal(3).unwrap();
        assert_eq!(delay.name, "DelayCommand");
        assert_eq!(delay.params[1].ty, Type::Action);

        assert_eq!(table.function("GetLocation").unwrap().ret, Type::Engine(2, "location".into()));
        assert_eq!(table.function("EffectHeal").unwrap().params[1].default, Some(ConstValue::Object(0)));
        assert_eq!(table.constant("MASK_ALL"), Some(&ConstValue::Int(0x1FF)));
        assert_eq!(table.type_index("location"), Some(2));
        assert_eq!(table.type_names().count(), 2);
    }

    #[test]
    fn test_rejects_body() {
        let err = EngineTable::from_source("test", "void F() { }").unwrap_err();
        assert!(matches!(err, NscError::EngineTable(_)));
    }

    #[test]
    fn test_rejects_runtime_constant() {
        let err = EngineTable::from_source("test", "int Random(int n);\nint X = Random(2);").unwrap_err();
        assert!(matches!(err, NscError::EngineTable(_)));
    }
}
