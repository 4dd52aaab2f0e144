use smol_str::SmolStr;
use std::{collections::HashMap, fmt};

use crate::constants::{CELL_SIZE, VECTOR_CELLS};

/// Resolved value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int,
    Float,
    String,
    Object,
    Vector,
    /// Deferred call, only valid as an engine function parameter.
    Action,
    Struct(SmolStr),
    /// Engine structure slot and its name.
    Engine(u8, SmolStr),
}

impl Type {
    /// Types that a variable may have.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Type::Void | Type::Action)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Vector => write!(f, "vector"),
            Type::Action => write!(f, "action"),
            Type::Struct(name) => write!(f, "struct {}", name),
            Type::Engine(_, name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: SmolStr,
    /// Fields in declaration order.
    pub fields: Vec<(SmolStr, Type)>,
    /// Size in bytes.
    pub size: i32,
}

/// User declared structures, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct StructTable {
    defs: HashMap<SmolStr, StructDef>,
}

impl StructTable {
    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&StructDef> {
        self.defs.get(name)
    }

    /// Register a structure, computing its size from its fields.
    ///
    /// Field types must already be resolved against this table.
    pub fn insert(&mut self, name: SmolStr, fields: Vec<(SmolStr, Type)>) {
        let size = fields.iter().map(|(_, ty)| self.size_of(ty)).sum();
        self.defs.insert(name.clone(), StructDef { name, fields, size });
    }

    /// Size of a value on the stack, in bytes.
    pub fn size_of(&self, ty: &Type) -> i32 {
        match ty {
            Type::Void | Type::Action => 0,
            Type::Int | Type::Float | Type::String | Type::Object | Type::Engine(..) => CELL_SIZE,
            Type::Vector => CELL_SIZE * VECTOR_CELLS,
            Type::Struct(name) => self.defs.get(name).map(|def| def.size).unwrap_or(0),
        }
    }

    /// Byte offset and type of a field within a value of type `ty`.
    ///
    /// Vectors expose their `x`, `y` and `z` components.
    pub fn field(&self, ty: &Type, field: &str) -> Option<(i32, Type)> {
        match ty {
            Type::Vector => ["x", "y", "z"]
                .iter()
                .position(|name| *name == field)
                .map(|index| (index as i32 * CELL_SIZE, Type::Float)),
            Type::Struct(name) => {
                let def = self.defs.get(name)?;
                let mut offset = 0;
                for (name, field_ty) in &def.fields {
                    if name == field {
                        return Some((offset, field_ty.clone()));
                    }
                    offset += self.size_of(field_ty);
                }
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_struct_layout() {
        let mut structs = StructTable::default();
        structs.insert("inner".into(), vec![("a".into(), Type::Int), ("v".into(), Type::Vector)]);
        structs.insert(
            "outer".into(),
            vec![("s".into(), Type::String), ("i".into(), Type::Struct("inner".into()))],
        );

        assert_eq!(structs.size_of(&Type::Struct("inner".into())), 16);
        assert_eq!(structs.size_of(&Type::Struct("outer".into())), 20);
        assert_eq!(
            structs.field(&Type::Struct("outer".into()), "i"),
            Some((4, Type::Struct("inner".into())))
        );
        assert_eq!(structs.field(&Type::Struct("inner".into()), "v"), Some((4, Type::Vector)));
        assert_eq!(structs.field(&Type::Vector, "z"), Some((8, Type::Float)));
        assert_eq!(structs.field(&Type::Vector, "w"), None);
        assert_eq!(structs.field(&Type::Int, "x"), None);
    }
}
