//! Instructions before layout.
use crate::constants::*;

/// Symbolic jump target, unique within a compile unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    String(Vec<u8>),
    Object(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Copy the top `size` bytes down to `SP + offset`.
    CpDownSp { offset: i32, size: u16 },
    /// Reserve one cell of the given type.
    RsAdd(u8),
    /// Push a copy of `size` bytes from `SP + offset`.
    CpTopSp { offset: i32, size: u16 },
    Const(Constant),
    /// Call engine function `ordinal` with `argc` arguments.
    Action { ordinal: u16, argc: u8 },
    Binary { opcode: u8, qualifier: u8 },
    /// Structure comparison over `size` bytes per operand.
    BinaryTT { opcode: u8, size: u16 },
    Neg(u8),
    Comp,
    NotI,
    MovSp(i32),
    Jmp(Label),
    Jsr(Label),
    Jz(Label),
    Jnz(Label),
    Retn,
    /// Pop `size` bytes, keeping `keep_size` bytes found at `keep_offset`.
    Destruct { size: u16, keep_offset: u16, keep_size: u16 },
    IncISp(i32),
    DecISp(i32),
    IncIBp(i32),
    DecIBp(i32),
    CpDownBp { offset: i32, size: u16 },
    CpTopBp { offset: i32, size: u16 },
    SaveBp,
    RestoreBp,
    /// Save globals and frame for a deferred action.
    StoreState { bp: u32, sp: u32 },
    Nop,
    /// Position of a label. Encodes to nothing.
    Mark(Label),
}

impl Op {
    /// Encoded size in bytes.
    #[rustfmt::skip]
    pub fn size(&self) -> u32 {
        match self {
            Op::Mark(_) => 0,
            Op::RsAdd(_) | Op::Binary { .. } | Op::Neg(_) | Op::Comp | Op::NotI
            | Op::Retn | Op::SaveBp | Op::RestoreBp | Op::Nop  => 2,
            Op::BinaryTT { .. }                                 => 4,
            Op::Action { .. }                                   => 5,
            Op::MovSp(_) | Op::Jmp(_) | Op::Jsr(_) | Op::Jz(_) | Op::Jnz(_)
            | Op::IncISp(_) | Op::DecISp(_) | Op::IncIBp(_) | Op::DecIBp(_) => 6,
            Op::CpDownSp { .. } | Op::CpTopSp { .. } | Op::CpDownBp { .. }
            | Op::CpTopBp { .. } | Op::Destruct { .. }           => 8,
            Op::StoreState { .. }                               => 10,
            Op::Const(Constant::String(value))                  => 4 + value.len() as u32,
            Op::Const(_)                                        => 6,
        }
    }

    /// Change in stack depth, in bytes.
    ///
    /// Calls return `None`; their effect depends on the callee and is
    /// supplied by the generator.
    pub fn stack_effect(&self) -> Option<i32> {
        let effect = match self {
            Op::RsAdd(_) | Op::Const(_) | Op::SaveBp => CELL_SIZE,
            Op::CpTopSp { size, .. } | Op::CpTopBp { size, .. } => *size as i32,
            Op::Binary { qualifier, .. } => match *qualifier {
                QUAL_VV => -CELL_SIZE * VECTOR_CELLS,
                _ => -CELL_SIZE,
            },
            Op::BinaryTT { size, .. } => CELL_SIZE - 2 * *size as i32,
            Op::MovSp(offset) => *offset,
            Op::Jz(_) | Op::Jnz(_) | Op::RestoreBp => -CELL_SIZE,
            Op::Destruct { size, keep_size, .. } => *keep_size as i32 - *size as i32,
            Op::Action { .. } | Op::Jsr(_) => return None,
            _ => 0,
        };
        Some(effect)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stack_effects() {
        assert_eq!(Op::Binary { opcode: OP_ADD, qualifier: QUAL_VV }.stack_effect(), Some(-12));
        assert_eq!(Op::Binary { opcode: OP_MUL, qualifier: QUAL_VF }.stack_effect(), Some(-4));
        assert_eq!(Op::BinaryTT { opcode: OP_EQUAL, size: 12 }.stack_effect(), Some(-20));
        assert_eq!(
            Op::Destruct { size: 12, keep_offset: 4, keep_size: 4 }.stack_effect(),
            Some(-8)
        );
        assert_eq!(Op::Jsr(Label(0)).stack_effect(), None);
        assert_eq!(Op::Const(Constant::String("abc".into())).size(), 7);
    }
}
