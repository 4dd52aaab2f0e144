//! Label resolution and NCS serialization.
use smol_str::SmolStr;
use std::collections::HashMap;

use crate::{
    codegen::{Code, Constant, Label, Op},
    constants::*,
    error::{NscError, NscResult},
};

/// A linked compile unit.
#[derive(Debug, Clone)]
pub struct Object {
    /// Complete object file, header included.
    pub bytes: Vec<u8>,
    /// Bytes of global storage.
    pub globals_size: i32,
    /// Offset of the entry function, if the unit has one.
    pub entry_offset: Option<u32>,
    pub routines: Vec<RoutineInfo>,
}

/// Placement of a routine within the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineInfo {
    pub name: SmolStr,
    pub offset: u32,
    pub size: u32,
}

impl Object {
    /// Instruction bytes following the header.
    pub fn code(&self) -> &[u8] {
        &self.bytes[NCS_HEADER_SIZE..]
    }
}

/// Lay out the routines in order and encode them.
pub fn link(code: &Code) -> NscResult<Object> {
    let mut labels = HashMap::new();
    let mut routines = Vec::with_capacity(code.routines.len());
    let mut offset = NCS_HEADER_SIZE as u32;

    for routine in &code.routines {
        let start = offset;
        for op in &routine.ops {
            if let Op::Mark(label) = op {
                if labels.insert(*label, offset).is_some() {
                    return Err(NscError::internal(format!("label {} placed twice", label.0)));
                }
            }
            offset += op.size();
        }
        log::trace!("routine {} at 0x{:08X}, {} bytes", routine.name, start, offset - start);
        routines.push(RoutineInfo {
            name: routine.name.clone(),
            offset: start,
            size: offset - start,
        });
    }

    let mut encoder = Encoder {
        bytes: Vec::with_capacity(offset as usize),
        labels: &labels,
    };
    encoder.bytes.extend_from_slice(NCS_SIGNATURE);
    encoder.bytes.push(NCS_SIZE_MARKER);
    encoder.bytes.extend_from_slice(&offset.to_be_bytes());
    for routine in &code.routines {
        for op in &routine.ops {
            encoder.op(op)?;
        }
    }
    debug_assert_eq!(encoder.bytes.len(), offset as usize);

    let entry_offset = match code.entry {
        Some(label) => Some(resolve(&labels, label)?),
        None => None,
    };

    Ok(Object {
        bytes: encoder.bytes,
        globals_size: code.globals_size,
        entry_offset,
        routines,
    })
}

fn resolve(labels: &HashMap<Label, u32>, label: Label) -> NscResult<u32> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| NscError::internal(format!("unresolved label {}", label.0)))
}

struct Encoder<'a> {
    bytes: Vec<u8>,
    labels: &'a HashMap<Label, u32>,
}

impl<'a> Encoder<'a> {
    fn op(&mut self, op: &Op) -> NscResult<()> {
        let at = self.bytes.len() as u32;
        match op {
            Op::CpDownSp { offset, size } => self.stack_copy(OP_CPDOWNSP, *offset, *size),
            Op::RsAdd(ty) => self.pair(OP_RSADD, *ty),
            Op::CpTopSp { offset, size } => self.stack_copy(OP_CPTOPSP, *offset, *size),
            Op::Const(constant) => self.constant(constant)?,
            Op::Action { ordinal, argc } => {
                self.pair(OP_ACTION, TYPE_VOID);
                self.u16(*ordinal);
                self.bytes.push(*argc);
            }
            Op::Binary { opcode, qualifier } => self.pair(*opcode, *qualifier),
            Op::BinaryTT { opcode, size } => {
                self.pair(*opcode, QUAL_TT);
                self.u16(*size);
            }
            Op::Neg(ty) => self.pair(OP_NEG, *ty),
            Op::Comp => self.pair(OP_COMP, TYPE_INT),
            Op::NotI => self.pair(OP_NOTI, TYPE_INT),
            Op::MovSp(offset) => {
                self.pair(OP_MOVSP, TYPE_VOID);
                self.i32(*offset);
            }
            Op::Jmp(label) => self.jump(OP_JMP, *label, at)?,
            Op::Jsr(label) => self.jump(OP_JSR, *label, at)?,
            Op::Jz(label) => self.jump(OP_JZ, *label, at)?,
            Op::Jnz(label) => self.jump(OP_JNZ, *label, at)?,
            Op::Retn => self.pair(OP_RETN, TYPE_VOID),
            Op::Destruct {
                size,
                keep_offset,
                keep_size,
            } => {
                self.pair(OP_DESTRUCT, TYPE_COPY);
                self.u16(*size);
                self.u16(*keep_offset);
                self.u16(*keep_size);
            }
            Op::IncISp(offset) => self.offset(OP_INCISP, *offset),
            Op::DecISp(offset) => self.offset(OP_DECISP, *offset),
            Op::IncIBp(offset) => self.offset(OP_INCIBP, *offset),
            Op::DecIBp(offset) => self.offset(OP_DECIBP, *offset),
            Op::CpDownBp { offset, size } => self.stack_copy(OP_CPDOWNBP, *offset, *size),
            Op::CpTopBp { offset, size } => self.stack_copy(OP_CPTOPBP, *offset, *size),
            Op::SaveBp => self.pair(OP_SAVEBP, TYPE_VOID),
            Op::RestoreBp => self.pair(OP_RESTOREBP, TYPE_VOID),
            Op::StoreState { bp, sp } => {
                self.pair(OP_STORE_STATE, STORE_STATE_MASK);
                self.bytes.extend_from_slice(&bp.to_be_bytes());
                self.bytes.extend_from_slice(&sp.to_be_bytes());
            }
            Op::Nop => self.pair(OP_NOP, TYPE_VOID),
            Op::Mark(_) => {}
        }
        debug_assert_eq!(self.bytes.len() as u32 - at, op.size(), "{:?}", op);
        Ok(())
    }

    #[inline]
    fn pair(&mut self, opcode: u8, qualifier: u8) {
        self.bytes.push(opcode);
        self.bytes.push(qualifier);
    }

    #[inline]
    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    fn i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    fn stack_copy(&mut self, opcode: u8, offset: i32, size: u16) {
        self.pair(opcode, TYPE_COPY);
        self.i32(offset);
        self.u16(size);
    }

    fn offset(&mut self, opcode: u8, offset: i32) {
        self.pair(opcode, TYPE_INT);
        self.i32(offset);
    }

    /// Jump offsets are relative to the jump instruction.
    fn jump(&mut self, opcode: u8, label: Label, at: u32) -> NscResult<()> {
        let target = resolve(self.labels, label)?;
        self.pair(opcode, TYPE_VOID);
        self.i32(target as i32 - at as i32);
        Ok(())
    }

    fn constant(&mut self, constant: &Constant) -> NscResult<()> {
        match constant {
            Constant::Int(value) => {
                self.pair(OP_CONST, TYPE_INT);
                self.i32(*value);
            }
            Constant::Float(value) => {
                self.pair(OP_CONST, TYPE_FLOAT);
                self.bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::String(value) => {
                let len = u16::try_from(value.len())
                    .map_err(|_| NscError::internal(format!("string constant of {} bytes", value.len())))?;
                self.pair(OP_CONST, TYPE_STRING);
                self.u16(len);
                self.bytes.extend_from_slice(value);
            }
            Constant::Object(value) => {
                self.pair(OP_CONST, TYPE_OBJECT);
                self.i32(*value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codegen::Routine;

    fn code(ops: Vec<Op>) -> Code {
        Code {
            routines: vec![Routine {
                name: "main".into(),
                label: Label(0),
                ops,
            }],
            globals_size: 0,
            entry: Some(Label(0)),
        }
    }

    #[test]
    fn test_header_and_operands() {
        let object = link(&code(vec![
            Op::Mark(Label(0)),
            Op::Const(Constant::Int(3)),
            Op::Const(Constant::String("ab".into())),
            Op::MovSp(-8),
            Op::Retn,
        ]))
        .unwrap();

        #[rustfmt::skip]
        let expected: &[u8] = &[
            b'N', b'C', b'S', b' ', b'V', b'1', b'.', b'0', 0x42, 0x00, 0x00, 0x00, 0x21,
            0x04, 0x03, 0x00, 0x00, 0x00, 0x03,
            0x04, 0x05, 0x00, 0x02, b'a', b'b',
            0x1B, 0x00, 0xFF, 0xFF, 0xFF, 0xF8,
            0x20, 0x00,
        ];
        assert_eq!(object.bytes, expected);
        assert_eq!(object.entry_offset, Some(13));
        assert_eq!(object.routines[0].size, 20);
    }

    #[test]
    fn test_relative_jumps() {
        let object = link(&code(vec![
            Op::Mark(Label(0)),
            Op::Mark(Label(1)),
            Op::Nop,
            Op::Jmp(Label(1)),
            Op::Jz(Label(2)),
            Op::Mark(Label(2)),
            Op::Retn,
        ]))
        .unwrap();

        let code = object.code();
        assert_eq!(&code[2..8], &[0x1D, 0x00, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(&code[8..14], &[0x1F, 0x00, 0x00, 0x00, 0x00, 0x06]);
    }

    #[test]
    fn test_unresolved_label() {
        let result = link(&code(vec![Op::Mark(Label(0)), Op::Jmp(Label(7))]));
        assert!(matches!(result, Err(NscError::Internal(_))));
    }
}
