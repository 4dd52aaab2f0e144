//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::{
    constants::*,
    error::{NscError, NscResult},
    source::decode,
};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset from the start of the object.
    pub offset: usize,
    pub size: usize,
    pub mnemonic: String,
    pub operands: String,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{:08X} {}", self.offset, self.mnemonic)
        } else {
            write!(f, "{:08X} {} {}", self.offset, self.mnemonic, self.operands)
        }
    }
}

pub struct Disassembler<'a> {
    bytecode: &'a [u8],
    cursor: usize,
}

impl<'a> Disassembler<'a> {
    pub fn new(bytecode: &'a [u8]) -> Self {
        Self {
            bytecode,
            cursor: 0,
        }
    }

    /// Text listing with one instruction per line.
    pub fn listing(&mut self) -> NscResult<String> {
        let mut s = String::new();
        self.write_listing(&mut s)?;
        Ok(s)
    }

    pub fn write_listing<W: FmtWrite>(&mut self, w: &mut W) -> NscResult<()> {
        for instruction in self.instructions()? {
            writeln!(w, "{}", instruction).map_err(|err| NscError::internal(err))?;
        }
        Ok(())
    }

    /// Check the header and decode every instruction after it.
    pub fn instructions(&mut self) -> NscResult<Vec<Instruction>> {
        self.cursor = 0;
        self.header()?;

        let mut instructions = vec![];
        while self.cursor < self.bytecode.len() {
            instructions.push(self.disassemble()?);
        }
        Ok(instructions)
    }

    fn header(&mut self) -> NscResult<()> {
        if self.bytecode.len() < NCS_HEADER_SIZE || &self.bytecode[..NCS_SIGNATURE.len()] != NCS_SIGNATURE {
            return Err(self.error("missing NCS V1.0 signature"));
        }
        self.cursor = NCS_SIGNATURE.len();
        if self.u8()? != NCS_SIZE_MARKER {
            return Err(self.error("expected size record"));
        }
        let size = self.u32()? as usize;
        if size != self.bytecode.len() {
            return Err(self.error(format!(
                "size record says {} bytes, object has {}",
                size,
                self.bytecode.len()
            )));
        }
        Ok(())
    }

    /// Decode the instruction at the cursor.
    fn disassemble(&mut self) -> NscResult<Instruction> {
        let offset = self.cursor;
        let opcode = self.u8()?;
        let qualifier = self.u8()?;

        let (mnemonic, operands) = match opcode {
            OP_CPDOWNSP => self.dis_copy("CPDOWNSP")?,
            OP_CPTOPSP => self.dis_copy("CPTOPSP")?,
            OP_CPDOWNBP => self.dis_copy("CPDOWNBP")?,
            OP_CPTOPBP => self.dis_copy("CPTOPBP")?,
            OP_RSADD => (format!("RSADD{}", type_suffix(qualifier)), String::new()),
            OP_CONST => self.dis_const(qualifier)?,
            OP_ACTION => {
                let ordinal = self.u16()?;
                let argc = self.u8()?;
                ("ACTION".to_string(), format!("{} {}", ordinal, argc))
            }
            OP_LOGANDII..=OP_MOD => self.dis_binary(opcode, qualifier)?,
            OP_NEG => (format!("NEG{}", type_suffix(qualifier)), String::new()),
            OP_COMP => ("COMPI".to_string(), String::new()),
            OP_NOTI => ("NOTI".to_string(), String::new()),
            OP_MOVSP => ("MOVSP".to_string(), self.i32()?.to_string()),
            OP_JMP => self.dis_jump("JMP", offset)?,
            OP_JSR => self.dis_jump("JSR", offset)?,
            OP_JZ => self.dis_jump("JZ", offset)?,
            OP_JNZ => self.dis_jump("JNZ", offset)?,
            OP_RETN => ("RETN".to_string(), String::new()),
            OP_DESTRUCT => {
                let size = self.u16()?;
                let keep_offset = self.u16()?;
                let keep_size = self.u16()?;
                (
                    "DESTRUCT".to_string(),
                    format!("{} {} {}", size, keep_offset, keep_size),
                )
            }
            OP_DECISP => ("DECISP".to_string(), self.i32()?.to_string()),
            OP_INCISP => ("INCISP".to_string(), self.i32()?.to_string()),
            OP_DECIBP => ("DECIBP".to_string(), self.i32()?.to_string()),
            OP_INCIBP => ("INCIBP".to_string(), self.i32()?.to_string()),
            OP_SAVEBP => ("SAVEBP".to_string(), String::new()),
            OP_RESTOREBP => ("RESTOREBP".to_string(), String::new()),
            OP_STORE_STATE => {
                let bp = self.u32()?;
                let sp = self.u32()?;
                ("STORE_STATE".to_string(), format!("{} {}", bp, sp))
            }
            OP_NOP => ("NOP".to_string(), String::new()),
            _ => {
                self.cursor = offset;
                return Err(self.error(format!("unknown opcode 0x{:02X}", opcode)));
            }
        };

        Ok(Instruction {
            offset,
            size: self.cursor - offset,
            mnemonic,
            operands,
        })
    }

    fn dis_copy(&mut self, name: &str) -> NscResult<(String, String)> {
        let offset = self.i32()?;
        let size = self.u16()?;
        Ok((name.to_string(), format!("{} {}", offset, size)))
    }

    fn dis_const(&mut self, qualifier: u8) -> NscResult<(String, String)> {
        let operand = match qualifier {
            TYPE_INT => self.i32()?.to_string(),
            TYPE_FLOAT => format!("{:?}", f32::from_bits(self.u32()?)),
            TYPE_STRING => {
                let len = self.u16()? as usize;
                let bytes = self.take(len)?;
                format!("{:?}", decode(bytes))
            }
            TYPE_OBJECT => format!("0x{:08X}", self.i32()?),
            _ => return Err(self.error(format!("constant of type 0x{:02X}", qualifier))),
        };
        Ok((format!("CONST{}", type_suffix(qualifier)), operand))
    }

    fn dis_binary(&mut self, opcode: u8, qualifier: u8) -> NscResult<(String, String)> {
        let name = binary_name(opcode);
        if qualifier == QUAL_TT {
            let size = self.u16()?;
            return Ok((format!("{}TT", name), size.to_string()));
        }
        Ok((format!("{}{}", name, qualifier_suffix(qualifier)), String::new()))
    }

    /// Jump targets are shown as absolute offsets.
    fn dis_jump(&mut self, name: &str, at: usize) -> NscResult<(String, String)> {
        let relative = self.i32()?;
        let target = at as i64 + relative as i64;
        Ok((name.to_string(), format!("{:08X}", target)))
    }

    #[inline(never)]
    #[cold]
    fn error(&self, message: impl ToString) -> NscError {
        NscError::Malformed {
            offset: self.cursor,
            message: message.to_string(),
        }
    }

    fn take(&mut self, len: usize) -> NscResult<&'a [u8]> {
        let bytecode = self.bytecode;
        match bytecode.get(self.cursor..self.cursor + len) {
            Some(bytes) => {
                self.cursor += len;
                Ok(bytes)
            }
            None => Err(self.error("truncated instruction")),
        }
    }

    fn u8(&mut self) -> NscResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> NscResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> NscResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> NscResult<i32> {
        Ok(self.u32()? as i32)
    }
}

#[rustfmt::skip]
fn binary_name(opcode: u8) -> &'static str {
    match opcode {
        OP_LOGANDII  => "LOGAND",
        OP_LOGORII   => "LOGOR",
        OP_INCORII   => "INCOR",
        OP_EXCORII   => "EXCOR",
        OP_BOOLANDII => "BOOLAND",
        OP_EQUAL     => "EQUAL",
        OP_NEQUAL    => "NEQUAL",
        OP_GEQ       => "GEQ",
        OP_GT        => "GT",
        OP_LT        => "LT",
        OP_LEQ       => "LEQ",
        OP_SHLEFT    => "SHLEFT",
        OP_SHRIGHT   => "SHRIGHT",
        OP_USHRIGHT  => "USHRIGHT",
        OP_ADD       => "ADD",
        OP_SUB       => "SUB",
        OP_MUL       => "MUL",
        OP_DIV       => "DIV",
        OP_MOD       => "MOD",
        _            => "?",
    }
}

#[rustfmt::skip]
fn type_suffix(qualifier: u8) -> String {
    match qualifier {
        TYPE_INT    => "I".to_string(),
        TYPE_FLOAT  => "F".to_string(),
        TYPE_STRING => "S".to_string(),
        TYPE_OBJECT => "O".to_string(),
        n if n >= TYPE_ENGINE_BASE => format!("E{}", n - TYPE_ENGINE_BASE),
        n           => format!("?{:02X}", n),
    }
}

#[rustfmt::skip]
fn qualifier_suffix(qualifier: u8) -> String {
    match qualifier {
        QUAL_II => "II".to_string(),
        QUAL_FF => "FF".to_string(),
        QUAL_OO => "OO".to_string(),
        QUAL_SS => "SS".to_string(),
        QUAL_IF => "IF".to_string(),
        QUAL_FI => "FI".to_string(),
        QUAL_VV => "VV".to_string(),
        QUAL_VF => "VF".to_string(),
        QUAL_FV => "FV".to_string(),
        n if (QUAL_ENGINE_BASE..QUAL_VV).contains(&n) => {
            let index = n - QUAL_ENGINE_BASE;
            format!("E{}E{}", index, index)
        }
        n       => format!("?{:02X}", n),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::{Code, Constant, Label, Op, Routine},
        emit::link,
    };

    fn object(ops: Vec<Op>) -> Vec<u8> {
        let mut all = vec![Op::Mark(Label(0))];
        all.extend(ops);
        let code = Code {
            routines: vec![Routine {
                name: "main".into(),
                label: Label(0),
                ops: all,
            }],
            globals_size: 0,
            entry: None,
        };
        link(&code).unwrap().bytes
    }

    #[test]
    fn test_listing() {
        let bytes = object(vec![
            Op::RsAdd(TYPE_INT),
            Op::Const(Constant::Int(3)),
            Op::Const(Constant::Float(1.5)),
            Op::BinaryTT { opcode: OP_EQUAL, size: 12 },
            Op::Jz(Label(1)),
            Op::Action { ordinal: 7, argc: 0 },
            Op::Mark(Label(1)),
            Op::Retn,
        ]);
        let listing = Disassembler::new(&bytes).listing().unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(
            lines,
            vec![
                "0000000D RSADDI",
                "0000000F CONSTI 3",
                "00000015 CONSTF 1.5",
                "0000001B EQUALTT 12",
                "0000001F JZ 0000002A",
                "00000025 ACTION 7 0",
                "0000002A RETN",
            ]
        );
    }

    #[test]
    fn test_bad_header() {
        let result = Disassembler::new(b"NCS V2.0B\0\0\0\x0D").instructions();
        assert!(matches!(result, Err(NscError::Malformed { offset: 0, .. })));

        let mut bytes = object(vec![Op::Retn]);
        bytes.truncate(bytes.len() - 1);
        let result = Disassembler::new(&bytes).instructions();
        assert!(matches!(result, Err(NscError::Malformed { .. })));
    }
}
