//! Constant values of the NCS object format.

/// File signature and version.
pub const NCS_SIGNATURE: &[u8; 8] = b"NCS V1.0";

/// Marker byte in front of the object's total size.
pub const NCS_SIZE_MARKER: u8 = 0x42;

/// Signature, size marker and the big-endian `u32` total size.
pub const NCS_HEADER_SIZE: usize = 13;

/// Width in bytes of a single stack cell.
pub const CELL_SIZE: i32 = 4;

/// Number of float cells in a vector.
pub const VECTOR_CELLS: i32 = 3;

/// Stored action state always saves this mask.
pub const STORE_STATE_MASK: u8 = 0x10;

/// Object constant referring to the script caller.
pub const OBJECT_SELF: i32 = 0x0000_0000;
pub const OBJECT_INVALID: i32 = 0x0000_0001;

/// Engine type slots that may be declared with `ENGINE_STRUCTURE_n`.
pub const MAX_ENGINE_TYPES: usize = 10;

// Opcodes.
pub const OP_CPDOWNSP: u8 = 0x01;
pub const OP_RSADD: u8 = 0x02;
pub const OP_CPTOPSP: u8 = 0x03;
pub const OP_CONST: u8 = 0x04;
pub const OP_ACTION: u8 = 0x05;
pub const OP_LOGANDII: u8 = 0x06;
pub const OP_LOGORII: u8 = 0x07;
pub const OP_INCORII: u8 = 0x08;
pub const OP_EXCORII: u8 = 0x09;
pub const OP_BOOLANDII: u8 = 0x0A;
pub const OP_EQUAL: u8 = 0x0B;
pub const OP_NEQUAL: u8 = 0x0C;
pub const OP_GEQ: u8 = 0x0D;
pub const OP_GT: u8 = 0x0E;
pub const OP_LT: u8 = 0x0F;
pub const OP_LEQ: u8 = 0x10;
pub const OP_SHLEFT: u8 = 0x11;
pub const OP_SHRIGHT: u8 = 0x12;
pub const OP_USHRIGHT: u8 = 0x13;
pub const OP_ADD: u8 = 0x14;
pub const OP_SUB: u8 = 0x15;
pub const OP_MUL: u8 = 0x16;
pub const OP_DIV: u8 = 0x17;
pub const OP_MOD: u8 = 0x18;
pub const OP_NEG: u8 = 0x19;
pub const OP_COMP: u8 = 0x1A;
pub const OP_MOVSP: u8 = 0x1B;
pub const OP_JMP: u8 = 0x1D;
pub const OP_JSR: u8 = 0x1E;
pub const OP_JZ: u8 = 0x1F;
pub const OP_RETN: u8 = 0x20;
pub const OP_DESTRUCT: u8 = 0x21;
pub const OP_NOTI: u8 = 0x22;
pub const OP_DECISP: u8 = 0x23;
pub const OP_INCISP: u8 = 0x24;
pub const OP_JNZ: u8 = 0x25;
pub const OP_CPDOWNBP: u8 = 0x26;
pub const OP_CPTOPBP: u8 = 0x27;
pub const OP_DECIBP: u8 = 0x28;
pub const OP_INCIBP: u8 = 0x29;
pub const OP_SAVEBP: u8 = 0x2A;
pub const OP_RESTOREBP: u8 = 0x2B;
pub const OP_STORE_STATE: u8 = 0x2C;
pub const OP_NOP: u8 = 0x2D;

// Unary type qualifiers.
pub const TYPE_VOID: u8 = 0x00;
pub const TYPE_COPY: u8 = 0x01;
pub const TYPE_INT: u8 = 0x03;
pub const TYPE_FLOAT: u8 = 0x04;
pub const TYPE_STRING: u8 = 0x05;
pub const TYPE_OBJECT: u8 = 0x06;
/// Engine type `n` is encoded as `TYPE_ENGINE_BASE + n`.
pub const TYPE_ENGINE_BASE: u8 = 0x10;

// Binary type qualifiers.
pub const QUAL_II: u8 = 0x20;
pub const QUAL_FF: u8 = 0x21;
pub const QUAL_OO: u8 = 0x22;
pub const QUAL_SS: u8 = 0x23;
pub const QUAL_TT: u8 = 0x24;
pub const QUAL_IF: u8 = 0x25;
pub const QUAL_FI: u8 = 0x26;
/// Engine type pair `n` is encoded as `QUAL_ENGINE_BASE + n`.
pub const QUAL_ENGINE_BASE: u8 = 0x30;
pub const QUAL_VV: u8 = 0x3A;
pub const QUAL_VF: u8 = 0x3B;
pub const QUAL_FV: u8 = 0x3C;
