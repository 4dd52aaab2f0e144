//! Script compiler producing NCS stack machine bytecode.
pub mod codegen;
mod compiler;
mod config;
pub mod constants;
mod context;
pub mod diagnostics;
mod disasm;
pub mod emit;
mod error;
pub mod include;
pub mod lex;
pub mod parse;
pub mod sema;
pub mod source;

/// Version of this compiler implementation.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        compiler::{CompileOutput, Compiler},
        config::CompilerConf,
        context::{CompileContext, UnitState},
        diagnostics::{DiagCode, Diagnostic, Severity, Stage},
        disasm::{Disassembler, Instruction},
        emit::Object,
        error::{NscError, NscResult},
        include::{DirectoryProvider, IncludeProvider, IncludeResolver, MemoryProvider},
        sema::EngineTable,
    };
}
