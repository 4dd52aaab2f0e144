//! Result and errors.
use smol_str::SmolStr;
use std::{
    fmt::{self, Display, Formatter},
    io,
};

pub type NscResult<T> = std::result::Result<T, NscError>;

/// Conditions that abort a compile unit.
///
/// Recoverable problems in the source are reported as
/// [`Diagnostic`](crate::diagnostics::Diagnostic) instead.
#[derive(Debug)]
pub enum NscError {
    Io(io::Error),
    /// No include provider knows the requested name.
    UnresolvedInclude {
        name: SmolStr,
        /// Include chain from the entry file to the requesting file.
        chain: Vec<SmolStr>,
    },
    /// Include nesting exceeded the configured limit.
    IncludeTooDeep { name: SmolStr, depth: usize },
    /// Invariant violated inside the compiler, for example an
    /// unresolved label or unbalanced stack at a function exit.
    Internal(String),
    /// The engine definition script could not be loaded.
    EngineTable(String),
    /// Compiled object bytes are not well formed.
    Malformed { offset: usize, message: String },
    Config(serde_yaml::Error),
}

impl NscError {
    #[inline(never)]
    #[cold]
    pub(crate) fn internal(message: impl ToString) -> Self {
        NscError::Internal(message.to_string())
    }
}

impl Display for NscError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "i/o error: {}", err),
            Self::UnresolvedInclude { name, chain } => {
                write!(f, "unresolved include \"{}\"", name)?;
                if !chain.is_empty() {
                    write!(f, " (included from {})", itertools::join(chain, " -> "))?;
                }
                Ok(())
            }
            Self::IncludeTooDeep { name, depth } => {
                write!(f, "include \"{}\" exceeds maximum nesting depth {}", name, depth)
            }
            Self::Internal(msg) => write!(f, "internal compiler error: {}", msg),
            Self::EngineTable(msg) => write!(f, "engine table: {}", msg),
            Self::Malformed { offset, message } => {
                write!(f, "malformed object at 0x{:08X}: {}", offset, message)
            }
            Self::Config(err) => write!(f, "configuration: {}", err),
        }
    }
}

impl std::error::Error for NscError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for NscError {
    fn from(err: io::Error) -> Self {
        NscError::Io(err)
    }
}

impl From<serde_yaml::Error> for NscError {
    fn from(err: serde_yaml::Error) -> Self {
        NscError::Config(err)
    }
}
