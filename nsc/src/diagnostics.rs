//! Recoverable compile problems, reported together per unit.
use smol_str::SmolStr;
use std::fmt;

use crate::source::{FileId, Pos};

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Include,
    Lex,
    Parse,
    Analyze,
    Generate,
    Emit,
}

impl fmt::Display for Stage {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Include  => write!(f, "include"),
            Stage::Lex      => write!(f, "lex"),
            Stage::Parse    => write!(f, "parse"),
            Stage::Analyze  => write!(f, "analyze"),
            Stage::Generate => write!(f, "generate"),
            Stage::Emit     => write!(f, "emit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Stable machine-readable diagnostic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagCode {
    // Include resolution
    ResolvedFromBundledLibrary,
    UnresolvedInclude,
    IncludeTooDeep,
    Io,

    // Lexing
    UnterminatedString,
    UnterminatedComment,
    MalformedNumber,
    InvalidEscape,
    UnknownCharacter,
    MalformedDirective,

    // Parsing
    UnexpectedToken,
    NonTrailingDefault,

    // Analysis
    UndefinedSymbol,
    UnknownType,
    ArityMismatch,
    TypeMismatch,
    NotAnLvalue,
    NonConstantCaseLabel,
    NonConstantDefault,
    NonConstantInitializer,
    DuplicateSwitchLabel,
    UnknownField,
    Redefinition,
    SignatureMismatch,
    MisplacedJump,
    MissingReturn,
    DeclarationSkippedByCase,
    InvalidActionArgument,
    DivisionByZero,
    StringTooLong,
    MissingFunctionBody,
    InvalidEntryPoint,
    UnreachableCode,

    Internal,
}

impl DiagCode {
    #[rustfmt::skip]
    pub fn as_str(&self) -> &'static str {
        use DiagCode as D;
        match self {
            D::ResolvedFromBundledLibrary => "resolved-from-bundled-library",
            D::UnresolvedInclude          => "unresolved-include",
            D::IncludeTooDeep             => "include-too-deep",
            D::Io                         => "io",
            D::UnterminatedString         => "unterminated-string",
            D::UnterminatedComment        => "unterminated-comment",
            D::MalformedNumber            => "malformed-number",
            D::InvalidEscape              => "invalid-escape",
            D::UnknownCharacter           => "unknown-character",
            D::MalformedDirective         => "malformed-directive",
            D::UnexpectedToken            => "unexpected-token",
            D::NonTrailingDefault         => "non-trailing-default",
            D::UndefinedSymbol            => "undefined-symbol",
            D::UnknownType                => "unknown-type",
            D::ArityMismatch              => "arity-mismatch",
            D::TypeMismatch               => "type-mismatch",
            D::NotAnLvalue                => "not-an-lvalue",
            D::NonConstantCaseLabel       => "non-constant-case-label",
            D::NonConstantDefault         => "non-constant-default",
            D::NonConstantInitializer     => "non-constant-initializer",
            D::DuplicateSwitchLabel       => "duplicate-switch-label",
            D::UnknownField               => "unknown-field",
            D::Redefinition               => "redefinition",
            D::SignatureMismatch          => "signature-mismatch",
            D::MisplacedJump              => "misplaced-jump",
            D::MissingReturn              => "missing-return",
            D::DeclarationSkippedByCase   => "declaration-skipped-by-case",
            D::InvalidActionArgument      => "invalid-action-argument",
            D::DivisionByZero             => "division-by-zero",
            D::StringTooLong              => "string-too-long",
            D::MissingFunctionBody        => "missing-function-body",
            D::InvalidEntryPoint          => "invalid-entry-point",
            D::UnreachableCode            => "unreachable-code",
            D::Internal                   => "internal",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    /// Include chain from the entry file to the file the problem is in.
    ///
    /// Filled in by the compile context from `file`.
    pub chain: Vec<SmolStr>,
    pub file: Option<FileId>,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn new(stage: Stage, severity: Severity, code: DiagCode, message: impl ToString) -> Self {
        Self {
            stage,
            severity,
            code,
            message: message.to_string(),
            chain: vec![],
            file: None,
            line: 0,
            column: 0,
        }
    }

    #[inline]
    pub fn error(stage: Stage, code: DiagCode, message: impl ToString) -> Self {
        Self::new(stage, Severity::Error, code, message)
    }

    #[inline]
    pub fn warning(stage: Stage, code: DiagCode, message: impl ToString) -> Self {
        Self::new(stage, Severity::Warning, code, message)
    }

    #[inline]
    pub fn info(stage: Stage, code: DiagCode, message: impl ToString) -> Self {
        Self::new(stage, Severity::Info, code, message)
    }

    /// Attach a source position.
    pub fn at(mut self, pos: Pos) -> Self {
        self.file = Some(pos.file);
        self.line = pos.line;
        self.column = pos.column;
        self
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    /// Format as `file:line:column: severity[code]: message`, followed by
    /// one `included from` line per enclosing file.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.chain.last() {
            Some(name) if self.line > 0 => write!(f, "{}:{}:{}: ", name, self.line, self.column)?,
            Some(name) => write!(f, "{}: ", name)?,
            None => {}
        }
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        for name in self.chain.iter().rev().skip(1) {
            write!(f, "\n    included from {}", name)?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics for one compile unit.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.items.iter().filter(|d| d.severity == severity).count()
    }

    /// Whether the unit must stop before code generation.
    pub fn blocks_codegen(&self, warnings_as_errors: bool) -> bool {
        self.items.iter().any(|d| match d.severity {
            Severity::Error => true,
            Severity::Warning => warnings_as_errors,
            Severity::Info => false,
        })
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Diagnostic> {
        self.items.iter_mut()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_chain() {
        let mut diag = Diagnostic::error(Stage::Analyze, DiagCode::UndefinedSymbol, "undefined symbol 'x'");
        diag.chain = vec!["main".into(), "nw_i0_math".into()];
        diag.line = 3;
        diag.column = 7;

        assert_eq!(
            diag.to_string(),
            "nw_i0_math:3:7: error[undefined-symbol]: undefined symbol 'x'\n    included from main"
        );
    }

    #[test]
    fn test_blocks_codegen() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::info(Stage::Include, DiagCode::ResolvedFromBundledLibrary, "bundled"));
        assert!(!diags.blocks_codegen(true));

        diags.push(Diagnostic::warning(Stage::Analyze, DiagCode::UnreachableCode, "unreachable"));
        assert!(!diags.blocks_codegen(false));
        assert!(diags.blocks_codegen(true));
    }
}
