//! State of a single compile unit.
use smol_str::SmolStr;
use std::fmt;

use crate::{
    diagnostics::{DiagCode, Diagnostic, Diagnostics, Stage},
    error::{NscError, NscResult},
    source::SourceMap,
};

/// Compile unit progress. Units only move forward, or to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitState {
    ResolvingIncludes,
    Lexing,
    Parsing,
    Analyzing,
    Generating,
    Emitting,
    Done,
    Failed,
}

impl UnitState {
    /// State that follows on success.
    #[rustfmt::skip]
    fn next(self) -> Option<UnitState> {
        use UnitState as S;
        match self {
            S::ResolvingIncludes => Some(S::Lexing),
            S::Lexing            => Some(S::Parsing),
            S::Parsing           => Some(S::Analyzing),
            S::Analyzing         => Some(S::Generating),
            S::Generating        => Some(S::Emitting),
            S::Emitting          => Some(S::Done),
            S::Done | S::Failed  => None,
        }
    }

    /// Pipeline stage the state belongs to.
    #[rustfmt::skip]
    pub fn stage(self) -> Stage {
        use UnitState as S;
        match self {
            S::ResolvingIncludes      => Stage::Include,
            S::Lexing                 => Stage::Lex,
            S::Parsing                => Stage::Parse,
            S::Analyzing              => Stage::Analyze,
            S::Generating             => Stage::Generate,
            S::Emitting | S::Done
            | S::Failed               => Stage::Emit,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed)
    }
}

impl fmt::Display for UnitState {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use UnitState as S;
        match self {
            S::ResolvingIncludes => write!(f, "RESOLVING_INCLUDES"),
            S::Lexing            => write!(f, "LEXING"),
            S::Parsing           => write!(f, "PARSING"),
            S::Analyzing         => write!(f, "ANALYZING"),
            S::Generating        => write!(f, "GENERATING"),
            S::Emitting          => write!(f, "EMITTING"),
            S::Done              => write!(f, "DONE"),
            S::Failed            => write!(f, "FAILED"),
        }
    }
}

/// Everything one compile unit carries between stages.
///
/// Nothing here is shared between units.
pub struct CompileContext {
    name: SmolStr,
    table_version: SmolStr,
    state: UnitState,
    sources: SourceMap,
    diagnostics: Diagnostics,
}

impl CompileContext {
    pub fn new(name: impl Into<SmolStr>, table_version: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            table_version: table_version.into(),
            state: UnitState::ResolvingIncludes,
            sources: SourceMap::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    #[inline]
    pub fn table_version(&self) -> &str {
        self.table_version.as_str()
    }

    #[inline]
    pub fn state(&self) -> UnitState {
        self.state
    }

    #[inline]
    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    #[inline]
    pub fn sources_mut(&mut self) -> &mut SourceMap {
        &mut self.sources
    }

    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Move to `next`, which must follow the current state.
    pub fn transition(&mut self, next: UnitState) -> NscResult<()> {
        let allowed = match next {
            UnitState::Failed => !self.state.is_terminal(),
            _ => self.state.next() == Some(next),
        };
        if !allowed {
            return Err(NscError::internal(format!(
                "unit '{}' cannot move from {} to {}",
                self.name, self.state, next
            )));
        }
        log::debug!("{}: {} -> {}", self.name, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record diagnostics, filling in their include chains.
    pub fn report(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        let sources = &self.sources;
        self.diagnostics.extend(diagnostics.into_iter().map(|mut diagnostic| {
            diagnostic.chain = match diagnostic.file {
                Some(file) => sources.chain(file),
                None => vec![self.name.clone()],
            };
            diagnostic
        }));
    }

    /// Record a fatal error as the last diagnostic and fail the unit.
    pub fn fail(&mut self, err: &NscError) {
        let code = match err {
            NscError::UnresolvedInclude { .. } => DiagCode::UnresolvedInclude,
            NscError::IncludeTooDeep { .. } => DiagCode::IncludeTooDeep,
            NscError::Io(_) => DiagCode::Io,
            _ => DiagCode::Internal,
        };
        let mut diagnostic = Diagnostic::error(self.state.stage(), code, err);
        diagnostic.chain = match err {
            NscError::UnresolvedInclude { chain, .. } if !chain.is_empty() => chain.clone(),
            _ => vec![self.name.clone()],
        };
        self.diagnostics.push(diagnostic);

        if !self.state.is_terminal() {
            log::debug!("{}: {} -> {}", self.name, self.state, UnitState::Failed);
            self.state = UnitState::Failed;
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut ctx = CompileContext::new("main", "test");
        ctx.transition(UnitState::Lexing).unwrap();
        assert!(ctx.transition(UnitState::Generating).is_err());
        ctx.transition(UnitState::Parsing).unwrap();
        ctx.transition(UnitState::Failed).unwrap();
        assert!(ctx.transition(UnitState::Failed).is_err());
    }

    #[test]
    fn test_fail_records_diagnostic() {
        let mut ctx = CompileContext::new("main", "test");
        ctx.fail(&NscError::UnresolvedInclude {
            name: "inc_missing".into(),
            chain: vec!["main".into(), "inc_a".into()],
        });
        assert_eq!(ctx.state(), UnitState::Failed);
        let diagnostics = ctx.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagCode::UnresolvedInclude);
        assert_eq!(diagnostics[0].stage, Stage::Include);
        assert_eq!(diagnostics[0].chain.len(), 2);
    }
}
