//! Compile pipeline.
use smol_str::SmolStr;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use crate::{
    codegen,
    config::CompilerConf,
    context::{CompileContext, UnitState},
    diagnostics::{Diagnostic, Severity},
    emit::{self, Object},
    error::{NscError, NscResult},
    include::{self, normalize, DirectoryProvider, IncludeResolver},
    parse::Parser,
    sema::{Analyzer, EngineTable},
    source::{decode, Origin, SourceFile},
};

/// Provider name of the directory holding a compiled script.
const UNIT_DIR_PROVIDER: &str = "source";

/// Result of compiling one unit.
#[derive(Debug)]
pub struct CompileOutput {
    pub name: SmolStr,
    /// Present only when the unit reached `Done`.
    pub object: Option<Object>,
    /// Every diagnostic of the unit, in the order they were found.
    pub diagnostics: Vec<Diagnostic>,
    pub state: UnitState,
    /// Condition that aborted the unit, also reported as the last
    /// diagnostic.
    pub error: Option<NscError>,
}

impl CompileOutput {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.object.is_some()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }
}

/// Compiles units against one engine table and include setup.
///
/// A compiler is shared by the workers of a batch.
pub struct Compiler {
    resolver: IncludeResolver,
    engine: Arc<EngineTable>,
    warnings_as_errors: bool,
}

impl Compiler {
    pub fn new(engine: Arc<EngineTable>) -> Self {
        Self {
            resolver: IncludeResolver::new(),
            engine,
            warnings_as_errors: false,
        }
    }

    /// Build a compiler from configuration, loading the engine table.
    pub fn from_conf(conf: &CompilerConf) -> NscResult<Self> {
        let path = conf
            .nwscript
            .as_ref()
            .ok_or_else(|| NscError::EngineTable("no engine definition script configured".to_string()))?;
        let version = conf
            .table_version
            .as_deref()
            .ok_or_else(|| NscError::EngineTable("no engine table version configured".to_string()))?;
        let engine = EngineTable::from_file(version, path)?;

        let mut resolver = IncludeResolver::new()
            .with_bundled(conf.use_bundled_library)
            .with_max_depth(conf.max_include_depth);
        if !conf.include_paths.is_empty() {
            resolver = resolver.with_project(DirectoryProvider::new("project", conf.include_paths.iter()));
        }
        if !conf.resource_paths.is_empty() {
            resolver = resolver.with_resources(DirectoryProvider::new("resources", conf.resource_paths.iter()));
        }

        Ok(Self::new(engine)
            .with_resolver(resolver)
            .with_warnings_as_errors(conf.warnings_as_errors))
    }

    pub fn with_resolver(mut self, resolver: IncludeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    #[inline]
    pub fn engine(&self) -> &EngineTable {
        &self.engine
    }

    /// Compile source text. `name` is the unit name used in diagnostics.
    pub fn compile(&self, name: &str, source: &str) -> CompileOutput {
        self.compile_unit(name, source, None)
    }

    fn compile_unit(&self, name: &str, source: &str, unit_dir: Option<&DirectoryProvider>) -> CompileOutput {
        let mut ctx = CompileContext::new(normalize(name), self.engine.version());

        let (object, error) = match self.run(&mut ctx, source, unit_dir) {
            Ok(object) => (object, None),
            Err(err) => {
                log::error!("{}: {}", ctx.name(), err);
                ctx.fail(&err);
                (None, Some(err))
            }
        };

        let state = ctx.state();
        match &object {
            Some(object) => log::info!("compiled {} ({} bytes)", ctx.name(), object.bytes.len()),
            None => log::info!("{} failed", ctx.name()),
        }
        CompileOutput {
            name: ctx.name().clone(),
            object,
            diagnostics: ctx.into_diagnostics(),
            state,
            error,
        }
    }

    /// Compile a script file. Read failures fail the unit.
    ///
    /// Includes are looked up in the script's own directory before the
    /// configured providers.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> CompileOutput {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let unit_dir = DirectoryProvider::new(UNIT_DIR_PROVIDER, [dir]);

        match fs::read(path) {
            Ok(bytes) => self.compile_unit(&name, &decode(&bytes), Some(&unit_dir)),
            Err(err) => {
                let err = NscError::from(err);
                let mut ctx = CompileContext::new(normalize(&name), self.engine.version());
                ctx.fail(&err);
                CompileOutput {
                    name: ctx.name().clone(),
                    object: None,
                    state: ctx.state(),
                    diagnostics: ctx.into_diagnostics(),
                    error: Some(err),
                }
            }
        }
    }

    /// Compile many files on up to `jobs` worker threads.
    ///
    /// Outputs keep the order of `paths`. Once `cancel` is set, units that
    /// have not started are skipped.
    pub fn compile_batch(&self, paths: &[PathBuf], jobs: usize, cancel: &AtomicBool) -> Vec<CompileOutput> {
        let next = &AtomicUsize::new(0);
        let workers = jobs.max(1).min(paths.len());
        log::debug!("compiling {} units on {} workers", paths.len(), workers);

        let mut outputs: Vec<(usize, CompileOutput)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = vec![];
                        while !cancel.load(Ordering::Relaxed) {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            match paths.get(index) {
                                Some(path) => done.push((index, self.compile_file(path))),
                                None => break,
                            }
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        outputs.sort_by_key(|(index, _)| *index);
        outputs.into_iter().map(|(_, output)| output).collect()
    }

    fn run(
        &self,
        ctx: &mut CompileContext,
        source: &str,
        unit_dir: Option<&DirectoryProvider>,
    ) -> NscResult<Option<Object>> {
        let name = ctx.name().clone();
        let entry = ctx.sources_mut().add(SourceFile {
            name,
            text: Arc::from(source),
            origin: Origin::Entry,
            parent: None,
        });

        let mut diagnostics = vec![];
        let plan = include::resolve_all(&self.resolver, unit_dir, ctx.sources_mut(), entry, &mut diagnostics);
        ctx.report(diagnostics);
        let plan = plan?;

        ctx.transition(UnitState::Lexing)?;
        let mut diagnostics = vec![];
        let tokens = include::splice(ctx.sources(), &plan, entry, &mut diagnostics);
        ctx.report(diagnostics);
        let tokens = tokens?;
        log::trace!("{}: {} tokens from {} files", ctx.name(), tokens.len(), ctx.sources().len());

        ctx.transition(UnitState::Parsing)?;
        let parsed = Parser::new(&tokens, ctx.sources())
            .with_engine_types(self.engine.type_names().cloned())
            .parse();
        ctx.report(parsed.diagnostics);

        ctx.transition(UnitState::Analyzing)?;
        let analyzed = Analyzer::new(&self.engine).analyze(&parsed.program);
        ctx.report(analyzed.diagnostics);

        if ctx.diagnostics().blocks_codegen(self.warnings_as_errors) {
            ctx.transition(UnitState::Failed)?;
            return Ok(None);
        }

        ctx.transition(UnitState::Generating)?;
        let code = codegen::generate(&parsed.program, &analyzed.analysis, &self.engine)?;

        ctx.transition(UnitState::Emitting)?;
        let object = emit::link(&code)?;

        ctx.transition(UnitState::Done)?;
        Ok(Some(object))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{diagnostics::{DiagCode, Stage}, include::MemoryProvider, sema::test::ENGINE};

    fn compiler() -> Compiler {
        let engine = EngineTable::from_source("test", ENGINE).unwrap();
        Compiler::new(Arc::new(engine))
    }

    #[test]
    fn test_states() {
        let output = compiler().compile("main.nss", "void main() { PrintString(\"hi\"); }");
        assert_eq!(output.name, "main");
        assert_eq!(output.state, UnitState::Done);
        assert!(output.is_success());
        assert!(output.diagnostics.is_empty());

        let output = compiler().compile("main", "void main() { x = 1; }");
        assert_eq!(output.state, UnitState::Failed);
        assert!(output.object.is_none());
        assert!(output.error.is_none());
        assert_eq!(output.diagnostics[0].code, DiagCode::UndefinedSymbol);
    }

    #[test]
    fn test_warnings_as_errors() {
        let source = "int F() { return 1; PrintString(\"never\"); }\nvoid main() { F(); }";
        assert!(compiler().compile("main", source).is_success());
        let output = compiler().with_warnings_as_errors(true).compile("main", source);
        assert!(!output.is_success());
        assert_eq!(output.count(Severity::Warning), 1);
    }

    #[test]
    fn test_unresolved_include_is_fatal() {
        let compiler = compiler()
            .with_resolver(IncludeResolver::new().with_project(MemoryProvider::new("project").with("inc_a", "#include \"inc_gone\"")));
        let output = compiler.compile("main", "#include \"inc_a\"\nvoid main() {}");
        assert!(matches!(output.error, Some(NscError::UnresolvedInclude { .. })));
        let last = output.diagnostics.last().unwrap();
        assert_eq!(last.code, DiagCode::UnresolvedInclude);
        assert_eq!(last.chain, vec![SmolStr::new("main"), SmolStr::new("inc_a")]);
    }

    #[test]
    fn test_lexing_follows_resolution() {
        // Files are only lexed once every include resolved.
        let output = compiler().compile("main", "#include \"inc_gone\"\nint n = 12ab;");
        assert_eq!(output.state, UnitState::Failed);
        let codes: Vec<DiagCode> = output.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagCode::UnresolvedInclude]);
        assert_eq!(output.diagnostics[0].stage, Stage::Include);

        let output = compiler().compile("main", "int n = 12ab;\nvoid main() {}");
        assert_eq!(output.diagnostics[0].code, DiagCode::MalformedNumber);
        assert_eq!(output.diagnostics[0].stage, Stage::Lex);
    }
}
