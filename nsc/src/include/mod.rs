//! `#include` resolution and token stream expansion.
mod provider;

pub use self::provider::{BundledLibrary, DirectoryProvider, IncludeProvider, MemoryProvider};

use smol_str::SmolStr;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    diagnostics::{DiagCode, Diagnostic, Stage},
    error::{NscError, NscResult},
    lex::{Lexer, Token, TokenKind},
    source::{FileId, Origin, Pos, SourceFile, SourceMap},
};

/// Normalize an include name: trimmed, lower case, without `.nss`.
pub fn normalize(name: &str) -> SmolStr {
    let lower = name.trim().to_ascii_lowercase();
    let stem = lower.strip_suffix(".nss").unwrap_or(&lower);
    SmolStr::new(stem.trim_end())
}

/// Text of an include and where it was found.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub text: String,
    pub origin: Origin,
}

/// Finds include text across the configured providers.
///
/// Project providers are searched first, then installed game resources,
/// then the bundled library. The first provider to know a name wins.
pub struct IncludeResolver {
    project: Vec<Box<dyn IncludeProvider>>,
    resources: Vec<Box<dyn IncludeProvider>>,
    bundled: Option<BundledLibrary>,
    max_depth: usize,
}

impl IncludeResolver {
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub fn new() -> Self {
        Self {
            project: vec![],
            resources: vec![],
            bundled: Some(BundledLibrary),
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_project(mut self, provider: impl IncludeProvider + 'static) -> Self {
        self.project.push(Box::new(provider));
        self
    }

    pub fn with_resources(mut self, provider: impl IncludeProvider + 'static) -> Self {
        self.resources.push(Box::new(provider));
        self
    }

    pub fn with_bundled(mut self, enabled: bool) -> Self {
        self.bundled = if enabled { Some(BundledLibrary) } else { None };
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Look up a normalized include name.
    pub fn resolve(&self, name: &str) -> NscResult<Option<Resolved>> {
        self.resolve_from(name, None)
    }

    /// Look up a normalized include name, searching the directory of the
    /// unit's own file before any configured provider.
    pub fn resolve_from(&self, name: &str, unit_dir: Option<&DirectoryProvider>) -> NscResult<Option<Resolved>> {
        if let Some(provider) = unit_dir {
            if let Some(resolved) = Self::search(provider, name)? {
                return Ok(Some(resolved));
            }
        }
        for provider in self.project.iter().chain(self.resources.iter()) {
            if let Some(resolved) = Self::search(provider.as_ref(), name)? {
                return Ok(Some(resolved));
            }
        }

        if let Some(bundled) = &self.bundled {
            if let Some(text) = bundled.resolve(name)? {
                log::warn!("include \"{}\" falling back to the bundled library", name);
                return Ok(Some(Resolved {
                    text,
                    origin: Origin::Bundled,
                }));
            }
        }

        Ok(None)
    }

    fn search(provider: &dyn IncludeProvider, name: &str) -> NscResult<Option<Resolved>> {
        Ok(provider.resolve(name)?.map(|text| {
            log::trace!("include \"{}\" resolved by {}", name, provider.name());
            Resolved {
                text,
                origin: Origin::Provider(provider.name().into()),
            }
        }))
    }
}

impl Default for IncludeResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// What the `#include` directives of every loaded file pulled in.
///
/// Each file maps to one entry per directive, in source order. `None`
/// marks a directive skipped because its include was already expanded or
/// is part of a cycle.
#[derive(Debug, Default)]
pub struct IncludePlan {
    children: HashMap<FileId, Vec<Option<FileId>>>,
}

impl IncludePlan {
    #[inline]
    pub fn includes_of(&self, file: FileId) -> &[Option<FileId>] {
        self.children.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Load the include closure of the entry file into the source map.
///
/// Files are scanned for `#include` directives only; lexical errors are
/// left for [`splice`] to report. Bundled library fallbacks are pushed to
/// `diagnostics`. Unresolved includes, excessive nesting and provider I/O
/// failures are fatal.
pub fn resolve_all(
    resolver: &IncludeResolver,
    unit_dir: Option<&DirectoryProvider>,
    sources: &mut SourceMap,
    entry: FileId,
    diagnostics: &mut Vec<Diagnostic>,
) -> NscResult<IncludePlan> {
    let entry_name = sources
        .get(entry)
        .map(|file| normalize(&file.name))
        .ok_or_else(|| NscError::internal("entry file missing from source map"))?;

    let mut loader = Loader {
        resolver,
        unit_dir,
        expanding: vec![entry_name],
        expanded: HashSet::new(),
        plan: IncludePlan::default(),
        diagnostics,
    };
    loader.load_file(sources, entry, 0)?;
    Ok(loader.plan)
}

/// Lex the entry file and splice in the tokens of every planned include.
///
/// `#include` tokens stay in the stream so the parser can record them.
/// Only the end-of-file token of the entry file is kept. Lexical errors
/// are pushed to `diagnostics`.
pub fn splice(
    sources: &SourceMap,
    plan: &IncludePlan,
    entry: FileId,
    diagnostics: &mut Vec<Diagnostic>,
) -> NscResult<Vec<Token>> {
    let mut tokens = vec![];
    splice_file(sources, plan, entry, true, &mut tokens, diagnostics)?;
    Ok(tokens)
}

fn splice_file(
    sources: &SourceMap,
    plan: &IncludePlan,
    file: FileId,
    is_entry: bool,
    tokens: &mut Vec<Token>,
    diagnostics: &mut Vec<Diagnostic>,
) -> NscResult<()> {
    let text: Arc<str> = sources
        .text(file)
        .ok_or_else(|| NscError::internal("include file missing from source map"))?;
    let mut includes = plan.includes_of(file).iter();

    for result in Lexer::new(&text, file) {
        match result {
            Ok(token) if token.kind == TokenKind::EOF => {
                if is_entry {
                    tokens.push(token);
                }
            }
            Ok(token) if token.kind == TokenKind::Include => {
                tokens.push(token);
                match includes.next() {
                    Some(Some(child)) => splice_file(sources, plan, *child, false, tokens, diagnostics)?,
                    Some(None) => {}
                    None => return Err(NscError::internal("include directive missing from plan")),
                }
            }
            Ok(token) => tokens.push(token),
            Err(err) => diagnostics.push(Diagnostic::error(Stage::Lex, err.code(), &err).at(err.pos)),
        }
    }

    Ok(())
}

struct Loader<'r, 'd> {
    resolver: &'r IncludeResolver,
    unit_dir: Option<&'r DirectoryProvider>,
    /// Includes currently being loaded, from the entry inward.
    expanding: Vec<SmolStr>,
    /// Includes already fully loaded.
    expanded: HashSet<SmolStr>,
    plan: IncludePlan,
    diagnostics: &'d mut Vec<Diagnostic>,
}

impl<'r, 'd> Loader<'r, 'd> {
    fn load_file(&mut self, sources: &mut SourceMap, file: FileId, depth: usize) -> NscResult<()> {
        let text: Arc<str> = sources
            .text(file)
            .ok_or_else(|| NscError::internal("include file missing from source map"))?;

        let mut children = vec![];
        let directives = Lexer::new(&text, file)
            .filter_map(Result::ok)
            .filter(|token| token.kind == TokenKind::Include);
        for token in directives {
            let name = normalize(token.span.fragment(&text));
            children.push(self.include(sources, name, file, token.pos, depth + 1)?);
        }
        self.plan.children.insert(file, children);

        Ok(())
    }

    fn include(
        &mut self,
        sources: &mut SourceMap,
        name: SmolStr,
        parent: FileId,
        pos: Pos,
        depth: usize,
    ) -> NscResult<Option<FileId>> {
        if self.expanded.contains(&name) {
            log::trace!("include \"{}\" already expanded", name);
            return Ok(None);
        }
        if self.expanding.contains(&name) {
            log::trace!("include \"{}\" is a cycle, skipping", name);
            return Ok(None);
        }
        if depth > self.resolver.max_depth() {
            return Err(NscError::IncludeTooDeep {
                name,
                depth: self.resolver.max_depth(),
            });
        }

        let resolved = match self.resolver.resolve_from(&name, self.unit_dir)? {
            Some(resolved) => resolved,
            None => {
                return Err(NscError::UnresolvedInclude {
                    name,
                    chain: sources.chain(parent),
                })
            }
        };

        if resolved.origin == Origin::Bundled {
            self.diagnostics.push(
                Diagnostic::info(
                    Stage::Include,
                    DiagCode::ResolvedFromBundledLibrary,
                    format!("include \"{}\" resolved from the bundled library", name),
                )
                .at(pos),
            );
        }

        let file = sources.add(SourceFile {
            name: name.clone(),
            text: Arc::from(resolved.text),
            origin: resolved.origin,
            parent: Some(parent),
        });

        self.expanding.push(name.clone());
        self.load_file(sources, file, depth)?;
        self.expanding.pop();
        self.expanded.insert(name);

        Ok(Some(file))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(sources: &mut SourceMap, text: &str) -> FileId {
        sources.add(SourceFile {
            name: "main".into(),
            text: Arc::from(text),
            origin: Origin::Entry,
            parent: None,
        })
    }

    fn expand(
        resolver: &IncludeResolver,
        sources: &mut SourceMap,
        entry: FileId,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> NscResult<Vec<Token>> {
        let plan = resolve_all(resolver, None, sources, entry, diagnostics)?;
        splice(sources, &plan, entry, diagnostics)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("NW_I0_Math.nss"), "nw_i0_math");
        assert_eq!(normalize("  inc_a  "), "inc_a");
        assert_eq!(normalize("inc.NSS"), "inc");
    }

    #[test]
    fn test_project_shadows_bundled() {
        let resolver = IncludeResolver::new()
            .with_project(MemoryProvider::new("project").with("nw_i0_math", "int nLocal;"));
        let resolved = resolver.resolve("nw_i0_math").unwrap().unwrap();
        assert_eq!(resolved.text, "int nLocal;");
        assert_eq!(resolved.origin, Origin::Provider("project".into()));
    }

    #[test]
    fn test_cycle_and_idempotence() {
        let resolver = IncludeResolver::new().with_project(
            MemoryProvider::new("project")
                .with("inc_a", "#include \"inc_b\"\nint nA;")
                .with("inc_b", "#include \"inc_a\"\nint nB;"),
        );
        let mut sources = SourceMap::new();
        let main = entry(&mut sources, "#include \"inc_a\"\n#include \"INC_B\"\nvoid main() {}");
        let mut diagnostics = vec![];

        let tokens = expand(&resolver, &mut sources, main, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        // main, inc_a and inc_b, each loaded once.
        assert_eq!(sources.len(), 3);

        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| sources.fragment(t))
            .collect();
        assert_eq!(idents, vec!["nB", "nA", "main"]);
        assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::EOF).count(), 1);
    }

    #[test]
    fn test_unresolved_include_chain() {
        let resolver = IncludeResolver::new()
            .with_bundled(false)
            .with_project(MemoryProvider::new("project").with("inc_a", "#include \"inc_missing\""));
        let mut sources = SourceMap::new();
        let main = entry(&mut sources, "#include \"inc_a\"");

        match expand(&resolver, &mut sources, main, &mut vec![]) {
            Err(NscError::UnresolvedInclude { name, chain }) => {
                assert_eq!(name, "inc_missing");
                assert_eq!(chain, vec!["main", "inc_a"]);
            }
            other => panic!("unexpected result {:?}", other.map(|tokens| tokens.len())),
        }
    }

    #[test]
    fn test_lex_errors_reported_when_splicing() {
        let resolver = IncludeResolver::new()
            .with_project(MemoryProvider::new("project").with("inc_a", "int n = 12ab;\nint nA;"));
        let mut sources = SourceMap::new();
        let main = entry(&mut sources, "#include \"inc_a\"\nstring s = \"open;\nint nMain;");

        let mut diagnostics = vec![];
        let plan = resolve_all(&resolver, None, &mut sources, main, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(plan.includes_of(main), &[Some(FileId(1))]);

        let tokens = splice(&sources, &plan, main, &mut diagnostics).unwrap();
        let codes: Vec<DiagCode> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagCode::MalformedNumber, DiagCode::UnterminatedString]);
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| sources.fragment(t))
            .collect();
        assert_eq!(idents, vec!["n", "nA", "s", "nMain"]);
    }

    #[test]
    fn test_unit_directory_first() {
        let dir = std::env::temp_dir().join(format!("nsc_unit_dir_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("inc_local.nss"), "int nLocal;").unwrap();
        let unit_dir = DirectoryProvider::new("source", [&dir]);
        let resolver = IncludeResolver::new()
            .with_project(MemoryProvider::new("project").with("inc_local", "int nProject;"));

        let resolved = resolver.resolve_from("inc_local", Some(&unit_dir)).unwrap().unwrap();
        assert_eq!(resolved.text, "int nLocal;");
        assert_eq!(resolved.origin, Origin::Provider("source".into()));
        assert_eq!(resolver.resolve("inc_local").unwrap().unwrap().text, "int nProject;");
    }

    #[test]
    fn test_include_too_deep() {
        let mut provider = MemoryProvider::new("project");
        for i in 0..4 {
            provider.insert(&format!("inc_{}", i), format!("#include \"inc_{}\"", i + 1));
        }
        provider.insert("inc_4", "int nDeep;");
        let resolver = IncludeResolver::new().with_project(provider).with_max_depth(3);

        let mut sources = SourceMap::new();
        let main = entry(&mut sources, "#include \"inc_0\"");
        assert!(matches!(
            expand(&resolver, &mut sources, main, &mut vec![]),
            Err(NscError::IncludeTooDeep { depth: 3, .. })
        ));
    }

    #[test]
    fn test_bundled_info_diagnostic() {
        let resolver = IncludeResolver::new();
        let mut sources = SourceMap::new();
        let main = entry(&mut sources, "#include \"nw_i0_math\"\n#include \"nw_i0_math\"");
        let mut diagnostics = vec![];

        expand(&resolver, &mut sources, main, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagCode::ResolvedFromBundledLibrary);
        assert_eq!(diagnostics[0].line, 1);
    }
}
