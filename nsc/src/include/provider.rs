//! Sources of include text.
use smol_str::SmolStr;
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use super::normalize;
use crate::{error::NscResult, source::decode};

/// Looks up the text of an include by its normalized name.
///
/// Providers are shared between compile units running on
/// different threads.
pub trait IncludeProvider: Send + Sync {
    /// Name used in logs and in a source file's origin.
    fn name(&self) -> &str;

    /// Returns `Ok(None)` when the provider does not know the name.
    fn resolve(&self, name: &str) -> NscResult<Option<String>>;
}

/// Searches a list of directories for `<name>.nss`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    name: SmolStr,
    dirs: Vec<PathBuf>,
}

impl DirectoryProvider {
    pub fn new(name: impl Into<SmolStr>, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            name: name.into(),
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn read(path: &Path) -> NscResult<Option<String>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(decode(&bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl IncludeProvider for DirectoryProvider {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn resolve(&self, name: &str) -> NscResult<Option<String>> {
        for dir in &self.dirs {
            // Script file names are case insensitive to the game, but the
            // host filesystem might not be. Try the normalized name first.
            let path = dir.join(format!("{}.nss", name));
            if let Some(text) = Self::read(&path)? {
                log::trace!("{}: found {}", self.name, path.display());
                return Ok(Some(text));
            }

            if let Some(path) = find_case_insensitive(dir, name)? {
                log::trace!("{}: found {}", self.name, path.display());
                return Self::read(&path);
            }
        }
        Ok(None)
    }
}

/// Scan a directory for a script whose normalized name matches.
///
/// When several spellings match, the lowest file name wins so every host
/// picks the same file.
fn find_case_insensitive(dir: &Path, name: &str) -> NscResult<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut candidates = vec![];
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .filter(|file_name| file_name.to_ascii_lowercase().ends_with(".nss"))
            .map(|file_name| normalize(file_name) == name)
            .unwrap_or(false);
        if matches {
            candidates.push(path);
        }
    }
    Ok(candidates.into_iter().min())
}

/// In-memory include sources.
#[derive(Debug, Default, Clone)]
pub struct MemoryProvider {
    name: SmolStr,
    files: HashMap<SmolStr, String>,
}

impl MemoryProvider {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            files: HashMap::new(),
        }
    }

    /// Add a file, builder style. The name is normalized.
    pub fn with(mut self, name: &str, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: impl Into<String>) {
        self.files.insert(normalize(name), text.into());
    }
}

impl IncludeProvider for MemoryProvider {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn resolve(&self, name: &str) -> NscResult<Option<String>> {
        Ok(self.files.get(name).cloned())
    }
}

/// The include library bundled with the compiler.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledLibrary;

impl IncludeProvider for BundledLibrary {
    fn name(&self) -> &str {
        "bundled"
    }

    fn resolve(&self, name: &str) -> NscResult<Option<String>> {
        Ok(nsc_includes::lookup(name).map(|entry| entry.source.to_owned()))
    }
}
