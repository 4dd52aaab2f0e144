//! Compiler configuration.
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path, path::PathBuf};

use crate::{error::NscResult, include::IncludeResolver};

/// Compiler configuration parameters, usually loaded from `nsc.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConf {
    /// Version label of the engine table. Required, since objects are
    /// only reproducible against the same table.
    pub table_version: Option<String>,
    /// Engine definition script.
    pub nwscript: Option<PathBuf>,
    /// Project directories searched for includes.
    pub include_paths: Vec<PathBuf>,
    /// Installed game resource directories, searched after the project.
    pub resource_paths: Vec<PathBuf>,
    pub use_bundled_library: bool,
    pub max_include_depth: usize,
    pub warnings_as_errors: bool,
    /// Worker threads for batch compiles. Defaults to the CPU count.
    pub jobs: Option<usize>,
}

impl Default for CompilerConf {
    fn default() -> Self {
        Self {
            table_version: None,
            nwscript: None,
            include_paths: vec![],
            resource_paths: vec![],
            use_bundled_library: true,
            max_include_depth: IncludeResolver::DEFAULT_MAX_DEPTH,
            warnings_as_errors: false,
            jobs: None,
        }
    }
}

impl CompilerConf {
    pub fn from_file(path: impl AsRef<Path>) -> NscResult<Self> {
        let mut file = File::open(path.as_ref())?;
        Self::from_reader(&mut file)
    }

    pub fn from_reader(reader: impl Read) -> NscResult<Self> {
        let conf = serde_yaml::from_reader(reader)?;
        Ok(conf)
    }

    /// Number of batch workers, at least one.
    pub fn jobs(&self) -> usize {
        self.jobs
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = CompilerConf::from_reader("include_paths: [scripts]\njobs: 0\n".as_bytes()).unwrap();
        assert_eq!(conf.include_paths, vec![PathBuf::from("scripts")]);
        assert_eq!(conf.table_version, None);
        assert!(conf.use_bundled_library);
        assert_eq!(conf.max_include_depth, 64);
        assert!(!conf.warnings_as_errors);
        assert_eq!(conf.jobs(), 1);
    }

    #[test]
    fn test_unknown_field() {
        assert!(CompilerConf::from_reader("colour: blue\n".as_bytes()).is_err());
    }
}
