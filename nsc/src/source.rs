//! Source files of a compile unit and their include relationships.
use smol_str::SmolStr;
use std::{fmt, sync::Arc};

use crate::lex::{Span, Token};

/// Index of a file inside a [`SourceMap`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub(crate) u32);

impl FileId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a token within its file.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl Default for Pos {
    fn default() -> Self {
        Self {
            file: FileId::default(),
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Where the text of a source file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The file handed to the compiler.
    Entry,
    /// Found by a named include provider.
    Provider(SmolStr),
    /// Fallback copy from the bundled include library.
    Bundled,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Normalized include name, or the entry name.
    pub name: SmolStr,
    pub text: Arc<str>,
    pub origin: Origin,
    /// File whose `#include` pulled this one in.
    pub parent: Option<FileId>,
}

/// All files loaded for one compile unit.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: SourceFile) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(file);
        id
    }

    #[inline]
    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(index, file)| (FileId(index as u32), file))
    }

    pub fn text(&self, id: FileId) -> Option<Arc<str>> {
        self.get(id).map(|file| file.text.clone())
    }

    /// Names of the files from the entry down to the given file.
    pub fn chain(&self, id: FileId) -> Vec<SmolStr> {
        let mut chain = vec![];
        let mut cursor = Some(id);
        while let Some(file) = cursor.and_then(|id| self.get(id)) {
            chain.push(file.name.clone());
            cursor = file.parent;
        }
        chain.reverse();
        chain
    }

    /// Slice the source code of a token.
    ///
    /// Returns an empty string when the token refers to
    /// a file that is not part of this map.
    pub fn fragment(&self, token: &Token) -> &str {
        self.span_fragment(token.pos.file, token.span)
    }

    pub fn span_fragment(&self, file: FileId, span: Span) -> &str {
        self.get(file)
            .and_then(|file| file.text.get(span.start..span.end))
            .unwrap_or("")
    }
}

/// Decode script bytes one character per byte.
///
/// Scripts are saved in a Windows code page, so any byte is accepted and
/// string literals keep their exact bytes. A UTF-8 byte order mark is
/// dropped.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Append the byte a source character stands for.
///
/// Characters produced by [`decode`] map back to their byte. Wider
/// characters can only come from in-memory sources and keep their UTF-8
/// encoding.
pub fn encode_char(c: char, out: &mut Vec<u8>) {
    match u8::try_from(c) {
        Ok(byte) => out.push(byte),
        Err(_) => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
    }
}
