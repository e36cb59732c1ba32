//! Source buffer registry and compressed source locations.

use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

/// A unique identifier for a registered source buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default, serde::Serialize)]
pub struct SourceId(pub u32);

impl Display for SourceId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "SourceId({})", self.0)
    }
}

/// A single compressed source location (source id + byte offset).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, serde::Serialize)]
pub struct SourceLoc(u32);

impl SourceLoc {
    const OFFSET_BITS: u32 = 22; // 4 MB max per buffer
    const OFFSET_MASK: u32 = (1 << Self::OFFSET_BITS) - 1;

    #[inline(always)]
    pub fn new(source_id: SourceId, offset: u32) -> Self {
        debug_assert!(source_id.0 < (1 << (32 - Self::OFFSET_BITS)), "source_id overflow");
        debug_assert!(offset < (1 << Self::OFFSET_BITS), "offset overflow");
        Self((source_id.0 << Self::OFFSET_BITS) | (offset & Self::OFFSET_MASK))
    }

    #[inline(always)]
    pub fn source_id(&self) -> SourceId {
        SourceId(self.0 >> Self::OFFSET_BITS)
    }

    #[inline(always)]
    pub fn offset(&self) -> u32 {
        self.0 & Self::OFFSET_MASK
    }
}

/// A half-open span within a single source buffer.
#[derive(Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct SourceSpan {
    pub start: SourceLoc,
    pub end: SourceLoc,
}

impl SourceSpan {
    pub fn new(start: SourceLoc, end: SourceLoc) -> Self {
        debug_assert_eq!(start.source_id(), end.source_id(), "span across buffers");
        Self { start, end }
    }

    pub fn new_with_length(source_id: SourceId, offset: u32, length: u32) -> Self {
        Self {
            start: SourceLoc::new(source_id, offset),
            end: SourceLoc::new(source_id, offset + length),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn source_id(&self) -> SourceId {
        self.start.source_id()
    }

    pub fn start_offset(&self) -> u32 {
        self.start.offset()
    }

    pub fn end_offset(&self) -> u32 {
        self.end.offset()
    }

    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start,
            end: other.end,
        }
    }
}

impl Debug for SourceSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SourceSpan(source={}, offset={}..{})",
            self.start.source_id().0,
            self.start.offset(),
            self.end.offset()
        )
    }
}

/// Normalize raw source text before lexing: line endings become `\n`, tabs
/// become spaces, and a trailing newline is guaranteed.
pub fn normalize_source(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\t' => out.push(' '),
            _ => out.push(c),
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// A single loaded source buffer with precomputed line positions.
#[derive(Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub path: PathBuf,
    pub content: String,
    pub line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(id: SourceId, path: PathBuf, content: String) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            id,
            path,
            content,
            line_starts,
        }
    }

    /// 1-based (line, column) for a byte offset.
    pub fn lookup_line_col(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(l) => l,
            Err(next) => next.saturating_sub(1),
        };
        let col = offset - self.line_starts[line];
        (line as u32 + 1, col + 1)
    }

    /// The full text of the line containing `offset`, without its newline.
    pub fn line_text(&self, offset: u32) -> &str {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(l) => l,
            Err(next) => next.saturating_sub(1),
        };
        let start = self.line_starts[line] as usize;
        let end = self
            .line_starts
            .get(line + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.content.len());
        self.content[start..end].trim_end_matches('\n')
    }
}

/// Central registry for all source buffers of one translation unit.
#[derive(Default)]
pub struct SourceManager {
    files: Vec<SourceFile>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named source buffer. The text is normalized on entry.
    pub fn add_buffer(&mut self, path: impl Into<PathBuf>, text: &str) -> SourceId {
        let id = SourceId(self.files.len() as u32);
        self.files
            .push(SourceFile::new(id, path.into(), normalize_source(text)));
        id
    }

    pub fn get(&self, id: SourceId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    /// Find an already-registered buffer by its path. Quoted includes
    /// resolve against registered buffers only; there is no filesystem
    /// search at preprocessing time.
    pub fn find_by_path(&self, path: &str) -> Option<SourceId> {
        self.files
            .iter()
            .find(|f| f.path == std::path::Path::new(path))
            .map(|f| f.id)
    }

    pub fn lookup_line_col(&self, loc: SourceLoc) -> Option<(u32, u32)> {
        self.get(loc.source_id()).map(|f| f.lookup_line_col(loc.offset()))
    }

    /// The spelled text covered by a span.
    pub fn span_text(&self, span: SourceSpan) -> &str {
        match self.get(span.source_id()) {
            Some(f) => {
                let start = span.start_offset() as usize;
                let end = (span.end_offset() as usize).min(f.content.len());
                &f.content[start.min(end)..end]
            }
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_loc_roundtrip() {
        let a = SourceLoc::new(SourceId(3), 10);
        assert_eq!(a.source_id(), SourceId(3));
        assert_eq!(a.offset(), 10);
        assert_eq!(a, SourceLoc::new(SourceId(3), 10));
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_source("a\r\nb\rc"), "a\nb\nc\n");
        assert_eq!(normalize_source("x\ty\n"), "x y\n");
    }

    #[test]
    fn line_col_lookup() {
        let mut sm = SourceManager::new();
        let id = sm.add_buffer("t.h", "int x;\nint y;\n");
        let file = sm.get(id).unwrap();
        assert_eq!(file.lookup_line_col(0), (1, 1));
        assert_eq!(file.lookup_line_col(4), (1, 5));
        assert_eq!(file.lookup_line_col(7), (2, 1));
        assert_eq!(file.line_text(8), "int y;");
    }
}
