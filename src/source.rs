use crate::error::{AsyncscopeError, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Handle to an appended fragment. Appending the same file twice returns the
/// same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentId(pub usize);

#[derive(Debug, Clone)]
pub struct SourceFragment {
    pub path: PathBuf,
    pub first_line: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
struct LineSpan {
    /// First buffer line covered by this fragment, 1-based.
    start: u32,
    /// One past the last buffer line covered.
    end: u32,
    path: PathBuf,
    first_line: u32,
}

/// Concatenates named source fragments into a single parse unit and keeps a
/// line map so every buffer line can report its origin `path:line`.
///
/// Fragments are append-only; two fragments may share a path (the same
/// logical file contributed to in parts, e.g. inline scripts of one page).
#[derive(Debug)]
pub struct SourceBuffer {
    root: PathBuf,
    text: String,
    next_line: u32,
    fragments: Vec<SourceFragment>,
    spans: Vec<LineSpan>,
    file_handles: HashMap<PathBuf, FragmentId>,
}

impl SourceBuffer {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            text: String::new(),
            next_line: 1,
            fragments: Vec::new(),
            spans: Vec::new(),
            file_handles: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The concatenated parse unit. Every fragment ends on a line boundary.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> &[SourceFragment] {
        &self.fragments
    }

    pub fn line_count(&self) -> u32 {
        self.next_line - 1
    }

    pub fn append_source(&mut self, path: &Path, first_line: u32, text: &str) -> Result<FragmentId> {
        if first_line < 1 {
            return Err(AsyncscopeError::InvalidInput(format!(
                "firstLine must be >= 1, got {first_line}"
            )));
        }
        if text.is_empty() {
            return Err(AsyncscopeError::InvalidInput(format!(
                "cannot append empty source for {}",
                path.display()
            )));
        }

        let newline_count = text.matches('\n').count() as u32;
        let line_count = if text.ends_with('\n') {
            newline_count
        } else {
            newline_count + 1
        };

        let start = self.next_line;
        self.text.push_str(text);
        if !text.ends_with('\n') {
            self.text.push('\n');
        }
        self.next_line = start + line_count;
        self.spans.push(LineSpan {
            start,
            end: start + line_count,
            path: path.to_path_buf(),
            first_line,
        });

        let id = FragmentId(self.fragments.len());
        self.fragments.push(SourceFragment {
            path: path.to_path_buf(),
            first_line,
            text: text.to_string(),
        });
        Ok(id)
    }

    /// Reads `rel` under the configured root and appends it with
    /// `first_line = 1`. Idempotent per path.
    pub fn append_file(&mut self, rel: &Path) -> Result<FragmentId> {
        if let Some(&id) = self.file_handles.get(rel) {
            return Ok(id);
        }
        let resolved = self.resolve(rel)?;
        let text = std::fs::read_to_string(&resolved)?;
        let id = self.append_source(rel, 1, &text)?;
        self.file_handles.insert(rel.to_path_buf(), id);
        Ok(id)
    }

    /// Resolves `rel` against the root, rejecting paths that escape it.
    pub fn resolve(&self, rel: &Path) -> Result<PathBuf> {
        let joined = self.root.join(rel);
        let canon = joined.canonicalize()?;
        let root = self.root.canonicalize()?;
        if !canon.starts_with(&root) {
            return Err(AsyncscopeError::PathEscape(rel.to_path_buf()));
        }
        Ok(canon)
    }

    /// Maps a 1-based buffer line to its origin `(path, line)`.
    pub fn locate_origin(&self, buffer_line: u32) -> Result<(&Path, u32)> {
        let i = self.spans.partition_point(|s| s.end <= buffer_line);
        match self.spans.get(i) {
            Some(s) if s.start <= buffer_line => {
                Ok((s.path.as_path(), s.first_line + (buffer_line - s.start)))
            }
            _ => Err(AsyncscopeError::NotFound(format!(
                "buffer line {buffer_line} has no origin"
            ))),
        }
    }

    /// Human-readable dump of every buffer line with its origin, one
    /// `bufferLine path:originalLine` per line. Used by tests and debugging.
    pub fn serialize_mapping(&self) -> String {
        let mut out = String::new();
        for line in 1..=self.line_count() {
            if let Ok((path, original)) = self.locate_origin(line) {
                let _ = writeln!(out, "{line} {}:{original}", path.display());
            }
        }
        out
    }
}
