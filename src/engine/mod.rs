pub mod propagate;

use crate::error::{AsyncscopeError, Result};
use crate::index::{build_index, SemanticIndex};
use crate::parser::ast::{Ast, AstNode, NodeId};
use crate::parser::scope::{self, ScopeAnalysis};
use crate::source::{FragmentId, SourceBuffer};
use propagate::AsyncMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Behavioral toggles, passed once at construction. Unknown configuration
/// keys are ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {}

#[derive(Debug)]
struct Parsed {
    ast: Ast,
    scopes: ScopeAnalysis,
    index: SemanticIndex,
}

/// The analysis engine: owns the source buffer, the parsed AST with its
/// scope tree and semantic index, and the caller-supplied ignore set.
/// Everything is single-threaded and deterministic; the only I/O is
/// [`Engine::append_file`].
#[derive(Debug)]
pub struct Engine {
    options: EngineOptions,
    buffer: SourceBuffer,
    parsed: Option<Parsed>,
    ignored: HashSet<NodeId>,
}

impl Engine {
    pub fn new(root: PathBuf, options: EngineOptions) -> Self {
        Self {
            options,
            buffer: SourceBuffer::new(root),
            parsed: None,
            ignored: HashSet::new(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn root(&self) -> &Path {
        self.buffer.root()
    }

    pub fn buffer(&self) -> &SourceBuffer {
        &self.buffer
    }

    /// Appends an in-memory fragment. Invalidates any previous parse.
    pub fn append_source(
        &mut self,
        path: &Path,
        first_line: u32,
        text: &str,
    ) -> Result<FragmentId> {
        self.parsed = None;
        self.buffer.append_source(path, first_line, text)
    }

    /// Appends a file under the configured root. Idempotent per path;
    /// invalidates any previous parse.
    pub fn append_file(&mut self, rel: &Path) -> Result<FragmentId> {
        self.parsed = None;
        self.buffer.append_file(rel)
    }

    /// Parses the buffer and builds the scope tree and semantic index.
    /// Node ids from an earlier parse are invalidated, as is the ignore set.
    pub fn parse(&mut self) -> Result<()> {
        if self.buffer.line_count() == 0 {
            return Err(AsyncscopeError::InvalidInput(
                "no sources appended".to_string(),
            ));
        }
        let ast = crate::parser::parse_buffer(&self.buffer)?;
        let scopes = scope::analyze(&ast);
        let index = build_index(&ast, &scopes, &self.buffer)?;
        tracing::info!(
            lines = self.buffer.line_count(),
            nodes = ast.len(),
            scopes = scopes.tree.len(),
            "parsed source buffer"
        );
        self.ignored.clear();
        self.parsed = Some(Parsed { ast, scopes, index });
        Ok(())
    }

    fn parsed(&self) -> Result<&Parsed> {
        self.parsed
            .as_ref()
            .ok_or_else(|| AsyncscopeError::InvalidInput("parse() has not been called".to_string()))
    }

    pub fn ast(&self) -> Result<&Ast> {
        Ok(&self.parsed()?.ast)
    }

    pub fn scopes(&self) -> Result<&ScopeAnalysis> {
        Ok(&self.parsed()?.scopes)
    }

    pub fn index(&self) -> Result<&SemanticIndex> {
        Ok(&self.parsed()?.index)
    }

    /// Suppresses propagation through `node`: it is neither recorded as an
    /// await site nor recursed into.
    pub fn mark_ignored(&mut self, node: NodeId) {
        self.ignored.insert(node);
    }

    pub fn ignored(&self) -> &HashSet<NodeId> {
        &self.ignored
    }

    /// The `index`-th node matching `predicate` among nodes at `(path, line)`.
    pub fn node_by_line_filter_index(
        &self,
        path: &Path,
        line: u32,
        index: usize,
        predicate: impl Fn(&AstNode) -> bool,
    ) -> Result<Option<NodeId>> {
        let parsed = self.parsed()?;
        Ok(parsed
            .index
            .nodes_at(path, line)
            .iter()
            .copied()
            .filter(|&n| predicate(parsed.ast.node(n)))
            .nth(index))
    }

    /// Like [`Engine::node_by_line_filter_index`], matching on the kind name
    /// used by configuration documents (`"CallExpression"`, ...).
    pub fn node_by_line_kind_index(
        &self,
        path: &Path,
        line: u32,
        kind: &str,
        index: usize,
    ) -> Result<Option<NodeId>> {
        self.node_by_line_filter_index(path, line, index, |n| n.kind.name() == kind)
    }

    pub fn function_node_from_line(
        &self,
        path: &Path,
        line: u32,
        function_index: usize,
    ) -> Result<Option<NodeId>> {
        self.node_by_line_filter_index(path, line, function_index, |n| n.kind.is_function())
    }

    /// Runs async propagation from `seed`. The seed must be function-like.
    pub fn get_async_stacks(&self, seed: NodeId) -> Result<AsyncMap> {
        let parsed = self.parsed()?;
        if !parsed.ast.is_function(seed) {
            return Err(AsyncscopeError::InvalidInput(format!(
                "seed must be function-like, got {}",
                parsed.ast.node(seed).kind.name()
            )));
        }
        propagate::propagate(
            &parsed.ast,
            &parsed.scopes,
            &parsed.index,
            &self.ignored,
            seed,
        )
    }
}
