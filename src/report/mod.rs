mod json;
mod markdown;
mod text;

pub use json::write_json;
pub use markdown::write_markdown;
pub use text::write_text;

use crate::engine::propagate::{AsyncMap, AsyncSource, Marking};
use crate::engine::Engine;
use crate::error::Result;
use crate::index::SemanticIndex;
use crate::parser::ast::{Ast, AstKind, NodeId, PropertyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Text,
    Markdown,
    Json,
}

/// Read-only result handed to serializers and tests: the seed plus the
/// propagation map, with display helpers over the engine's index.
pub struct ReportModel<'a> {
    ast: &'a Ast,
    index: &'a SemanticIndex,
    seed: NodeId,
    async_map: AsyncMap,
}

impl<'a> ReportModel<'a> {
    pub fn new(engine: &'a Engine, seed: NodeId) -> Result<Self> {
        let async_map = engine.get_async_stacks(seed)?;
        Ok(Self {
            ast: engine.ast()?,
            index: engine.index()?,
            seed,
            async_map,
        })
    }

    /// Collapses duplicate await sites and orders each entry's edges by
    /// (file, line) for stable output.
    pub fn with_sorted_edges(mut self) -> Self {
        self.async_map = self.async_map.dedup_sorted(self.index);
        self
    }

    pub fn seed(&self) -> NodeId {
        self.seed
    }

    pub fn async_map(&self) -> &AsyncMap {
        &self.async_map
    }

    pub fn name_of(&self, node: NodeId) -> Result<String> {
        self.index.name_of(self.ast, node)
    }

    /// `"path:line <Kind>[indexOnLine]"`, the stable display form of a node.
    pub fn serialize_node(&self, node: NodeId) -> String {
        let (path, line) = self.index.origin(node);
        format!(
            "{}:{} {}[{}]",
            path.display(),
            line,
            self.ast.node(node).kind.name(),
            self.index.kind_index_on_line(self.ast, node)
        )
    }

    pub fn ast_kind_name(&self, node: NodeId) -> &'static str {
        self.ast.node(node).kind.name()
    }

    /// Whether marking `node` async is a JavaScript syntax error:
    /// constructors, getters and setters cannot be async.
    pub fn is_async_syntax_error(&self, node: NodeId) -> bool {
        self.index.constructors.contains(&node) || self.index.accessors.contains(&node)
    }

    /// `", constructor"` / `", getter"` / `", setter"` suffix for a
    /// function, empty when none applies.
    pub fn annotation(&self, node: NodeId) -> String {
        let mut out = String::new();
        if self.index.constructors.contains(&node) {
            out.push_str(", constructor");
        }
        if self.index.accessors.contains(&node) {
            match self.ast.node(node).parent.map(|p| &self.ast.node(p).kind) {
                Some(AstKind::Property {
                    kind: PropertyKind::Get,
                    ..
                }) => out.push_str(", getter"),
                Some(AstKind::Property {
                    kind: PropertyKind::Set,
                    ..
                }) => out.push_str(", setter"),
                _ => {}
            }
        }
        out
    }

    /// Functions that were marked async through some edge but have no
    /// entry of their own (nothing calls them), in discovery order.
    pub fn marked_without_entry(&self) -> Vec<NodeId> {
        let keyed: HashSet<NodeId> = self.async_map.functions().collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (source, edges) in self.async_map.iter() {
            if source == AsyncSource::Root {
                continue;
            }
            for edge in edges {
                if let Marking::Function(f) = edge.marking {
                    if !keyed.contains(&f) && seen.insert(f) {
                        out.push(f);
                    }
                }
            }
        }
        out
    }
}

/// Renders a report with the serializer the configuration selected.
pub fn render(report: &ReportModel, kind: SerializerKind) -> Result<String> {
    match kind {
        SerializerKind::Text => write_text(report),
        SerializerKind::Markdown => write_markdown(report),
        SerializerKind::Json => write_json(report),
    }
}
