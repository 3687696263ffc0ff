use crate::error::Result;
use crate::index::SemanticIndex;
use crate::parser::ast::{Ast, NodeId};
use crate::parser::scope::ScopeAnalysis;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncSource {
    /// Sentinel entry carrying the seed.
    Root,
    Function(NodeId),
}

/// What an await site does to its enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marking {
    /// The enclosing function newly becomes async.
    Function(NodeId),
    /// The enclosing function is already async in source; no new marking
    /// needed.
    AlreadyAsync(NodeId),
    /// No enclosing function (top level), or it is ignored.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The reference that must become awaited. Absent only on the root entry.
    pub await_site: Option<NodeId>,
    pub marking: Marking,
}

/// Result of propagation: for each async function, the await sites that
/// forced it. Entries keep worklist order; edges keep discovery order.
#[derive(Debug, Default, Clone)]
pub struct AsyncMap {
    order: Vec<AsyncSource>,
    entries: HashMap<AsyncSource, Vec<Edge>>,
}

impl AsyncMap {
    fn insert(&mut self, source: AsyncSource, edges: Vec<Edge>) {
        if !self.entries.contains_key(&source) {
            self.order.push(source);
        }
        self.entries.insert(source, edges);
    }

    pub fn get(&self, source: AsyncSource) -> Option<&[Edge]> {
        self.entries.get(&source).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AsyncSource, &[Edge])> {
        self.order
            .iter()
            .map(move |&s| (s, self.entries[&s].as_slice()))
    }

    /// The newly async functions, in the order the worklist reached them.
    pub fn functions(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().filter_map(|s| match s {
            AsyncSource::Function(f) => Some(*f),
            AsyncSource::Root => None,
        })
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stable output form: per entry, duplicate await sites collapse and
    /// edges order by (file, line). Entry order is untouched.
    pub fn dedup_sorted(&self, index: &SemanticIndex) -> AsyncMap {
        let mut out = AsyncMap::default();
        for (source, edges) in self.iter() {
            let mut seen = HashSet::new();
            let mut kept: Vec<Edge> = edges
                .iter()
                .filter(|e| match e.await_site {
                    Some(site) => seen.insert(site),
                    None => true,
                })
                .copied()
                .collect();
            kept.sort_by(|a, b| {
                let key = |e: &Edge| {
                    e.await_site.map(|site| {
                        let (path, line) = index.origin(site);
                        (path.to_path_buf(), line, site)
                    })
                };
                key(a).cmp(&key(b))
            });
            out.insert(source, kept);
        }
        out
    }
}

/// Monotonic worklist: treat the seed as newly async, find every reference
/// that now needs an await, mark the functions enclosing those references,
/// repeat. FIFO order makes the enumeration deterministic.
pub fn propagate(
    ast: &Ast,
    scopes: &ScopeAnalysis,
    index: &SemanticIndex,
    ignored: &HashSet<NodeId>,
    seed: NodeId,
) -> Result<AsyncMap> {
    let mut map = AsyncMap::default();
    map.insert(
        AsyncSource::Root,
        vec![Edge {
            await_site: None,
            marking: Marking::Function(seed),
        }],
    );

    let mut work = VecDeque::new();
    let mut scheduled = HashSet::new();
    work.push_back(seed);
    scheduled.insert(seed);

    while let Some(g) = work.pop_front() {
        if ignored.contains(&g) {
            continue;
        }
        let candidates = await_candidates(ast, scopes, index, g)?;
        if candidates.is_empty() {
            continue;
        }
        let mut edges = Vec::new();
        for site in candidates {
            if ignored.contains(&site) {
                continue;
            }
            let marking = match index.enclosing_fn.get(&site) {
                Some(&parent) if !ignored.contains(&parent) => {
                    if scheduled.insert(parent) {
                        work.push_back(parent);
                    }
                    if ast.node(parent).is_async {
                        Marking::AlreadyAsync(parent)
                    } else {
                        Marking::Function(parent)
                    }
                }
                _ => Marking::None,
            };
            edges.push(Edge {
                await_site: Some(site),
                marking,
            });
        }
        map.insert(AsyncSource::Function(g), edges);
    }

    tracing::debug!(entries = map.len(), "async propagation finished");
    Ok(map)
}

/// References that would need an await once `g` is async: calls by g's
/// name, bare reads when g is an accessor, and `this.<name>` members of
/// g's constructor. Filtered to sites g can lexically reach and not
/// already under an await.
fn await_candidates(
    ast: &Ast,
    scopes: &ScopeAnalysis,
    index: &SemanticIndex,
    g: NodeId,
) -> Result<Vec<NodeId>> {
    let name = index.name_of(ast, g)?;
    let mut out: Vec<NodeId> = Vec::new();

    if let Some(calls) = index.calls.get(&name) {
        out.extend(calls);
    }
    if index.accessors.contains(&g) {
        if let Some(reads) = index.reads.get(&name) {
            out.extend(reads);
        }
    }
    if let Some(ctor) = index.constructor_of.get(&g) {
        if let Some(members) = index.members_of.get(ctor) {
            for &member in members {
                if index.name_of(ast, member)? == name {
                    out.push(member);
                }
            }
        }
    }

    let g_scope = scopes.scope_of(g);
    out.retain(|&site| {
        scopes.tree.is_ancestor_or_self(g_scope, scopes.scope_of(site))
            && !index.in_await.contains(&site)
    });
    Ok(out)
}
