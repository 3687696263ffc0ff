use crate::error::{AsyncscopeError, Result};
use crate::parser::ast::{Ast, AstKind, NodeId, PropertyKind};
use crate::parser::scope::{ScopeAnalysis, ScopeId};
use crate::source::SourceBuffer;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Display name for function values with no name of their own.
pub const LAMBDA_NAME: &str = "(lambda)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathId(pub u32);

/// Every derived fact the propagator and the report layer read. Populated
/// once by [`build_index`] and logically immutable afterwards.
#[derive(Debug, Default)]
pub struct SemanticIndex {
    paths: Vec<PathBuf>,
    path_ids: HashMap<PathBuf, PathId>,
    /// Per node: origin file and line, derived through the line map.
    origin: Vec<(PathId, u32)>,
    /// Nodes per (file, line), in traversal order.
    node_index: HashMap<(PathId, u32), Vec<NodeId>>,
    /// Nearest function-like ancestor. Absent for top-level nodes.
    pub enclosing_fn: HashMap<NodeId, NodeId>,
    /// Property values and assignment right-hand sides point at the
    /// key/target expression that names them.
    pub owner_key: HashMap<NodeId, NodeId>,
    /// Function values of `get`/`set` properties.
    pub accessors: HashSet<NodeId>,
    /// Definitions observed under a `new` expression.
    pub constructors: HashSet<NodeId>,
    /// Method value -> the constructor whose prototype carries it.
    pub constructor_of: HashMap<NodeId, NodeId>,
    /// Function -> property identifiers referenced as `this.<prop>` inside it.
    pub members_of: HashMap<NodeId, Vec<NodeId>>,
    /// Nodes lexically inside an `await` subtree.
    pub in_await: HashSet<NodeId>,
    /// Call and `new` expressions by derived name.
    pub calls: HashMap<String, Vec<NodeId>>,
    /// Other reference-bearing nodes by derived name.
    pub reads: HashMap<String, Vec<NodeId>>,
}

impl SemanticIndex {
    pub fn path_id(&self, path: &Path) -> Option<PathId> {
        self.path_ids.get(path).copied()
    }

    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id.0 as usize]
    }

    pub fn origin(&self, node: NodeId) -> (&Path, u32) {
        let (pid, line) = self.origin[node.0 as usize];
        (self.path(pid), line)
    }

    /// Nodes whose derived line equals `(path, line)`, in traversal order.
    pub fn nodes_at(&self, path: &Path, line: u32) -> &[NodeId] {
        self.path_id(path)
            .and_then(|pid| self.node_index.get(&(pid, line)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Position of `node` among same-kind nodes sharing its (file, line).
    pub fn kind_index_on_line(&self, ast: &Ast, node: NodeId) -> usize {
        let (pid, line) = self.origin[node.0 as usize];
        let kind = ast.node(node).kind.name();
        self.node_index
            .get(&(pid, line))
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|&&n| ast.node(n).kind.name() == kind)
                    .take_while(|&&n| n != node)
                    .count()
            })
            .unwrap_or(0)
    }

    /// The short, syntactically derived name used as the reference-lookup
    /// key. Not a resolved symbol: a node named through its property key or
    /// assignment target reports that name, a function falls back to its
    /// own identifier, and anonymous functions are all `(lambda)`.
    pub fn name_of(&self, ast: &Ast, id: NodeId) -> Result<String> {
        if let Some(&key) = self.owner_key.get(&id) {
            return self.name_of(ast, key);
        }
        let node = ast.node(id);
        if node.kind.is_function() {
            let own_id = match &node.kind {
                AstKind::FunctionDeclaration { id } | AstKind::FunctionExpression { id } => *id,
                _ => None,
            };
            return match own_id {
                Some(name) => self.name_of(ast, name),
                None => Ok(LAMBDA_NAME.to_string()),
            };
        }
        match &node.kind {
            AstKind::Identifier | AstKind::Literal => Ok(ast.text_of(id).to_string()),
            AstKind::MemberExpression { property, .. } => self.name_of(ast, *property),
            AstKind::CallExpression { callee } | AstKind::NewExpression { callee } => {
                self.name_of(ast, *callee)
            }
            AstKind::Property { key, .. } => self.name_of(ast, *key),
            AstKind::VariableDeclarator { id: pattern, .. } => self.name_of(ast, *pattern),
            AstKind::ThisExpression => Ok("this".to_string()),
            AstKind::ArrayPattern | AstKind::ObjectPattern => {
                let parts = node
                    .children
                    .iter()
                    .map(|&c| self.name_of(ast, c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(","))
            }
            other => Err(AsyncscopeError::InvalidInput(format!(
                "no name rule for {} node",
                other.name()
            ))),
        }
    }

    fn intern(&mut self, path: &Path) -> PathId {
        if let Some(&id) = self.path_ids.get(path) {
            return id;
        }
        let id = PathId(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        self.path_ids.insert(path.to_path_buf(), id);
        id
    }
}

/// Two walks over the AST: a line/scope pass attaching origins and the
/// per-line node lists, then a semantic pass emitting the reference index
/// and the prototype/constructor/accessor/await facts.
pub fn build_index(
    ast: &Ast,
    scopes: &ScopeAnalysis,
    buffer: &SourceBuffer,
) -> Result<SemanticIndex> {
    let mut index = SemanticIndex {
        origin: vec![(PathId(0), 0); ast.len()],
        ..SemanticIndex::default()
    };

    locate_pass(ast, buffer, &mut index, ast.root())?;

    let mut builder = SemanticPass {
        index,
        fn_stack: Vec::new(),
        proto_stack: Vec::new(),
        await_depth: 0,
    };
    builder.visit(ast, scopes, ast.root())?;

    let index = builder.index;
    tracing::debug!(
        calls = index.calls.len(),
        reads = index.reads.len(),
        constructors = index.constructors.len(),
        "semantic index built"
    );
    Ok(index)
}

fn locate_pass(
    ast: &Ast,
    buffer: &SourceBuffer,
    index: &mut SemanticIndex,
    id: NodeId,
) -> Result<()> {
    let line = ast.node(id).span.line;
    let (path, original) = buffer.locate_origin(line)?;
    let pid = index.intern(path);
    index.origin[id.0 as usize] = (pid, original);
    index.node_index.entry((pid, original)).or_default().push(id);

    for &child in &ast.node(id).children {
        locate_pass(ast, buffer, index, child)?;
    }
    Ok(())
}

struct SemanticPass {
    index: SemanticIndex,
    fn_stack: Vec<NodeId>,
    proto_stack: Vec<NodeId>,
    await_depth: u32,
}

impl SemanticPass {
    fn visit(&mut self, ast: &Ast, scopes: &ScopeAnalysis, id: NodeId) -> Result<()> {
        let node = ast.node(id);

        if self.await_depth > 0 {
            self.index.in_await.insert(id);
        }
        if let Some(&f) = self.fn_stack.last() {
            self.index.enclosing_fn.insert(id, f);
        }

        let mut pushed_proto = false;
        match &node.kind {
            AstKind::Property { kind, key, value } => {
                self.index.owner_key.insert(*value, *key);
                if *kind != PropertyKind::Init {
                    self.index.accessors.insert(*value);
                }
                if let Some(&ctor) = self.proto_stack.last() {
                    self.index.constructor_of.insert(*value, ctor);
                }
            }
            AstKind::AssignmentExpression { left, right } => {
                self.index.owner_key.insert(*right, *left);
                if let Some(target) = prototype_target(ast, *left) {
                    // Form A: X.prototype = { ... } collects members below
                    if ast.node(*right).kind == AstKind::ObjectExpression {
                        if let Some(ctor) =
                            resolve_function(ast, scopes, scopes.scope_of(id), ast.text_of(target))
                        {
                            self.proto_stack.push(ctor);
                            pushed_proto = true;
                        }
                    }
                } else if let Some(target) = prototype_member_target(ast, *left) {
                    // Form B: X.prototype.m = value
                    if let Some(ctor) =
                        resolve_function(ast, scopes, scopes.scope_of(id), ast.text_of(target))
                    {
                        self.index.constructor_of.insert(*right, ctor);
                    }
                }
            }
            AstKind::NewExpression { callee } => {
                if ast.node(*callee).kind == AstKind::Identifier {
                    if let Some(def) =
                        resolve_function(ast, scopes, scopes.scope_of(id), ast.text_of(*callee))
                    {
                        self.index.constructors.insert(def);
                        if matches!(ast.node(def).kind, AstKind::ClassDeclaration { .. }) {
                            if let Some(ctor) = class_constructor(ast, def) {
                                self.index.constructors.insert(ctor);
                            }
                        }
                    }
                }
            }
            AstKind::MemberExpression {
                object, property, ..
            } => {
                if ast.node(*object).kind == AstKind::ThisExpression {
                    if let Some(&f) = self.fn_stack.last() {
                        self.index.members_of.entry(f).or_default().push(*property);
                    }
                }
            }
            AstKind::ClassBody => {
                // The minimal class path: members associate with the class's
                // constructor the way Form A members associate with X
                if let Some(ctor) = node.parent.and_then(|class| class_constructor(ast, class)) {
                    self.proto_stack.push(ctor);
                    pushed_proto = true;
                }
            }
            _ => {}
        }

        let is_fn = node.kind.is_function();
        if is_fn {
            self.fn_stack.push(id);
        }
        let is_await = node.kind == AstKind::AwaitExpression;
        if is_await {
            self.await_depth += 1;
        }

        match &node.kind {
            AstKind::CallExpression { .. } | AstKind::NewExpression { .. } => {
                let name = self.index.name_of(ast, id)?;
                self.index.calls.entry(name).or_default().push(id);
            }
            AstKind::MemberExpression { .. } | AstKind::VariableDeclarator { .. } => {
                if !self.is_accessor_definition(ast, id) {
                    let name = self.index.name_of(ast, id)?;
                    self.index.reads.entry(name).or_default().push(id);
                }
            }
            AstKind::Identifier => {
                // Identifiers named through their parent (member property,
                // property key) are reference-indexed by that parent
                if !self.is_accessor_definition(ast, id) && !named_through_parent(ast, id) {
                    let name = self.index.name_of(ast, id)?;
                    self.index.reads.entry(name).or_default().push(id);
                }
            }
            _ => {}
        }

        for &child in &node.children {
            self.visit(ast, scopes, child)?;
        }

        if is_await {
            self.await_depth -= 1;
        }
        if is_fn {
            self.fn_stack.pop();
        }
        if pushed_proto {
            self.proto_stack.pop();
        }
        Ok(())
    }

    /// An accessor's own definition site must not index as a reference.
    fn is_accessor_definition(&self, ast: &Ast, id: NodeId) -> bool {
        if self.index.accessors.contains(&id) {
            return true;
        }
        match ast.node(id).parent.map(|p| &ast.node(p).kind) {
            Some(AstKind::Property { kind, key, .. }) => *kind != PropertyKind::Init && *key == id,
            _ => false,
        }
    }
}

fn named_through_parent(ast: &Ast, id: NodeId) -> bool {
    match ast.node(id).parent.map(|p| &ast.node(p).kind) {
        Some(AstKind::MemberExpression {
            property, computed, ..
        }) => *property == id && !computed,
        Some(AstKind::Property { key, .. }) => *key == id,
        _ => false,
    }
}

/// `X.prototype` as an assignment target; returns the X identifier.
fn prototype_target(ast: &Ast, left: NodeId) -> Option<NodeId> {
    if let AstKind::MemberExpression {
        object,
        property,
        computed: false,
    } = ast.node(left).kind
    {
        if ast.node(object).kind == AstKind::Identifier
            && ast.node(property).kind == AstKind::Identifier
            && ast.text_of(property) == "prototype"
        {
            return Some(object);
        }
    }
    None
}

/// `X.prototype.m` as an assignment target; returns the X identifier.
fn prototype_member_target(ast: &Ast, left: NodeId) -> Option<NodeId> {
    if let AstKind::MemberExpression {
        object,
        computed: false,
        ..
    } = ast.node(left).kind
    {
        return prototype_target(ast, object);
    }
    None
}

/// Resolves `name` through the scope chain to a function-like definition,
/// looking through `var F = function ...` and class declarations.
fn resolve_function(
    ast: &Ast,
    scopes: &ScopeAnalysis,
    from: ScopeId,
    name: &str,
) -> Option<NodeId> {
    let (_, binding) = scopes.tree.lookup(from, name)?;
    let def = binding.def;
    match &ast.node(def).kind {
        kind if kind.is_function() => Some(def),
        AstKind::ClassDeclaration { .. } => Some(def),
        AstKind::VariableDeclarator {
            init: Some(init), ..
        } => {
            let init_kind = &ast.node(*init).kind;
            if init_kind.is_function() || matches!(init_kind, AstKind::ClassDeclaration { .. }) {
                Some(*init)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The function value of a class's `constructor` member, if any.
fn class_constructor(ast: &Ast, class: NodeId) -> Option<NodeId> {
    if !matches!(ast.node(class).kind, AstKind::ClassDeclaration { .. }) {
        return None;
    }
    for &child in &ast.node(class).children {
        if ast.node(child).kind != AstKind::ClassBody {
            continue;
        }
        for &member in &ast.node(child).children {
            if let AstKind::Property { key, value, .. } = ast.node(member).kind {
                if ast.text_of(key) == "constructor" && ast.is_function(value) {
                    return Some(value);
                }
            }
        }
    }
    None
}
