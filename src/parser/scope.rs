use crate::parser::ast::{Ast, AstKind, NodeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// A name defined in some scope: its definition site plus every reference
/// that resolved to it.
#[derive(Debug)]
pub struct Binding {
    pub def: NodeId,
    pub references: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The program node for the root scope, the function node otherwise.
    pub owner: NodeId,
    bindings: HashMap<String, Binding>,
}

impl Scope {
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Lexical scope tree: one scope for the program plus one per function-like
/// node. Scopes live in an arena and point at their parent by id.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    fn with_root(owner: NodeId) -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                owner,
                bindings: HashMap::new(),
            }],
        }
    }

    fn push(&mut self, parent: ScopeId, owner: NodeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            owner,
            bindings: HashMap::new(),
        });
        id
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.0 as usize].parent
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    fn bind(&mut self, scope: ScopeId, name: &str, def: NodeId) {
        // First definition wins; later same-name definitions fold into it
        self.scopes[scope.0 as usize]
            .bindings
            .entry(name.to_string())
            .or_insert(Binding {
                def,
                references: Vec::new(),
            });
    }

    /// Walks the parent chain from `from` and returns the nearest binding.
    pub fn lookup(&self, from: ScopeId, name: &str) -> Option<(ScopeId, &Binding)> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(binding) = self.scopes[id.0 as usize].bindings.get(name) {
                return Some((id, binding));
            }
            current = self.scopes[id.0 as usize].parent;
        }
        None
    }

    fn add_reference(&mut self, from: ScopeId, name: &str, site: NodeId) {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.scopes[id.0 as usize].bindings.contains_key(name) {
                if let Some(binding) = self.scopes[id.0 as usize].bindings.get_mut(name) {
                    binding.references.push(site);
                }
                return;
            }
            current = self.scopes[id.0 as usize].parent;
        }
    }

    /// Reflexive-transitive ancestry test on the scope tree.
    pub fn is_ancestor_or_self(&self, ancestor: ScopeId, of: ScopeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.scopes[id.0 as usize].parent;
        }
        false
    }
}

#[derive(Debug)]
pub struct ScopeAnalysis {
    pub tree: ScopeTree,
    /// Per node: the scope current at the node's first visit. For a
    /// function-like node that is its defining scope; the function's own
    /// scope applies from its children on.
    pub scope_of: Vec<ScopeId>,
}

impl ScopeAnalysis {
    pub fn scope_of(&self, id: NodeId) -> ScopeId {
        self.scope_of[id.0 as usize]
    }
}

pub fn analyze(ast: &Ast) -> ScopeAnalysis {
    let mut tree = ScopeTree::with_root(ast.root());
    let mut scope_of = vec![ScopeId(0); ast.len()];
    bind_walk(ast, ast.root(), tree.root(), &mut tree, &mut scope_of);
    record_references(ast, &mut tree, &scope_of);
    ScopeAnalysis { tree, scope_of }
}

fn bind_walk(
    ast: &Ast,
    id: NodeId,
    current: ScopeId,
    tree: &mut ScopeTree,
    scope_of: &mut [ScopeId],
) {
    scope_of[id.0 as usize] = current;
    let node = ast.node(id);

    match &node.kind {
        // Declaration names are visible in the defining scope
        AstKind::FunctionDeclaration { id: Some(name) }
        | AstKind::ClassDeclaration { id: Some(name) } => {
            tree.bind(current, ast.text_of(*name), id);
        }
        AstKind::VariableDeclarator { id: pattern, .. } => {
            let mut idents = Vec::new();
            collect_binding_idents(ast, *pattern, &mut idents);
            for ident in idents {
                tree.bind(current, ast.text_of(ident), id);
            }
        }
        _ => {}
    }

    let next = if node.kind.is_function() {
        let inner = tree.push(current, id);
        // A function expression's own name is only visible inside it
        if let AstKind::FunctionExpression { id: Some(name) } = &node.kind {
            tree.bind(inner, ast.text_of(*name), id);
        }
        for &child in &node.children {
            if ast.node(child).kind == AstKind::Other("formal_parameters") {
                let mut params = Vec::new();
                collect_binding_idents(ast, child, &mut params);
                for param in params {
                    tree.bind(inner, ast.text_of(param), param);
                }
            }
        }
        inner
    } else {
        current
    };

    for &child in &node.children {
        bind_walk(ast, child, next, tree, scope_of);
    }
}

/// Collects the identifiers a pattern binds. Default values and other
/// expressions inside the pattern are not descended into.
fn collect_binding_idents(ast: &Ast, id: NodeId, out: &mut Vec<NodeId>) {
    let node = ast.node(id);
    match &node.kind {
        AstKind::Identifier => out.push(id),
        AstKind::ObjectPattern | AstKind::ArrayPattern => {
            for &child in &node.children {
                collect_binding_idents(ast, child, out);
            }
        }
        AstKind::Property { value, .. } => collect_binding_idents(ast, *value, out),
        AstKind::Other("assignment_pattern") => {
            if let Some(&left) = node.children.first() {
                collect_binding_idents(ast, left, out);
            }
        }
        AstKind::Other("formal_parameters") | AstKind::Other("rest_pattern") => {
            for &child in &node.children {
                collect_binding_idents(ast, child, out);
            }
        }
        _ => {}
    }
}

fn record_references(ast: &Ast, tree: &mut ScopeTree, scope_of: &[ScopeId]) {
    for (id, node) in ast.iter() {
        if node.kind != AstKind::Identifier {
            continue;
        }
        if is_definition_or_key_position(ast, id, node.parent) {
            continue;
        }
        let name = ast.text_of(id);
        tree.add_reference(scope_of[id.0 as usize], name, id);
    }
}

fn is_definition_or_key_position(ast: &Ast, id: NodeId, parent: Option<NodeId>) -> bool {
    let Some(parent) = parent else {
        return false;
    };
    match &ast.node(parent).kind {
        AstKind::FunctionDeclaration { id: name }
        | AstKind::FunctionExpression { id: name }
        | AstKind::ClassDeclaration { id: name } => *name == Some(id),
        AstKind::VariableDeclarator { id: name, .. } => *name == id,
        AstKind::MemberExpression {
            property, computed, ..
        } => *property == id && !computed,
        AstKind::Property { key, .. } => *key == id,
        AstKind::Other("formal_parameters") | AstKind::Other("assignment_pattern") => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_buffer;
    use crate::source::SourceBuffer;
    use std::path::{Path, PathBuf};

    fn analyzed(src: &str) -> (Ast, ScopeAnalysis) {
        let mut buffer = SourceBuffer::new(PathBuf::from("."));
        buffer.append_source(Path::new("s.js"), 1, src).unwrap();
        let ast = parse_buffer(&buffer).unwrap();
        let analysis = analyze(&ast);
        (ast, analysis)
    }

    fn function_on_line(ast: &Ast, line: u32) -> NodeId {
        ast.iter()
            .find(|(_, n)| n.kind.is_function() && n.span.line == line)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no function on line {line}"))
    }

    #[test]
    fn one_scope_per_function_plus_program() {
        let (_, analysis) = analyzed(
            "function a() {\n  function b() {}\n}\nconst c = () => 1;\n",
        );
        assert_eq!(analysis.tree.len(), 4);
    }

    #[test]
    fn declarations_bind_in_the_defining_scope() {
        let (ast, analysis) = analyzed("function outer() {\n  function inner() {}\n}\n");
        let outer = function_on_line(&ast, 1);
        let inner = function_on_line(&ast, 2);

        let root = analysis.tree.root();
        let (scope, binding) = analysis.tree.lookup(root, "outer").unwrap();
        assert_eq!(scope, root);
        assert_eq!(binding.def, outer);
        assert!(analysis.tree.lookup(root, "inner").is_none());

        // inner is visible from inside outer's scope
        let inner_scope = analysis.scope_of(inner);
        let (_, binding) = analysis.tree.lookup(inner_scope, "inner").unwrap();
        assert_eq!(binding.def, inner);
    }

    #[test]
    fn function_nodes_sit_in_their_defining_scope() {
        let (ast, analysis) = analyzed("function outer() {\n  function inner() {}\n}\n");
        let outer = function_on_line(&ast, 1);
        let inner = function_on_line(&ast, 2);
        assert_eq!(analysis.scope_of(outer), analysis.tree.root());
        assert_ne!(analysis.scope_of(inner), analysis.tree.root());
        assert!(analysis
            .tree
            .is_ancestor_or_self(analysis.scope_of(inner), analysis.scope_of(inner)));
    }

    #[test]
    fn shadowing_resolves_to_the_nearest_binding() {
        let (ast, analysis) =
            analyzed("function f() {}\nfunction wrap() {\n  function f() {}\n  f();\n}\n");
        let outer_f = function_on_line(&ast, 1);
        let inner_f = function_on_line(&ast, 3);

        // From inside wrap, f resolves to the inner definition
        let wrap_scope = analysis.scope_of(inner_f);
        let (_, inner_binding) = analysis.tree.lookup(wrap_scope, "f").unwrap();
        assert_eq!(inner_binding.def, inner_f);
        // The call site landed on the shadowing binding, not the outer one
        assert_eq!(inner_binding.references.len(), 1);

        let (_, outer_binding) = analysis.tree.lookup(analysis.tree.root(), "f").unwrap();
        assert_eq!(outer_binding.def, outer_f);
        assert!(outer_binding.references.is_empty());
    }

    #[test]
    fn parameters_and_declarators_bind_inside_the_function() {
        let (ast, analysis) = analyzed("function f(a, b) {\n  var c = 1;\n}\n");
        let f = function_on_line(&ast, 1);
        // The function's own scope is the one its body children carry
        let body_scope = ast
            .node(f)
            .children
            .iter()
            .map(|&c| analysis.scope_of(c))
            .next()
            .unwrap();
        for name in ["a", "b", "c"] {
            assert!(
                analysis.tree.lookup(body_scope, name).is_some(),
                "{name} should be bound in the function scope"
            );
            assert!(
                analysis.tree.lookup(analysis.tree.root(), name).is_none(),
                "{name} must not leak to the program scope"
            );
        }
    }
}
