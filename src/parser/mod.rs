pub mod ast;
pub mod scope;

use crate::error::{AsyncscopeError, Result};
use crate::source::SourceBuffer;
use ast::{Ast, AstKind, AstNode, NodeId, PropertyKind, Span};
use std::collections::HashMap;
use tree_sitter::{Node as TsNode, Parser};

/// Parses the concatenated buffer with tree-sitter-javascript and lowers
/// the CST into the arena AST the analyzer works on. The lowered shape
/// follows ESTree naming: object members become `Property` nodes whose
/// value is a function expression, `a[b]` becomes a computed
/// `MemberExpression`, parentheses disappear.
pub fn parse_buffer(buffer: &SourceBuffer) -> Result<Ast> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| AsyncscopeError::Syntax(e.to_string()))?;

    let source = buffer.text();
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| AsyncscopeError::Syntax("parser produced no tree".to_string()))?;

    if tree.root_node().has_error() {
        let (line, what) = first_error(tree.root_node());
        let origin = match buffer.locate_origin(line) {
            Ok((path, original)) => format!("{}:{original}", path.display()),
            Err(_) => format!("<buffer>:{line}"),
        };
        return Err(AsyncscopeError::Syntax(format!("{origin}: {what}")));
    }

    let mut lowerer = Lowerer {
        source,
        nodes: Vec::new(),
    };
    let root = lowerer.lower(tree.root_node());
    tracing::debug!(nodes = lowerer.nodes.len(), "lowered syntax tree");
    Ok(Ast::new(lowerer.nodes, root))
}

fn first_error(root: TsNode) -> (u32, String) {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            return (
                node.start_position().row as u32 + 1,
                "unexpected token".to_string(),
            );
        }
        if node.is_missing() {
            return (
                node.start_position().row as u32 + 1,
                format!("missing {}", node.kind()),
            );
        }
        if node.has_error() {
            let children: Vec<_> = node.children(&mut cursor).collect();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
    }
    (
        root.start_position().row as u32 + 1,
        "unexpected token".to_string(),
    )
}

struct Lowerer<'a> {
    source: &'a str,
    nodes: Vec<AstNode>,
}

impl Lowerer<'_> {
    fn push(
        &mut self,
        kind: AstKind,
        span: Span,
        is_async: bool,
        text: Option<String>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for &child in &children {
            self.nodes[child.0 as usize].parent = Some(id);
        }
        self.nodes.push(AstNode {
            kind,
            span,
            parent: None,
            children,
            is_async,
            text,
        });
        id
    }

    fn span(&self, n: TsNode) -> Span {
        Span {
            start_byte: n.start_byte(),
            end_byte: n.end_byte(),
            line: n.start_position().row as u32 + 1,
            column: n.start_position().column as u32,
        }
    }

    fn text(&self, n: TsNode) -> String {
        n.utf8_text(self.source.as_bytes())
            .unwrap_or_default()
            .to_string()
    }

    fn lower(&mut self, n: TsNode) -> NodeId {
        match n.kind() {
            // ESTree has no node for parentheses
            "parenthesized_expression" => {
                let mut cursor = n.walk();
                let inner = n.named_children(&mut cursor).find(|c| c.kind() != "comment");
                match inner {
                    Some(inner) => self.lower(inner),
                    None => self.push(
                        AstKind::Other("parenthesized_expression"),
                        self.span(n),
                        false,
                        None,
                        Vec::new(),
                    ),
                }
            }
            "method_definition" => self.lower_method(n),
            "arrow_function" => self.lower_arrow(n),
            kind if is_identifier_kind(kind) => {
                let text = self.text(n);
                let span = self.span(n);
                self.push(AstKind::Identifier, span, false, Some(text), Vec::new())
            }
            kind if is_literal_kind(kind) => {
                let text = self.text(n);
                let span = self.span(n);
                self.push(AstKind::Literal, span, false, Some(text), Vec::new())
            }
            _ => self.lower_generic(n),
        }
    }

    fn lower_generic(&mut self, n: TsNode) -> NodeId {
        let mut children = Vec::new();
        let mut by_cst: HashMap<usize, NodeId> = HashMap::new();
        let mut cursor = n.walk();
        let named: Vec<_> = n.named_children(&mut cursor).collect();
        for child in named {
            if child.kind() == "comment" {
                continue;
            }
            let lowered = self.lower(child);
            by_cst.insert(child.id(), lowered);
            children.push(lowered);
        }

        let field = |name: &str| -> Option<NodeId> {
            n.child_by_field_name(name)
                .and_then(|c| by_cst.get(&c.id()).copied())
        };

        let kind = match n.kind() {
            "program" => AstKind::Program,
            "function_declaration" | "generator_function_declaration" => {
                AstKind::FunctionDeclaration { id: field("name") }
            }
            "function" | "function_expression" | "generator_function" => {
                AstKind::FunctionExpression { id: field("name") }
            }
            "class_declaration" | "class" => AstKind::ClassDeclaration { id: field("name") },
            "class_body" => AstKind::ClassBody,
            "variable_declarator" => match field("name") {
                Some(id) => AstKind::VariableDeclarator {
                    id,
                    init: field("value"),
                },
                None => AstKind::Other("variable_declarator"),
            },
            "assignment_expression" => match (field("left"), field("right")) {
                (Some(left), Some(right)) => AstKind::AssignmentExpression { left, right },
                _ => AstKind::Other("assignment_expression"),
            },
            "pair" | "pair_pattern" => match (field("key"), field("value")) {
                (Some(key), Some(value)) => AstKind::Property {
                    kind: PropertyKind::Init,
                    key,
                    value,
                },
                _ => AstKind::Other("pair"),
            },
            "call_expression" => match field("function") {
                Some(callee) => AstKind::CallExpression { callee },
                None => AstKind::Other("call_expression"),
            },
            "new_expression" => match field("constructor") {
                Some(callee) => AstKind::NewExpression { callee },
                None => AstKind::Other("new_expression"),
            },
            "member_expression" => match (field("object"), field("property")) {
                (Some(object), Some(property)) => AstKind::MemberExpression {
                    object,
                    property,
                    computed: false,
                },
                _ => AstKind::Other("member_expression"),
            },
            "subscript_expression" => match (field("object"), field("index")) {
                (Some(object), Some(property)) => AstKind::MemberExpression {
                    object,
                    property,
                    computed: true,
                },
                _ => AstKind::Other("subscript_expression"),
            },
            "this" => AstKind::ThisExpression,
            "await_expression" => AstKind::AwaitExpression,
            "object" => AstKind::ObjectExpression,
            "object_pattern" => AstKind::ObjectPattern,
            "array_pattern" => AstKind::ArrayPattern,
            other => AstKind::Other(other),
        };

        let is_async = kind.is_function() && has_keyword(n, "async");
        self.push(kind, self.span(n), is_async, None, children)
    }

    /// `method_definition` covers plain methods, getters and setters in both
    /// object literals and class bodies. Lowered to a `Property` whose value
    /// is a synthesized function expression spanning the whole member.
    fn lower_method(&mut self, n: TsNode) -> NodeId {
        let key = n.child_by_field_name("name").map(|c| self.lower(c));
        let params = n.child_by_field_name("parameters").map(|c| self.lower(c));
        let body = n.child_by_field_name("body").map(|c| self.lower(c));

        let (Some(key), Some(body)) = (key, body) else {
            return self.push(
                AstKind::Other("method_definition"),
                self.span(n),
                false,
                None,
                Vec::new(),
            );
        };

        let mut fn_children = Vec::new();
        fn_children.extend(params);
        fn_children.push(body);
        let value = self.push(
            AstKind::FunctionExpression { id: None },
            self.span(n),
            has_keyword(n, "async"),
            None,
            fn_children,
        );

        let prop_kind = if has_keyword(n, "get") {
            PropertyKind::Get
        } else if has_keyword(n, "set") {
            PropertyKind::Set
        } else {
            PropertyKind::Init
        };

        self.push(
            AstKind::Property {
                kind: prop_kind,
                key,
                value,
            },
            self.span(n),
            false,
            None,
            vec![key, value],
        )
    }

    fn lower_arrow(&mut self, n: TsNode) -> NodeId {
        let params = match (
            n.child_by_field_name("parameters"),
            n.child_by_field_name("parameter"),
        ) {
            (Some(list), _) => Some(self.lower(list)),
            // A bare single parameter gets wrapped so the body stays
            // distinguishable from it
            (None, Some(bare)) => {
                let span = self.span(bare);
                let param = self.lower(bare);
                Some(self.push(
                    AstKind::Other("formal_parameters"),
                    span,
                    false,
                    None,
                    vec![param],
                ))
            }
            (None, None) => None,
        };
        let body = n.child_by_field_name("body").map(|c| self.lower(c));

        let mut children = Vec::new();
        children.extend(params);
        children.extend(body);
        self.push(
            AstKind::ArrowFunctionExpression,
            self.span(n),
            has_keyword(n, "async"),
            None,
            children,
        )
    }
}

fn has_keyword(n: TsNode, keyword: &str) -> bool {
    let mut cursor = n.walk();
    let result = n.children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == keyword);
    result
}

fn is_identifier_kind(kind: &str) -> bool {
    matches!(
        kind,
        "identifier"
            | "property_identifier"
            | "shorthand_property_identifier"
            | "shorthand_property_identifier_pattern"
            | "statement_identifier"
            | "private_property_identifier"
    )
}

fn is_literal_kind(kind: &str) -> bool {
    matches!(
        kind,
        "string" | "number" | "regex" | "true" | "false" | "null" | "undefined"
    )
}
