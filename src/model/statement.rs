//! Statement extraction from operation bodies.

use crate::ast::{Ast, NodeCategory, NodeId, Role, Span, normalize_code};
use serde::{Deserialize, Serialize};

/// A call made from a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    /// Called operation name (`new T` for constructor calls).
    pub name: String,
    /// Normalized argument expressions.
    pub arguments: Vec<String>,
    pub node: NodeId,
}

/// One statement of an operation body.
///
/// Composite statements (`if`, loops, `switch`, `try`) are represented by
/// their header only; their nested statements follow them in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Normalized statement text.
    pub text: String,
    pub kind: String,
    pub node: NodeId,
    pub span: Span,
    /// Nesting depth below the body block, 0 for top-level statements.
    pub depth: usize,
    pub composite: bool,
    pub invocations: Vec<Invocation>,
}

/// Collect the statements of a body block in pre-order. Nested operations and
/// type declarations (lambdas aside) are not descended into.
pub fn extract_statements(ast: &Ast, body: NodeId) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = ast
        .children(body)
        .iter()
        .rev()
        .map(|c| (*c, 0))
        .collect();

    while let Some((id, depth)) = stack.pop() {
        let category = ast.category(id);
        if matches!(
            category,
            NodeCategory::Operation | NodeCategory::TypeDeclaration
        ) {
            continue;
        }

        let nested_depth = if category.is_statement() {
            let split = header_end(ast, id);
            out.push(Statement {
                text: statement_text(ast, id, split),
                kind: ast.kind(id).to_string(),
                node: id,
                span: ast.span(id),
                depth,
                composite: split.is_some(),
                invocations: invocations(ast, id, split),
            });
            depth + 1
        } else {
            depth
        };

        for child in ast.children(id).iter().rev() {
            stack.push((*child, nested_depth));
        }
    }
    out
}

/// Index of the first nested block or statement child, if any.
fn header_end(ast: &Ast, id: NodeId) -> Option<usize> {
    ast.children(id).iter().position(|c| {
        let cat = ast.category(*c);
        cat == NodeCategory::Block || cat.is_statement()
    })
}

fn statement_text(ast: &Ast, id: NodeId, split: Option<usize>) -> String {
    let Some(index) = split else {
        return normalize_code(ast.text(id));
    };
    let start = ast.span(id).start_byte;
    let end = ast.span(ast.children(id)[index]).start_byte;
    let header = ast.source().get(start..end).unwrap_or_else(|| ast.label(id));
    let text = normalize_code(header);
    let text = text.trim_end_matches(['{', ':']).trim_end();
    if text.is_empty() {
        ast.label(id).to_string()
    } else {
        text.to_string()
    }
}

fn invocations(ast: &Ast, id: NodeId, split: Option<usize>) -> Vec<Invocation> {
    let roots: Vec<NodeId> = match split {
        Some(index) => ast.children(id)[..index].to_vec(),
        None => ast.children(id).to_vec(),
    };
    let mut out = Vec::new();
    for root in roots {
        for node in ast.pre_order(root) {
            if ast.category(node) == NodeCategory::Invocation {
                if let Some(name) = invocation_name(ast, node) {
                    out.push(Invocation {
                        name,
                        arguments: arguments(ast, node),
                        node,
                    });
                }
            }
        }
    }
    out
}

fn invocation_name(ast: &Ast, node: NodeId) -> Option<String> {
    if let Some(name) = ast.child_with_role(node, Role::Name) {
        return Some(ast.label(name).to_string());
    }
    if let Some(ty) = ast.child_with_role(node, Role::Type) {
        return Some(format!("new {}", normalize_code(ast.text(ty))));
    }
    let callee = ast.child_with_role(node, Role::Callee)?;
    match ast.child_with_role(callee, Role::Name) {
        Some(name) => Some(ast.label(name).to_string()),
        None => Some(normalize_code(ast.text(callee))),
    }
}

fn arguments(ast: &Ast, node: NodeId) -> Vec<String> {
    ast.child_with_role(node, Role::Arguments)
        .map(|args| {
            ast.children(args)
                .iter()
                .map(|a| normalize_code(ast.text(*a)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Java, Language, Python};
    use std::path::Path;

    fn java_statements(body: &str) -> Vec<Statement> {
        let source = format!("class A {{ void f(int x) {{ {body} }} }}");
        let ast = Java.parse(Path::new("A.java"), &source).unwrap();
        let method = ast
            .ids()
            .find(|id| ast.category(*id) == NodeCategory::Operation)
            .unwrap();
        let block = ast.child_with_role(method, Role::Body).unwrap();
        extract_statements(&ast, block)
    }

    #[test]
    fn test_leaf_statements() {
        let stmts = java_statements("int y = x + 1; foo(y, 2);");
        let texts: Vec<&str> = stmts.iter().map(|s| s.text.as_str()).collect();

        assert_eq!(texts, ["int y=x+1;", "foo(y,2);"]);
        assert_eq!(stmts[1].invocations[0].name, "foo");
        assert_eq!(stmts[1].invocations[0].arguments, ["y", "2"]);
    }

    #[test]
    fn test_composite_header_and_depth() {
        let stmts = java_statements("if (x > 0) { bar(); } return;");
        let texts: Vec<&str> = stmts.iter().map(|s| s.text.as_str()).collect();

        assert_eq!(texts, ["if(x>0)", "bar();", "return;"]);
        assert!(stmts[0].composite);
        assert!(stmts[0].invocations.is_empty());
        assert_eq!(stmts[1].depth, 1);
        assert_eq!(stmts[2].depth, 0);
    }

    #[test]
    fn test_switch_labels_are_statements() {
        let stmts = java_statements("switch (x) { case 1: bar(); break; default: break; }");
        let texts: Vec<&str> = stmts.iter().map(|s| s.text.as_str()).collect();

        assert_eq!(
            texts,
            ["switch(x)", "case 1", "bar();", "break;", "default", "break;"]
        );
    }

    #[test]
    fn test_python_call_names() {
        let source = "def f(a):\n    total = a.compute(1)\n    return total\n";
        let ast = Python.parse(Path::new("m.py"), source).unwrap();
        let func = ast
            .ids()
            .find(|id| ast.category(*id) == NodeCategory::Operation)
            .unwrap();
        let block = ast.child_with_role(func, Role::Body).unwrap();
        let stmts = extract_statements(&ast, block);

        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].invocations[0].name, "compute");
    }
}
