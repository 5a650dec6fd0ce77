//! Derives a [`StructuralModel`] from parsed files.

use super::{
    Attribute, AttributeId, Class, ClassId, Operation, OperationId, Parameter, StructuralModel,
    Variable, extract_statements,
};
use crate::ast::{Ast, NodeCategory, NodeId, Role, normalize_code};
use std::path::Path;
use tracing::debug;

/// Build the structural model of a snapshot from its parsed files.
///
/// Files are processed in the order given; callers pass them sorted by path
/// so entity ids are stable across runs.
pub fn build_model<'a>(asts: impl IntoIterator<Item = &'a Ast>) -> StructuralModel {
    let mut model = StructuralModel::default();
    for ast in asts {
        let container = module_name(ast);
        let mut walker = Walker {
            ast,
            model: &mut model,
        };
        walker.visit_children(ast.root(), &container, None);
    }
    debug!(
        classes = model.classes.len(),
        operations = model.operations.len(),
        attributes = model.attributes.len(),
        "Built structural model"
    );
    model
}

struct Walker<'a, 'm> {
    ast: &'a Ast,
    model: &'m mut StructuralModel,
}

impl Walker<'_, '_> {
    fn visit_children(&mut self, id: NodeId, container: &str, class: Option<ClassId>) {
        for child in self.ast.children(id).to_vec() {
            self.visit(child, container, class);
        }
    }

    fn visit(&mut self, id: NodeId, container: &str, class: Option<ClassId>) {
        match self.ast.category(id) {
            NodeCategory::TypeDeclaration => self.add_class(id, container, class),
            NodeCategory::Operation => self.add_operation(id, container, class),
            NodeCategory::Attribute => {
                if let Some(class) = class {
                    self.add_attributes(id, container, class);
                }
            }
            _ => self.visit_children(id, container, class),
        }
    }

    fn add_class(&mut self, id: NodeId, container: &str, outer: Option<ClassId>) {
        let ast = self.ast;
        let Some(name) = ast.child_with_role(id, Role::Name).map(|n| ast.label(n).to_string())
        else {
            return;
        };
        let class_id = ClassId(self.model.classes.len());
        let mut supertypes = Vec::new();
        for role in [Role::Superclass, Role::Interfaces] {
            for child in ast.children(id).iter().filter(|c| ast.role(**c) == Some(role)) {
                supertypes.extend(type_names(ast, *child));
            }
        }

        let class = Class {
            id: class_id,
            name: name.clone(),
            container: container.to_string(),
            path: ast.path().to_path_buf(),
            node: id,
            span: ast.span(id),
            supertypes,
            outer,
            operations: Vec::new(),
            attributes: Vec::new(),
        };
        let qualified = class.qualified_name();
        self.model.classes.push(class);

        if let Some(body) = ast.child_with_role(id, Role::Body) {
            self.visit_children(body, &qualified, Some(class_id));
        }
    }

    fn add_operation(&mut self, id: NodeId, container: &str, class: Option<ClassId>) {
        let ast = self.ast;
        let Some(name) = ast.child_with_role(id, Role::Name).map(|n| ast.label(n).to_string())
        else {
            return;
        };
        let op_id = OperationId(self.model.operations.len());

        let mut parameters = ast
            .child_with_role(id, Role::Parameters)
            .map(|params| {
                ast.children(params)
                    .iter()
                    .filter(|p| ast.category(**p) == NodeCategory::Parameter)
                    .filter_map(|p| parameter(ast, *p))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if class.is_some()
            && parameters
                .first()
                .is_some_and(|p| p.type_name.is_none() && (p.name == "self" || p.name == "cls"))
        {
            parameters.remove(0);
        }

        let return_type = ast
            .child_with_role(id, Role::Type)
            .map(|t| normalize_code(ast.text(t)));
        let body = ast.child_with_role(id, Role::Body);
        let statements = body
            .map(|b| extract_statements(ast, b))
            .unwrap_or_default();

        for stmt in &statements {
            if ast.category(stmt.node) == NodeCategory::VariableDeclaration {
                let type_name = ast
                    .child_with_role(stmt.node, Role::Type)
                    .map(|t| normalize_code(ast.text(t)));
                for (name, node) in declared_names(ast, stmt.node) {
                    let initializer = ast
                        .parent(node)
                        .and_then(|declarator| ast.child_with_role(declarator, Role::Value))
                        .map(|value| normalize_code(ast.text(value)));
                    self.model.variables.push(Variable {
                        name,
                        type_name: type_name.clone(),
                        initializer,
                        operation: op_id,
                        path: ast.path().to_path_buf(),
                        node,
                        span: ast.span(stmt.node),
                    });
                }
            }
        }

        self.model.operations.push(Operation {
            id: op_id,
            name,
            class,
            container: container.to_string(),
            path: ast.path().to_path_buf(),
            node: id,
            span: ast.span(id),
            parameters,
            return_type,
            body,
            statements,
        });
        if let Some(class) = class {
            self.model.classes[class.0].operations.push(op_id);
        }
    }

    fn add_attributes(&mut self, id: NodeId, container: &str, class: ClassId) {
        let ast = self.ast;
        let type_name = ast
            .pre_order(id)
            .into_iter()
            .find(|n| ast.role(*n) == Some(Role::Type))
            .map(|t| normalize_code(ast.text(t)));

        for (name, _) in declared_names(ast, id) {
            let attr_id = AttributeId(self.model.attributes.len());
            self.model.attributes.push(Attribute {
                id: attr_id,
                name,
                type_name: type_name.clone(),
                class,
                container: container.to_string(),
                path: ast.path().to_path_buf(),
                node: id,
                span: ast.span(id),
            });
            self.model.classes[class.0].attributes.push(attr_id);
        }
    }
}

/// Identifiers introduced by a declaration, skipping types, initializers,
/// modifiers and calls.
fn declared_names(ast: &Ast, id: NodeId) -> Vec<(String, NodeId)> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(node) = stack.pop() {
        let kind = ast.kind(node);
        if node != id
            && (matches!(ast.role(node), Some(Role::Type | Role::Value))
                || ast.category(node) == NodeCategory::Invocation
                || kind.contains("modifier")
                || kind.contains("annotation"))
        {
            continue;
        }
        if ast.category(node) == NodeCategory::Identifier && kind == "identifier" {
            out.push((ast.label(node).to_string(), node));
        }
        stack.extend(ast.children(node).iter().rev());
    }
    out
}

fn parameter(ast: &Ast, id: NodeId) -> Option<Parameter> {
    let (name, _) = declared_names(ast, id).into_iter().next()?;
    let type_name = ast
        .child_with_role(id, Role::Type)
        .map(|t| normalize_code(ast.text(t)));
    let type_name = match ast.kind(id) {
        "spread_parameter" => type_name.or_else(|| {
            ast.children(id)
                .first()
                .map(|t| format!("{}...", normalize_code(ast.text(*t))))
        }),
        _ => type_name,
    };
    Some(Parameter {
        name,
        type_name,
        node: id,
    })
}

/// Simple type names listed under a supertype clause, ignoring type arguments.
fn type_names(ast: &Ast, id: NodeId) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(node) = stack.pop() {
        if ast.kind(node).contains("type_arguments") || ast.kind(node) == "keyword_argument" {
            continue;
        }
        if ast.category(node) == NodeCategory::Identifier {
            out.push(ast.label(node).to_string());
            continue;
        }
        stack.extend(ast.children(node).iter().rev());
    }
    out
}

/// Package (Java) or dotted module path (Python) of a file.
fn module_name(ast: &Ast) -> String {
    let root = ast.root();
    if let Some(package) = ast
        .children(root)
        .iter()
        .find(|c| ast.kind(**c) == "package_declaration")
    {
        return ast
            .children(*package)
            .iter()
            .find(|c| !ast.kind(**c).contains("annotation"))
            .map(|c| normalize_code(ast.text(*c)))
            .unwrap_or_default();
    }
    if ast.path().extension().is_some_and(|e| e == "py" || e == "pyi") {
        return python_module(ast.path());
    }
    String::new()
}

fn python_module(path: &Path) -> String {
    let stem = path.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|c| *c != "." && *c != "__init__")
        .map(str::to_string)
        .collect();
    parts.join(".")
}
