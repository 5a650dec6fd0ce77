//! Java language support.

use super::Language;
use crate::ast::NodeCategory;
use tree_sitter::Language as TsLanguage;

/// Java programming language.
pub struct Java;

impl Language for Java {
    fn name(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &[&'static str] {
        &["java"]
    }

    fn grammar(&self) -> TsLanguage {
        tree_sitter_java::LANGUAGE.into()
    }

    fn categorize(
        &self,
        kind: &str,
        parent_kind: Option<&str>,
        _grandparent_kind: Option<&str>,
    ) -> NodeCategory {
        match kind {
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => NodeCategory::TypeDeclaration,
            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                NodeCategory::Operation
            }
            "field_declaration" | "constant_declaration" => NodeCategory::Attribute,
            "formal_parameter" | "spread_parameter" => NodeCategory::Parameter,
            "local_variable_declaration" => NodeCategory::VariableDeclaration,
            "block" | "constructor_body" | "switch_block" | "switch_block_statement_group" => {
                NodeCategory::Block
            }
            // A switch used as a statement, not as an expression value.
            "switch_expression" if parent_kind.is_some_and(is_statement_container) => {
                NodeCategory::Statement
            }
            "expression_statement"
            | "if_statement"
            | "for_statement"
            | "enhanced_for_statement"
            | "while_statement"
            | "do_statement"
            | "return_statement"
            | "break_statement"
            | "continue_statement"
            | "throw_statement"
            | "yield_statement"
            | "assert_statement"
            | "try_statement"
            | "try_with_resources_statement"
            | "catch_clause"
            | "finally_clause"
            | "synchronized_statement"
            | "labeled_statement"
            | "explicit_constructor_invocation"
            | "switch_label"
            | "switch_rule" => NodeCategory::Statement,
            "method_invocation" | "object_creation_expression" => NodeCategory::Invocation,
            "identifier" | "type_identifier" => NodeCategory::Identifier,
            "true" | "false" => NodeCategory::Literal,
            k if k.ends_with("_literal") => NodeCategory::Literal,
            _ => NodeCategory::Other,
        }
    }
}

fn is_statement_container(kind: &str) -> bool {
    matches!(
        kind,
        "block" | "constructor_body" | "switch_block_statement_group" | "labeled_statement"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SOURCE: &str = r#"
class Customer extends Person {
    private String name;

    public double amountFor(Rental each) {
        double thisAmount = 0;
        switch (each.getMovie().getPriceCode()) {
            case Movie.REGULAR:
                thisAmount += 2;
                break;
        }
        return thisAmount;
    }
}
"#;

    #[test]
    fn test_categories() {
        let ast = Java.parse(Path::new("Customer.java"), SOURCE).unwrap();
        let count = |cat: NodeCategory| ast.ids().filter(|id| ast.category(*id) == cat).count();

        assert_eq!(count(NodeCategory::TypeDeclaration), 1);
        assert_eq!(count(NodeCategory::Operation), 1);
        assert_eq!(count(NodeCategory::Attribute), 1);
        assert_eq!(count(NodeCategory::Parameter), 1);
        assert_eq!(count(NodeCategory::VariableDeclaration), 1);
        assert!(count(NodeCategory::Invocation) >= 2);
    }

    #[test]
    fn test_switch_statement_and_labels() {
        let ast = Java.parse(Path::new("Customer.java"), SOURCE).unwrap();
        let switch = ast
            .ids()
            .find(|id| ast.kind(*id) == "switch_expression")
            .unwrap();

        assert_eq!(ast.category(switch), NodeCategory::Statement);
        assert!(
            ast.ids()
                .any(|id| ast.kind(id) == "switch_label"
                    && ast.category(id) == NodeCategory::Statement)
        );
    }

    #[test]
    fn test_roles_and_labels() {
        let ast = Java.parse(Path::new("Customer.java"), SOURCE).unwrap();
        let method = ast
            .ids()
            .find(|id| ast.category(*id) == NodeCategory::Operation)
            .unwrap();
        let name = ast.child_with_role(method, crate::ast::Role::Name).unwrap();

        assert_eq!(ast.label(name), "amountFor");
        assert!(ast.child_with_role(method, crate::ast::Role::Body).is_some());

        let assign = ast
            .ids()
            .find(|id| ast.kind(*id) == "assignment_expression")
            .unwrap();
        assert_eq!(ast.label(assign), "+=");
    }

    #[test]
    fn test_span_is_one_based() {
        let ast = Java.parse(Path::new("A.java"), "class A {}").unwrap();
        let class = ast
            .ids()
            .find(|id| ast.category(*id) == NodeCategory::TypeDeclaration)
            .unwrap();

        assert_eq!(ast.span(class).start_line, 1);
        assert_eq!(ast.span(class).start_column, 1);
    }
}
