//! Python language support.

use super::Language;
use crate::ast::NodeCategory;
use tree_sitter::Language as TsLanguage;

/// Python programming language.
pub struct Python;

impl Language for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &["py", "pyi"]
    }

    fn grammar(&self) -> TsLanguage {
        tree_sitter_python::LANGUAGE.into()
    }

    fn categorize(
        &self,
        kind: &str,
        parent_kind: Option<&str>,
        grandparent_kind: Option<&str>,
    ) -> NodeCategory {
        match kind {
            "class_definition" => NodeCategory::TypeDeclaration,
            "function_definition" => NodeCategory::Operation,
            // Class-level assignments are attributes.
            "expression_statement"
                if parent_kind == Some("block") && grandparent_kind == Some("class_definition") =>
            {
                NodeCategory::Attribute
            }
            "identifier"
            | "typed_parameter"
            | "default_parameter"
            | "typed_default_parameter"
            | "list_splat_pattern"
            | "dictionary_splat_pattern"
                if parent_kind == Some("parameters") =>
            {
                NodeCategory::Parameter
            }
            "block" => NodeCategory::Block,
            "expression_statement"
            | "return_statement"
            | "if_statement"
            | "elif_clause"
            | "else_clause"
            | "for_statement"
            | "while_statement"
            | "try_statement"
            | "except_clause"
            | "finally_clause"
            | "with_statement"
            | "raise_statement"
            | "pass_statement"
            | "break_statement"
            | "continue_statement"
            | "assert_statement"
            | "delete_statement"
            | "global_statement"
            | "nonlocal_statement"
            | "import_statement"
            | "import_from_statement"
            | "match_statement"
            | "case_clause" => NodeCategory::Statement,
            "call" => NodeCategory::Invocation,
            "identifier" => NodeCategory::Identifier,
            "string" | "integer" | "float" | "true" | "false" | "none" => NodeCategory::Literal,
            _ => NodeCategory::Other,
        }
    }
}
