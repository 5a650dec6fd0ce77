//! Language abstraction: tree-sitter parsing into the neutral [`Ast`].

mod java;
mod python;

pub use java::Java;
pub use python::Python;

use crate::ast::{Ast, AstBuilder, NodeCategory, NodeId, Role, Span, normalize_code};
use crate::error::{MinerError, Result};
use std::path::Path;
use tree_sitter::{Language as TsLanguage, Node, Parser};

/// A programming language the miner can parse.
pub trait Language: Send + Sync {
    /// Returns the name of the language.
    fn name(&self) -> &'static str;

    /// Returns the file extensions associated with this language.
    fn extensions(&self) -> &[&'static str];

    /// Returns the tree-sitter language grammar.
    fn grammar(&self) -> TsLanguage;

    /// Classify a grammar node kind, given the kinds of its parent and
    /// grandparent.
    fn categorize(
        &self,
        kind: &str,
        parent_kind: Option<&str>,
        grandparent_kind: Option<&str>,
    ) -> NodeCategory;

    /// Parses source code into a neutral AST.
    ///
    /// Sources containing syntax errors are rejected: a half-parsed file
    /// would otherwise show up as spurious refactorings.
    fn parse(&self, path: &Path, source: &str) -> Result<Ast> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar())
            .map_err(|e| MinerError::Parse {
                path: path.to_path_buf(),
                message: format!("Failed to set language: {e}"),
            })?;

        let tree = parser.parse(source, None).ok_or_else(|| MinerError::Parse {
            path: path.to_path_buf(),
            message: "Failed to parse source".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root)
                .map(|n| n.start_position().row + 1)
                .unwrap_or(1);
            return Err(MinerError::Parse {
                path: path.to_path_buf(),
                message: format!("syntax error near line {line}"),
            });
        }

        Ok(convert(self, path, source, root))
    }

    /// Checks if this language handles the given file extension.
    fn matches_extension(&self, ext: &str) -> bool {
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Registry of supported languages.
#[derive(Default)]
pub struct LanguageRegistry {
    languages: Vec<Box<dyn Language>>,
}

impl LanguageRegistry {
    /// Creates a new registry with all built-in languages.
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(Box::new(Java));
        registry.register(Box::new(Python));
        registry
    }

    /// Registers a new language.
    pub fn register(&mut self, lang: Box<dyn Language>) {
        self.languages.push(lang);
    }

    /// Finds a language by file extension.
    pub fn by_extension(&self, ext: &str) -> Option<&dyn Language> {
        self.languages
            .iter()
            .find(|l| l.matches_extension(ext))
            .map(|l| l.as_ref())
    }

    /// Finds a language by name.
    pub fn by_name(&self, name: &str) -> Option<&dyn Language> {
        self.languages
            .iter()
            .find(|l| l.name().eq_ignore_ascii_case(name))
            .map(|l| l.as_ref())
    }

    /// Detects the language for a given file path.
    pub fn detect(&self, path: &Path) -> Option<&dyn Language> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension(ext))
    }

    /// Parses a file, picking the language from its extension.
    pub fn parse(&self, path: &Path, source: &str) -> Result<Ast> {
        let lang = self
            .detect(path)
            .ok_or_else(|| MinerError::UnsupportedLanguage(path.display().to_string()))?;
        lang.parse(path, source)
    }

    /// Returns all registered languages.
    pub fn all(&self) -> &[Box<dyn Language>] {
        &self.languages
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

struct Pending<'t> {
    node: Node<'t>,
    parent: Option<NodeId>,
    role: Option<Role>,
    parent_kind: Option<&'static str>,
    grandparent_kind: Option<&'static str>,
}

/// Convert a tree-sitter CST into the arena AST. Anonymous tokens and
/// comments are folded into labels or dropped.
fn convert<L: Language + ?Sized>(lang: &L, path: &Path, source: &str, root: Node) -> Ast {
    let bytes = source.as_bytes();
    let mut builder = AstBuilder::new(path, source);
    let mut stack = vec![Pending {
        node: root,
        parent: None,
        role: None,
        parent_kind: None,
        grandparent_kind: None,
    }];

    while let Some(item) = stack.pop() {
        let node = item.node;
        let kind = node.kind();

        let mut named = Vec::new();
        let mut tokens = Vec::new();
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() && !child.is_extra() {
                    named.push((child, cursor.field_name().and_then(Role::from_field)));
                } else if !child.is_named() {
                    let text = child.utf8_text(bytes).unwrap_or("");
                    if is_label_token(text) {
                        tokens.push(text.to_string());
                    }
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }

        let label = if named.is_empty() {
            normalize_code(node.utf8_text(bytes).unwrap_or(""))
        } else {
            tokens.join(" ")
        };

        let start = node.start_position();
        let end = node.end_position();
        let span = Span::new(
            (start.row + 1, start.column + 1),
            (end.row + 1, end.column + 1),
            (node.start_byte(), node.end_byte()),
        );
        let category = lang.categorize(kind, item.parent_kind, item.grandparent_kind);
        let id = builder.add(item.parent, kind, category, item.role, label, span);

        for (child, role) in named.into_iter().rev() {
            stack.push(Pending {
                node: child,
                parent: Some(id),
                role,
                parent_kind: Some(kind),
                grandparent_kind: item.parent_kind,
            });
        }
    }

    builder.finish()
}

/// Anonymous tokens worth keeping in a label: operators and keywords, but not
/// pure punctuation.
fn is_label_token(text: &str) -> bool {
    !text.is_empty()
        && !text
            .chars()
            .all(|c| matches!(c, '(' | ')' | '{' | '}' | '[' | ']' | ';' | ',' | '.' | '"' | '\'' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_detects_languages() {
        let registry = LanguageRegistry::new();

        assert_eq!(registry.detect(Path::new("A.java")).map(|l| l.name()), Some("java"));
        assert_eq!(registry.detect(Path::new("a.py")).map(|l| l.name()), Some("python"));
        assert!(registry.detect(Path::new("README.md")).is_none());
        assert!(registry.by_name("JAVA").is_some());
    }

    #[test]
    fn test_label_tokens() {
        assert!(is_label_token("+="));
        assert!(is_label_token("return"));
        assert!(!is_label_token(";"));
        assert!(!is_label_token("()"));
    }

    #[test]
    fn test_parse_rejects_syntax_errors() {
        let registry = LanguageRegistry::new();
        let result = registry.parse(Path::new("Broken.java"), "class A { void f( { }");

        assert!(matches!(result, Err(MinerError::Parse { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let registry = LanguageRegistry::new();
        let result = registry.parse(Path::new("x.cobol"), "");

        assert!(matches!(result, Err(MinerError::UnsupportedLanguage(_))));
    }
}
