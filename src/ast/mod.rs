//! Language-neutral abstract syntax trees.
//!
//! Every parsed file becomes an [`Ast`]: an arena of [`AstNode`]s addressed by
//! [`NodeId`]. Children are owned, ordered id lists on the parent; the parent
//! link is a plain index, so walking up and down never needs shared ownership.
//!
//! Node kinds keep the grammar's own type names (`method_declaration`,
//! `if_statement`, ...). The language adapter additionally tags each node with
//! a [`NodeCategory`] and, where the grammar names the child slot, a [`Role`].
//! Everything downstream of parsing (model building, tree matching, edit
//! scripts) only looks at categories and roles.

mod metrics;

pub use metrics::TreeMetrics;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Index of a node inside its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Source span of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_column: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed, exclusive).
    pub end_column: usize,
    /// Byte offset of the first character.
    pub start_byte: usize,
    /// Byte offset one past the last character.
    pub end_byte: usize,
}

impl Span {
    /// Create a span from line/column pairs and byte offsets.
    pub fn new(start: (usize, usize), end: (usize, usize), bytes: (usize, usize)) -> Self {
        Self {
            start_line: start.0,
            start_column: start.1,
            end_line: end.0,
            end_column: end.1,
            start_byte: bytes.0,
            end_byte: bytes.1,
        }
    }

    /// Check whether `other` lies within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Neutral classification of a node, assigned by the language adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Class, interface, enum or record declaration.
    TypeDeclaration,
    /// Method, constructor or function declaration.
    Operation,
    /// Field / class-level attribute declaration.
    Attribute,
    /// Formal parameter of an operation.
    Parameter,
    /// Local variable declaration statement.
    VariableDeclaration,
    /// Any other statement.
    Statement,
    /// Statement container (`{ ... }`, indented block, switch body).
    Block,
    /// Method call or constructor invocation.
    Invocation,
    /// Identifier or type identifier.
    Identifier,
    /// Literal value.
    Literal,
    /// Everything else.
    Other,
}

impl NodeCategory {
    /// Statement-like categories collected into operation bodies.
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeCategory::Statement | NodeCategory::VariableDeclaration
        )
    }
}

/// Neutral role of a node inside its parent, derived from grammar field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Name,
    Type,
    Parameters,
    Body,
    Superclass,
    Interfaces,
    Arguments,
    Receiver,
    Callee,
    Condition,
    Value,
}

impl Role {
    /// Map a grammar field name to a neutral role.
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "name" | "attribute" => Some(Role::Name),
            "type" | "return_type" => Some(Role::Type),
            "parameters" => Some(Role::Parameters),
            "body" => Some(Role::Body),
            "superclass" => Some(Role::Superclass),
            "interfaces" | "superclasses" => Some(Role::Interfaces),
            "arguments" => Some(Role::Arguments),
            "object" => Some(Role::Receiver),
            "function" => Some(Role::Callee),
            "condition" => Some(Role::Condition),
            "value" | "right" => Some(Role::Value),
            _ => None,
        }
    }
}

/// A single node of an [`Ast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstNode {
    /// Grammar node type.
    pub kind: String,
    /// Neutral category.
    pub category: NodeCategory,
    /// Role in the parent, if the grammar names it.
    pub role: Option<Role>,
    /// Label: source text for leaves, operator/keyword tokens for inner nodes.
    pub label: String,
    /// Source span.
    pub span: Span,
    /// Non-owning parent link.
    pub parent: Option<NodeId>,
    /// Ordered children.
    pub children: Vec<NodeId>,
}

/// Arena-backed syntax tree of one file.
#[derive(Debug, Clone)]
pub struct Ast {
    path: PathBuf,
    source: String,
    nodes: Vec<AstNode>,
    metrics: TreeMetrics,
}

impl Ast {
    /// Path of the file this tree was parsed from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source text of the file.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Access a node.
    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0]
    }

    /// Iterate over all node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn kind(&self, id: NodeId) -> &str {
        &self.nodes[id.0].kind
    }

    pub fn label(&self, id: NodeId) -> &str {
        &self.nodes[id.0].label
    }

    pub fn category(&self, id: NodeId) -> NodeCategory {
        self.nodes[id.0].category
    }

    pub fn role(&self, id: NodeId) -> Option<Role> {
        self.nodes[id.0].role
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Precomputed height/size/hash information.
    pub fn metrics(&self) -> &TreeMetrics {
        &self.metrics
    }

    /// Source text covered by a node, falling back to its label.
    pub fn text(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source
            .get(span.start_byte..span.end_byte)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.label(id))
    }

    /// First child playing the given role.
    pub fn child_with_role(&self, id: NodeId, role: Role) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.role(*c) == Some(role))
    }

    /// Index of `id` among its parent's children.
    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Pre-order traversal of the subtree rooted at `root`.
    pub fn pre_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.metrics.size(root));
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Post-order traversal of the subtree rooted at `root`.
    pub fn post_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.metrics.size(root));
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for child in self.children(id).iter().rev() {
                stack.push((*child, false));
            }
        }
        out
    }

    /// Breadth-first traversal of the subtree rooted at `root`.
    pub fn breadth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let id = out[i];
            out.extend_from_slice(self.children(id));
            i += 1;
        }
        out
    }

    /// All strict descendants of a node in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = self.pre_order(id);
        all.remove(0);
        all
    }

    /// Find the deepest node of the given category whose span equals `span`.
    pub fn find_by_span(&self, span: &Span, category: Option<NodeCategory>) -> Option<NodeId> {
        self.ids()
            .filter(|id| {
                let s = self.span(*id);
                s.start_byte == span.start_byte
                    && s.end_byte == span.end_byte
                    && category.is_none_or(|c| self.category(*id) == c)
            })
            .max_by_key(|id| self.metrics.depth(*id))
    }

    /// Whether two subtrees (possibly from different trees) are identical in
    /// kind, label and shape.
    pub fn isomorphic(&self, a: NodeId, other: &Ast, b: NodeId) -> bool {
        if self.metrics.hash(a) != other.metrics.hash(b)
            || self.metrics.size(a) != other.metrics.size(b)
        {
            return false;
        }
        self.same_subtree(a, other, b, true)
    }

    /// Whether two subtrees have the same kinds and shape, ignoring labels.
    pub fn structurally_isomorphic(&self, a: NodeId, other: &Ast, b: NodeId) -> bool {
        if self.metrics.shape_hash(a) != other.metrics.shape_hash(b)
            || self.metrics.size(a) != other.metrics.size(b)
        {
            return false;
        }
        self.same_subtree(a, other, b, false)
    }

    fn same_subtree(&self, a: NodeId, other: &Ast, b: NodeId, with_labels: bool) -> bool {
        let mut stack = vec![(a, b)];
        while let Some((x, y)) = stack.pop() {
            let nx = self.node(x);
            let ny = other.node(y);
            if nx.kind != ny.kind || nx.children.len() != ny.children.len() {
                return false;
            }
            if with_labels && nx.label != ny.label {
                return false;
            }
            stack.extend(nx.children.iter().copied().zip(ny.children.iter().copied()));
        }
        true
    }
}

/// Normalize a code fragment for comparison: whitespace is dropped except a
/// single space between two word characters, so `a + b` and `a+b` compare
/// equal while `return x` stays readable.
pub fn normalize_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let prev_word = out.chars().last().is_some_and(is_word_char);
            if prev_word && is_word_char(ch) {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Incrementally builds an [`Ast`]. Nodes must be added parents first.
#[derive(Debug)]
pub struct AstBuilder {
    path: PathBuf,
    source: String,
    nodes: Vec<AstNode>,
}

impl AstBuilder {
    /// Start a tree for the given file.
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            nodes: Vec::new(),
        }
    }

    /// Source text being built over.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append a node under `parent` (or as the root when `parent` is `None`).
    pub fn add(
        &mut self,
        parent: Option<NodeId>,
        kind: impl Into<String>,
        category: NodeCategory,
        role: Option<Role>,
        label: impl Into<String>,
        span: Span,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(AstNode {
            kind: kind.into(),
            category,
            role,
            label: label.into(),
            span,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    /// Freeze the tree and compute its metrics.
    pub fn finish(self) -> Ast {
        let metrics = TreeMetrics::compute(&self.nodes);
        Ast {
            path: self.path,
            source: self.source,
            nodes: self.nodes,
            metrics,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Compact tree notation for unit tests: `kind` or `kind:label`, with
    //! children in parentheses, e.g. `block(stmt:a call(id:f) stmt:b)`.

    use super::*;

    pub fn tree(shape: &str) -> Ast {
        let mut builder = AstBuilder::new("test.src", "");
        let tokens = tokenize(shape);
        let mut pos = 0;
        parse_node(&tokens, &mut pos, None, &mut builder);
        builder.finish()
    }

    fn tokenize(shape: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for ch in shape.chars() {
            match ch {
                '(' | ')' => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                    out.push(ch.to_string());
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }

    fn parse_node(
        tokens: &[String],
        pos: &mut usize,
        parent: Option<NodeId>,
        builder: &mut AstBuilder,
    ) -> NodeId {
        let token = &tokens[*pos];
        *pos += 1;
        let (kind, label) = match token.split_once(':') {
            Some((k, l)) => (k.to_string(), l.to_string()),
            None => (token.clone(), String::new()),
        };
        let category = match kind.as_str() {
            "stmt" => NodeCategory::Statement,
            "block" => NodeCategory::Block,
            "id" => NodeCategory::Identifier,
            _ => NodeCategory::Other,
        };
        let id = builder.add(parent, kind, category, None, label, Span::default());
        if tokens.get(*pos).map(String::as_str) == Some("(") {
            *pos += 1;
            while tokens[*pos] != ")" {
                parse_node(tokens, pos, Some(id), builder);
            }
            *pos += 1;
        }
        id
    }
}
