//! Structural model of a snapshot: classes, operations, attributes and local
//! variables, each pointing back at its declaring AST subtree.
//!
//! The model is derived once from the parsed files by [`build_model`] and is
//! immutable afterwards. Entities are addressed by small index types
//! ([`ClassId`], [`OperationId`], [`AttributeId`]) so that matching and
//! refactoring detection can refer to them without borrowing the model.

mod builder;
mod statement;

pub use builder::build_model;
pub use statement::{Invocation, Statement, extract_statements};

use crate::ast::{NodeId, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Index of a class in its [`StructuralModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(pub usize);

/// Index of an operation in its [`StructuralModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub usize);

/// Index of an attribute in its [`StructuralModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub usize);

/// Any structural entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum EntityId {
    Class(ClassId),
    Operation(OperationId),
    Attribute(AttributeId),
}

/// Serializable description of an entity, detached from its model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    /// Simple name.
    pub name: String,
    /// Qualified name of the enclosing class or module.
    pub container: String,
    /// Human readable signature, e.g. `amountFor(each Rental) : double`.
    pub signature: String,
    pub path: PathBuf,
    /// Root of the declaring subtree in the file's AST.
    pub node: NodeId,
    pub span: Span,
}

impl EntityRef {
    /// `container.name`, or just the name at top level.
    pub fn qualified_name(&self) -> String {
        qualify(&self.container, &self.name)
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: Option<String>,
    pub node: NodeId,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(t) => write!(f, "{} {}", self.name, t),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A class, interface, enum or record.
#[derive(Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    /// Package or module plus enclosing classes.
    pub container: String,
    pub path: PathBuf,
    pub node: NodeId,
    pub span: Span,
    /// Direct supertypes by simple name, superclass first.
    pub supertypes: Vec<String>,
    pub outer: Option<ClassId>,
    pub operations: Vec<OperationId>,
    pub attributes: Vec<AttributeId>,
}

impl Class {
    pub fn qualified_name(&self) -> String {
        qualify(&self.container, &self.name)
    }

    /// Whether `name` is a direct supertype of this class.
    pub fn extends(&self, name: &str) -> bool {
        self.supertypes.iter().any(|s| s == name)
    }
}

/// A method, constructor or function.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub class: Option<ClassId>,
    /// Qualified name of the enclosing class or module.
    pub container: String,
    pub path: PathBuf,
    pub node: NodeId,
    pub span: Span,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub body: Option<NodeId>,
    /// Body statements in pre-order.
    pub statements: Vec<Statement>,
}

impl Operation {
    pub fn qualified_name(&self) -> String {
        qualify(&self.container, &self.name)
    }

    /// Parameter types in declaration order; untyped parameters count as `_`.
    pub fn parameter_types(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(|p| p.type_name.as_deref().unwrap_or("_"))
            .collect()
    }

    /// Name plus parameter types, used for exact matching.
    pub fn signature_key(&self) -> String {
        format!("{}({})", self.name, self.parameter_types().join(","))
    }

    /// Human readable signature, e.g. `amountFor(each Rental) : double`.
    pub fn display_signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        match &self.return_type {
            Some(ret) => format!("{}({}) : {}", self.name, params.join(", "), ret),
            None => format!("{}({})", self.name, params.join(", ")),
        }
    }

    /// Whether the operation calls an operation named `name` anywhere in its body.
    pub fn calls(&self, name: &str) -> bool {
        self.statements
            .iter()
            .any(|s| s.invocations.iter().any(|i| i.name == name))
    }
}

/// A field or class-level attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub type_name: Option<String>,
    pub class: ClassId,
    pub container: String,
    pub path: PathBuf,
    pub node: NodeId,
    pub span: Span,
}

impl Attribute {
    pub fn qualified_name(&self) -> String {
        qualify(&self.container, &self.name)
    }

    pub fn display_signature(&self) -> String {
        match &self.type_name {
            Some(t) => format!("{} : {}", self.name, t),
            None => self.name.clone(),
        }
    }
}

/// A local variable declared inside an operation body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub type_name: Option<String>,
    /// Normalized initializer expression.
    pub initializer: Option<String>,
    pub operation: OperationId,
    pub path: PathBuf,
    pub node: NodeId,
    /// Span of the declaring statement.
    pub span: Span,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(t) => write!(f, "{} : {}", self.name, t),
            None => write!(f, "{}", self.name),
        }
    }
}

/// All entities of one snapshot.
#[derive(Debug, Clone, Default)]
pub struct StructuralModel {
    classes: Vec<Class>,
    operations: Vec<Operation>,
    attributes: Vec<Attribute>,
    variables: Vec<Variable>,
}

impl StructuralModel {
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn operation(&self, id: OperationId) -> &Operation {
        &self.operations[id.0]
    }

    pub fn attribute(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id.0]
    }

    /// Local variables of an operation in declaration order.
    pub fn variables_of(&self, operation: OperationId) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(move |v| v.operation == operation)
    }

    /// Whether the model has no entities at all.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.operations.is_empty() && self.attributes.is_empty()
    }

    /// Find a class by qualified name.
    pub fn class_by_name(&self, qualified_name: &str) -> Option<&Class> {
        self.classes
            .iter()
            .find(|c| c.qualified_name() == qualified_name)
    }

    /// Classes declared in a file.
    pub fn classes_in(&self, path: &Path) -> impl Iterator<Item = &Class> {
        self.classes.iter().filter(move |c| c.path == path)
    }

    /// Operations declared under a file.
    pub fn operations_in(&self, path: &Path) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(move |o| o.path == path)
    }

    /// Classes whose direct supertypes include `class`'s simple name.
    pub fn subclasses_of(&self, class: ClassId) -> impl Iterator<Item = &Class> {
        let name = self.classes[class.0].name.clone();
        self.classes.iter().filter(move |c| c.extends(&name))
    }

    /// Serializable reference to any entity.
    pub fn entity_ref(&self, id: EntityId) -> EntityRef {
        match id {
            EntityId::Class(c) => {
                let class = self.class(c);
                EntityRef {
                    id,
                    name: class.name.clone(),
                    container: class.container.clone(),
                    signature: class.qualified_name(),
                    path: class.path.clone(),
                    node: class.node,
                    span: class.span,
                }
            }
            EntityId::Operation(o) => {
                let op = self.operation(o);
                EntityRef {
                    id,
                    name: op.name.clone(),
                    container: op.container.clone(),
                    signature: op.display_signature(),
                    path: op.path.clone(),
                    node: op.node,
                    span: op.span,
                }
            }
            EntityId::Attribute(a) => {
                let attr = self.attribute(a);
                EntityRef {
                    id,
                    name: attr.name.clone(),
                    container: attr.container.clone(),
                    signature: attr.display_signature(),
                    path: attr.path.clone(),
                    node: attr.node,
                    span: attr.span,
                }
            }
        }
    }

    pub fn operation_ref(&self, id: OperationId) -> EntityRef {
        self.entity_ref(EntityId::Operation(id))
    }

    pub fn class_ref(&self, id: ClassId) -> EntityRef {
        self.entity_ref(EntityId::Class(id))
    }

    pub fn attribute_ref(&self, id: AttributeId) -> EntityRef {
        self.entity_ref(EntityId::Attribute(id))
    }
}

fn qualify(container: &str, name: &str) -> String {
    if container.is_empty() {
        name.to_string()
    } else {
        format!("{container}.{name}")
    }
}
