//! Refactoring facts and the detectors that infer them.
//!
//! Each detector is a pure function over a [`DetectionContext`]: the two
//! models, the entity matching and the thresholds. Detectors may overlap;
//! [`resolve_conflicts`] keeps a single classification per entity pair.

mod extract;
mod merge;
mod moves;
mod parameter;
mod rename;
mod variable;

use crate::ast::{NodeId, Span};
use crate::config::Thresholds;
use crate::matcher::EntityMatching;
use crate::model::{EntityId, EntityRef, Parameter, Statement, StructuralModel, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A source location taking part in a justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRef {
    pub path: PathBuf,
    pub node: NodeId,
    pub span: Span,
}

impl SpanRef {
    pub fn of_statement(path: &Path, statement: &Statement) -> Self {
        Self {
            path: path.to_path_buf(),
            node: statement.node,
            span: statement.span,
        }
    }

    pub fn of_entity(entity: &EntityRef) -> Self {
        Self {
            path: entity.path.clone(),
            node: entity.node,
            span: entity.span,
        }
    }
}

/// A before/after pair of code fragments supporting a refactoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanPair {
    pub before: SpanRef,
    pub after: SpanRef,
}

/// The matched fragments a refactoring was inferred from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    pub pairs: Vec<SpanPair>,
}

impl Justification {
    pub fn new(pairs: Vec<SpanPair>) -> Self {
        Self { pairs }
    }

    /// Justification consisting of the two declarations themselves.
    pub fn declarations(before: &EntityRef, after: &EntityRef) -> Self {
        Self::new(vec![SpanPair {
            before: SpanRef::of_entity(before),
            after: SpanRef::of_entity(after),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Classification of a refactoring, with the entities it relates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefactoringKind {
    RenameClass {
        before: EntityRef,
        after: EntityRef,
    },
    MoveClass {
        before: EntityRef,
        after: EntityRef,
    },
    MoveAndRenameClass {
        before: EntityRef,
        after: EntityRef,
    },
    RenameMethod {
        before: EntityRef,
        after: EntityRef,
        body_similarity: f64,
        /// Body essentially unchanged.
        pure: bool,
    },
    MoveMethod {
        before: EntityRef,
        after: EntityRef,
    },
    MoveAndRenameMethod {
        before: EntityRef,
        after: EntityRef,
    },
    PullUpMethod {
        before: EntityRef,
        after: EntityRef,
    },
    PushDownMethod {
        before: EntityRef,
        after: EntityRef,
    },
    RenameAttribute {
        before: EntityRef,
        after: EntityRef,
    },
    MoveAttribute {
        before: EntityRef,
        after: EntityRef,
    },
    PullUpAttribute {
        before: EntityRef,
        after: EntityRef,
    },
    PushDownAttribute {
        before: EntityRef,
        after: EntityRef,
    },
    ExtractMethod {
        extracted: EntityRef,
        source_before: EntityRef,
        source_after: EntityRef,
    },
    ExtractAndMoveMethod {
        extracted: EntityRef,
        source_before: EntityRef,
        source_after: EntityRef,
    },
    InlineMethod {
        inlined: EntityRef,
        target_before: EntityRef,
        target_after: EntityRef,
    },
    MoveAndInlineMethod {
        inlined: EntityRef,
        target_before: EntityRef,
        target_after: EntityRef,
    },
    MergeMethod {
        merged: Vec<EntityRef>,
        into: EntityRef,
    },
    SplitMethod {
        split: EntityRef,
        into: Vec<EntityRef>,
    },
    AddParameter {
        before: EntityRef,
        after: EntityRef,
        parameter: Parameter,
    },
    RemoveParameter {
        before: EntityRef,
        after: EntityRef,
        parameter: Parameter,
    },
    RenameParameter {
        before: EntityRef,
        after: EntityRef,
        old: Parameter,
        new: Parameter,
    },
    ChangeParameterType {
        before: EntityRef,
        after: EntityRef,
        old: Parameter,
        new: Parameter,
    },
    ReorderParameter {
        before: EntityRef,
        after: EntityRef,
        old_order: Vec<String>,
        new_order: Vec<String>,
    },
    ChangeReturnType {
        before: EntityRef,
        after: EntityRef,
        old: Option<String>,
        new: Option<String>,
    },
    RenameVariable {
        before: EntityRef,
        after: EntityRef,
        old: Variable,
        new: Variable,
    },
    ExtractVariable {
        before: EntityRef,
        after: EntityRef,
        variable: Variable,
    },
    InlineVariable {
        before: EntityRef,
        after: EntityRef,
        variable: Variable,
    },
    ChangeVariableType {
        before: EntityRef,
        after: EntityRef,
        old: Variable,
        new: Variable,
    },
    ChangeAttributeType {
        before: EntityRef,
        after: EntityRef,
    },
}

/// Detector families, in decreasing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefactoringGroup {
    Rename,
    Move,
    Hierarchy,
    ExtractInline,
    MergeSplit,
    ParameterChange,
    /// Local variables and attribute types.
    VariableChange,
}

impl RefactoringGroup {
    /// Whether two classifications of one entity pair cannot both hold.
    /// Parameter and variable facts compose with each other and with renames
    /// and moves of the same entity, but not with relations between
    /// different operations.
    pub fn excludes(self, other: RefactoringGroup) -> bool {
        use RefactoringGroup::*;
        match (self, other) {
            (ParameterChange | VariableChange, ParameterChange | VariableChange) => false,
            (ParameterChange | VariableChange, g) | (g, ParameterChange | VariableChange) => {
                matches!(g, ExtractInline | MergeSplit)
            }
            (a, b) => a != b,
        }
    }
}

impl RefactoringKind {
    /// Conventional display name, e.g. `Extract Method`.
    pub fn display_name(&self) -> &'static str {
        match self {
            RefactoringKind::RenameClass { .. } => "Rename Class",
            RefactoringKind::MoveClass { .. } => "Move Class",
            RefactoringKind::MoveAndRenameClass { .. } => "Move And Rename Class",
            RefactoringKind::RenameMethod { .. } => "Rename Method",
            RefactoringKind::MoveMethod { .. } => "Move Method",
            RefactoringKind::MoveAndRenameMethod { .. } => "Move And Rename Method",
            RefactoringKind::PullUpMethod { .. } => "Pull Up Method",
            RefactoringKind::PushDownMethod { .. } => "Push Down Method",
            RefactoringKind::RenameAttribute { .. } => "Rename Attribute",
            RefactoringKind::MoveAttribute { .. } => "Move Attribute",
            RefactoringKind::PullUpAttribute { .. } => "Pull Up Attribute",
            RefactoringKind::PushDownAttribute { .. } => "Push Down Attribute",
            RefactoringKind::ExtractMethod { .. } => "Extract Method",
            RefactoringKind::ExtractAndMoveMethod { .. } => "Extract And Move Method",
            RefactoringKind::InlineMethod { .. } => "Inline Method",
            RefactoringKind::MoveAndInlineMethod { .. } => "Move And Inline Method",
            RefactoringKind::MergeMethod { .. } => "Merge Method",
            RefactoringKind::SplitMethod { .. } => "Split Method",
            RefactoringKind::AddParameter { .. } => "Add Parameter",
            RefactoringKind::RemoveParameter { .. } => "Remove Parameter",
            RefactoringKind::RenameParameter { .. } => "Rename Parameter",
            RefactoringKind::ChangeParameterType { .. } => "Change Parameter Type",
            RefactoringKind::ReorderParameter { .. } => "Reorder Parameter",
            RefactoringKind::ChangeReturnType { .. } => "Change Return Type",
            RefactoringKind::RenameVariable { .. } => "Rename Variable",
            RefactoringKind::ExtractVariable { .. } => "Extract Variable",
            RefactoringKind::InlineVariable { .. } => "Inline Variable",
            RefactoringKind::ChangeVariableType { .. } => "Change Variable Type",
            RefactoringKind::ChangeAttributeType { .. } => "Change Attribute Type",
        }
    }

    pub fn group(&self) -> RefactoringGroup {
        match self {
            RefactoringKind::RenameClass { .. }
            | RefactoringKind::RenameMethod { .. }
            | RefactoringKind::RenameAttribute { .. } => RefactoringGroup::Rename,
            RefactoringKind::MoveClass { .. }
            | RefactoringKind::MoveAndRenameClass { .. }
            | RefactoringKind::MoveMethod { .. }
            | RefactoringKind::MoveAndRenameMethod { .. }
            | RefactoringKind::MoveAttribute { .. } => RefactoringGroup::Move,
            RefactoringKind::PullUpMethod { .. }
            | RefactoringKind::PushDownMethod { .. }
            | RefactoringKind::PullUpAttribute { .. }
            | RefactoringKind::PushDownAttribute { .. } => RefactoringGroup::Hierarchy,
            RefactoringKind::ExtractMethod { .. }
            | RefactoringKind::ExtractAndMoveMethod { .. }
            | RefactoringKind::InlineMethod { .. }
            | RefactoringKind::MoveAndInlineMethod { .. } => RefactoringGroup::ExtractInline,
            RefactoringKind::MergeMethod { .. } | RefactoringKind::SplitMethod { .. } => {
                RefactoringGroup::MergeSplit
            }
            RefactoringKind::AddParameter { .. }
            | RefactoringKind::RemoveParameter { .. }
            | RefactoringKind::RenameParameter { .. }
            | RefactoringKind::ChangeParameterType { .. }
            | RefactoringKind::ReorderParameter { .. }
            | RefactoringKind::ChangeReturnType { .. } => RefactoringGroup::ParameterChange,
            RefactoringKind::RenameVariable { .. }
            | RefactoringKind::ExtractVariable { .. }
            | RefactoringKind::InlineVariable { .. }
            | RefactoringKind::ChangeVariableType { .. }
            | RefactoringKind::ChangeAttributeType { .. } => RefactoringGroup::VariableChange,
        }
    }

    /// Before/after entity pairs this refactoring relates.
    pub fn entity_pairs(&self) -> Vec<(&EntityRef, &EntityRef)> {
        match self {
            RefactoringKind::RenameClass { before, after }
            | RefactoringKind::MoveClass { before, after }
            | RefactoringKind::MoveAndRenameClass { before, after }
            | RefactoringKind::RenameMethod { before, after, .. }
            | RefactoringKind::MoveMethod { before, after }
            | RefactoringKind::MoveAndRenameMethod { before, after }
            | RefactoringKind::PullUpMethod { before, after }
            | RefactoringKind::PushDownMethod { before, after }
            | RefactoringKind::RenameAttribute { before, after }
            | RefactoringKind::MoveAttribute { before, after }
            | RefactoringKind::PullUpAttribute { before, after }
            | RefactoringKind::PushDownAttribute { before, after }
            | RefactoringKind::AddParameter { before, after, .. }
            | RefactoringKind::RemoveParameter { before, after, .. }
            | RefactoringKind::RenameParameter { before, after, .. }
            | RefactoringKind::ChangeParameterType { before, after, .. }
            | RefactoringKind::ReorderParameter { before, after, .. }
            | RefactoringKind::ChangeReturnType { before, after, .. }
            | RefactoringKind::RenameVariable { before, after, .. }
            | RefactoringKind::ExtractVariable { before, after, .. }
            | RefactoringKind::InlineVariable { before, after, .. }
            | RefactoringKind::ChangeVariableType { before, after, .. }
            | RefactoringKind::ChangeAttributeType { before, after } => vec![(before, after)],
            RefactoringKind::ExtractMethod {
                extracted,
                source_before,
                ..
            }
            | RefactoringKind::ExtractAndMoveMethod {
                extracted,
                source_before,
                ..
            } => vec![(source_before, extracted)],
            RefactoringKind::InlineMethod {
                inlined,
                target_after,
                ..
            }
            | RefactoringKind::MoveAndInlineMethod {
                inlined,
                target_after,
                ..
            } => vec![(inlined, target_after)],
            RefactoringKind::MergeMethod { merged, into } => {
                merged.iter().map(|m| (m, into)).collect()
            }
            RefactoringKind::SplitMethod { split, into } => {
                into.iter().map(|i| (split, i)).collect()
            }
        }
    }

    fn describe(&self) -> String {
        let name = self.display_name();
        match self {
            RefactoringKind::RenameClass { before, after } => format!(
                "{name} {} renamed to {}",
                before.qualified_name(),
                after.qualified_name()
            ),
            RefactoringKind::MoveClass { before, after } => format!(
                "{name} {} moved to {}",
                before.qualified_name(),
                after.qualified_name()
            ),
            RefactoringKind::MoveAndRenameClass { before, after } => format!(
                "{name} {} moved and renamed to {}",
                before.qualified_name(),
                after.qualified_name()
            ),
            RefactoringKind::RenameMethod { before, after, .. } => format!(
                "{name} {} renamed to {} in class {}",
                before.signature, after.signature, after.container
            ),
            RefactoringKind::RenameAttribute { before, after } => format!(
                "{name} {} to {} in class {}",
                before.signature, after.signature, after.container
            ),
            RefactoringKind::MoveMethod { before, after }
            | RefactoringKind::MoveAndRenameMethod { before, after }
            | RefactoringKind::PullUpMethod { before, after }
            | RefactoringKind::PushDownMethod { before, after }
            | RefactoringKind::MoveAttribute { before, after }
            | RefactoringKind::PullUpAttribute { before, after }
            | RefactoringKind::PushDownAttribute { before, after } => format!(
                "{name} {} from class {} to {} from class {}",
                before.signature, before.container, after.signature, after.container
            ),
            RefactoringKind::ExtractMethod {
                extracted,
                source_before,
                ..
            } => format!(
                "{name} {} extracted from {} in class {}",
                extracted.signature, source_before.signature, source_before.container
            ),
            RefactoringKind::ExtractAndMoveMethod {
                extracted,
                source_before,
                ..
            } => format!(
                "{name} {} extracted from {} in class {} & moved to class {}",
                extracted.signature,
                source_before.signature,
                source_before.container,
                extracted.container
            ),
            RefactoringKind::InlineMethod {
                inlined,
                target_after,
                ..
            } => format!(
                "{name} {} inlined to {} in class {}",
                inlined.signature, target_after.signature, target_after.container
            ),
            RefactoringKind::MoveAndInlineMethod {
                inlined,
                target_after,
                ..
            } => format!(
                "{name} {} moved from class {} to class {} & inlined to {}",
                inlined.signature, inlined.container, target_after.container, target_after.signature
            ),
            RefactoringKind::MergeMethod { merged, into } => {
                let sources: Vec<&str> = merged.iter().map(|m| m.signature.as_str()).collect();
                format!(
                    "{name} [{}] to {} in class {}",
                    sources.join(", "),
                    into.signature,
                    into.container
                )
            }
            RefactoringKind::SplitMethod { split, into } => {
                let targets: Vec<&str> = into.iter().map(|m| m.signature.as_str()).collect();
                format!(
                    "{name} {} to [{}] in class {}",
                    split.signature,
                    targets.join(", "),
                    split.container
                )
            }
            RefactoringKind::AddParameter {
                after, parameter, ..
            } => format!(
                "{name} {parameter} in method {} from class {}",
                after.signature, after.container
            ),
            RefactoringKind::RemoveParameter {
                before,
                after,
                parameter,
            } => format!(
                "{name} {parameter} in method {} from class {}",
                before.signature, after.container
            ),
            RefactoringKind::RenameParameter { after, old, new, .. }
            | RefactoringKind::ChangeParameterType { after, old, new, .. } => format!(
                "{name} {old} to {new} in method {} from class {}",
                after.signature, after.container
            ),
            RefactoringKind::ReorderParameter {
                after,
                old_order,
                new_order,
                ..
            } => format!(
                "{name} [{}] to [{}] in method {} from class {}",
                old_order.join(", "),
                new_order.join(", "),
                after.signature,
                after.container
            ),
            RefactoringKind::ChangeReturnType { after, old, new, .. } => format!(
                "{name} {} to {} in method {} from class {}",
                old.as_deref().unwrap_or("none"),
                new.as_deref().unwrap_or("none"),
                after.signature,
                after.container
            ),
            RefactoringKind::RenameVariable { after, old, new, .. }
            | RefactoringKind::ChangeVariableType { after, old, new, .. } => format!(
                "{name} {old} to {new} in method {} from class {}",
                after.signature, after.container
            ),
            RefactoringKind::ExtractVariable {
                after, variable, ..
            } => format!(
                "{name} {variable} in method {} from class {}",
                after.signature, after.container
            ),
            RefactoringKind::InlineVariable {
                before, variable, ..
            } => format!(
                "{name} {variable} in method {} from class {}",
                before.signature, before.container
            ),
            RefactoringKind::ChangeAttributeType { before, after } => format!(
                "{name} {} to {} in class {}",
                before.signature, after.signature, after.container
            ),
        }
    }
}

/// A detected refactoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refactoring {
    #[serde(flatten)]
    pub kind: RefactoringKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Justification::is_empty")]
    pub justification: Justification,
}

impl Refactoring {
    pub fn new(kind: RefactoringKind) -> Self {
        let description = kind.describe();
        Self {
            kind,
            description,
            justification: Justification::default(),
        }
    }

    /// Set the supporting fragments.
    pub fn with_justification(mut self, justification: Justification) -> Self {
        self.justification = justification;
        self
    }

    pub fn display_name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn group(&self) -> RefactoringGroup {
        self.kind.group()
    }

    /// Whether the refactoring relates entities in different files.
    pub fn is_cross_file(&self) -> bool {
        self.kind
            .entity_pairs()
            .iter()
            .any(|(b, a)| b.path != a.path)
    }
}

impl fmt::Display for Refactoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Everything a detector may look at.
pub struct DetectionContext<'a> {
    pub before: &'a StructuralModel,
    pub after: &'a StructuralModel,
    pub matching: &'a EntityMatching,
    pub thresholds: &'a Thresholds,
}

/// Run all detectors and resolve conflicting classifications.
pub fn detect_all(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut found = Vec::new();
    found.extend(rename::detect(ctx));
    found.extend(moves::detect(ctx));
    found.extend(extract::detect_extract(ctx));
    found.extend(extract::detect_inline(ctx));
    found.extend(merge::detect_merge(ctx));
    found.extend(merge::detect_split(ctx));
    found.extend(parameter::detect(ctx));
    found.extend(variable::detect(ctx));
    debug!(candidates = found.len(), "Ran refactoring detectors");

    let mut resolved = resolve_conflicts(found);
    resolved.sort_by(|a, b| {
        a.group()
            .cmp(&b.group())
            .then_with(|| a.description.cmp(&b.description))
    });
    resolved.dedup_by(|a, b| a.description == b.description && a.kind == b.kind);
    resolved
}

/// Keep one classification per entity pair, by [`RefactoringGroup`] priority.
pub fn resolve_conflicts(mut refactorings: Vec<Refactoring>) -> Vec<Refactoring> {
    refactorings.sort_by(|a, b| {
        a.group()
            .cmp(&b.group())
            .then_with(|| a.description.cmp(&b.description))
    });

    let mut claimed: BTreeMap<(EntityId, EntityId), RefactoringGroup> = BTreeMap::new();
    let mut kept = Vec::new();
    for refactoring in refactorings {
        let keys: Vec<(EntityId, EntityId)> = refactoring
            .kind
            .entity_pairs()
            .iter()
            .map(|(b, a)| (b.id, a.id))
            .collect();
        let group = refactoring.group();
        let conflict = keys.iter().find_map(|k| {
            claimed
                .get(k)
                .filter(|existing| existing.excludes(group))
                .map(|existing| (*k, *existing))
        });
        if let Some((key, existing)) = conflict {
            debug!(
                dropped = %refactoring.description,
                ?key,
                kept_group = ?existing,
                "Conflicting refactoring dropped"
            );
            continue;
        }
        for key in keys {
            claimed.entry(key).or_insert(group);
        }
        kept.push(refactoring);
    }
    kept
}

/// Replace parameter names with the argument expressions of a call, on word
/// boundaries.
pub(crate) fn substitute(text: &str, bindings: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (param, arg) in bindings {
        if param == arg || param.is_empty() {
            continue;
        }
        if let Ok(re) = regex::Regex::new(&format!(r"\b{}\b", regex::escape(param))) {
            out = re.replace_all(&out, regex::NoExpand(arg)).into_owned();
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::lang::{Java, Language};
    use crate::matcher::EntityMatcher;
    use crate::model::build_model;

    /// Build both models from `(path, source)` lists and run every detector.
    pub fn detect_java(before: &[(&str, &str)], after: &[(&str, &str)]) -> Vec<Refactoring> {
        let parse = |files: &[(&str, &str)]| -> StructuralModel {
            let asts: Vec<_> = files
                .iter()
                .map(|(p, s)| Java.parse(Path::new(p), s).unwrap())
                .collect();
            build_model(asts.iter())
        };
        let before = parse(before);
        let after = parse(after);
        let thresholds = Thresholds::default();
        let matching = EntityMatcher::new(&before, &after, &thresholds).match_entities();
        detect_all(&DetectionContext {
            before: &before,
            after: &after,
            matching: &matching,
            thresholds: &thresholds,
        })
    }

    pub fn descriptions(refactorings: &[Refactoring]) -> Vec<String> {
        refactorings.iter().map(|r| r.description.clone()).collect()
    }
}
