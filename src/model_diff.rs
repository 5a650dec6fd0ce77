//! Structural diff of two snapshots: entity matching plus detected
//! refactorings.

use crate::config::DiffConfig;
use crate::matcher::{EntityMatcher, EntityMatching};
use crate::model::{EntityId, EntityRef, StructuralModel};
use crate::refactoring::{DetectionContext, Refactoring, detect_all};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// A matched before/after entity pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPair {
    pub before: EntityRef,
    pub after: EntityRef,
    pub score: f64,
}

/// Immutable result of comparing two structural models.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelDiff {
    refactorings: Vec<Refactoring>,
    matched: Vec<EntityPair>,
    added: Vec<EntityRef>,
    removed: Vec<EntityRef>,
    #[serde(skip)]
    matching: EntityMatching,
}

/// Match entities between two models and run every refactoring detector.
pub fn compute_diff(
    before: &StructuralModel,
    after: &StructuralModel,
    config: &DiffConfig,
) -> ModelDiff {
    let thresholds = config.thresholds.clone().clamped();
    let matching = EntityMatcher::new(before, after, &thresholds).match_entities();
    let refactorings = detect_all(&DetectionContext {
        before,
        after,
        matching: &matching,
        thresholds: &thresholds,
    });

    let mut matched = Vec::new();
    for p in &matching.classes {
        matched.push(EntityPair {
            before: before.class_ref(p.before),
            after: after.class_ref(p.after),
            score: p.score,
        });
    }
    for p in &matching.operations {
        matched.push(EntityPair {
            before: before.operation_ref(p.before),
            after: after.operation_ref(p.after),
            score: p.score,
        });
    }
    for p in &matching.attributes {
        matched.push(EntityPair {
            before: before.attribute_ref(p.before),
            after: after.attribute_ref(p.after),
            score: p.score,
        });
    }

    let added = matching
        .added_classes
        .iter()
        .map(|id| EntityId::Class(*id))
        .chain(matching.added_operations.iter().map(|id| EntityId::Operation(*id)))
        .chain(matching.added_attributes.iter().map(|id| EntityId::Attribute(*id)))
        .map(|id| after.entity_ref(id))
        .collect();
    let removed = matching
        .removed_classes
        .iter()
        .map(|id| EntityId::Class(*id))
        .chain(matching.removed_operations.iter().map(|id| EntityId::Operation(*id)))
        .chain(matching.removed_attributes.iter().map(|id| EntityId::Attribute(*id)))
        .map(|id| before.entity_ref(id))
        .collect();

    let diff = ModelDiff {
        refactorings,
        matched,
        added,
        removed,
        matching,
    };
    info!(
        refactorings = diff.refactorings.len(),
        matched = diff.matched.len(),
        added = diff.added.len(),
        removed = diff.removed.len(),
        "Computed model diff"
    );
    diff
}

impl ModelDiff {
    /// Detected refactorings, sorted by priority group and description.
    pub fn refactorings(&self) -> &[Refactoring] {
        &self.refactorings
    }

    pub fn matched_pairs(&self) -> &[EntityPair] {
        &self.matched
    }

    pub fn added_entities(&self) -> &[EntityRef] {
        &self.added
    }

    pub fn removed_entities(&self) -> &[EntityRef] {
        &self.removed
    }

    /// Raw id-level matching.
    pub fn matching(&self) -> &EntityMatching {
        &self.matching
    }

    /// Whether nothing changed structurally.
    pub fn is_empty(&self) -> bool {
        self.refactorings.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Refactorings relating an entity in `src` to an entity in `dst`.
    pub fn refactorings_between<'a>(
        &'a self,
        src: &'a Path,
        dst: &'a Path,
    ) -> impl Iterator<Item = (usize, &'a Refactoring)> + 'a {
        self.refactorings.iter().enumerate().filter(move |(_, r)| {
            r.kind
                .entity_pairs()
                .iter()
                .any(|(b, a)| b.path == src && a.path == dst)
        })
    }

    /// Refactorings relating entities of two different files.
    pub fn cross_file_refactorings(&self) -> impl Iterator<Item = &Refactoring> {
        self.refactorings.iter().filter(|r| r.is_cross_file())
    }

    /// Look up the match partner of a before entity.
    pub fn partner_of(&self, before: EntityId) -> Option<&EntityRef> {
        self.matched
            .iter()
            .find(|p| p.before.id == before)
            .map(|p| &p.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Java, Language};
    use crate::model::build_model;

    fn model(files: &[(&str, &str)]) -> StructuralModel {
        let asts: Vec<_> = files
            .iter()
            .map(|(p, s)| Java.parse(Path::new(p), s).unwrap())
            .collect();
        build_model(asts.iter())
    }

    #[test]
    fn test_identity_is_empty() {
        let src = "class A { int x; int f(int a) { return a + x; } }";
        let m = model(&[("A.java", src)]);
        let diff = compute_diff(&m, &m, &DiffConfig::default());

        assert!(diff.is_empty());
        assert_eq!(diff.matched_pairs().len(), 3);
        assert!(diff.matched_pairs().iter().all(|p| p.score >= 1.0));
    }

    #[test]
    fn test_added_and_removed_entities() {
        let before = model(&[("A.java", "class A { void gone() { a(); } }")]);
        let after = model(&[("A.java", "class A { int fresh; }")]);
        let diff = compute_diff(&before, &after, &DiffConfig::default());

        let added: Vec<&str> = diff.added_entities().iter().map(|e| e.name.as_str()).collect();
        let removed: Vec<&str> = diff.removed_entities().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(added, ["fresh"]);
        assert_eq!(removed, ["gone"]);
        assert!(diff.refactorings().is_empty());
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_cross_file_move_is_queryable() {
        let before = model(&[
            ("A.java", "class A { void report(int x) { print(x); flush(); } }"),
            ("B.java", "class B { void other() {} }"),
        ]);
        let after = model(&[
            ("A.java", "class A { }"),
            ("B.java", "class B { void other() {} void report(int x) { print(x); flush(); } }"),
        ]);
        let diff = compute_diff(&before, &after, &DiffConfig::default());

        assert_eq!(diff.cross_file_refactorings().count(), 1);
        assert_eq!(
            diff.refactorings_between(Path::new("A.java"), Path::new("B.java"))
                .count(),
            1
        );
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(json["refactorings"][0]["type"], "move_method");
    }
}
