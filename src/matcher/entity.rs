//! Pairing of before/after structural entities.

use super::similarity::{dice, levenshtein_distance, parameter_similarity, string_similarity};
use crate::config::Thresholds;
use crate::model::{
    Attribute, AttributeId, Class, ClassId, Operation, OperationId, StructuralModel,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const NAME_WEIGHT: f64 = 0.25;
const PARAMETER_WEIGHT: f64 = 0.25;
const BODY_WEIGHT: f64 = 0.5;

/// A before/after pair accepted by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchedPair<T> {
    pub before: T,
    pub after: T,
    pub score: f64,
}

/// Component scores of an operation comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationScore {
    pub name: f64,
    pub parameters: f64,
    pub body: f64,
    pub total: f64,
}

/// Result of matching two models.
#[derive(Debug, Clone, Default)]
pub struct EntityMatching {
    pub classes: Vec<MatchedPair<ClassId>>,
    pub operations: Vec<MatchedPair<OperationId>>,
    pub attributes: Vec<MatchedPair<AttributeId>>,
    pub added_classes: Vec<ClassId>,
    pub removed_classes: Vec<ClassId>,
    pub added_operations: Vec<OperationId>,
    pub removed_operations: Vec<OperationId>,
    pub added_attributes: Vec<AttributeId>,
    pub removed_attributes: Vec<AttributeId>,
}

impl EntityMatching {
    /// After-side partner of a before class.
    pub fn class_after(&self, before: ClassId) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|p| p.before == before)
            .map(|p| p.after)
    }

    /// Before-side partner of an after class.
    pub fn class_before(&self, after: ClassId) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|p| p.after == after)
            .map(|p| p.before)
    }

    /// After-side partner of a before operation.
    pub fn operation_after(&self, before: OperationId) -> Option<OperationId> {
        self.operations
            .iter()
            .find(|p| p.before == before)
            .map(|p| p.after)
    }
}

struct Candidate<T> {
    before: T,
    after: T,
    score: f64,
    same_file: bool,
    name_distance: usize,
}

/// Pairs entities of two structural models.
pub struct EntityMatcher<'a> {
    before: &'a StructuralModel,
    after: &'a StructuralModel,
    thresholds: &'a Thresholds,
}

impl<'a> EntityMatcher<'a> {
    pub fn new(
        before: &'a StructuralModel,
        after: &'a StructuralModel,
        thresholds: &'a Thresholds,
    ) -> Self {
        Self {
            before,
            after,
            thresholds,
        }
    }

    /// Match classes, then operations and attributes.
    pub fn match_entities(&self) -> EntityMatching {
        let classes = self.match_classes();
        let class_pairs: BTreeSet<(ClassId, ClassId)> =
            classes.iter().map(|p| (p.before, p.after)).collect();
        let operations = self.match_operations(&class_pairs);
        let attributes = self.match_attributes(&class_pairs);

        let matching = EntityMatching {
            added_classes: unmatched(self.after.classes().iter().map(|c| c.id), |id| {
                classes.iter().any(|p| p.after == id)
            }),
            removed_classes: unmatched(self.before.classes().iter().map(|c| c.id), |id| {
                classes.iter().any(|p| p.before == id)
            }),
            added_operations: unmatched(self.after.operations().iter().map(|o| o.id), |id| {
                operations.iter().any(|p| p.after == id)
            }),
            removed_operations: unmatched(self.before.operations().iter().map(|o| o.id), |id| {
                operations.iter().any(|p| p.before == id)
            }),
            added_attributes: unmatched(self.after.attributes().iter().map(|a| a.id), |id| {
                attributes.iter().any(|p| p.after == id)
            }),
            removed_attributes: unmatched(self.before.attributes().iter().map(|a| a.id), |id| {
                attributes.iter().any(|p| p.before == id)
            }),
            classes,
            operations,
            attributes,
        };
        debug!(
            classes = matching.classes.len(),
            operations = matching.operations.len(),
            attributes = matching.attributes.len(),
            added_operations = matching.added_operations.len(),
            removed_operations = matching.removed_operations.len(),
            "Matched entities"
        );
        matching
    }

    /// Composite similarity of two operations.
    pub fn operation_score(&self, b: &Operation, a: &Operation) -> OperationScore {
        if b.qualified_name() == a.qualified_name() && b.signature_key() == a.signature_key() {
            return OperationScore {
                name: 1.0,
                parameters: 1.0,
                body: 1.0,
                total: 1.0,
            };
        }
        let name = string_similarity(&b.name, &a.name);
        let parameters = parameter_similarity(&b.parameter_types(), &a.parameter_types());
        let body = body_similarity(b, a);
        OperationScore {
            name,
            parameters,
            body,
            total: NAME_WEIGHT * name + PARAMETER_WEIGHT * parameters + BODY_WEIGHT * body,
        }
    }

    fn match_classes(&self) -> Vec<MatchedPair<ClassId>> {
        let mut matched = Vec::new();
        let mut taken_after = BTreeSet::new();
        let by_name: HashMap<String, ClassId> = self
            .after
            .classes()
            .iter()
            .rev()
            .map(|c| (c.qualified_name(), c.id))
            .collect();

        for class in self.before.classes() {
            if let Some(after) = by_name.get(&class.qualified_name())
                && taken_after.insert(*after)
            {
                matched.push(MatchedPair {
                    before: class.id,
                    after: *after,
                    score: 1.0,
                });
            }
        }

        let mut candidates = Vec::new();
        for b in self.before.classes() {
            if matched.iter().any(|p| p.before == b.id) {
                continue;
            }
            for a in self.after.classes() {
                if taken_after.contains(&a.id) {
                    continue;
                }
                let score = self.class_score(b, a);
                if score >= self.thresholds.class_match {
                    candidates.push(Candidate {
                        before: b.id,
                        after: a.id,
                        score,
                        same_file: b.path == a.path,
                        name_distance: levenshtein_distance(&b.name, &a.name),
                    });
                }
            }
        }
        matched.extend(greedy(candidates));
        matched.sort_by_key(|p| (p.before, p.after));
        matched
    }

    fn class_score(&self, b: &Class, a: &Class) -> f64 {
        let members = |model: &StructuralModel, class: &Class| -> Vec<String> {
            class
                .operations
                .iter()
                .map(|o| model.operation(*o).signature_key())
                .chain(class.attributes.iter().map(|x| model.attribute(*x).name.clone()))
                .collect()
        };
        let before_members = members(self.before, b);
        let after_members = members(self.after, a);
        let overlap = if before_members.is_empty() && after_members.is_empty() {
            if b.name == a.name { 1.0 } else { 0.0 }
        } else {
            dice(&before_members, &after_members)
        };
        0.3 * string_similarity(&b.name, &a.name) + 0.7 * overlap
    }

    fn match_operations(
        &self,
        class_pairs: &BTreeSet<(ClassId, ClassId)>,
    ) -> Vec<MatchedPair<OperationId>> {
        let mut matched = Vec::new();
        let mut taken_before = BTreeSet::new();
        let mut taken_after = BTreeSet::new();

        let exact: HashMap<(String, String), OperationId> = self
            .after
            .operations()
            .iter()
            .rev()
            .map(|o| ((o.qualified_name(), o.signature_key()), o.id))
            .collect();
        for op in self.before.operations() {
            if let Some(after) = exact.get(&(op.qualified_name(), op.signature_key()))
                && taken_after.insert(*after)
            {
                taken_before.insert(op.id);
                matched.push(MatchedPair {
                    before: op.id,
                    after: *after,
                    score: 1.0,
                });
            }
        }

        // Inside matched containers first, then across everything left.
        for same_container_only in [true, false] {
            let mut candidates = Vec::new();
            for b in self.before.operations() {
                if taken_before.contains(&b.id) {
                    continue;
                }
                for a in self.after.operations() {
                    if taken_after.contains(&a.id) {
                        continue;
                    }
                    if same_container_only && !same_container(b, a, class_pairs) {
                        continue;
                    }
                    let score = self.operation_score(b, a).total;
                    if score >= self.thresholds.operation_match {
                        candidates.push(Candidate {
                            before: b.id,
                            after: a.id,
                            score,
                            same_file: b.path == a.path,
                            name_distance: levenshtein_distance(&b.name, &a.name),
                        });
                    }
                }
            }
            for pair in greedy(candidates) {
                taken_before.insert(pair.before);
                taken_after.insert(pair.after);
                matched.push(pair);
            }
        }

        matched.sort_by_key(|p| (p.before, p.after));
        matched
    }

    fn match_attributes(
        &self,
        class_pairs: &BTreeSet<(ClassId, ClassId)>,
    ) -> Vec<MatchedPair<AttributeId>> {
        let mut matched = Vec::new();
        let mut taken_before = BTreeSet::new();
        let mut taken_after = BTreeSet::new();

        let exact: HashMap<String, AttributeId> = self
            .after
            .attributes()
            .iter()
            .rev()
            .map(|a| (a.qualified_name(), a.id))
            .collect();
        for attr in self.before.attributes() {
            if let Some(after) = exact.get(&attr.qualified_name())
                && taken_after.insert(*after)
            {
                taken_before.insert(attr.id);
                matched.push(MatchedPair {
                    before: attr.id,
                    after: *after,
                    score: 1.0,
                });
            }
        }

        for same_class_only in [true, false] {
            let mut candidates = Vec::new();
            for b in self.before.attributes() {
                if taken_before.contains(&b.id) {
                    continue;
                }
                for a in self.after.attributes() {
                    if taken_after.contains(&a.id) {
                        continue;
                    }
                    if same_class_only && !class_pairs.contains(&(b.class, a.class)) {
                        continue;
                    }
                    // Across classes only same-named attributes are related.
                    if !same_class_only && b.name != a.name {
                        continue;
                    }
                    let score = attribute_score(b, a);
                    if score >= self.thresholds.attribute_match {
                        candidates.push(Candidate {
                            before: b.id,
                            after: a.id,
                            score,
                            same_file: b.path == a.path,
                            name_distance: levenshtein_distance(&b.name, &a.name),
                        });
                    }
                }
            }
            for pair in greedy(candidates) {
                taken_before.insert(pair.before);
                taken_after.insert(pair.after);
                matched.push(pair);
            }
        }

        matched.sort_by_key(|p| (p.before, p.after));
        matched
    }
}

/// Multiset Dice of normalized statement texts.
pub fn body_similarity(b: &Operation, a: &Operation) -> f64 {
    let before: Vec<&str> = b.statements.iter().map(|s| s.text.as_str()).collect();
    let after: Vec<&str> = a.statements.iter().map(|s| s.text.as_str()).collect();
    dice(&before, &after)
}

fn attribute_score(b: &Attribute, a: &Attribute) -> f64 {
    let type_score = if b.type_name == a.type_name { 1.0 } else { 0.0 };
    0.6 * string_similarity(&b.name, &a.name) + 0.4 * type_score
}

fn same_container(
    b: &Operation,
    a: &Operation,
    class_pairs: &BTreeSet<(ClassId, ClassId)>,
) -> bool {
    match (b.class, a.class) {
        (Some(bc), Some(ac)) => class_pairs.contains(&(bc, ac)),
        (None, None) => b.container == a.container,
        _ => false,
    }
}

/// Accept candidates best-first while both sides are free.
fn greedy<T: Copy + Ord>(mut candidates: Vec<Candidate<T>>) -> Vec<MatchedPair<T>> {
    candidates.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| y.same_file.cmp(&x.same_file))
            .then_with(|| x.name_distance.cmp(&y.name_distance))
            .then_with(|| x.before.cmp(&y.before))
            .then_with(|| x.after.cmp(&y.after))
    });
    let mut taken_before = BTreeSet::new();
    let mut taken_after = BTreeSet::new();
    let mut out = Vec::new();
    for c in candidates {
        if taken_before.contains(&c.before) || taken_after.contains(&c.after) {
            continue;
        }
        taken_before.insert(c.before);
        taken_after.insert(c.after);
        out.push(MatchedPair {
            before: c.before,
            after: c.after,
            score: c.score,
        });
    }
    out
}

fn unmatched<T: Copy + Ord>(ids: impl Iterator<Item = T>, is_matched: impl Fn(T) -> bool) -> Vec<T> {
    let mut out: Vec<T> = ids.filter(|id| !is_matched(*id)).collect();
    out.sort();
    out
}
