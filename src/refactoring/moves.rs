//! Move, pull-up and push-down detection.

use super::rename::{same_container, statement_justification};
use super::{DetectionContext, Justification, Refactoring, RefactoringKind};
use crate::model::{ClassId, Operation};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    PullUp,
    PushDown,
    Unrelated,
}

pub(super) fn detect(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    detect_class_moves(ctx, &mut out);
    detect_operation_moves(ctx, &mut out);
    detect_attribute_moves(ctx, &mut out);
    out
}

fn detect_class_moves(ctx: &DetectionContext, out: &mut Vec<Refactoring>) {
    for pair in &ctx.matching.classes {
        let b = ctx.before.class(pair.before);
        let a = ctx.after.class(pair.after);
        if b.container == a.container && b.path == a.path {
            continue;
        }
        if b.qualified_name() == a.qualified_name() || b.name != a.name {
            continue;
        }
        let before = ctx.before.class_ref(b.id);
        let after = ctx.after.class_ref(a.id);
        let justification = Justification::declarations(&before, &after);
        out.push(
            Refactoring::new(RefactoringKind::MoveClass { before, after })
                .with_justification(justification),
        );
    }
}

fn detect_operation_moves(ctx: &DetectionContext, out: &mut Vec<Refactoring>) {
    let mut pulled_up: BTreeSet<(String, ClassId)> = BTreeSet::new();

    for pair in &ctx.matching.operations {
        let b = ctx.before.operation(pair.before);
        let a = ctx.after.operation(pair.after);
        if same_container(ctx, b, a) {
            continue;
        }
        let before = ctx.before.operation_ref(b.id);
        let after = ctx.after.operation_ref(a.id);
        let kind = match relation(ctx, b.class, a.class) {
            Relation::PullUp => {
                if let Some(target) = a.class {
                    pulled_up.insert((b.signature_key(), target));
                }
                RefactoringKind::PullUpMethod { before, after }
            }
            Relation::PushDown => RefactoringKind::PushDownMethod { before, after },
            Relation::Unrelated if b.name == a.name => RefactoringKind::MoveMethod { before, after },
            Relation::Unrelated => RefactoringKind::MoveAndRenameMethod { before, after },
        };
        out.push(Refactoring::new(kind).with_justification(statement_justification(b, a)));
    }

    // Removed copies in sibling subclasses of a pull-up target.
    for (signature, target) in &pulled_up {
        let Some(target_op) = ctx
            .after
            .class(*target)
            .operations
            .iter()
            .map(|o| ctx.after.operation(*o))
            .find(|o| o.signature_key() == *signature)
        else {
            continue;
        };
        let target_name = ctx.after.class(*target).name.clone();
        for removed in &ctx.matching.removed_operations {
            let op = ctx.before.operation(*removed);
            if op.signature_key() != *signature || !is_subclass_of(ctx, op, &target_name) {
                continue;
            }
            out.push(
                Refactoring::new(RefactoringKind::PullUpMethod {
                    before: ctx.before.operation_ref(op.id),
                    after: ctx.after.operation_ref(target_op.id),
                })
                .with_justification(statement_justification(op, target_op)),
            );
        }
    }
}

fn detect_attribute_moves(ctx: &DetectionContext, out: &mut Vec<Refactoring>) {
    for pair in &ctx.matching.attributes {
        let b = ctx.before.attribute(pair.before);
        let a = ctx.after.attribute(pair.after);
        if ctx.matching.class_after(b.class) == Some(a.class) {
            continue;
        }
        let before = ctx.before.attribute_ref(b.id);
        let after = ctx.after.attribute_ref(a.id);
        let justification = Justification::declarations(&before, &after);
        let kind = match relation(ctx, Some(b.class), Some(a.class)) {
            Relation::PullUp => RefactoringKind::PullUpAttribute { before, after },
            Relation::PushDown => RefactoringKind::PushDownAttribute { before, after },
            Relation::Unrelated => RefactoringKind::MoveAttribute { before, after },
        };
        out.push(Refactoring::new(kind).with_justification(justification));
    }
}

/// Inheritance relation between a before class and an after class.
fn relation(ctx: &DetectionContext, from: Option<ClassId>, to: Option<ClassId>) -> Relation {
    let (Some(from), Some(to)) = (from, to) else {
        return Relation::Unrelated;
    };
    let source = ctx.before.class(from);
    let target = ctx.after.class(to);
    // The source class as it exists after the change, if it survived.
    let source_after = ctx.matching.class_after(from).map(|c| ctx.after.class(c));

    let target_is_super = source.extends(&target.name)
        || source_after.is_some_and(|s| s.extends(&target.name));
    if target_is_super {
        return Relation::PullUp;
    }
    let source_name = source_after.map_or(source.name.as_str(), |s| s.name.as_str());
    if target.extends(source_name) || target.extends(&source.name) {
        return Relation::PushDown;
    }
    Relation::Unrelated
}

fn is_subclass_of(ctx: &DetectionContext, op: &Operation, parent: &str) -> bool {
    op.class.is_some_and(|c| {
        ctx.before.class(c).extends(parent)
            || ctx
                .matching
                .class_after(c)
                .is_some_and(|after| ctx.after.class(after).extends(parent))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, OperationId};
    use crate::refactoring::testing::{descriptions, detect_java};

    fn moved_ids(found: &[Refactoring]) -> Vec<EntityId> {
        found
            .iter()
            .flat_map(|r| r.kind.entity_pairs().into_iter().map(|(b, _)| b.id))
            .collect()
    }

    #[test]
    fn test_move_method_between_unrelated_classes() {
        let found = detect_java(
            &[
                ("A.java", "class A { void report(int x) { print(x); flush(); } void keep() {} }"),
                ("B.java", "class B { void other() {} }"),
            ],
            &[
                ("A.java", "class A { void keep() {} }"),
                ("B.java", "class B { void other() {} void report(int x) { print(x); flush(); } }"),
            ],
        );

        assert_eq!(
            descriptions(&found),
            ["Move Method report(x int) : void from class A to report(x int) : void from class B"]
        );
        assert_eq!(moved_ids(&found), [EntityId::Operation(OperationId(0))]);
        assert!(found[0].is_cross_file());
    }

    #[test]
    fn test_pull_up_with_sibling_copies() {
        let found = detect_java(
            &[
                ("Shape.java", "class Shape { }"),
                ("Circle.java", "class Circle extends Shape { String label() { return name(); } double r() { return 1; } }"),
                ("Square.java", "class Square extends Shape { String label() { return name(); } double s() { return 2; } }"),
            ],
            &[
                ("Shape.java", "class Shape { String label() { return name(); } }"),
                ("Circle.java", "class Circle extends Shape { double r() { return 1; } }"),
                ("Square.java", "class Square extends Shape { double s() { return 2; } }"),
            ],
        );

        assert_eq!(
            descriptions(&found),
            [
                "Pull Up Method label() : String from class Circle to label() : String from class Shape",
                "Pull Up Method label() : String from class Square to label() : String from class Shape",
            ]
        );
    }

    #[test]
    fn test_push_down_attribute() {
        let found = detect_java(
            &[
                ("Base.java", "class Base { int count; void a() {} }"),
                ("Sub.java", "class Sub extends Base { void b() {} }"),
            ],
            &[
                ("Base.java", "class Base { void a() {} }"),
                ("Sub.java", "class Sub extends Base { int count; void b() {} }"),
            ],
        );

        assert_eq!(
            descriptions(&found),
            ["Push Down Attribute count : int from class Base to count : int from class Sub"]
        );
    }
}
