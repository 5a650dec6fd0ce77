//! Rename detection for classes, methods and attributes.

use super::{DetectionContext, Justification, Refactoring, RefactoringKind, SpanPair, SpanRef};
use crate::matcher::body_similarity;
use crate::matcher::similarity::lcs;
use crate::model::Operation;

pub(super) fn detect(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();

    for pair in &ctx.matching.classes {
        let b = ctx.before.class(pair.before);
        let a = ctx.after.class(pair.after);
        if b.name != a.name {
            let before = ctx.before.class_ref(b.id);
            let after = ctx.after.class_ref(a.id);
            let justification = Justification::declarations(&before, &after);
            let kind = if b.container == a.container {
                RefactoringKind::RenameClass { before, after }
            } else {
                RefactoringKind::MoveAndRenameClass { before, after }
            };
            out.push(Refactoring::new(kind).with_justification(justification));
        }
    }

    for pair in &ctx.matching.operations {
        let b = ctx.before.operation(pair.before);
        let a = ctx.after.operation(pair.after);
        if b.name == a.name || !same_container(ctx, b, a) {
            continue;
        }
        // Same signature shape: arity is kept, types may change separately.
        if b.parameters.len() != a.parameters.len() {
            continue;
        }
        let similarity = body_similarity(b, a);
        let pure =
            b.parameter_types() == a.parameter_types() && similarity >= ctx.thresholds.rename_body;
        out.push(
            Refactoring::new(RefactoringKind::RenameMethod {
                before: ctx.before.operation_ref(b.id),
                after: ctx.after.operation_ref(a.id),
                body_similarity: similarity,
                pure,
            })
            .with_justification(statement_justification(b, a)),
        );
    }

    for pair in &ctx.matching.attributes {
        let b = ctx.before.attribute(pair.before);
        let a = ctx.after.attribute(pair.after);
        if b.name == a.name {
            continue;
        }
        let same_class = ctx.matching.class_after(b.class) == Some(a.class);
        if !same_class {
            continue;
        }
        let before = ctx.before.attribute_ref(b.id);
        let after = ctx.after.attribute_ref(a.id);
        let justification = Justification::declarations(&before, &after);
        out.push(
            Refactoring::new(RefactoringKind::RenameAttribute { before, after })
                .with_justification(justification),
        );
    }

    out
}

/// Whether two matched operations live in the same (possibly renamed)
/// container.
pub(super) fn same_container(ctx: &DetectionContext, b: &Operation, a: &Operation) -> bool {
    match (b.class, a.class) {
        (Some(bc), Some(ac)) => ctx.matching.class_after(bc) == Some(ac),
        (None, None) => b.container == a.container,
        _ => false,
    }
}

/// Statement pairs with identical text, aligned in order.
pub(super) fn statement_justification(b: &Operation, a: &Operation) -> Justification {
    let pairs = lcs(&b.statements, &a.statements, |x, y| x.text == y.text)
        .into_iter()
        .map(|(i, j)| SpanPair {
            before: SpanRef::of_statement(&b.path, &b.statements[i]),
            after: SpanRef::of_statement(&a.path, &a.statements[j]),
        })
        .collect();
    Justification::new(pairs)
}

#[cfg(test)]
mod tests {
    use crate::refactoring::RefactoringKind;
    use crate::refactoring::testing::{descriptions, detect_java};

    #[test]
    fn test_rename_method() {
        let found = detect_java(
            &[("A.java", "class A { int getUserById(int id) { log(id); return find(id); } }")],
            &[("A.java", "class A { int fetchUserById(int id) { log(id); return find(id); } }")],
        );

        assert_eq!(
            descriptions(&found),
            ["Rename Method getUserById(id int) : int renamed to fetchUserById(id int) : int in class A"]
        );
        assert!(matches!(
            &found[0].kind,
            RefactoringKind::RenameMethod { pure: true, .. }
        ));
        assert_eq!(found[0].justification.pairs.len(), 2);
    }

    #[test]
    fn test_rename_class() {
        let found = detect_java(
            &[("a/Cust.java", "package a; class Cust { int n; void f() { g(); } }")],
            &[("a/Customer.java", "package a; class Customer { int n; void f() { g(); } }")],
        );

        assert_eq!(descriptions(&found), ["Rename Class a.Cust renamed to a.Customer"]);
    }

    #[test]
    fn test_class_renamed_into_other_package() {
        let found = detect_java(
            &[("a/Cust.java", "package a; class Cust { int n; void f() { g(); } }")],
            &[("b/Customer.java", "package b; class Customer { int n; void f() { g(); } }")],
        );

        assert_eq!(
            descriptions(&found),
            ["Move And Rename Class a.Cust moved and renamed to b.Customer"]
        );
        assert!(matches!(
            found[0].kind,
            RefactoringKind::MoveAndRenameClass { .. }
        ));
    }

    #[test]
    fn test_rename_attribute() {
        let found = detect_java(
            &[("A.java", "class A { String custName; void f() {} }")],
            &[("A.java", "class A { String customerName; void f() {} }")],
        );

        assert_eq!(
            descriptions(&found),
            ["Rename Attribute custName : String to customerName : String in class A"]
        );
    }

    #[test]
    fn test_identical_models_yield_nothing() {
        let src = "class A { int x; int f(int a) { return a + x; } }";
        assert!(detect_java(&[("A.java", src)], &[("A.java", src)]).is_empty());
    }
}
