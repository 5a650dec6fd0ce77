//! Parameter list and return type changes of matched operations.

use super::rename::statement_justification;
use super::{DetectionContext, Refactoring, RefactoringKind};
use crate::model::{Operation, Parameter};

pub(super) fn detect(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for pair in &ctx.matching.operations {
        let b = ctx.before.operation(pair.before);
        let a = ctx.after.operation(pair.after);
        let kinds = parameter_changes(ctx, b, a);
        if kinds.is_empty() {
            continue;
        }
        let justification = statement_justification(b, a);
        out.extend(
            kinds
                .into_iter()
                .map(|kind| Refactoring::new(kind).with_justification(justification.clone())),
        );
    }
    out
}

fn parameter_changes(ctx: &DetectionContext, b: &Operation, a: &Operation) -> Vec<RefactoringKind> {
    let before = || ctx.before.operation_ref(b.id);
    let after = || ctx.after.operation_ref(a.id);
    let mut kinds = Vec::new();

    let common: Vec<(&Parameter, &Parameter)> = b
        .parameters
        .iter()
        .filter_map(|p| a.parameters.iter().find(|q| q.name == p.name).map(|q| (p, q)))
        .collect();
    for (old, new) in &common {
        if old.type_name != new.type_name {
            kinds.push(RefactoringKind::ChangeParameterType {
                before: before(),
                after: after(),
                old: (*old).clone(),
                new: (*new).clone(),
            });
        }
    }

    let mut removed: Vec<(usize, &Parameter)> = b
        .parameters
        .iter()
        .enumerate()
        .filter(|(_, p)| !a.parameters.iter().any(|q| q.name == p.name))
        .collect();
    let mut added: Vec<(usize, &Parameter)> = a
        .parameters
        .iter()
        .enumerate()
        .filter(|(_, q)| !b.parameters.iter().any(|p| p.name == q.name))
        .collect();

    // A removed and an added parameter of the same type are one renamed
    // parameter, preferably at the same position.
    let mut renamed = Vec::new();
    for (index, old) in removed.clone() {
        let candidates = added.iter().filter(|(_, q)| q.type_name == old.type_name);
        let chosen = candidates
            .clone()
            .find(|(j, _)| *j == index)
            .or_else(|| candidates.clone().next())
            .map(|(j, _)| *j);
        if let Some(j) = chosen {
            added.retain(|(k, _)| *k != j);
            removed.retain(|(k, _)| *k != index);
            renamed.push((old, &a.parameters[j]));
        }
    }
    for (old, new) in renamed {
        kinds.push(RefactoringKind::RenameParameter {
            before: before(),
            after: after(),
            old: old.clone(),
            new: new.clone(),
        });
    }
    for (_, parameter) in removed {
        kinds.push(RefactoringKind::RemoveParameter {
            before: before(),
            after: after(),
            parameter: parameter.clone(),
        });
    }
    for (_, parameter) in added {
        kinds.push(RefactoringKind::AddParameter {
            before: before(),
            after: after(),
            parameter: parameter.clone(),
        });
    }

    if common.len() >= 2 {
        let old_order: Vec<String> = common.iter().map(|(p, _)| p.name.clone()).collect();
        let mut new_order: Vec<String> = Vec::new();
        for q in &a.parameters {
            if old_order.contains(&q.name) {
                new_order.push(q.name.clone());
            }
        }
        if old_order != new_order {
            kinds.push(RefactoringKind::ReorderParameter {
                before: before(),
                after: after(),
                old_order,
                new_order,
            });
        }
    }

    if b.return_type != a.return_type {
        kinds.push(RefactoringKind::ChangeReturnType {
            before: before(),
            after: after(),
            old: b.return_type.clone(),
            new: a.return_type.clone(),
        });
    }

    kinds
}

#[cfg(test)]
mod tests {
    use crate::refactoring::testing::{descriptions, detect_java};

    #[test]
    fn test_rename_parameter() {
        let found = detect_java(
            &[(
                "Customer.java",
                "class Customer { double amountFor(Rental each) { return each.getCharge(); } }",
            )],
            &[(
                "Customer.java",
                "class Customer { double amountFor(Rental aRental) { return aRental.getCharge(); } }",
            )],
        );

        assert_eq!(
            descriptions(&found),
            ["Rename Parameter each Rental to aRental Rental in method amountFor(aRental Rental) : double from class Customer"]
        );
    }

    #[test]
    fn test_added_reordered_and_return_type() {
        let found = detect_java(
            &[("A.java", "class A { int f(int a, String b) { return g(a, b); } }")],
            &[(
                "A.java",
                "class A { long f(String b, int a, boolean c) { return g(a, b); } }",
            )],
        );

        assert_eq!(
            descriptions(&found),
            [
                "Add Parameter c boolean in method f(b String, a int, c boolean) : long from class A",
                "Change Return Type int to long in method f(b String, a int, c boolean) : long from class A",
                "Reorder Parameter [a, b] to [b, a] in method f(b String, a int, c boolean) : long from class A",
            ]
        );
    }

    #[test]
    fn test_changed_parameter_type_and_removal() {
        let found = detect_java(
            &[("A.java", "class A { void f(int a, String s, int b) { use(a, s); } }")],
            &[("A.java", "class A { void f(long a, String s) { use(a, s); } }")],
        );

        assert_eq!(
            descriptions(&found),
            [
                "Change Parameter Type a int to a long in method f(a long, s String) : void from class A",
                "Remove Parameter b int in method f(a int, s String, b int) : void from class A",
            ]
        );
    }
}
