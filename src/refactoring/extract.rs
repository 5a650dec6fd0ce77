//! Extract Method and Inline Method detection.
//!
//! An extraction shows up as a matched caller that lost a contiguous run of
//! statements and gained a call to an added operation whose body, once its
//! parameters are replaced by the call's arguments, reproduces the lost run.
//! Inlining is the mirror image.

use super::{
    DetectionContext, Justification, Refactoring, RefactoringKind, SpanPair, SpanRef, substitute,
};
use crate::matcher::similarity::lcs;
use crate::model::{Invocation, Operation};
use std::collections::BTreeSet;

pub(super) fn detect_extract(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for added in &ctx.matching.added_operations {
        let extracted = ctx.after.operation(*added);
        if extracted.statements.is_empty() {
            continue;
        }
        for pair in &ctx.matching.operations {
            let caller_before = ctx.before.operation(pair.before);
            let caller_after = ctx.after.operation(pair.after);
            if call_count(caller_after, &extracted.name) <= call_count(caller_before, &extracted.name)
            {
                continue;
            }
            let Some(call) = first_call(caller_after, &extracted.name) else {
                continue;
            };
            let Some(fragments) = relocated(
                extracted,
                call,
                caller_before,
                caller_after,
                ctx.thresholds.extract_overlap,
            ) else {
                continue;
            };

            let justification = Justification::new(
                fragments
                    .iter()
                    .map(|(caller_index, body_index)| SpanPair {
                        before: SpanRef::of_statement(
                            &caller_before.path,
                            &caller_before.statements[*caller_index],
                        ),
                        after: SpanRef::of_statement(
                            &extracted.path,
                            &extracted.statements[*body_index],
                        ),
                    })
                    .collect(),
            );
            let extracted_ref = ctx.after.operation_ref(extracted.id);
            let source_before = ctx.before.operation_ref(caller_before.id);
            let source_after = ctx.after.operation_ref(caller_after.id);
            let kind = if same_container(extracted, caller_after) {
                RefactoringKind::ExtractMethod {
                    extracted: extracted_ref,
                    source_before,
                    source_after,
                }
            } else {
                RefactoringKind::ExtractAndMoveMethod {
                    extracted: extracted_ref,
                    source_before,
                    source_after,
                }
            };
            out.push(Refactoring::new(kind).with_justification(justification));
        }
    }
    out
}

pub(super) fn detect_inline(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for removed in &ctx.matching.removed_operations {
        let inlined = ctx.before.operation(*removed);
        if inlined.statements.is_empty() {
            continue;
        }
        for pair in &ctx.matching.operations {
            let target_before = ctx.before.operation(pair.before);
            let target_after = ctx.after.operation(pair.after);
            if call_count(target_before, &inlined.name) <= call_count(target_after, &inlined.name) {
                continue;
            }
            let Some(call) = first_call(target_before, &inlined.name) else {
                continue;
            };
            // Mirror image of extraction: the target after the change plays
            // the caller that lost the statements.
            let Some(fragments) = relocated(
                inlined,
                call,
                target_after,
                target_before,
                ctx.thresholds.extract_overlap,
            ) else {
                continue;
            };

            let justification = Justification::new(
                fragments
                    .iter()
                    .map(|(target_index, body_index)| SpanPair {
                        before: SpanRef::of_statement(
                            &inlined.path,
                            &inlined.statements[*body_index],
                        ),
                        after: SpanRef::of_statement(
                            &target_after.path,
                            &target_after.statements[*target_index],
                        ),
                    })
                    .collect(),
            );
            let inlined_ref = ctx.before.operation_ref(inlined.id);
            let target_before_ref = ctx.before.operation_ref(target_before.id);
            let target_after_ref = ctx.after.operation_ref(target_after.id);
            let kind = if same_container(inlined, target_before) {
                RefactoringKind::InlineMethod {
                    inlined: inlined_ref,
                    target_before: target_before_ref,
                    target_after: target_after_ref,
                }
            } else {
                RefactoringKind::MoveAndInlineMethod {
                    inlined: inlined_ref,
                    target_before: target_before_ref,
                    target_after: target_after_ref,
                }
            };
            out.push(Refactoring::new(kind).with_justification(justification));
        }
    }
    out
}

/// Match the body of `callee` (parameters bound to `call`'s arguments)
/// against the statements `host` has and `other` lacks.
///
/// Returns `(host statement, callee statement)` index pairs when enough of
/// the callee body is found and the found statements form a contiguous run
/// of unmatched host statements.
fn relocated(
    callee: &Operation,
    call: &Invocation,
    host: &Operation,
    other: &Operation,
    threshold: f64,
) -> Option<Vec<(usize, usize)>> {
    let bindings: Vec<(String, String)> = callee
        .parameters
        .iter()
        .zip(&call.arguments)
        .map(|(p, arg)| (p.name.clone(), arg.clone()))
        .collect();
    let body: Vec<String> = callee
        .statements
        .iter()
        .map(|s| substitute(&s.text, &bindings))
        .collect();

    let kept: BTreeSet<usize> = lcs(&host.statements, &other.statements, |x, y| x.text == y.text)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    let unmatched: Vec<usize> = (0..host.statements.len())
        .filter(|i| !kept.contains(i))
        .collect();

    let mut used = BTreeSet::new();
    let mut pairs = Vec::new();
    for (body_index, text) in body.iter().enumerate() {
        if let Some(host_index) = unmatched
            .iter()
            .copied()
            .find(|i| !used.contains(i) && host.statements[*i].text == *text)
        {
            used.insert(host_index);
            pairs.push((host_index, body_index));
        }
    }

    let overlap = pairs.len() as f64 / body.len() as f64;
    if pairs.is_empty() || overlap < threshold {
        return None;
    }
    let first = *used.first()?;
    let last = *used.last()?;
    if (first..=last).any(|i| kept.contains(&i)) {
        return None;
    }
    Some(pairs)
}

fn call_count(op: &Operation, name: &str) -> usize {
    op.statements
        .iter()
        .flat_map(|s| &s.invocations)
        .filter(|i| i.name == name)
        .count()
}

fn first_call<'o>(op: &'o Operation, name: &str) -> Option<&'o Invocation> {
    op.statements
        .iter()
        .flat_map(|s| &s.invocations)
        .find(|i| i.name == name)
}

fn same_container(x: &Operation, y: &Operation) -> bool {
    match (x.class, y.class) {
        (Some(_), Some(_)) | (None, None) => x.container == y.container,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::refactoring::RefactoringKind;
    use crate::refactoring::testing::{descriptions, detect_java};

    const BEFORE: &str = r#"
class Invoice {
    double total(Item item, int qty) {
        double sum = 0;
        log("start");
        double price = item.price() * qty;
        if (price > 100) {
            price = price * 0.9;
        }
        sum += price;
        return sum;
    }
}
"#;

    const AFTER: &str = r#"
class Invoice {
    double total(Item item, int qty) {
        double sum = 0;
        log("start");
        sum += discounted(item, qty);
        return sum;
    }

    double discounted(Item it, int n) {
        double price = it.price() * n;
        if (price > 100) {
            price = price * 0.9;
        }
        return price;
    }
}
"#;

    #[test]
    fn test_extract_method_with_renamed_parameters() {
        let found = detect_java(&[("Invoice.java", BEFORE)], &[("Invoice.java", AFTER)]);

        assert_eq!(
            descriptions(&found),
            ["Extract Method discounted(it Item, n int) : double extracted from total(item Item, qty int) : double in class Invoice"]
        );
        assert_eq!(found[0].justification.pairs.len(), 3);
    }

    #[test]
    fn test_inline_method_is_the_mirror_image() {
        let found = detect_java(&[("Invoice.java", AFTER)], &[("Invoice.java", BEFORE)]);

        assert_eq!(found.len(), 1);
        assert!(matches!(found[0].kind, RefactoringKind::InlineMethod { .. }));
        assert!(
            found[0]
                .description
                .starts_with("Inline Method discounted(it Item, n int) : double inlined to total")
        );
    }

    #[test]
    fn test_unrelated_new_call_is_not_an_extraction() {
        let found = detect_java(
            &[("A.java", "class A { void f() { a(); b(); } }")],
            &[("A.java", "class A { void f() { a(); b(); audit(); } void audit() { write(1); } }")],
        );

        assert!(found.is_empty());
    }
}
