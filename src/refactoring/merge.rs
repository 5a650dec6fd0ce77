//! Merge Method and Split Method detection.

use super::{DetectionContext, Justification, Refactoring, RefactoringKind, SpanPair, SpanRef};
use crate::matcher::similarity::multiset_intersection;
use crate::model::{Operation, OperationId};

pub(super) fn detect_merge(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for added in &ctx.matching.added_operations {
        let target = ctx.after.operation(*added);
        if target.statements.is_empty() {
            continue;
        }
        let target_texts = texts(target);

        let sources: Vec<&Operation> = ctx
            .matching
            .removed_operations
            .iter()
            .map(|id| ctx.before.operation(*id))
            .filter(|op| !op.statements.is_empty() && related_containers(ctx, op, target))
            .filter(|op| {
                let shared = multiset_intersection(&texts(op), &target_texts);
                shared as f64 / op.statements.len() as f64 >= ctx.thresholds.merge_fraction
            })
            .collect();
        if sources.len() < 2 {
            continue;
        }

        let discriminator = sources
            .iter()
            .all(|op| target.parameters.len() > op.parameters.len());
        let mut combined: Vec<&str> = Vec::new();
        for op in &sources {
            for text in texts(op) {
                if !combined.contains(&text) {
                    combined.push(text);
                }
            }
        }
        let coverage =
            multiset_intersection(&target_texts, &combined) as f64 / target_texts.len() as f64;
        if !discriminator && coverage < ctx.thresholds.merge_coverage {
            continue;
        }

        let mut pairs = Vec::new();
        for op in &sources {
            pairs.extend(shared_statements(op, target));
        }
        out.push(
            Refactoring::new(RefactoringKind::MergeMethod {
                merged: sources
                    .iter()
                    .map(|op| ctx.before.operation_ref(op.id))
                    .collect(),
                into: ctx.after.operation_ref(target.id),
            })
            .with_justification(Justification::new(pairs)),
        );
    }
    out
}

pub(super) fn detect_split(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for removed in &ctx.matching.removed_operations {
        let source = ctx.before.operation(*removed);
        if source.statements.is_empty() {
            continue;
        }
        let source_texts = texts(source);

        let targets: Vec<OperationId> = ctx
            .matching
            .added_operations
            .iter()
            .copied()
            .filter(|id| {
                let op = ctx.after.operation(*id);
                !op.statements.is_empty()
                    && related_containers(ctx, source, op)
                    && multiset_intersection(&texts(op), &source_texts) as f64
                        / op.statements.len() as f64
                        >= ctx.thresholds.merge_fraction
            })
            .collect();
        if targets.len() < 2 {
            continue;
        }

        let mut combined: Vec<&str> = Vec::new();
        for id in &targets {
            combined.extend(texts(ctx.after.operation(*id)));
        }
        let coverage =
            multiset_intersection(&source_texts, &combined) as f64 / source_texts.len() as f64;
        if coverage < ctx.thresholds.split_coverage {
            continue;
        }

        let mut pairs = Vec::new();
        for id in &targets {
            pairs.extend(shared_statements(source, ctx.after.operation(*id)));
        }
        out.push(
            Refactoring::new(RefactoringKind::SplitMethod {
                split: ctx.before.operation_ref(source.id),
                into: targets.iter().map(|id| ctx.after.operation_ref(*id)).collect(),
            })
            .with_justification(Justification::new(pairs)),
        );
    }
    out
}

fn texts(op: &Operation) -> Vec<&str> {
    op.statements.iter().map(|s| s.text.as_str()).collect()
}

/// A before operation and an after operation in the same logical container.
fn related_containers(ctx: &DetectionContext, before: &Operation, after: &Operation) -> bool {
    match (before.class, after.class) {
        (Some(b), Some(a)) => ctx.matching.class_after(b) == Some(a),
        (None, None) => before.container == after.container,
        _ => false,
    }
}

/// First-come pairing of statements with identical text.
fn shared_statements(before: &Operation, after: &Operation) -> Vec<SpanPair> {
    let mut used = vec![false; after.statements.len()];
    let mut pairs = Vec::new();
    for stmt in &before.statements {
        if let Some(j) = (0..after.statements.len())
            .find(|j| !used[*j] && after.statements[*j].text == stmt.text)
        {
            used[j] = true;
            pairs.push(SpanPair {
                before: SpanRef::of_statement(&before.path, stmt),
                after: SpanRef::of_statement(&after.path, &after.statements[j]),
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use crate::refactoring::testing::{descriptions, detect_java};

    #[test]
    fn test_merge_with_discriminator_parameter() {
        let before = r#"
class Check {
    boolean inIf(Node n) {
        boolean found = false;
        for (Node t = n.parent(); t != null; t = t.parent()) {
            if (t.type() == IF) {
                found = true;
                break;
            }
        }
        return found;
    }
    boolean inElse(Node n) {
        boolean found = false;
        for (Node t = n.parent(); t != null; t = t.parent()) {
            if (t.type() == ELSE) {
                found = true;
                break;
            }
        }
        return found;
    }
}
"#;
        let after = r#"
class Check {
    boolean inBlock(Node n, int kind) {
        boolean found = false;
        for (Node t = n.parent(); t != null; t = t.parent()) {
            if (t.type() == kind) {
                found = true;
                break;
            }
        }
        return found;
    }
}
"#;
        let found = detect_java(&[("Check.java", before)], &[("Check.java", after)]);

        assert_eq!(
            descriptions(&found),
            ["Merge Method [inIf(n Node) : boolean, inElse(n Node) : boolean] to inBlock(n Node, kind int) : boolean in class Check"]
        );
    }

    #[test]
    fn test_split_method() {
        let before = r#"
class Report {
    void print() {
        header();
        title();
        rows();
        totals();
    }
}
"#;
        let after = r#"
class Report {
    void heading() {
        header();
        title();
    }
    void details() {
        rows();
        totals();
    }
}
"#;
        let found = detect_java(&[("Report.java", before)], &[("Report.java", after)]);

        assert_eq!(
            descriptions(&found),
            ["Split Method print() : void to [heading() : void, details() : void] in class Report"]
        );
    }
}
