//! Local variable refactorings of matched operations, and attribute type
//! changes.

use super::rename::statement_justification;
use super::{
    DetectionContext, Justification, Refactoring, RefactoringKind, SpanPair, SpanRef, substitute,
};
use crate::ast::normalize_code;
use crate::model::{Operation, Statement, Variable};
use std::collections::{BTreeMap, BTreeSet};

pub(super) fn detect(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for pair in &ctx.matching.operations {
        let b = ctx.before.operation(pair.before);
        let a = ctx.after.operation(pair.after);
        out.extend(variable_changes(ctx, b, a));
    }
    out.extend(attribute_type_changes(ctx));
    out
}

/// First declaration of each name; shadowing redeclarations are ignored.
fn declarations<'m>(
    variables: impl Iterator<Item = &'m Variable>,
) -> BTreeMap<&'m str, &'m Variable> {
    let mut out = BTreeMap::new();
    for v in variables {
        out.entry(v.name.as_str()).or_insert(v);
    }
    out
}

fn variable_changes(ctx: &DetectionContext, b: &Operation, a: &Operation) -> Vec<Refactoring> {
    let old_vars = declarations(ctx.before.variables_of(b.id));
    let new_vars = declarations(ctx.after.variables_of(a.id));
    let mut out = Vec::new();
    let make = |kind: RefactoringKind, justification: Justification| {
        Refactoring::new(kind).with_justification(justification)
    };
    let before = || ctx.before.operation_ref(b.id);
    let after = || ctx.after.operation_ref(a.id);

    for (name, old) in &old_vars {
        if let Some(new) = new_vars.get(name)
            && old.type_name.is_some()
            && new.type_name.is_some()
            && old.type_name != new.type_name
        {
            out.push(make(
                RefactoringKind::ChangeVariableType {
                    before: before(),
                    after: after(),
                    old: (*old).clone(),
                    new: (*new).clone(),
                },
                declaration_pair(old, new),
            ));
        }
    }

    let mut removed: Vec<&Variable> = old_vars
        .iter()
        .filter(|(name, _)| !new_vars.contains_key(*name))
        .map(|(_, v)| *v)
        .collect();
    let mut added: Vec<&Variable> = new_vars
        .iter()
        .filter(|(name, _)| !old_vars.contains_key(*name))
        .map(|(_, v)| *v)
        .collect();
    removed.sort_by_key(|v| v.span.start_byte);
    added.sort_by_key(|v| v.span.start_byte);

    let after_texts: BTreeSet<&str> = a.statements.iter().map(|s| s.text.as_str()).collect();
    let mut renamed = Vec::new();
    for old in &removed {
        let best = added
            .iter()
            .map(|new| (rename_support(b, old, new, &after_texts), *new))
            .filter(|(support, _)| *support > 0)
            .max_by(|x, y| {
                x.0.cmp(&y.0)
                    .then_with(|| y.1.span.start_byte.cmp(&x.1.span.start_byte))
            });
        if let Some((_, new)) = best {
            added.retain(|v| v.name != new.name);
            renamed.push((*old, new));
        }
    }
    removed.retain(|v| !renamed.iter().any(|(old, _)| old.name == v.name));

    for (old, new) in renamed {
        let justification = statement_justification(b, a);
        if old.type_name.is_some() && new.type_name.is_some() && old.type_name != new.type_name {
            out.push(make(
                RefactoringKind::ChangeVariableType {
                    before: before(),
                    after: after(),
                    old: old.clone(),
                    new: new.clone(),
                },
                declaration_pair(old, new),
            ));
        }
        out.push(make(
            RefactoringKind::RenameVariable {
                before: before(),
                after: after(),
                old: old.clone(),
                new: new.clone(),
            },
            justification,
        ));
    }

    for new in added {
        let pairs = replaced_uses(a, new, b);
        if !pairs.is_empty() {
            let pairs = pairs
                .into_iter()
                .map(|(use_site, original)| SpanPair {
                    before: SpanRef::of_statement(&b.path, original),
                    after: SpanRef::of_statement(&a.path, use_site),
                })
                .collect();
            out.push(make(
                RefactoringKind::ExtractVariable {
                    before: before(),
                    after: after(),
                    variable: new.clone(),
                },
                Justification::new(pairs),
            ));
        }
    }

    for old in removed {
        let pairs = replaced_uses(b, old, a);
        if !pairs.is_empty() {
            let pairs = pairs
                .into_iter()
                .map(|(use_site, inlined)| SpanPair {
                    before: SpanRef::of_statement(&b.path, use_site),
                    after: SpanRef::of_statement(&a.path, inlined),
                })
                .collect();
            out.push(make(
                RefactoringKind::InlineVariable {
                    before: before(),
                    after: after(),
                    variable: old.clone(),
                },
                Justification::new(pairs),
            ));
        }
    }

    out
}

fn declaration_pair(old: &Variable, new: &Variable) -> Justification {
    Justification::new(vec![SpanPair {
        before: SpanRef {
            path: old.path.clone(),
            node: old.node,
            span: old.span,
        },
        after: SpanRef {
            path: new.path.clone(),
            node: new.node,
            span: new.span,
        },
    }])
}

fn mentions(text: &str, name: &str) -> bool {
    regex::Regex::new(&format!(r"\b{}\b", regex::escape(name))).is_ok_and(|re| re.is_match(text))
}

/// Number of statements mentioning `old` that reappear verbatim once `old`
/// is replaced by `new`. Zero unless at least half of them do.
fn rename_support(
    b: &Operation,
    old: &Variable,
    new: &Variable,
    after_texts: &BTreeSet<&str>,
) -> usize {
    let bindings = [(old.name.clone(), new.name.clone())];
    let using: Vec<&Statement> = b
        .statements
        .iter()
        .filter(|s| mentions(&s.text, &old.name))
        .collect();
    let found = using
        .iter()
        .filter(|s| {
            let renamed = normalize_code(&substitute(&s.text, &bindings));
            after_texts.contains(renamed.as_str())
        })
        .count();
    if found * 2 >= using.len() { found } else { 0 }
}

/// Statements of `side` using `variable` that, with the variable replaced by
/// its initializer, equal a statement of `other` that is not already present
/// in `side`. Each hit is paired with its counterpart.
fn replaced_uses<'o>(
    side: &'o Operation,
    variable: &Variable,
    other: &'o Operation,
) -> Vec<(&'o Statement, &'o Statement)> {
    let Some(init) = variable.initializer.as_deref() else {
        return Vec::new();
    };
    let own: BTreeSet<&str> = side.statements.iter().map(|s| s.text.as_str()).collect();
    let replacements = [init.to_string(), format!("({init})")];

    let mut out = Vec::new();
    for statement in &side.statements {
        if statement.span == variable.span || !mentions(&statement.text, &variable.name) {
            continue;
        }
        let hit = replacements.iter().find_map(|r| {
            let bindings = [(variable.name.clone(), r.clone())];
            let text = normalize_code(&substitute(&statement.text, &bindings));
            other
                .statements
                .iter()
                .find(|o| o.text == text && !own.contains(o.text.as_str()))
        });
        if let Some(counterpart) = hit {
            out.push((statement, counterpart));
        }
    }
    out
}

fn attribute_type_changes(ctx: &DetectionContext) -> Vec<Refactoring> {
    let mut out = Vec::new();
    for pair in &ctx.matching.attributes {
        let b = ctx.before.attribute(pair.before);
        let a = ctx.after.attribute(pair.after);
        if b.type_name.is_none() || a.type_name.is_none() || b.type_name == a.type_name {
            continue;
        }
        if ctx.matching.class_after(b.class) != Some(a.class) {
            continue;
        }
        let before = ctx.before.attribute_ref(b.id);
        let after = ctx.after.attribute_ref(a.id);
        let justification = Justification::declarations(&before, &after);
        out.push(
            Refactoring::new(RefactoringKind::ChangeAttributeType { before, after })
                .with_justification(justification),
        );
    }
    out
}
