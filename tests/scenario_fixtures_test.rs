//! Integration tests over the Java fixtures.
//!
//! Each fixture directory holds successive versions of a small code base.
//! The tests load two versions as snapshots and check the reported
//! refactorings and the per-file edit scripts.

use refactor_miner::prelude::*;
use std::path::{Path, PathBuf};

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

fn load(rel: &str) -> Snapshot {
    Snapshot::from_directory(fixture(rel), &DiffConfig::default(), &LanguageRegistry::new())
        .unwrap()
}

fn descriptions(diff: &ModelDiff) -> Vec<String> {
    diff.refactorings()
        .iter()
        .map(|r| r.description.clone())
        .collect()
}

fn action_names(diff: &AstDiff) -> Vec<&'static str> {
    diff.actions().iter().map(Action::name).collect()
}

#[test]
fn test_final_local_variable_rename_and_merge() {
    let before = load("final_local_variable/before");
    let after = load("final_local_variable/after");
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert_eq!(
        descriptions(project.model_diff()),
        [
            "Rename Method markFinalVariableCandidateAsAssignInElseBlock(ast DetailAST) : void renamed to markFinalVariableCandidateAsAssignedInElseBlock(ast DetailAST) : void in class FinalLocalVariableCheck",
            "Rename Method markFinalVariableCandidateAsAssignInIfBlock(ast DetailAST) : void renamed to markFinalVariableCandidateAsAssignedInIfBlock(ast DetailAST) : void in class FinalLocalVariableCheck",
            "Rename Method markFinalVariableCandidateAsAssignOutsideIfOrElseBlock(ast DetailAST) : void renamed to markFinalVariableCandidateAsAssignedOutsideIfOrElseBlock(ast DetailAST) : void in class FinalLocalVariableCheck",
            "Merge Method [isInIfBlock(node DetailAST) : boolean, isInElseBlock(node DetailAST) : boolean] to isInSpecificCodeBlock(node DetailAST, blockType int) : boolean in class FinalLocalVariableCheck",
        ]
    );

    let merge = project
        .model_diff()
        .refactorings()
        .iter()
        .find(|r| matches!(r.kind, RefactoringKind::MergeMethod { .. }))
        .unwrap();
    assert!(!merge.justification.pairs.is_empty());

    assert!(project.failures().is_empty());
    let path = Path::new("FinalLocalVariableCheck.java");
    let diff = project.ast_diff(path, path).unwrap();
    assert!(action_names(diff).contains(&"update-node"));
}

#[test]
fn test_customer_extract_amount_for() {
    let before = load("customer/v1");
    let after = load("customer/v2");
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert_eq!(
        descriptions(project.model_diff()),
        ["Extract Method amountFor(each Rental) : double extracted from statement() : String in class Customer"]
    );
    let extract = &project.model_diff().refactorings()[0];
    assert!(matches!(extract.kind, RefactoringKind::ExtractMethod { .. }));
    assert!(extract.justification.pairs.len() >= 10);

    assert!(project.failures().is_empty());
    assert_eq!(project.all_diffs().filter(|d| !d.is_empty()).count(), 1);
    let path = Path::new("Customer.java");
    let names = action_names(project.ast_diff(path, path).unwrap());
    assert!(names.contains(&"move-tree"));
    assert!(names.contains(&"insert-node"));
}

#[test]
fn test_parameter_rename_is_only_label_updates() {
    let before = load("customer/v2");
    let after = load("customer/v3");
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert_eq!(
        descriptions(project.model_diff()),
        ["Rename Parameter each Rental to aRental Rental in method amountFor(aRental Rental) : double from class Customer"]
    );

    assert!(project.failures().is_empty());
    let path = Path::new("Customer.java");
    let diff = project.ast_diff(path, path).unwrap();
    assert_eq!(action_names(diff), ["update-node"; 7]);
    for record in diff.records() {
        assert_eq!(record.node_type, "identifier");
        assert_eq!(record.label, "aRental");
    }
}

#[test]
fn test_scenarios_render_summaries() {
    let before = load("customer/v1");
    let after = load("customer/v2");
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    let path = Path::new("Customer.java");
    let diff = project.ast_diff(path, path).unwrap();
    let summary = DiffSummary::from_ast_diff(
        diff,
        before.ast(path).unwrap().source(),
        after.ast(path).unwrap().source(),
    );

    assert_eq!(summary.files_changed, 1);
    assert!(summary.insertions > 0 && summary.deletions > 0);
    assert!(summary.actions.contains_key("move-tree"));
    assert!(ActionListing(diff).to_string().starts_with("Customer.java -> Customer.java"));
}
