//! Integration tests for the refactor-miner crate.

use git2::{Repository, Signature};
use refactor_miner::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BEFORE: &str = r#"
class Shop {
    private int stock;

    int total(int price, int qty) {
        int sum = price * qty;
        if (sum > 100) {
            sum = sum - 10;
        }
        log(sum);
        return sum;
    }

    void restock(int n) {
        stock = stock + n;
    }
}
"#;

const AFTER: &str = r#"
class Shop {
    private int stock;

    int total(int price, int quantity) {
        int sum = price * quantity;
        sum = discounted(sum);
        log(sum);
        return sum;
    }

    int discounted(int sum) {
        if (sum > 100) {
            sum = sum - 10;
        }
        return sum;
    }

    void refill(int n) {
        stock = stock + n;
    }
}
"#;

fn snapshot(label: &str, files: &[(&str, &str)]) -> Snapshot {
    let sources = files
        .iter()
        .map(|(p, s)| (p.into(), s.to_string()))
        .collect();
    Snapshot::from_sources(label, sources, &LanguageRegistry::new())
}

fn entity_count(model: &StructuralModel) -> usize {
    model.classes().len() + model.operations().len() + model.attributes().len()
}

#[test]
fn test_identity_is_empty() {
    let before = snapshot("before", &[("Shop.java", BEFORE)]);
    let after = snapshot("after", &[("Shop.java", BEFORE)]);
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert!(project.model_diff().is_empty());
    assert!(project.model_diff().refactorings().is_empty());
    assert_eq!(
        project.model_diff().matched_pairs().len(),
        entity_count(before.model())
    );
    assert!(
        project
            .model_diff()
            .matched_pairs()
            .iter()
            .all(|p| p.score == 1.0)
    );
    assert!(project.is_empty());

    let ast = before.ast(Path::new("Shop.java")).unwrap();
    let diff = project
        .ast_diff(Path::new("Shop.java"), Path::new("Shop.java"))
        .unwrap();
    assert_eq!(diff.mapping().len(), ast.len());
    assert!(diff.actions().is_empty());
}

#[test]
fn test_matching_is_total() {
    let before = snapshot("before", &[("Shop.java", BEFORE)]);
    let after = snapshot("after", &[("Shop.java", AFTER)]);
    let diff = compute_diff(before.model(), after.model(), &DiffConfig::default());

    let matched = diff.matched_pairs().len();
    assert_eq!(matched + diff.removed_entities().len(), entity_count(before.model()));
    assert_eq!(matched + diff.added_entities().len(), entity_count(after.model()));
}

#[test]
fn test_every_node_is_mapped_or_touched_once() {
    let before = snapshot(
        "before",
        &[
            (
                "A.java",
                "class A { int total(int a, int b) { int s = a + b; return s * 2; } void keep() { run(1); } }",
            ),
            ("B.java", "class B { void other() { go(); } }"),
        ],
    );
    let after = snapshot(
        "after",
        &[
            ("A.java", "class A { void keep() { run(2); stop(); } }"),
            (
                "B.java",
                "class B { void other() { go(); } int total(int a, int b) { int s = a + b; return s * 2; } }",
            ),
        ],
    );
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();
    assert!(project.failures().is_empty());
    assert!(
        project
            .model_diff()
            .refactorings()
            .iter()
            .any(|r| r.is_cross_file())
    );

    for diff in project.all_diffs() {
        let src = before.ast(diff.src_path()).unwrap();
        let dst = after.ast(diff.dst_path()).unwrap();
        for id in src.ids() {
            let mapped = diff.mapping().has_src(id);
            assert!(
                mapped != diff.is_removed(id),
                "{}: source node {id:?} mapped={mapped} removed={}",
                src.path().display(),
                diff.is_removed(id)
            );
        }
        for id in dst.ids() {
            let mapped = diff.mapping().has_dst(id);
            assert!(
                mapped != diff.is_added(id),
                "{}: destination node {id:?} mapped={mapped} added={}",
                dst.path().display(),
                diff.is_added(id)
            );
        }
    }
}

#[test]
fn test_detects_mixed_refactorings() {
    let before = snapshot("before", &[("Shop.java", BEFORE)]);
    let after = snapshot("after", &[("Shop.java", AFTER)]);
    let diff = compute_diff(before.model(), after.model(), &DiffConfig::default());

    let names: Vec<&str> = diff.refactorings().iter().map(|r| r.kind.display_name()).collect();
    assert!(names.contains(&"Rename Method"));
    assert!(names.contains(&"Extract Method"));
    assert!(names.contains(&"Rename Parameter"));
}

#[test]
fn test_results_are_deterministic() {
    let before = snapshot("before", &[("Shop.java", BEFORE), ("Other.java", "class Other { void f() { a(); } }")]);
    let after = snapshot("after", &[("Shop.java", AFTER), ("Other.java", "class Other { void f() { b(); a(); } }")]);
    let config = DiffConfig::default();

    let first = ProjectDiff::between(&before, &after, &config).unwrap();
    let second = ProjectDiff::between(&before, &after, &config).unwrap();
    let sequential = ProjectDiff::between(&before, &after, &config.clone().sequential()).unwrap();

    let json = |p: &ProjectDiff| serde_json::to_string(p).unwrap();
    assert_eq!(json(&first), json(&second));
    assert_eq!(json(&first), json(&sequential));
}

#[test]
fn test_every_diff_round_trips() {
    let before = snapshot("before", &[("Shop.java", BEFORE)]);
    let after = snapshot("after", &[("Shop.java", AFTER)]);
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert!(project.failures().is_empty());
    for diff in project.all_diffs() {
        let src = before.ast(diff.src_path()).unwrap();
        let dst = after.ast(diff.dst_path()).unwrap();
        refactor_miner::tree::replay(src, dst, diff.mapping(), src.root(), dst.root(), diff.actions())
            .unwrap();
    }
}

#[test]
fn test_unparseable_file_is_skipped() {
    let before = snapshot("before", &[("Shop.java", BEFORE), ("Bad.java", "class Bad { void f( }")]);
    let after = snapshot("after", &[("Shop.java", BEFORE), ("Bad.java", "class Bad { void g( }")]);
    let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

    assert_eq!(before.skipped().len(), 1);
    assert!(project.ast_diff(Path::new("Bad.java"), Path::new("Bad.java")).is_none());
    assert!(project.is_empty());
}

#[test]
fn test_python_module_functions() {
    let before = snapshot(
        "before",
        &[("calc.py", "def area(w, h):\n    r = w * h\n    return r\n")],
    );
    let after = snapshot(
        "after",
        &[("calc.py", "def surface(w, h):\n    r = w * h\n    return r\n")],
    );
    let diff = compute_diff(before.model(), after.model(), &DiffConfig::default());

    assert_eq!(diff.refactorings().len(), 1);
    assert_eq!(diff.refactorings()[0].kind.display_name(), "Rename Method");
}

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Test", "test@example.com").unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parents: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

#[test]
fn test_git_commits() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("Shop.java"), BEFORE).unwrap();
    fs::write(dir.path().join("README.md"), "# shop").unwrap();
    commit_all(&repo, "initial");
    fs::write(dir.path().join("Shop.java"), AFTER).unwrap();
    fs::write(dir.path().join("README.md"), "# shop v2").unwrap();
    commit_all(&repo, "refactor");

    let config = DiffConfig::default();
    let registry = LanguageRegistry::new();
    let (before, after) =
        Snapshot::pair_from_git(&repo, "HEAD~1", "HEAD", &config, &registry).unwrap();

    assert_eq!(before.paths().count(), 1);
    let project = ProjectDiff::between(&before, &after, &config).unwrap();
    assert!(!project.model_diff().refactorings().is_empty());
    assert!(project.ast_diff(Path::new("Shop.java"), Path::new("Shop.java")).is_some());

    let reader = GitReader::new(&repo, &config).unwrap();
    let range = reader.commit_range("HEAD~1", "HEAD").unwrap();
    assert_eq!(range.len(), 1);

    let pairs = vec![(before, after)];
    let results = compute_batch(&pairs, &config);
    assert!(results[0].is_ok());
}

#[test]
fn test_invalid_ref() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    fs::write(dir.path().join("A.java"), "class A {}").unwrap();
    commit_all(&repo, "initial");

    let result = Snapshot::from_git(
        &repo,
        "no-such-branch",
        &DiffConfig::default(),
        &LanguageRegistry::new(),
    );
    assert!(matches!(result, Err(MinerError::InvalidRef { .. })));
}
