//! Project-level AST diff: one [`AstDiff`] per file pair plus the diffs of
//! entities moved across files. Files unchanged between the snapshots get an
//! identity diff.
//!
//! Every matched entity pair and every extract/inline/merge/split pair
//! contributes a subtree mapping to the diff of its file pair. Contributions
//! are computed in parallel and folded in a fixed order (most specific
//! first), so the result never depends on thread scheduling.

use crate::ast::{Ast, NodeId};
use crate::config::{DiffConfig, Thresholds};
use crate::error::{MinerError, Result};
use crate::model::EntityId;
use crate::model_diff::{ModelDiff, compute_diff};
use crate::refactoring::RefactoringGroup;
use crate::snapshot::Snapshot;
use crate::tree::{AstDiff, EditScriptBuilder, MappingStore, TreeMatcher, replay};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

type PairKey = (PathBuf, PathBuf);

/// A file or entity pair whose diff could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffFailure {
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub message: String,
}

/// AST diffs of two snapshots, keyed by `(before path, after path)`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectDiff {
    #[serde(serialize_with = "values")]
    diffs: BTreeMap<PairKey, AstDiff>,
    #[serde(serialize_with = "values")]
    moved: BTreeMap<PairKey, AstDiff>,
    failures: Vec<DiffFailure>,
    #[serde(rename = "model")]
    model_diff: ModelDiff,
}

fn values<S: Serializer>(
    map: &BTreeMap<PairKey, AstDiff>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(map.values())
}

impl ProjectDiff {
    /// Compute the model diff and the project diff of two snapshots.
    pub fn between(before: &Snapshot, after: &Snapshot, config: &DiffConfig) -> Result<Self> {
        let model_diff = compute_diff(before.model(), after.model(), config);
        compute_project_diff(&model_diff, before, after, config)
    }

    /// Diff of one file pair, looking at moved diffs second.
    pub fn ast_diff(&self, src: &Path, dst: &Path) -> Option<&AstDiff> {
        let key = (src.to_path_buf(), dst.to_path_buf());
        self.diffs.get(&key).or_else(|| self.moved.get(&key))
    }

    /// Per-file diffs in path order, unchanged files included.
    pub fn all_diffs(&self) -> impl Iterator<Item = &AstDiff> {
        self.diffs.values()
    }

    /// Diffs of entities moved between files, in path order.
    pub fn moved_diffs(&self) -> impl Iterator<Item = &AstDiff> {
        self.moved.values()
    }

    pub fn failures(&self) -> &[DiffFailure] {
        &self.failures
    }

    pub fn model_diff(&self) -> &ModelDiff {
        &self.model_diff
    }

    /// Whether no file pair carries any action.
    pub fn is_empty(&self) -> bool {
        self.diffs.values().chain(self.moved.values()).all(AstDiff::is_empty)
    }
}

/// Build the per-file AST diffs of `before` and `after`, guided by an
/// already computed model diff.
///
/// Invariant violations only discard the diff they occur in and are reported
/// through [`ProjectDiff::failures`].
pub fn compute_project_diff(
    model_diff: &ModelDiff,
    before: &Snapshot,
    after: &Snapshot,
    config: &DiffConfig,
) -> Result<ProjectDiff> {
    let thresholds = config.thresholds.clone().clamped();
    let keys = file_pairs(model_diff, before, after);
    debug!(pairs = keys.len(), "Diffing file pairs");

    let mut jobs = Vec::new();
    for key in &keys {
        jobs.extend(contribution_jobs(model_diff, before, after, key)?);
    }

    let contributions: Mutex<BTreeMap<PairKey, Vec<Contribution>>> = Mutex::new(BTreeMap::new());
    let run = |job: &Job| {
        let mapping =
            TreeMatcher::new(job.src, job.dst, &thresholds).match_subtrees(job.src_root, job.dst_root);
        let mut map = contributions.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(job.key.clone()).or_default().push(Contribution {
            order: (job.tier, job.seq),
            mapping,
        });
    };
    if config.parallel {
        jobs.par_iter().for_each(run);
    } else {
        jobs.iter().for_each(run);
    }
    let contributions = contributions
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    let mut project = ProjectDiff {
        model_diff: model_diff.clone(),
        ..ProjectDiff::default()
    };

    let build = |(key, parts): (PairKey, Vec<Contribution>)| {
        let result = file_diff(model_diff, before, after, &key, parts);
        (key, result)
    };
    let built: Vec<(PairKey, Result<AstDiff>)> = if config.parallel {
        contributions.into_par_iter().map(build).collect()
    } else {
        contributions.into_iter().map(build).collect()
    };
    for (key, result) in built {
        match result {
            Ok(diff) => {
                project.diffs.insert(key, diff);
            }
            Err(err) => project.record_failure(&key, err)?,
        }
    }

    for (path, ast) in before.files() {
        let key = (path.clone(), path.clone());
        if let Some(other) = after.ast(path)
            && !keys.contains(&key)
            && other.source() == ast.source()
        {
            match AstDiff::identity(ast, other) {
                Ok(diff) => {
                    project.diffs.insert(key, diff);
                }
                Err(err) => project.record_failure(&key, err)?,
            }
        }
    }

    compute_moved_diffs(&mut project, model_diff, before, after, &keys, &thresholds, config)?;

    info!(
        diffs = project.diffs.len(),
        moved = project.moved.len(),
        failures = project.failures.len(),
        "Computed project diff"
    );
    Ok(project)
}

/// Diff independent snapshot pairs in parallel.
pub fn compute_batch(pairs: &[(Snapshot, Snapshot)], config: &DiffConfig) -> Vec<Result<ProjectDiff>> {
    pairs
        .par_iter()
        .map(|(before, after)| ProjectDiff::between(before, after, config))
        .collect()
}

impl ProjectDiff {
    fn record_failure(&mut self, key: &PairKey, err: MinerError) -> Result<()> {
        match err {
            MinerError::InvariantViolation { message, .. } => {
                error!(
                    src = %key.0.display(),
                    dst = %key.1.display(),
                    %message,
                    "Discarding file pair diff"
                );
                self.failures.push(DiffFailure {
                    src_path: key.0.clone(),
                    dst_path: key.1.clone(),
                    message,
                });
                Ok(())
            }
            other => Err(other),
        }
    }
}

struct Job<'a> {
    key: &'a PairKey,
    tier: u8,
    seq: usize,
    src: &'a Ast,
    dst: &'a Ast,
    src_root: NodeId,
    dst_root: NodeId,
}

struct Contribution {
    order: (u8, usize),
    mapping: Result<MappingStore>,
}

/// File pairs to diff: changed files present in both snapshots, plus the
/// files of class pairs whose file was renamed.
fn file_pairs(model_diff: &ModelDiff, before: &Snapshot, after: &Snapshot) -> BTreeSet<PairKey> {
    let mut keys = BTreeSet::new();
    for (path, ast) in before.files() {
        if let Some(other) = after.ast(path)
            && other.source() != ast.source()
        {
            keys.insert((path.clone(), path.clone()));
        }
    }
    for pair in model_diff.matched_pairs() {
        if matches!(pair.before.id, EntityId::Class(_))
            && pair.before.path != pair.after.path
            && after.ast(&pair.before.path).is_none()
            && before.ast(&pair.after.path).is_none()
        {
            keys.insert((pair.before.path.clone(), pair.after.path.clone()));
        }
    }
    keys
}

fn lookup<'a>(snapshot: &'a Snapshot, path: &Path) -> Result<&'a Ast> {
    snapshot
        .ast(path)
        .ok_or_else(|| MinerError::FileNotFound(path.to_path_buf()))
}

/// Subtree pairs contributing to one file pair, tiered from the most
/// specific (operations) to the whole file.
fn contribution_jobs<'a>(
    model_diff: &ModelDiff,
    before: &'a Snapshot,
    after: &'a Snapshot,
    key: &'a PairKey,
) -> Result<Vec<Job<'a>>> {
    let src = lookup(before, &key.0)?;
    let dst = lookup(after, &key.1)?;
    let in_key = |b: &Path, a: &Path| b == key.0 && a == key.1;
    let job = |tier, seq, src_root, dst_root| Job {
        key,
        tier,
        seq,
        src,
        dst,
        src_root,
        dst_root,
    };

    let mut jobs = Vec::new();
    for (seq, pair) in model_diff.matched_pairs().iter().enumerate() {
        if !in_key(&pair.before.path, &pair.after.path) {
            continue;
        }
        match pair.before.id {
            EntityId::Operation(_) => jobs.push(job(0, seq, pair.before.node, pair.after.node)),
            EntityId::Class(_) => jobs.push(job(2, seq, pair.before.node, pair.after.node)),
            EntityId::Attribute(_) => {}
        }
    }

    let mut seq = 0;
    for refactoring in model_diff.refactorings() {
        if !matches!(
            refactoring.group(),
            RefactoringGroup::ExtractInline | RefactoringGroup::MergeSplit
        ) {
            continue;
        }
        for (b, a) in refactoring.kind.entity_pairs() {
            if in_key(&b.path, &a.path) {
                jobs.push(job(1, seq, b.node, a.node));
                seq += 1;
            }
        }
    }

    jobs.push(job(3, 0, src.root(), dst.root()));
    Ok(jobs)
}

/// Fold the contributions of one file pair and turn them into a verified
/// edit script.
fn file_diff(
    model_diff: &ModelDiff,
    before: &Snapshot,
    after: &Snapshot,
    key: &PairKey,
    mut parts: Vec<Contribution>,
) -> Result<AstDiff> {
    let src = lookup(before, &key.0)?;
    let dst = lookup(after, &key.1)?;

    parts.sort_by_key(|c| c.order);
    let mut mapping = MappingStore::between(src, dst);
    for part in parts {
        let dropped = mapping.merge(&part.mapping?);
        if dropped > 0 {
            debug!(order = ?part.order, dropped, "Dropped conflicting mappings");
        }
    }

    let mut builder = EditScriptBuilder::new(src, dst, &mapping);
    for (index, refactoring) in model_diff.refactorings().iter().enumerate() {
        if !refactoring.is_cross_file() {
            continue;
        }
        for (b, a) in refactoring.kind.entity_pairs() {
            if b.path == a.path {
                continue;
            }
            if b.path == key.0 {
                builder = builder.moved_out(b.node, a.path.clone(), Some(index));
            }
            if a.path == key.1 {
                builder = builder.moved_in(a.node, b.path.clone(), Some(index));
            }
        }
    }

    let actions = builder.build()?;
    replay(src, dst, &mapping, src.root(), dst.root(), &actions)?;
    Ok(AstDiff::from_script(src, dst, mapping, actions))
}

/// Diff each entity moved across files against its new location and fold
/// the results per file pair.
fn compute_moved_diffs(
    project: &mut ProjectDiff,
    model_diff: &ModelDiff,
    before: &Snapshot,
    after: &Snapshot,
    keys: &BTreeSet<PairKey>,
    thresholds: &Thresholds,
    config: &DiffConfig,
) -> Result<()> {
    let mut moved = BTreeSet::new();
    for refactoring in model_diff.cross_file_refactorings() {
        for (b, a) in refactoring.kind.entity_pairs() {
            let key = (b.path.clone(), a.path.clone());
            if b.path != a.path && !keys.contains(&key) {
                moved.insert((key, b.node, a.node));
            }
        }
    }
    let moved: Vec<_> = moved.into_iter().collect();

    let diff_one = |(key, b, a): &(PairKey, NodeId, NodeId)| -> Result<AstDiff> {
        let src = lookup(before, &key.0)?;
        let dst = lookup(after, &key.1)?;
        let mapping = TreeMatcher::new(src, dst, thresholds).match_subtrees(*b, *a)?;
        let actions = EditScriptBuilder::new(src, dst, &mapping)
            .with_roots(*b, *a)
            .build()?;
        replay(src, dst, &mapping, *b, *a, &actions)?;
        Ok(AstDiff::from_script(src, dst, mapping, actions))
    };
    let results: Vec<Result<AstDiff>> = if config.parallel {
        moved.par_iter().map(diff_one).collect()
    } else {
        moved.iter().map(diff_one).collect()
    };

    for ((key, _, _), result) in moved.iter().zip(results) {
        match result {
            Ok(diff) => match project.moved.get_mut(key) {
                Some(existing) => {
                    existing.merge(diff);
                }
                None => {
                    project.moved.insert(key.clone(), diff);
                }
            },
            Err(err) => project.record_failure(key, err)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::LanguageRegistry;
    use crate::tree::Action;

    fn snapshot(label: &str, files: &[(&str, &str)]) -> Snapshot {
        let sources = files
            .iter()
            .map(|(p, s)| (PathBuf::from(p), s.to_string()))
            .collect();
        Snapshot::from_sources(label, sources, &LanguageRegistry::new())
    }

    fn kinds(diff: &AstDiff) -> Vec<&str> {
        diff.actions().iter().map(Action::name).collect()
    }

    #[test]
    fn test_identical_snapshots_have_identity_diffs() {
        let files = [("A.java", "class A { int f() { return 1; } }")];
        let before = snapshot("before", &files);
        let after = snapshot("after", &files);
        let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

        assert!(project.is_empty());
        assert!(project.failures().is_empty());
        let ast = before.ast(Path::new("A.java")).unwrap();
        let diff = project
            .ast_diff(Path::new("A.java"), Path::new("A.java"))
            .unwrap();
        assert_eq!(diff.mapping().len(), ast.len());
        assert!(diff.actions().is_empty());
    }

    #[test]
    fn test_unchanged_file_next_to_changed_one_has_identity_diff() {
        let before = snapshot(
            "before",
            &[
                ("A.java", "class A { int f() { return 1; } }"),
                ("B.java", "class B { void g() { h(); } }"),
            ],
        );
        let after = snapshot(
            "after",
            &[
                ("A.java", "class A { int f() { return 2; } }"),
                ("B.java", "class B { void g() { h(); } }"),
            ],
        );
        let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

        assert_eq!(project.all_diffs().count(), 2);
        let b = project
            .ast_diff(Path::new("B.java"), Path::new("B.java"))
            .unwrap();
        assert!(b.is_empty());
        assert_eq!(b.mapping().len(), before.ast(Path::new("B.java")).unwrap().len());
    }

    #[test]
    fn test_changed_literal_is_one_update() {
        let before = snapshot("before", &[("A.java", "class A { int f() { return 1; } }")]);
        let after = snapshot("after", &[("A.java", "class A { int f() { return 2; } }")]);
        let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();

        let diff = project
            .ast_diff(Path::new("A.java"), Path::new("A.java"))
            .unwrap();
        assert_eq!(kinds(diff), vec!["update-node"]);
        assert_eq!(diff.records()[0].label, "2");
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let before = snapshot(
            "before",
            &[
                ("A.java", "class A { void f() { a(); b(); } void g() { c(); } }"),
                ("B.java", "class B { int x; void h() { d(1); } }"),
            ],
        );
        let after = snapshot(
            "after",
            &[
                ("A.java", "class A { void g() { c(); } void f() { b(); a(); } }"),
                ("B.java", "class B { int x; void h() { d(2); e(); } }"),
            ],
        );
        let parallel = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();
        let sequential =
            ProjectDiff::between(&before, &after, &DiffConfig::default().sequential()).unwrap();

        let records = |p: &ProjectDiff| -> Vec<_> {
            p.all_diffs().flat_map(|d| d.records().to_vec()).collect()
        };
        assert_eq!(records(&parallel), records(&sequential));
        assert_eq!(parallel.all_diffs().count(), 2);
    }

    #[test]
    fn test_method_moved_to_other_file_has_moved_diff() {
        let before = snapshot(
            "before",
            &[
                (
                    "A.java",
                    "class A { int total(int a, int b) { int s = a + b; return s * 2; } void keep() { run(); } }",
                ),
                ("B.java", "class B { void other() { go(); } }"),
            ],
        );
        let after = snapshot(
            "after",
            &[
                ("A.java", "class A { void keep() { run(); } }"),
                (
                    "B.java",
                    "class B { void other() { go(); } int total(int a, int b) { int s = a + b; return s * 2; } }",
                ),
            ],
        );
        let project = ProjectDiff::between(&before, &after, &DiffConfig::default()).unwrap();
        assert!(project.failures().is_empty());

        let moved: Vec<_> = project.moved_diffs().collect();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].src_path(), Path::new("A.java"));
        assert_eq!(moved[0].dst_path(), Path::new("B.java"));
        assert!(moved[0].is_empty());

        let a = project
            .ast_diff(Path::new("A.java"), Path::new("A.java"))
            .unwrap();
        assert!(a.actions().iter().any(|x| matches!(x, Action::MoveOut { .. })));
        let b = project
            .ast_diff(Path::new("B.java"), Path::new("B.java"))
            .unwrap();
        assert!(b.actions().iter().any(|x| matches!(x, Action::MoveIn { .. })));
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let a = snapshot("a", &[("A.java", "class A { void f() { x(); } }")]);
        let b = snapshot("b", &[("A.java", "class A { void f() { y(); } }")]);
        let results = compute_batch(
            &[(a.clone(), a.clone()), (a, b)],
            &DiffConfig::default(),
        );

        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().is_empty());
        assert!(!results[1].as_ref().unwrap().is_empty());
    }
}
