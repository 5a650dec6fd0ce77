//! Loading source snapshots from git refs or directories.
//!
//! A [`Snapshot`] is the parsed view of one version of a source tree: one
//! [`Ast`] per successfully parsed file, the [`StructuralModel`] built from
//! them and the list of files that could not be parsed.

use crate::ast::Ast;
use crate::config::DiffConfig;
use crate::error::{MinerError, Result};
use crate::lang::LanguageRegistry;
use crate::model::{StructuralModel, build_model};
use git2::{Delta, DiffOptions, Repository};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file excluded from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Parsed version of a source tree.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    label: String,
    files: BTreeMap<PathBuf, Ast>,
    model: StructuralModel,
    skipped: Vec<SkippedFile>,
}

impl Snapshot {
    /// Parse a set of `(path, content)` pairs. Unparseable files are recorded
    /// as skipped, never fatal.
    pub fn from_sources(
        label: impl Into<String>,
        sources: BTreeMap<PathBuf, String>,
        registry: &LanguageRegistry,
    ) -> Self {
        let label = label.into();
        let parsed: Vec<(PathBuf, Result<Ast>)> = sources
            .into_par_iter()
            .map(|(path, content)| {
                let ast = registry.parse(&path, &content);
                (path, ast)
            })
            .collect();

        let mut files = BTreeMap::new();
        let mut skipped = Vec::new();
        for (path, result) in parsed {
            match result {
                Ok(ast) => {
                    files.insert(path, ast);
                }
                Err(e) => {
                    warn!(snapshot = %label, path = %path.display(), error = %e, "Skipping file");
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        let model = build_model(files.values());
        debug!(snapshot = %label, files = files.len(), skipped = skipped.len(), "Loaded snapshot");
        Self {
            label,
            files,
            model,
            skipped,
        }
    }

    /// Load every matching file below a directory.
    pub fn from_directory(
        root: impl AsRef<Path>,
        config: &DiffConfig,
        registry: &LanguageRegistry,
    ) -> Result<Self> {
        let root = root.as_ref();
        let sources = directory_contents(root, config)?;
        Ok(Self::from_sources(root.display().to_string(), sources, registry))
    }

    /// Load every matching file at a git ref.
    pub fn from_git(
        repo: &Repository,
        reference: &str,
        config: &DiffConfig,
        registry: &LanguageRegistry,
    ) -> Result<Self> {
        let reader = GitReader::new(repo, config)?;
        let sources = reader.file_contents(reference, None)?;
        Ok(Self::from_sources(reference, sources, registry))
    }

    /// Load the files touched between two refs, on both sides.
    pub fn pair_from_git(
        repo: &Repository,
        from_ref: &str,
        to_ref: &str,
        config: &DiffConfig,
        registry: &LanguageRegistry,
    ) -> Result<(Self, Self)> {
        let reader = GitReader::new(repo, config)?;
        let changed = reader.changed_paths(from_ref, to_ref)?;
        debug!(from = from_ref, to = to_ref, files = changed.len(), "Changed files");
        let before = reader.file_contents(from_ref, Some(&changed))?;
        let after = reader.file_contents(to_ref, Some(&changed))?;
        Ok((
            Self::from_sources(from_ref, before, registry),
            Self::from_sources(to_ref, after, registry),
        ))
    }

    /// Name of the ref or directory the snapshot came from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn model(&self) -> &StructuralModel {
        &self.model
    }

    pub fn ast(&self, path: &Path) -> Option<&Ast> {
        self.files.get(path)
    }

    /// Parsed files, sorted by path.
    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Ast)> {
        self.files.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }
}

/// Reads file contents from a git repository.
pub struct GitReader<'a> {
    repo: &'a Repository,
    extensions: Vec<String>,
    exclude: GlobSet,
}

impl<'a> GitReader<'a> {
    /// Create a reader filtering files by the configured extensions and excludes.
    pub fn new(repo: &'a Repository, config: &DiffConfig) -> Result<Self> {
        Ok(Self {
            repo,
            extensions: config.extensions.clone(),
            exclude: build_glob_set(&config.exclude_patterns)?,
        })
    }

    /// Contents of all matching files at a ref, optionally restricted to a set
    /// of paths.
    pub fn file_contents(
        &self,
        reference: &str,
        only: Option<&BTreeSet<PathBuf>>,
    ) -> Result<BTreeMap<PathBuf, String>> {
        let tree = self.get_tree(reference)?;
        let mut files = BTreeMap::new();

        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob) {
                return git2::TreeWalkResult::Ok;
            }
            let path = PathBuf::from(format!("{}{}", dir, entry.name().unwrap_or("")));
            if !self.accepts(&path) || only.is_some_and(|set| !set.contains(&path)) {
                return git2::TreeWalkResult::Ok;
            }
            if let Ok(blob) = self.repo.find_blob(entry.id())
                && let Ok(content) = std::str::from_utf8(blob.content())
            {
                files.insert(path, content.to_string());
            }
            git2::TreeWalkResult::Ok
        })?;

        Ok(files)
    }

    /// Paths added, deleted, modified or renamed between two refs (old and new
    /// names of renames both included).
    pub fn changed_paths(&self, from_ref: &str, to_ref: &str) -> Result<BTreeSet<PathBuf>> {
        let from_tree = self.get_tree(from_ref)?;
        let to_tree = self.get_tree(to_ref)?;

        let mut opts = DiffOptions::new();
        opts.ignore_whitespace(true);
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut opts))?;

        let mut paths = BTreeSet::new();
        for delta in diff.deltas() {
            if !matches!(
                delta.status(),
                Delta::Added | Delta::Deleted | Delta::Modified | Delta::Renamed
            ) {
                continue;
            }
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path()
                    && self.accepts(path)
                {
                    paths.insert(path.to_path_buf());
                }
            }
        }
        Ok(paths)
    }

    /// First-parent commits after `from_ref` up to and including `to_ref`,
    /// oldest first, as `(parent, commit)` id pairs.
    pub fn commit_range(&self, from_ref: &str, to_ref: &str) -> Result<Vec<(String, String)>> {
        let resolve = |reference: &str| {
            self.repo
                .revparse_single(reference)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(|e| MinerError::InvalidRef {
                    reference: reference.to_string(),
                    message: e.message().to_string(),
                })
        };
        let from = resolve(from_ref)?;
        let to = resolve(to_ref)?;

        let mut walk = self.repo.revwalk()?;
        walk.simplify_first_parent()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
        walk.push(to.id())?;
        walk.hide(from.id())?;

        let mut pairs = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            if let Ok(parent) = commit.parent(0) {
                pairs.push((parent.id().to_string(), commit.id().to_string()));
            }
        }
        Ok(pairs)
    }

    fn accepts(&self, path: &Path) -> bool {
        extension_matches(path, &self.extensions) && !self.exclude.is_match(path)
    }

    fn get_tree(&self, reference: &str) -> Result<git2::Tree<'a>> {
        let obj = self
            .repo
            .revparse_single(reference)
            .map_err(|e| MinerError::InvalidRef {
                reference: reference.to_string(),
                message: e.message().to_string(),
            })?;
        let tree = obj.peel_to_tree().map_err(|e| MinerError::InvalidRef {
            reference: reference.to_string(),
            message: format!("could not get tree: {}", e.message()),
        })?;
        Ok(tree)
    }
}

/// Contents of all matching files below a directory, keyed by path relative
/// to the root.
pub fn directory_contents(root: &Path, config: &DiffConfig) -> Result<BTreeMap<PathBuf, String>> {
    if !root.is_dir() {
        return Err(MinerError::FileNotFound(root.to_path_buf()));
    }
    let exclude = build_glob_set(&config.exclude_patterns)?;
    let mut files = BTreeMap::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !extension_matches(path, &config.extensions) {
            continue;
        }
        let rel_path = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(rel_path) {
            continue;
        }
        match fs::read_to_string(path) {
            Ok(content) => {
                files.insert(rel_path.to_path_buf(), content);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Unreadable file"),
        }
    }
    Ok(files)
}

fn extension_matches(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
