//! # Refactor Miner
//!
//! Refactoring detection and fine-grained AST diffing between two versions of
//! a source tree.
//!
//! This crate provides:
//! - Loading snapshots of a source tree from git refs or directories
//! - A structural model (classes, operations, attributes) per snapshot
//! - Entity matching and refactoring detection (rename, move, extract,
//!   inline, merge, split, pull-up/push-down, parameter and variable changes)
//! - GumTree-style node mapping and edit scripts per file pair,
//!   including moves across files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refactor_miner::prelude::*;
//! use git2::Repository;
//!
//! let repo = Repository::open("./my-project")?;
//! let config = DiffConfig::default();
//! let registry = LanguageRegistry::new();
//!
//! let (before, after) = Snapshot::pair_from_git(&repo, "HEAD~1", "HEAD", &config, &registry)?;
//! let project = ProjectDiff::between(&before, &after, &config)?;
//!
//! for refactoring in project.model_diff().refactorings() {
//!     println!("{refactoring}");
//! }
//! for diff in project.all_diffs() {
//!     println!("{}", ActionListing(diff));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Model Diff Only
//!
//! ```rust,no_run
//! use refactor_miner::prelude::*;
//!
//! let config = DiffConfig::default().operation_threshold(0.8);
//! let registry = LanguageRegistry::new();
//! let before = Snapshot::from_directory("./v1", &config, &registry)?;
//! let after = Snapshot::from_directory("./v2", &config, &registry)?;
//!
//! let diff = compute_diff(before.model(), after.model(), &config);
//! println!("{}", serde_json::to_string_pretty(&diff)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Supported Languages
//!
//! - Java (`.java`)
//! - Python (`.py`, `.pyi`)

pub mod ast;
pub mod config;
pub mod error;
pub mod lang;
pub mod matcher;
pub mod model;
pub mod model_diff;
pub mod project;
pub mod refactoring;
pub mod render;
pub mod snapshot;
pub mod tree;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::ast::{Ast, AstBuilder, NodeCategory, NodeId, Role, Span};
    pub use crate::config::{DiffConfig, Thresholds};
    pub use crate::error::{MinerError, Result};
    pub use crate::lang::{Java, Language, LanguageRegistry, Python};
    pub use crate::matcher::{EntityMatcher, EntityMatching, MatchedPair};
    pub use crate::model::{
        Attribute, Class, EntityId, EntityRef, Operation, StructuralModel, build_model,
    };
    pub use crate::model_diff::{EntityPair, ModelDiff, compute_diff};
    pub use crate::project::{DiffFailure, ProjectDiff, compute_batch, compute_project_diff};
    pub use crate::refactoring::{Justification, Refactoring, RefactoringGroup, RefactoringKind};
    pub use crate::render::{ActionListing, DiffSummary, colorized_diff, unified_diff};
    pub use crate::snapshot::{GitReader, SkippedFile, Snapshot};
    pub use crate::tree::{
        Action, ActionRecord, AstDiff, EditScriptBuilder, MappingStore, TreeMatcher,
    };
}

pub use prelude::*;
