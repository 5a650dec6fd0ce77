//! Fine-grained AST diffing: node mapping, edit scripts and their replay.
//!
//! ```text
//! TreeMatcher ──► MappingStore ──► EditScriptBuilder ──► Vec<Action>
//!                                                           │
//!                                                 replay ◄──┘ (round-trip check)
//! ```

mod action;
mod edit_script;
mod mapping;
mod matcher;
mod replay;

pub use action::{Action, ActionRecord, group_multi_moves};
pub use edit_script::EditScriptBuilder;
pub use mapping::MappingStore;
pub use matcher::TreeMatcher;
pub use replay::replay;

use crate::ast::{Ast, NodeId};
use crate::config::Thresholds;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Mapping and edit script for one source/destination file pair.
#[derive(Debug, Clone, Serialize)]
pub struct AstDiff {
    src_path: PathBuf,
    dst_path: PathBuf,
    #[serde(skip)]
    mapping: MappingStore,
    #[serde(skip)]
    actions: Vec<Action>,
    #[serde(rename = "actions")]
    records: Vec<ActionRecord>,
    /// Source nodes deleted or carried away by a move-out.
    #[serde(skip)]
    removed: BTreeSet<NodeId>,
    /// Destination nodes inserted or brought in by a move-in.
    #[serde(skip)]
    added: BTreeSet<NodeId>,
}

impl AstDiff {
    /// Match two whole trees, build the edit script and verify it replays.
    pub fn compute(src: &Ast, dst: &Ast, thresholds: &Thresholds) -> Result<Self> {
        let mapping = TreeMatcher::new(src, dst, thresholds).match_trees()?;
        let actions = EditScriptBuilder::new(src, dst, &mapping).build()?;
        replay(src, dst, &mapping, src.root(), dst.root(), &actions)?;
        Ok(Self::from_script(src, dst, mapping, actions))
    }

    /// Wrap an already built script.
    pub fn from_script(src: &Ast, dst: &Ast, mapping: MappingStore, actions: Vec<Action>) -> Self {
        let records = actions.iter().map(|a| a.record(src, dst)).collect();
        let mut removed = BTreeSet::new();
        let mut added = BTreeSet::new();
        for action in &actions {
            collect_touched(action, src, dst, &mut removed, &mut added);
        }
        Self {
            src_path: src.path().to_path_buf(),
            dst_path: dst.path().to_path_buf(),
            mapping,
            actions,
            records,
            removed,
            added,
        }
    }

    /// Diff of a file against an unchanged copy of itself: every node maps
    /// to its twin and the script is empty.
    pub fn identity(src: &Ast, dst: &Ast) -> Result<Self> {
        let mut mapping = MappingStore::between(src, dst);
        mapping.add_recursively(src, src.root(), dst, dst.root())?;
        Ok(Self::from_script(src, dst, mapping, Vec::new()))
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    pub fn dst_path(&self) -> &Path {
        &self.dst_path
    }

    pub fn mapping(&self) -> &MappingStore {
        &self.mapping
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Serializable action descriptions, in script order.
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Whether the two sides are identical.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether a source node is deleted, alone or inside a moved-out subtree.
    pub fn is_removed(&self, src: NodeId) -> bool {
        self.removed.contains(&src)
    }

    /// Whether a destination node is inserted, alone or inside a moved-in
    /// subtree.
    pub fn is_added(&self, dst: NodeId) -> bool {
        self.added.contains(&dst)
    }

    /// Fold another diff of the same file pair into this one. Mappings are
    /// united without mapping a node twice; actions are appended. Returns
    /// the number of dropped conflicting pairs.
    pub fn merge(&mut self, other: AstDiff) -> usize {
        let dropped = self.mapping.merge(&other.mapping);
        self.actions.extend(other.actions);
        self.records.extend(other.records);
        self.removed.extend(other.removed);
        self.added.extend(other.added);
        dropped
    }
}

fn collect_touched(
    action: &Action,
    src: &Ast,
    dst: &Ast,
    removed: &mut BTreeSet<NodeId>,
    added: &mut BTreeSet<NodeId>,
) {
    match action {
        Action::Delete { node } => {
            removed.insert(*node);
        }
        Action::MoveOut { node, .. } => removed.extend(src.pre_order(*node)),
        Action::Insert { node, .. } => {
            added.insert(*node);
        }
        Action::MoveIn { node, .. } => added.extend(dst.pre_order(*node)),
        Action::MultiMove { members } => {
            for member in members {
                collect_touched(member, src, dst, removed, added);
            }
        }
        Action::Update { .. } | Action::Move { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testing::tree;

    #[test]
    fn test_compute_round_trips() {
        let src = tree("block(stmt(call(id:a id:x)) stmt(call(id:b id:y)) ret:r)");
        let dst = tree("block(stmt(call(id:b id:y)) stmt(call(id:a id:z)) ret:r)");
        let diff = AstDiff::compute(&src, &dst, &Thresholds::default()).unwrap();

        assert!(!diff.is_empty());
        assert_eq!(diff.records().len(), diff.actions().len());
        assert!(diff.records().iter().all(|r| r.src_path == Path::new("test.src")));
    }

    #[test]
    fn test_merge_appends_actions() {
        let src = tree("a(b:x)");
        let dst = tree("a(b:y)");
        let mut left = AstDiff::compute(&src, &dst, &Thresholds::default()).unwrap();
        let right = AstDiff::compute(&src, &dst, &Thresholds::default()).unwrap();
        let before = left.mapping().len();

        assert_eq!(left.merge(right), 0);
        assert_eq!(left.mapping().len(), before);
        assert_eq!(left.actions().len(), 2);
    }

    #[test]
    fn test_identity_maps_every_node() {
        let src = tree("block(stmt(call(id:a id:x)) ret:r)");
        let diff = AstDiff::identity(&src, &src).unwrap();

        assert!(diff.is_empty());
        assert!(diff.records().is_empty());
        assert_eq!(diff.mapping().len(), src.len());
        assert!(src.ids().all(|id| diff.mapping().dst_for(id) == Some(id)));
    }

    #[test]
    fn test_moved_out_subtree_counts_as_removed() {
        let src = tree("block(m(stmt:x stmt:y) k:z)");
        let dst = tree("block(k:z)");
        let mut mapping = MappingStore::between(&src, &dst);
        mapping.add(src.root(), dst.root()).unwrap();
        mapping.add(NodeId(4), NodeId(1)).unwrap();
        let actions = EditScriptBuilder::new(&src, &dst, &mapping)
            .moved_out(NodeId(1), PathBuf::from("other.src"), Some(0))
            .build()
            .unwrap();
        let diff = AstDiff::from_script(&src, &dst, mapping, actions);

        assert_eq!(diff.actions().len(), 1);
        for id in [1, 2, 3] {
            assert!(diff.is_removed(NodeId(id)), "node {id} is unaccounted for");
        }
        assert!(!diff.is_removed(NodeId(4)));
    }
}
