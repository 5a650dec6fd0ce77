//! Injective node correspondence between two trees.

use crate::ast::{Ast, NodeId};
use crate::error::{MinerError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Partial one-to-one mapping from source-tree nodes to destination-tree
/// nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    src_path: PathBuf,
    dst_path: PathBuf,
    src_to_dst: BTreeMap<NodeId, NodeId>,
    dst_to_src: BTreeMap<NodeId, NodeId>,
}

impl MappingStore {
    pub fn new(src_path: impl Into<PathBuf>, dst_path: impl Into<PathBuf>) -> Self {
        Self {
            src_path: src_path.into(),
            dst_path: dst_path.into(),
            ..Self::default()
        }
    }

    /// Empty mapping between two trees.
    pub fn between(src: &Ast, dst: &Ast) -> Self {
        Self::new(src.path(), dst.path())
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    pub fn dst_path(&self) -> &Path {
        &self.dst_path
    }

    pub fn len(&self) -> usize {
        self.src_to_dst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src_to_dst.is_empty()
    }

    /// Record a pair. Mapping a node that already has another partner is an
    /// invariant violation; re-adding an existing pair is a no-op.
    pub fn add(&mut self, src: NodeId, dst: NodeId) -> Result<()> {
        match (self.src_to_dst.get(&src), self.dst_to_src.get(&dst)) {
            (Some(d), Some(s)) if *d == dst && *s == src => return Ok(()),
            (None, None) => {}
            (existing_dst, existing_src) => {
                return Err(MinerError::invariant(
                    &self.src_path,
                    &self.dst_path,
                    format!(
                        "cannot map {src:?} to {dst:?}: already mapped ({existing_dst:?}, {existing_src:?})"
                    ),
                ));
            }
        }
        self.src_to_dst.insert(src, dst);
        self.dst_to_src.insert(dst, src);
        Ok(())
    }

    /// Map two isomorphic (or structurally isomorphic) subtrees node by node.
    pub fn add_recursively(&mut self, src: &Ast, s: NodeId, dst: &Ast, d: NodeId) -> Result<()> {
        for (x, y) in src.pre_order(s).into_iter().zip(dst.pre_order(d)) {
            self.add(x, y)?;
        }
        Ok(())
    }

    pub fn has_src(&self, src: NodeId) -> bool {
        self.src_to_dst.contains_key(&src)
    }

    pub fn has_dst(&self, dst: NodeId) -> bool {
        self.dst_to_src.contains_key(&dst)
    }

    pub fn has(&self, src: NodeId, dst: NodeId) -> bool {
        self.src_to_dst.get(&src) == Some(&dst)
    }

    pub fn dst_for(&self, src: NodeId) -> Option<NodeId> {
        self.src_to_dst.get(&src).copied()
    }

    pub fn src_for(&self, dst: NodeId) -> Option<NodeId> {
        self.dst_to_src.get(&dst).copied()
    }

    /// Pairs ordered by source node.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.src_to_dst.iter().map(|(s, d)| (*s, *d))
    }

    /// Whether no node of either subtree is mapped yet.
    pub fn subtrees_free(&self, src: &Ast, s: NodeId, dst: &Ast, d: NodeId) -> bool {
        src.pre_order(s).iter().all(|x| !self.has_src(*x))
            && dst.pre_order(d).iter().all(|y| !self.has_dst(*y))
    }

    /// Whether zipping the two subtrees in pre-order agrees with every pair
    /// already recorded for their nodes.
    pub fn subtrees_aligned(&self, src: &Ast, s: NodeId, dst: &Ast, d: NodeId) -> bool {
        src.pre_order(s)
            .into_iter()
            .zip(dst.pre_order(d))
            .all(|(x, y)| {
                self.dst_for(x).is_none_or(|m| m == y) && self.src_for(y).is_none_or(|m| m == x)
            })
    }

    /// Union with another mapping over the same trees. Pairs that would map
    /// an already mapped node elsewhere are dropped; returns how many were.
    pub fn merge(&mut self, other: &MappingStore) -> usize {
        let mut dropped = 0;
        for (s, d) in other.iter() {
            if self.has(s, d) {
                continue;
            }
            if self.has_src(s) || self.has_dst(d) {
                dropped += 1;
                continue;
            }
            self.src_to_dst.insert(s, d);
            self.dst_to_src.insert(d, s);
        }
        if dropped > 0 {
            debug!(
                src = %self.src_path.display(),
                dst = %self.dst_path.display(),
                dropped,
                "Dropped conflicting pairs while merging mappings"
            );
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testing::tree;

    #[test]
    fn test_rejects_second_partner() {
        let mut m = MappingStore::new("a", "b");
        m.add(NodeId(1), NodeId(2)).unwrap();
        m.add(NodeId(1), NodeId(2)).unwrap();

        let err = m.add(NodeId(1), NodeId(3)).unwrap_err();
        assert!(matches!(err, MinerError::InvariantViolation { .. }));
        assert!(m.add(NodeId(4), NodeId(2)).is_err());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_add_recursively_and_lookup() {
        let src = tree("a(b(c) d)");
        let dst = tree("x(b(c) d)");
        let mut m = MappingStore::between(&src, &dst);
        let b = src.children(src.root())[0];
        let b2 = dst.children(dst.root())[0];
        m.add_recursively(&src, b, &dst, b2).unwrap();

        assert_eq!(m.len(), 2);
        assert_eq!(m.dst_for(b), Some(b2));
        assert_eq!(m.src_for(dst.children(b2)[0]), Some(src.children(b)[0]));
        assert!(!m.subtrees_free(&src, src.root(), &dst, dst.root()));
        assert!(m.subtrees_aligned(&src, src.root(), &dst, dst.root()));
    }

    #[test]
    fn test_misaligned_subtrees() {
        let src = tree("a(b:x b:y)");
        let dst = tree("a(b:y b:x)");
        let mut m = MappingStore::between(&src, &dst);
        m.add(NodeId(1), NodeId(2)).unwrap();

        assert!(!m.subtrees_aligned(&src, src.root(), &dst, dst.root()));
        assert!(m.subtrees_aligned(&src, NodeId(1), &dst, NodeId(2)));
    }

    #[test]
    fn test_merge_drops_conflicts() {
        let mut left = MappingStore::new("a", "b");
        left.add(NodeId(0), NodeId(0)).unwrap();
        let mut right = MappingStore::new("a", "b");
        right.add(NodeId(0), NodeId(0)).unwrap();
        right.add(NodeId(2), NodeId(5)).unwrap();
        right.add(NodeId(3), NodeId(4)).unwrap();
        left.add(NodeId(9), NodeId(4)).unwrap();

        assert_eq!(left.merge(&right), 1);
        assert!(left.has(NodeId(2), NodeId(5)));
        assert!(!left.has_src(NodeId(3)));
    }
}
