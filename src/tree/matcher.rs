//! GumTree-style node matching between two trees.
//!
//! Matching runs in two phases. The top-down phase maps the largest
//! isomorphic subtrees, tallest first. The bottom-up phase maps inner nodes
//! whose descendants are already largely mapped to each other and then
//! recovers mappings among their remaining children.

use super::mapping::MappingStore;
use crate::ast::{Ast, NodeId};
use crate::config::Thresholds;
use crate::error::Result;
use crate::matcher::similarity::lcs;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Open subtree roots grouped by height.
struct HeightQueue<'t> {
    ast: &'t Ast,
    min_height: usize,
    by_height: BTreeMap<usize, Vec<NodeId>>,
}

impl<'t> HeightQueue<'t> {
    fn new(ast: &'t Ast, root: NodeId, min_height: usize) -> Self {
        let mut queue = Self {
            ast,
            min_height,
            by_height: BTreeMap::new(),
        };
        queue.push(root);
        queue
    }

    fn push(&mut self, id: NodeId) {
        let height = self.ast.metrics().height(id);
        if height >= self.min_height {
            self.by_height.entry(height).or_default().push(id);
        }
    }

    fn peek_height(&self) -> Option<usize> {
        self.by_height.keys().next_back().copied()
    }

    /// Remove every node of the greatest height, in pre-order.
    fn pop(&mut self) -> Vec<NodeId> {
        let mut nodes = self
            .by_height
            .pop_last()
            .map(|(_, nodes)| nodes)
            .unwrap_or_default();
        nodes.sort_by_key(|id| self.ast.metrics().pre_order_index(*id));
        nodes
    }

    fn open(&mut self, id: NodeId) {
        for child in self.ast.children(id) {
            self.push(*child);
        }
    }
}

/// Computes a [`MappingStore`] between two trees.
pub struct TreeMatcher<'a> {
    src: &'a Ast,
    dst: &'a Ast,
    min_height: usize,
    dice_threshold: f64,
}

impl<'a> TreeMatcher<'a> {
    pub fn new(src: &'a Ast, dst: &'a Ast, thresholds: &Thresholds) -> Self {
        Self {
            src,
            dst,
            min_height: thresholds.min_height.max(1),
            dice_threshold: thresholds.dice,
        }
    }

    /// Match the two whole trees.
    pub fn match_trees(&self) -> Result<MappingStore> {
        self.match_subtrees(self.src.root(), self.dst.root())
    }

    /// Match two subtrees, e.g. the declarations of a matched operation pair.
    pub fn match_subtrees(&self, src_root: NodeId, dst_root: NodeId) -> Result<MappingStore> {
        let mut mapping = MappingStore::between(self.src, self.dst);
        self.top_down(&mut mapping, src_root, dst_root)?;
        let after_top_down = mapping.len();
        self.bottom_up(&mut mapping, src_root, dst_root)?;
        trace!(
            src = %self.src.path().display(),
            dst = %self.dst.path().display(),
            top_down = after_top_down,
            total = mapping.len(),
            "Matched trees"
        );
        Ok(mapping)
    }

    fn top_down(&self, mapping: &mut MappingStore, src_root: NodeId, dst_root: NodeId) -> Result<()> {
        let mut src_queue = HeightQueue::new(self.src, src_root, self.min_height);
        let mut dst_queue = HeightQueue::new(self.dst, dst_root, self.min_height);
        let mut ambiguous: Vec<(NodeId, NodeId)> = Vec::new();

        while let (Some(hs), Some(hd)) = (src_queue.peek_height(), dst_queue.peek_height()) {
            if hs > hd {
                for id in src_queue.pop() {
                    src_queue.open(id);
                }
                continue;
            }
            if hd > hs {
                for id in dst_queue.pop() {
                    dst_queue.open(id);
                }
                continue;
            }

            let srcs = src_queue.pop();
            let dsts = dst_queue.pop();
            let mut pairs = Vec::new();
            for s in &srcs {
                for d in &dsts {
                    if self.src.isomorphic(*s, self.dst, *d) {
                        pairs.push((*s, *d));
                    }
                }
            }

            let mut src_count: BTreeMap<NodeId, usize> = BTreeMap::new();
            let mut dst_count: BTreeMap<NodeId, usize> = BTreeMap::new();
            for (s, d) in &pairs {
                *src_count.entry(*s).or_default() += 1;
                *dst_count.entry(*d).or_default() += 1;
            }
            for (s, d) in &pairs {
                if src_count[s] == 1 && dst_count[d] == 1 {
                    mapping.add_recursively(self.src, *s, self.dst, *d)?;
                } else {
                    ambiguous.push((*s, *d));
                }
            }

            for s in srcs {
                if !src_count.contains_key(&s) {
                    src_queue.open(s);
                }
            }
            for d in dsts {
                if !dst_count.contains_key(&d) {
                    dst_queue.open(d);
                }
            }
        }

        // Ambiguous candidates of every height are ranked together: parents
        // sharing the most mapped descendants first, then document order.
        let mut ranked: Vec<(f64, usize, usize, NodeId, NodeId)> = ambiguous
            .into_iter()
            .map(|(s, d)| {
                let parent_dice = match (self.src.parent(s), self.dst.parent(d)) {
                    (Some(ps), Some(pd)) => self.dice(mapping, ps, pd),
                    _ => 0.0,
                };
                (
                    parent_dice,
                    self.src.metrics().pre_order_index(s),
                    self.dst.metrics().pre_order_index(d),
                    s,
                    d,
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        for (_, _, _, s, d) in ranked {
            if mapping.subtrees_free(self.src, s, self.dst, d) {
                mapping.add_recursively(self.src, s, self.dst, d)?;
            }
        }
        Ok(())
    }

    fn bottom_up(&self, mapping: &mut MappingStore, src_root: NodeId, dst_root: NodeId) -> Result<()> {
        for s in self.src.post_order(src_root) {
            if s == src_root {
                break;
            }
            if mapping.has_src(s) || self.src.children(s).is_empty() {
                continue;
            }
            let Some((d, score)) = self.best_container(mapping, s, dst_root) else {
                continue;
            };
            if score >= self.dice_threshold {
                mapping.add(s, d)?;
                self.recover(mapping, s, d)?;
            }
        }

        if !mapping.has_src(src_root)
            && !mapping.has_dst(dst_root)
            && self.src.kind(src_root) == self.dst.kind(dst_root)
        {
            mapping.add(src_root, dst_root)?;
        }
        if mapping.has(src_root, dst_root) {
            self.recover(mapping, src_root, dst_root)?;
        }
        Ok(())
    }

    /// Unmapped destination node of the same kind containing the most
    /// partners of `s`'s descendants.
    fn best_container(&self, mapping: &MappingStore, s: NodeId, dst_root: NodeId) -> Option<(NodeId, f64)> {
        let mut candidates = BTreeSet::new();
        for x in self.src.descendants(s) {
            let Some(y) = mapping.dst_for(x) else {
                continue;
            };
            for a in self.dst.ancestors(y) {
                if !self.dst.is_ancestor_or_self(dst_root, a) {
                    break;
                }
                if a != dst_root && !mapping.has_dst(a) && self.dst.kind(a) == self.src.kind(s) {
                    candidates.insert(a);
                }
            }
        }

        let mut best: Option<(NodeId, f64)> = None;
        for d in candidates {
            let score = self.dice(mapping, s, d);
            let better = match best {
                None => true,
                Some((b, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && self.dst.metrics().pre_order_index(d)
                                < self.dst.metrics().pre_order_index(b))
                }
            };
            if better {
                best = Some((d, score));
            }
        }
        best
    }

    /// Dice coefficient of the descendants of `s` and `d` under `mapping`.
    fn dice(&self, mapping: &MappingStore, s: NodeId, d: NodeId) -> f64 {
        let src_desc = self.src.descendants(s);
        let dst_size = self.dst.metrics().size(d) - 1;
        if src_desc.is_empty() && dst_size == 0 {
            return 0.0;
        }
        let common = src_desc
            .iter()
            .filter(|x| {
                mapping
                    .dst_for(**x)
                    .is_some_and(|y| y != d && self.dst.is_ancestor_or_self(d, y))
            })
            .count();
        2.0 * common as f64 / (src_desc.len() + dst_size) as f64
    }

    /// Map the remaining children of a mapped pair: identical subtrees in
    /// order, then same-shape subtrees in order, then children whose kind is
    /// unique on both sides.
    fn recover(&self, mapping: &mut MappingStore, s: NodeId, d: NodeId) -> Result<()> {
        let free = |m: &MappingStore, x: NodeId, y: NodeId| m.subtrees_free(self.src, x, self.dst, y);

        let (xs, ys) = self.unmapped_children(mapping, s, d);
        let pairs = lcs(&xs, &ys, |x, y| {
            self.src.isomorphic(*x, self.dst, *y) && free(mapping, *x, *y)
        });
        for (i, j) in pairs {
            mapping.add_recursively(self.src, xs[i], self.dst, ys[j])?;
        }

        let (xs, ys) = self.unmapped_children(mapping, s, d);
        let pairs = lcs(&xs, &ys, |x, y| {
            self.src.structurally_isomorphic(*x, self.dst, *y)
                && mapping.subtrees_aligned(self.src, *x, self.dst, *y)
        });
        for (i, j) in pairs {
            mapping.add_recursively(self.src, xs[i], self.dst, ys[j])?;
        }

        let (xs, ys) = self.unmapped_children(mapping, s, d);
        let mut src_kinds: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
        let mut dst_kinds: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
        for x in &xs {
            src_kinds.entry(self.src.kind(*x)).or_default().push(*x);
        }
        for y in &ys {
            dst_kinds.entry(self.dst.kind(*y)).or_default().push(*y);
        }
        for (kind, sources) in &src_kinds {
            if let [x] = sources.as_slice()
                && let Some([y]) = dst_kinds.get(kind).map(Vec::as_slice)
            {
                mapping.add(*x, *y)?;
                self.recover(mapping, *x, *y)?;
            }
        }
        Ok(())
    }

    fn unmapped_children(&self, mapping: &MappingStore, s: NodeId, d: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
        let xs = self
            .src
            .children(s)
            .iter()
            .copied()
            .filter(|x| !mapping.has_src(*x))
            .collect();
        let ys = self
            .dst
            .children(d)
            .iter()
            .copied()
            .filter(|y| !mapping.has_dst(*y))
            .collect();
        (xs, ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testing::tree;

    fn matched(src: &Ast, dst: &Ast) -> MappingStore {
        TreeMatcher::new(src, dst, &Thresholds::default())
            .match_trees()
            .unwrap()
    }

    fn labels(src: &Ast, dst: &Ast, m: &MappingStore) -> Vec<(String, String)> {
        m.iter()
            .map(|(s, d)| {
                (
                    format!("{}:{}", src.kind(s), src.label(s)),
                    format!("{}:{}", dst.kind(d), dst.label(d)),
                )
            })
            .collect()
    }

    #[test]
    fn test_identical_trees_map_completely() {
        let src = tree("block(stmt(call(id:f id:x)) stmt(call(id:g id:y)))");
        let dst = tree("block(stmt(call(id:f id:x)) stmt(call(id:g id:y)))");
        let m = matched(&src, &dst);

        assert_eq!(m.len(), src.len());
        for (s, d) in m.iter() {
            assert_eq!(s, d);
        }
    }

    #[test]
    fn test_moved_subtree_is_found() {
        let src = tree("root(a(stmt(call(id:f id:x)) stmt:z) b(stmt:w))");
        let dst = tree("root(a(stmt:z) b(stmt:w stmt(call(id:f id:x))))");
        let m = matched(&src, &dst);

        let call_stmt = src.children(src.children(src.root())[0])[0];
        let target = dst.children(dst.children(dst.root())[1])[1];
        assert_eq!(m.dst_for(call_stmt), Some(target));
    }

    #[test]
    fn test_relabelled_leaf_is_recovered() {
        let src = tree("block(stmt(call(id:print id:each)) stmt(ret(id:total id:x)))");
        let dst = tree("block(stmt(call(id:print id:aRental)) stmt(ret(id:total id:x)))");
        let m = matched(&src, &dst);

        assert_eq!(m.len(), src.len());
        assert!(labels(&src, &dst, &m).contains(&("id:each".into(), "id:aRental".into())));
    }

    #[test]
    fn test_renamed_identifier_throughout_siblings() {
        let src = tree(
            "root(blk(iff(cond(call(id:each id:days)) st(v:x v:z)) iff(cond(call(id:each id:rate)) st(v:x v:w))))",
        );
        let dst = tree(
            "root(blk(iff(cond(call(id:aRental id:days)) st(v:x v:z)) iff(cond(call(id:aRental id:rate)) st(v:x v:w))))",
        );
        let m = matched(&src, &dst);

        assert_eq!(m.len(), src.len());
        for (s, d) in m.iter() {
            assert_eq!(s, d);
        }
    }

    #[test]
    fn test_ambiguous_copies_follow_document_order() {
        let src = tree("root(s(c(id:x id:y)) s(c(id:x id:y)))");
        let dst = tree("root(s(c(id:x id:y)) s(c(id:x id:y)) t:k)");
        let m = matched(&src, &dst);

        let first = src.children(src.root())[0];
        assert_eq!(m.dst_for(first), Some(dst.children(dst.root())[0]));
        assert_eq!(m.len(), src.len());
    }

    #[test]
    fn test_ambiguous_copy_follows_its_mapped_parent() {
        let src = tree("root(q(s(c(id:x id:y))) p(w(id:e id:f) s(c(id:x id:y))))");
        let dst = tree("root(p(w(id:e id:f) s(c(id:x id:y)) z:9))");
        let m = matched(&src, &dst);

        let q = src.children(src.root())[0];
        let p = src.children(src.root())[1];
        let copy = dst.children(dst.children(dst.root())[0])[1];
        assert_eq!(m.dst_for(src.children(p)[1]), Some(copy));
        assert_eq!(m.dst_for(src.children(q)[0]), None);
    }

    #[test]
    fn test_mapping_is_injective() {
        let src = tree("root(s(c(id:x id:y)) s(c(id:x id:y)) t:k)");
        let dst = tree("root(s(c(id:x id:y)) u:k)");
        let m = matched(&src, &dst);

        let dsts: BTreeSet<NodeId> = m.iter().map(|(_, d)| d).collect();
        assert_eq!(dsts.len(), m.len());
    }
}
