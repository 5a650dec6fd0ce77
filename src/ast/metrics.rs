//! Per-node height, size, depth and subtree hashes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{AstNode, NodeId};

/// Metrics computed once when an [`super::Ast`] is frozen.
#[derive(Debug, Clone, Default)]
pub struct TreeMetrics {
    heights: Vec<usize>,
    sizes: Vec<usize>,
    depths: Vec<usize>,
    pre_order: Vec<usize>,
    hashes: Vec<u64>,
    shape_hashes: Vec<u64>,
}

impl TreeMetrics {
    pub(super) fn compute(nodes: &[AstNode]) -> Self {
        let n = nodes.len();
        let mut metrics = TreeMetrics {
            heights: vec![1; n],
            sizes: vec![1; n],
            depths: vec![0; n],
            pre_order: vec![0; n],
            hashes: vec![0; n],
            shape_hashes: vec![0; n],
        };
        if n == 0 {
            return metrics;
        }

        // Pre-order pass: depth and visit index.
        let mut stack = vec![NodeId(0)];
        let mut counter = 0;
        while let Some(id) = stack.pop() {
            metrics.pre_order[id.0] = counter;
            counter += 1;
            for child in nodes[id.0].children.iter().rev() {
                metrics.depths[child.0] = metrics.depths[id.0] + 1;
                stack.push(*child);
            }
        }

        // Children always have larger arena indices than their parent, so a
        // reverse index sweep is a valid bottom-up order.
        for i in (0..n).rev() {
            let node = &nodes[i];
            let mut height = 1;
            let mut size = 1;
            let mut hasher = DefaultHasher::new();
            let mut shape = DefaultHasher::new();
            node.kind.hash(&mut hasher);
            node.label.hash(&mut hasher);
            node.kind.hash(&mut shape);
            for child in &node.children {
                height = height.max(metrics.heights[child.0] + 1);
                size += metrics.sizes[child.0];
                metrics.hashes[child.0].hash(&mut hasher);
                metrics.shape_hashes[child.0].hash(&mut shape);
            }
            node.children.len().hash(&mut hasher);
            node.children.len().hash(&mut shape);
            metrics.heights[i] = height;
            metrics.sizes[i] = size;
            metrics.hashes[i] = hasher.finish();
            metrics.shape_hashes[i] = shape.finish();
        }

        metrics
    }

    /// Height of the subtree (a leaf has height 1).
    pub fn height(&self, id: NodeId) -> usize {
        self.heights[id.0]
    }

    /// Number of nodes in the subtree, including the node itself.
    pub fn size(&self, id: NodeId) -> usize {
        self.sizes[id.0]
    }

    /// Distance from the root.
    pub fn depth(&self, id: NodeId) -> usize {
        self.depths[id.0]
    }

    /// Pre-order visit index from the root.
    pub fn pre_order_index(&self, id: NodeId) -> usize {
        self.pre_order[id.0]
    }

    /// Hash over kinds, labels and shape.
    pub fn hash(&self, id: NodeId) -> u64 {
        self.hashes[id.0]
    }

    /// Hash over kinds and shape only.
    pub fn shape_hash(&self, id: NodeId) -> u64 {
        self.shape_hashes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::testing::tree;

    #[test]
    fn test_heights_and_sizes() {
        let ast = tree("a(b(c d) e)");
        let m = ast.metrics();
        let root = ast.root();
        let b = ast.children(root)[0];

        assert_eq!(m.height(root), 3);
        assert_eq!(m.size(root), 5);
        assert_eq!(m.height(b), 2);
        assert_eq!(m.size(b), 3);
        assert_eq!(m.depth(ast.children(b)[1]), 2);
        assert_eq!(m.pre_order_index(ast.children(root)[1]), 4);
    }

    #[test]
    fn test_hashes_distinguish_labels_but_not_shapes() {
        let x = tree("a(b:1 c)");
        let y = tree("a(b:2 c)");

        assert_ne!(x.metrics().hash(x.root()), y.metrics().hash(y.root()));
        assert_eq!(
            x.metrics().shape_hash(x.root()),
            y.metrics().shape_hash(y.root())
        );
    }
}
