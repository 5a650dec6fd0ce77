//! Applying an edit script to the source tree.

use super::action::Action;
use super::edit_script::{VIRTUAL_ROOT, WorkTree};
use super::mapping::MappingStore;
use crate::ast::{Ast, NodeId};
use crate::error::{MinerError, Result};
use std::collections::HashMap;

/// Apply `actions` to a copy of the source subtree and check that the result
/// equals the destination subtree.
pub fn replay(
    src: &Ast,
    dst: &Ast,
    mapping: &MappingStore,
    src_root: NodeId,
    dst_root: NodeId,
    actions: &[Action],
) -> Result<()> {
    let (work, src_to_work) = WorkTree::copy_of(src, src_root);
    let mut dst_to_work = HashMap::new();
    for (s, d) in mapping.iter() {
        if let Some(w) = src_to_work.get(&s)
            && dst.is_ancestor_or_self(dst_root, d)
        {
            dst_to_work.insert(d, *w);
        }
    }
    let mut replayer = Replayer {
        src,
        dst,
        work,
        src_to_work,
        dst_to_work,
    };
    for action in actions {
        replayer.apply(action)?;
    }

    let top = replayer.work.children(VIRTUAL_ROOT).to_vec();
    match top.as_slice() {
        [root] if replayer.work.same_as(*root, dst, dst_root) => Ok(()),
        _ => Err(replayer.fail("replayed tree differs from the destination")),
    }
}

struct Replayer<'a> {
    src: &'a Ast,
    dst: &'a Ast,
    work: WorkTree,
    src_to_work: HashMap<NodeId, usize>,
    dst_to_work: HashMap<NodeId, usize>,
}

impl Replayer<'_> {
    fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Insert {
                node,
                parent,
                position,
            } => {
                let p = self.parent(*parent)?;
                let w = self
                    .work
                    .add_node(self.dst.kind(*node), self.dst.label(*node), None);
                self.attach(p, *position, w)?;
                self.dst_to_work.insert(*node, w);
            }
            Action::Delete { node } => {
                let w = self.source(*node)?;
                if !self.work.children(w).is_empty() {
                    return Err(self.fail(format!("delete of non-leaf {node:?}")));
                }
                self.work.detach(w);
            }
            Action::Update { src, dst } => {
                let w = self.source(*src)?;
                self.work.set_label(w, self.dst.label(*dst));
            }
            Action::Move {
                src,
                parent,
                position,
                ..
            } => {
                let w = self.source(*src)?;
                let p = self.parent(*parent)?;
                self.work.detach(w);
                self.attach(p, *position, w)?;
            }
            Action::MoveIn {
                node,
                parent,
                position,
                ..
            } => {
                let p = self.parent(*parent)?;
                let copied = self.work.graft(self.dst, *node, p, *position, false);
                if copied.get(node).and_then(|w| self.work.parent(*w)) != Some(p) {
                    return Err(self.fail(format!("move-in of {node:?} at {position} out of range")));
                }
                self.dst_to_work.extend(copied);
            }
            Action::MoveOut { node, .. } => {
                let w = self.source(*node)?;
                self.work.detach(w);
            }
            Action::MultiMove { members } => {
                for member in members {
                    self.apply(member)?;
                }
            }
        }
        Ok(())
    }

    fn parent(&self, parent: Option<NodeId>) -> Result<usize> {
        match parent {
            None => Ok(VIRTUAL_ROOT),
            Some(p) => self
                .dst_to_work
                .get(&p)
                .copied()
                .ok_or_else(|| self.fail(format!("no node stands for destination {p:?}"))),
        }
    }

    fn source(&self, node: NodeId) -> Result<usize> {
        self.src_to_work
            .get(&node)
            .copied()
            .ok_or_else(|| self.fail(format!("unknown source node {node:?}")))
    }

    fn attach(&mut self, parent: usize, position: usize, w: usize) -> Result<()> {
        if self.work.attach(parent, position, w) {
            Ok(())
        } else {
            Err(self.fail(format!("position {position} out of range")))
        }
    }

    fn fail(&self, message: impl Into<String>) -> MinerError {
        MinerError::invariant(self.src.path(), self.dst.path(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testing::tree;

    #[test]
    fn test_wrong_script_is_rejected() {
        let src = tree("a(b:x)");
        let dst = tree("a(b:y)");
        let mut mapping = MappingStore::between(&src, &dst);
        mapping.add(NodeId(0), NodeId(0)).unwrap();
        mapping.add(NodeId(1), NodeId(1)).unwrap();

        let err = replay(&src, &dst, &mapping, src.root(), dst.root(), &[]).unwrap_err();
        assert!(matches!(err, MinerError::InvariantViolation { .. }));

        let fixed = [Action::Update {
            src: NodeId(1),
            dst: NodeId(1),
        }];
        replay(&src, &dst, &mapping, src.root(), dst.root(), &fixed).unwrap();
    }

    #[test]
    fn test_delete_of_inner_node_is_rejected() {
        let src = tree("a(b(c))");
        let dst = tree("a");
        let mapping = MappingStore::between(&src, &dst);

        let err = replay(
            &src,
            &dst,
            &mapping,
            src.root(),
            dst.root(),
            &[Action::Delete { node: NodeId(1) }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-leaf"));
    }
}
