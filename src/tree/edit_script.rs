//! Chawathe-style edit script generation.
//!
//! The script is computed against a working copy of the source subtree that
//! is mutated as actions are emitted, so every position refers to the tree
//! as it is when the action applies.

use super::action::{Action, group_multi_moves};
use super::mapping::MappingStore;
use crate::ast::{Ast, NodeId};
use crate::error::{MinerError, Result};
use crate::matcher::similarity::lcs;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Index of the virtual node holding the diffed subtree root.
pub(super) const VIRTUAL_ROOT: usize = 0;

#[derive(Debug, Clone)]
struct WorkNode {
    kind: String,
    label: String,
    parent: Option<usize>,
    children: Vec<usize>,
    origin: Option<NodeId>,
}

/// Mutable copy of a subtree used while generating or replaying a script.
#[derive(Debug, Clone)]
pub(super) struct WorkTree {
    nodes: Vec<WorkNode>,
}

impl WorkTree {
    /// Copy `root`'s subtree under a virtual root. Returns the tree and the
    /// work index of every copied node.
    pub(super) fn copy_of(ast: &Ast, root: NodeId) -> (Self, HashMap<NodeId, usize>) {
        let mut tree = WorkTree {
            nodes: vec![WorkNode {
                kind: String::new(),
                label: String::new(),
                parent: None,
                children: Vec::new(),
                origin: None,
            }],
        };
        let index = tree.graft(ast, root, VIRTUAL_ROOT, 0, true);
        (tree, index)
    }

    /// Copy a subtree of `ast` under `parent` at `position`.
    pub(super) fn graft(
        &mut self,
        ast: &Ast,
        root: NodeId,
        parent: usize,
        position: usize,
        keep_origin: bool,
    ) -> HashMap<NodeId, usize> {
        let mut index = HashMap::new();
        for id in ast.pre_order(root) {
            let w = self.add_node(ast.kind(id), ast.label(id), keep_origin.then_some(id));
            index.insert(id, w);
            if id == root {
                self.attach(parent, position, w);
            } else if let Some(p) = ast.parent(id).and_then(|p| index.get(&p)) {
                let end = self.nodes[*p].children.len();
                self.attach(*p, end, w);
            }
        }
        index
    }

    pub(super) fn add_node(&mut self, kind: &str, label: &str, origin: Option<NodeId>) -> usize {
        self.nodes.push(WorkNode {
            kind: kind.to_string(),
            label: label.to_string(),
            parent: None,
            children: Vec::new(),
            origin,
        });
        self.nodes.len() - 1
    }

    /// Insert a detached node; returns false when the position is out of
    /// range.
    pub(super) fn attach(&mut self, parent: usize, position: usize, child: usize) -> bool {
        if position > self.nodes[parent].children.len() {
            return false;
        }
        self.nodes[parent].children.insert(position, child);
        self.nodes[child].parent = Some(parent);
        true
    }

    pub(super) fn detach(&mut self, child: usize) {
        if let Some(parent) = self.nodes[child].parent.take() {
            self.nodes[parent].children.retain(|c| *c != child);
        }
    }

    pub(super) fn parent(&self, w: usize) -> Option<usize> {
        self.nodes[w].parent
    }

    pub(super) fn children(&self, w: usize) -> &[usize] {
        &self.nodes[w].children
    }

    pub(super) fn position(&self, w: usize) -> Option<usize> {
        let parent = self.nodes[w].parent?;
        self.nodes[parent].children.iter().position(|c| *c == w)
    }

    pub(super) fn label(&self, w: usize) -> &str {
        &self.nodes[w].label
    }

    pub(super) fn set_label(&mut self, w: usize, label: &str) {
        self.nodes[w].label = label.to_string();
    }

    pub(super) fn origin(&self, w: usize) -> Option<NodeId> {
        self.nodes[w].origin
    }

    /// Work nodes below `w` in post-order, `w` excluded.
    pub(super) fn post_order_below(&self, w: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, bool)> =
            self.nodes[w].children.iter().rev().map(|c| (*c, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for child in self.nodes[id].children.iter().rev() {
                stack.push((*child, false));
            }
        }
        out
    }

    /// Whether the subtree at `w` has the kinds, labels and shape of `id`.
    pub(super) fn same_as(&self, w: usize, ast: &Ast, id: NodeId) -> bool {
        let mut stack = vec![(w, id)];
        while let Some((a, b)) = stack.pop() {
            let node = &self.nodes[a];
            if node.kind != ast.kind(b)
                || node.label != ast.label(b)
                || node.children.len() != ast.children(b).len()
            {
                return false;
            }
            stack.extend(node.children.iter().copied().zip(ast.children(b).iter().copied()));
        }
        true
    }
}

/// Builds the edit script turning one subtree into another under a mapping.
pub struct EditScriptBuilder<'a> {
    src: &'a Ast,
    dst: &'a Ast,
    mapping: &'a MappingStore,
    src_root: NodeId,
    dst_root: NodeId,
    moved_out: BTreeMap<NodeId, (PathBuf, Option<usize>)>,
    moved_in: BTreeMap<NodeId, (PathBuf, Option<usize>)>,
}

impl<'a> EditScriptBuilder<'a> {
    pub fn new(src: &'a Ast, dst: &'a Ast, mapping: &'a MappingStore) -> Self {
        Self {
            src,
            dst,
            mapping,
            src_root: src.root(),
            dst_root: dst.root(),
            moved_out: BTreeMap::new(),
            moved_in: BTreeMap::new(),
        }
    }

    /// Restrict the script to two subtrees.
    pub fn with_roots(mut self, src_root: NodeId, dst_root: NodeId) -> Self {
        self.src_root = src_root;
        self.dst_root = dst_root;
        self
    }

    /// Report the unmapped source subtree at `node` as moved to `dst_file`.
    /// The first report of a node is kept.
    pub fn moved_out(mut self, node: NodeId, dst_file: PathBuf, justification: Option<usize>) -> Self {
        self.moved_out.entry(node).or_insert((dst_file, justification));
        self
    }

    /// Report the unmapped destination subtree at `node` as moved in from
    /// `src_file`. The first report of a node is kept.
    pub fn moved_in(mut self, node: NodeId, src_file: PathBuf, justification: Option<usize>) -> Self {
        self.moved_in.entry(node).or_insert((src_file, justification));
        self
    }

    pub fn build(&self) -> Result<Vec<Action>> {
        let (work, src_to_work) = WorkTree::copy_of(self.src, self.src_root);
        let mut state = ScriptState {
            builder: self,
            work,
            src_to_work,
            work_to_dst: HashMap::new(),
            dst_to_work: HashMap::new(),
            src_in_order: HashSet::new(),
            dst_in_order: HashSet::new(),
            arrivals: Vec::new(),
            actions: Vec::new(),
        };
        for (s, d) in self.mapping.iter() {
            if self.src.is_ancestor_or_self(self.src_root, s)
                && self.dst.is_ancestor_or_self(self.dst_root, d)
                && let Some(w) = state.src_to_work.get(&s).copied()
            {
                state.link(w, d);
            }
        }

        state.remove_unmapped_subtrees();
        state.edit_towards_destination()?;
        state.delete_remaining()?;
        state.move_in_arrivals()?;

        let actions = group_multi_moves(state.actions);
        debug!(
            src = %self.src.path().display(),
            dst = %self.dst.path().display(),
            actions = actions.len(),
            "Built edit script"
        );
        Ok(actions)
    }

    fn dst_parent(&self, x: NodeId) -> Option<NodeId> {
        if x == self.dst_root {
            None
        } else {
            self.dst.parent(x)
        }
    }

    fn dst_children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            None => vec![self.dst_root],
            Some(p) => self.dst.children(p).to_vec(),
        }
    }

    fn invariant(&self, message: impl Into<String>) -> MinerError {
        MinerError::invariant(self.src.path(), self.dst.path(), message)
    }
}

struct ScriptState<'b, 'a> {
    builder: &'b EditScriptBuilder<'a>,
    work: WorkTree,
    src_to_work: HashMap<NodeId, usize>,
    work_to_dst: HashMap<usize, NodeId>,
    dst_to_work: HashMap<NodeId, usize>,
    src_in_order: HashSet<usize>,
    dst_in_order: HashSet<NodeId>,
    /// Moved-in subtree roots, grafted once everything else is in place.
    arrivals: Vec<NodeId>,
    actions: Vec<Action>,
}

impl ScriptState<'_, '_> {
    fn link(&mut self, w: usize, x: NodeId) {
        self.work_to_dst.insert(w, x);
        self.dst_to_work.insert(x, w);
    }

    fn work_of(&self, parent: Option<NodeId>) -> Option<usize> {
        match parent {
            None => Some(VIRTUAL_ROOT),
            Some(p) => self.dst_to_work.get(&p).copied(),
        }
    }

    /// Cross-file moved subtrees leave first, grouped by justification, then
    /// every subtree without a single mapped node is deleted bottom-up.
    fn remove_unmapped_subtrees(&mut self) {
        let b = self.builder;
        let mut pure: HashSet<NodeId> = HashSet::new();
        for s in b.src.post_order(b.src_root) {
            let mapped = self.src_to_work.get(&s).is_some_and(|w| self.work_to_dst.contains_key(w));
            if !mapped && b.src.children(s).iter().all(|c| pure.contains(c)) {
                pure.insert(s);
            }
        }

        let mut gone: HashSet<NodeId> = HashSet::new();
        let mut leaving = Vec::new();
        for s in b.src.pre_order(b.src_root) {
            if gone.contains(&s) || !pure.contains(&s) {
                continue;
            }
            if let Some((dst_file, justification)) = b.moved_out.get(&s) {
                if let Some(w) = self.src_to_work.get(&s) {
                    self.work.detach(*w);
                }
                gone.extend(b.src.pre_order(s));
                leaving.push(Action::MoveOut {
                    node: s,
                    dst_file: dst_file.clone(),
                    justification: *justification,
                });
            }
        }
        leaving.sort_by_key(justification_order);
        self.actions.extend(leaving);

        for s in b.src.post_order(b.src_root) {
            if gone.contains(&s) || !pure.contains(&s) {
                continue;
            }
            if let Some(w) = self.src_to_work.get(&s) {
                self.work.detach(*w);
            }
            self.actions.push(Action::Delete { node: s });
        }
    }

    fn edit_towards_destination(&mut self) -> Result<()> {
        let b = self.builder;
        let mut deferred: HashSet<NodeId> = HashSet::new();
        for x in b.dst.pre_order(b.dst_root) {
            if deferred.contains(&x) {
                continue;
            }
            if b.moved_in.contains_key(&x)
                && b.dst.pre_order(x).iter().all(|d| !self.dst_to_work.contains_key(d))
            {
                deferred.extend(b.dst.pre_order(x));
                self.arrivals.push(x);
                continue;
            }
            let y = b.dst_parent(x);
            let z = self
                .work_of(y)
                .ok_or_else(|| b.invariant(format!("parent of {x:?} has no partner")))?;

            let w = match self.dst_to_work.get(&x).copied() {
                None => self.insert(x, y, z)?,
                Some(w) => {
                    if self.work.label(w) != b.dst.label(x) {
                        let src = self.origin(w)?;
                        self.actions.push(Action::Update { src, dst: x });
                        self.work.set_label(w, b.dst.label(x));
                    }
                    if self.work.parent(w) != Some(z) {
                        let src = self.origin(w)?;
                        let k = self.find_pos(x);
                        self.work.detach(w);
                        self.place(z, k, w)?;
                        self.actions.push(Action::Move {
                            src,
                            dst: x,
                            parent: y,
                            position: k,
                        });
                    }
                    w
                }
            };
            self.src_in_order.insert(w);
            self.dst_in_order.insert(x);
            self.align_children(w, x)?;
        }
        Ok(())
    }

    fn insert(&mut self, x: NodeId, y: Option<NodeId>, z: usize) -> Result<usize> {
        let b = self.builder;
        let k = self.find_pos(x);
        let w = self.work.add_node(b.dst.kind(x), b.dst.label(x), None);
        self.place(z, k, w)?;
        self.link(w, x);
        self.actions.push(Action::Insert {
            node: x,
            parent: y,
            position: k,
        });
        Ok(w)
    }

    fn align_children(&mut self, w: usize, x: NodeId) -> Result<()> {
        let b = self.builder;
        for c in self.work.children(w).to_vec() {
            self.src_in_order.remove(&c);
        }
        for c in b.dst.children(x) {
            self.dst_in_order.remove(c);
        }

        let s1: Vec<usize> = self
            .work
            .children(w)
            .iter()
            .copied()
            .filter(|c| {
                self.work_to_dst
                    .get(c)
                    .is_some_and(|d| b.dst_parent(*d) == Some(x))
            })
            .collect();
        let s2: Vec<NodeId> = b
            .dst
            .children(x)
            .iter()
            .copied()
            .filter(|c| {
                self.dst_to_work
                    .get(c)
                    .is_some_and(|p| self.work.parent(*p) == Some(w))
            })
            .collect();

        let aligned = lcs(&s1, &s2, |a, d| self.work_to_dst.get(a) == Some(d));
        let mut in_lcs = HashSet::new();
        for (i, j) in aligned {
            self.src_in_order.insert(s1[i]);
            self.dst_in_order.insert(s2[j]);
            in_lcs.insert(s1[i]);
        }

        for d in &s2 {
            for a in &s1 {
                if self.work_to_dst.get(a) != Some(d) || in_lcs.contains(a) {
                    continue;
                }
                let src = self.origin(*a)?;
                self.work.detach(*a);
                let k = self.find_pos(*d);
                self.place(w, k, *a)?;
                self.actions.push(Action::Move {
                    src,
                    dst: *d,
                    parent: Some(x),
                    position: k,
                });
                self.src_in_order.insert(*a);
                self.dst_in_order.insert(*d);
            }
        }
        Ok(())
    }

    /// Position in the partner of `x`'s parent right after the partner of
    /// the nearest in-order left sibling of `x`.
    fn find_pos(&self, x: NodeId) -> usize {
        let b = self.builder;
        let siblings = b.dst_children(b.dst_parent(x));
        for c in &siblings {
            if self.dst_in_order.contains(c) {
                if *c == x {
                    return 0;
                }
                break;
            }
        }
        let Some(xpos) = siblings.iter().position(|c| *c == x) else {
            return 0;
        };
        let left = siblings[..xpos]
            .iter()
            .rev()
            .find(|c| self.dst_in_order.contains(*c));
        match left.and_then(|v| self.dst_to_work.get(v)) {
            Some(u) => self.work.position(*u).map_or(0, |p| p + 1),
            None => 0,
        }
    }

    fn place(&mut self, parent: usize, position: usize, w: usize) -> Result<()> {
        if self.work.attach(parent, position, w) {
            Ok(())
        } else {
            Err(self
                .builder
                .invariant(format!("position {position} out of range under work node {parent}")))
        }
    }

    fn origin(&self, w: usize) -> Result<NodeId> {
        self.work
            .origin(w)
            .ok_or_else(|| self.builder.invariant(format!("work node {w} has no source node")))
    }

    /// Whatever is still unmapped had mapped descendants that moved away and
    /// is now deleted leaf by leaf.
    fn delete_remaining(&mut self) -> Result<()> {
        for w in self.work.post_order_below(VIRTUAL_ROOT) {
            if self.work_to_dst.contains_key(&w) {
                continue;
            }
            let node = self.origin(w)?;
            if !self.work.children(w).is_empty() {
                return Err(self
                    .builder
                    .invariant(format!("deleting {node:?} which still has children")));
            }
            self.work.detach(w);
            self.actions.push(Action::Delete { node });
        }
        Ok(())
    }

    /// Graft the moved-in subtrees, grouped by justification. The work tree
    /// now holds every other destination node in order, so each arrival
    /// lands after the siblings already present to its left.
    fn move_in_arrivals(&mut self) -> Result<()> {
        let b = self.builder;
        let mut arrivals: Vec<(NodeId, &PathBuf, Option<usize>)> = Vec::new();
        for x in std::mem::take(&mut self.arrivals) {
            if let Some((src_file, justification)) = b.moved_in.get(&x) {
                arrivals.push((x, src_file, *justification));
            }
        }
        arrivals.sort_by_key(|(_, _, j)| (j.is_none(), *j));

        for (x, src_file, justification) in arrivals {
            let y = b.dst_parent(x);
            let z = self
                .work_of(y)
                .ok_or_else(|| b.invariant(format!("parent of {x:?} has no partner")))?;
            let k = b
                .dst_children(y)
                .iter()
                .take_while(|c| **c != x)
                .filter(|c| self.dst_to_work.contains_key(*c))
                .count();
            let copied = self.work.graft(b.dst, x, z, k, false);
            if copied.get(&x).and_then(|w| self.work.parent(*w)) != Some(z) {
                return Err(b.invariant(format!("cannot move {x:?} in at position {k}")));
            }
            for (d, w) in &copied {
                self.link(*w, *d);
            }
            self.actions.push(Action::MoveIn {
                node: x,
                parent: y,
                position: k,
                src_file: src_file.clone(),
                justification,
            });
        }
        Ok(())
    }
}

fn justification_order(action: &Action) -> (bool, Option<usize>) {
    let j = action.justification();
    (j.is_none(), j)
}
