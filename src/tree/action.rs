//! Edit actions and their serializable records.

use crate::ast::{Ast, NodeId, Span};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One step of an edit script.
///
/// Node ids name source-tree nodes for `Delete`, `Update`, `Move` and
/// `MoveOut`, and destination-tree nodes for `Insert` and `MoveIn`. A
/// `parent` of `None` is the virtual node above the diffed subtree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Insert {
        node: NodeId,
        parent: Option<NodeId>,
        position: usize,
    },
    Delete {
        node: NodeId,
    },
    Update {
        src: NodeId,
        dst: NodeId,
    },
    Move {
        src: NodeId,
        dst: NodeId,
        parent: Option<NodeId>,
        position: usize,
    },
    /// A subtree arriving from another file.
    MoveIn {
        node: NodeId,
        parent: Option<NodeId>,
        position: usize,
        src_file: PathBuf,
        /// Index of the refactoring that explains the move.
        justification: Option<usize>,
    },
    /// A subtree leaving for another file.
    MoveOut {
        node: NodeId,
        dst_file: PathBuf,
        justification: Option<usize>,
    },
    /// Consecutive cross-file moves explained by one refactoring.
    MultiMove { members: Vec<Action> },
}

impl Action {
    /// Stable kebab-case name used in records.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Insert { .. } => "insert-node",
            Action::Delete { .. } => "delete-node",
            Action::Update { .. } => "update-node",
            Action::Move { .. } => "move-tree",
            Action::MoveIn { .. } => "move-in",
            Action::MoveOut { .. } => "move-out",
            Action::MultiMove { .. } => "multi-move",
        }
    }

    /// Refactoring index a cross-file move is justified by.
    pub fn justification(&self) -> Option<usize> {
        match self {
            Action::MoveIn { justification, .. } | Action::MoveOut { justification, .. } => {
                *justification
            }
            _ => None,
        }
    }

    /// Number of primitive actions, counting multi-move members.
    pub fn primitive_count(&self) -> usize {
        match self {
            Action::MultiMove { members } => members.iter().map(Action::primitive_count).sum(),
            _ => 1,
        }
    }

    /// Describe the action with file paths and node positions.
    pub fn record(&self, src: &Ast, dst: &Ast) -> ActionRecord {
        let base = |node_type: &str, label: &str| ActionRecord {
            kind: self.name().to_string(),
            src_path: src.path().to_path_buf(),
            dst_path: dst.path().to_path_buf(),
            node_type: node_type.to_string(),
            label: label.to_string(),
            src_position: None,
            dst_position: None,
            members: Vec::new(),
        };
        match self {
            Action::Insert { node, .. } => ActionRecord {
                dst_position: Some(dst.span(*node)),
                ..base(dst.kind(*node), dst.label(*node))
            },
            Action::Delete { node } => ActionRecord {
                src_position: Some(src.span(*node)),
                ..base(src.kind(*node), src.label(*node))
            },
            Action::Update { src: s, dst: d } => ActionRecord {
                src_position: Some(src.span(*s)),
                dst_position: Some(dst.span(*d)),
                ..base(dst.kind(*d), dst.label(*d))
            },
            Action::Move { src: s, dst: d, .. } => ActionRecord {
                src_position: Some(src.span(*s)),
                dst_position: Some(dst.span(*d)),
                ..base(src.kind(*s), src.label(*s))
            },
            Action::MoveIn { node, src_file, .. } => ActionRecord {
                src_path: src_file.clone(),
                dst_position: Some(dst.span(*node)),
                ..base(dst.kind(*node), dst.label(*node))
            },
            Action::MoveOut { node, dst_file, .. } => ActionRecord {
                dst_path: dst_file.clone(),
                src_position: Some(src.span(*node)),
                ..base(src.kind(*node), src.label(*node))
            },
            Action::MultiMove { members } => ActionRecord {
                members: members.iter().map(|m| m.record(src, dst)).collect(),
                ..base("", "")
            },
        }
    }
}

/// Serializable description of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: String,
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_position: Option<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_position: Option<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ActionRecord>,
}

impl ActionRecord {
    /// Whether the record concerns the given file on either side.
    pub fn touches(&self, path: &Path) -> bool {
        self.src_path == path || self.dst_path == path
    }
}

/// Group runs of adjacent cross-file moves sharing a justification. The
/// script builder emits departures and arrivals each sorted by
/// justification, so every refactoring yields at most one group per phase.
pub fn group_multi_moves(actions: Vec<Action>) -> Vec<Action> {
    let mut out: Vec<Action> = Vec::with_capacity(actions.len());
    let mut run: Vec<Action> = Vec::new();

    let flush = |run: &mut Vec<Action>, out: &mut Vec<Action>| match run.len() {
        0 => {}
        1 => out.append(run),
        _ => out.push(Action::MultiMove {
            members: std::mem::take(run),
        }),
    };

    for action in actions {
        let key = action.justification();
        let continues = key.is_some() && run.last().and_then(Action::justification) == key;
        if !continues {
            flush(&mut run, &mut out);
        }
        if key.is_some() {
            run.push(action);
        } else {
            out.push(action);
        }
    }
    flush(&mut run, &mut out);
    out
}
