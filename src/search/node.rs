use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::transition::Transition;
use crate::oracle::Message;

/// Index of a node inside its [`SearchTree`](super::SearchTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Transient execution phase of a node. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NodeState {
    #[default]
    Idle = 0,
    Running = 1,
    Expanding = 2,
    Evaluating = 3,
    Rollout = 4,
    Reflecting = 5,
    Success = 6,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => NodeState::Running,
            2 => NodeState::Expanding,
            3 => NodeState::Evaluating,
            4 => NodeState::Rollout,
            5 => NodeState::Reflecting,
            6 => NodeState::Success,
            _ => NodeState::Idle,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Idle => "idle",
            NodeState::Running => "running",
            NodeState::Expanding => "expanding",
            NodeState::Evaluating => "evaluating",
            NodeState::Rollout => "rollout",
            NodeState::Reflecting => "reflecting",
            NodeState::Success => "success",
        };
        f.write_str(name)
    }
}

/// Shareable cell holding a [`NodeState`].
///
/// Observation tasks get a clone so they can flag their node as running
/// without borrowing the tree.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(state: NodeState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> NodeState {
        NodeState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: NodeState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn replace(&self, state: NodeState) -> NodeState {
        NodeState::from_u8(self.0.swap(state as u8, Ordering::SeqCst))
    }
}

/// Scoped state change: sets a state and restores the previous one on drop.
#[must_use = "the previous state is restored when the guard is dropped"]
pub struct StateGuard {
    cell: StateCell,
    previous: NodeState,
}

impl StateGuard {
    pub fn enter(cell: &StateCell, state: NodeState) -> Self {
        let previous = cell.replace(state);
        Self {
            cell: cell.clone(),
            previous,
        }
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

/// A vertex of the search tree.
///
/// Structural fields (id, parent, children, depth) are owned by the tree and
/// only readable from outside; search statistics are plain fields.
#[derive(Debug, Clone)]
pub struct Node {
    pub(super) id: NodeId,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) depth: usize,
    /// Messages introduced at this node only
    pub messages: Vec<Message>,
    pub transition: Transition,
    pub observation: Option<String>,
    pub visits: u32,
    /// Running mean of backpropagated rewards
    pub value: f64,
    pub is_terminal: bool,
    /// Meaningful only when terminal
    pub reward: f64,
    pub auxiliary: Map<String, Value>,
    /// Detached from the search frontier after its subtree was exhausted
    pub pruned: bool,
    pub(super) state: StateCell,
}

impl Node {
    pub(super) fn new(id: NodeId, parent: Option<NodeId>, depth: usize, messages: Vec<Message>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            depth,
            messages,
            transition: Transition::None,
            observation: None,
            visits: 0,
            value: 0.0,
            is_terminal: false,
            reward: 0.0,
            auxiliary: Map::new(),
            pruned: false,
            state: StateCell::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn state(&self) -> NodeState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &StateCell {
        &self.state
    }

    /// Enter `state` for the lifetime of the returned guard.
    pub fn enter_state(&self, state: NodeState) -> StateGuard {
        StateGuard::enter(&self.state, state)
    }

    /// Terminal with full reward.
    pub fn is_success(&self) -> bool {
        self.is_terminal && self.reward >= 1.0
    }

    /// Concatenated text of this node's own messages.
    pub fn own_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Mark terminal with the given reward.
    pub fn finish(&mut self, reward: f64) {
        self.is_terminal = true;
        self.reward = reward;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_guard_restores_previous() {
        let cell = StateCell::new(NodeState::Idle);
        {
            let _outer = StateGuard::enter(&cell, NodeState::Expanding);
            assert_eq!(cell.get(), NodeState::Expanding);
            {
                let _inner = StateGuard::enter(&cell, NodeState::Evaluating);
                assert_eq!(cell.get(), NodeState::Evaluating);
            }
            assert_eq!(cell.get(), NodeState::Expanding);
        }
        assert_eq!(cell.get(), NodeState::Idle);
    }

    #[test]
    fn test_state_guard_restores_on_error_path() {
        fn failing(cell: &StateCell) -> Result<(), String> {
            let _guard = StateGuard::enter(cell, NodeState::Rollout);
            Err("boom".to_string())?;
            Ok(())
        }

        let cell = StateCell::new(NodeState::Running);
        assert!(failing(&cell).is_err());
        assert_eq!(cell.get(), NodeState::Running);
    }

    #[test]
    fn test_state_guard_restores_on_panic() {
        let cell = StateCell::new(NodeState::Idle);
        let inner = cell.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = StateGuard::enter(&inner, NodeState::Reflecting);
            panic!("tool crashed");
        });
        assert!(result.is_err());
        assert_eq!(cell.get(), NodeState::Idle);
    }

    #[test]
    fn test_node_defaults() {
        let node = Node::new(NodeId(0), None, 0, vec![Message::user("q")]);
        assert!(node.transition.is_none());
        assert_eq!(node.visits, 0);
        assert!(!node.is_terminal);
        assert_eq!(node.state(), NodeState::Idle);
        assert_eq!(node.own_text(), "q");
        assert_eq!(node.id().to_string(), "n0");
    }

    #[test]
    fn test_finish_and_success() {
        let mut node = Node::new(NodeId(1), Some(NodeId(0)), 1, Vec::new());
        node.finish(0.5);
        assert!(node.is_terminal);
        assert!(!node.is_success());
        node.finish(1.0);
        assert!(node.is_success());
    }
}
