use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::node::{Node, NodeId, NodeState};
use super::transition::Transition;
use crate::oracle::Message;

/// Arena of nodes rooted at index 0.
///
/// Nodes are never removed; pruning only hides a subtree from selection,
/// so final bookkeeping still sees every node ever created.
#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

/// Recursive, serializable view of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub messages: Vec<Message>,
    pub transition: Transition,
    pub observation: Option<String>,
    pub depth: usize,
    pub visits: u32,
    pub value: f64,
    pub is_terminal: bool,
    pub reward: f64,
    pub state: NodeState,
    #[serde(default)]
    pub auxiliary: Map<String, Value>,
    #[serde(default)]
    pub pruned: bool,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl SearchTree {
    /// Create a tree whose root holds `messages`.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            nodes: vec![Node::new(NodeId(0), None, 0, messages)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Number of nodes ever created
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Append a child carrying `messages`. Terminal parents accept no children.
    pub fn add_child(&mut self, parent: NodeId, messages: Vec<Message>) -> Option<NodeId> {
        let (depth, terminal) = {
            let node = self.get(parent)?;
            (node.depth + 1, node.is_terminal)
        };
        if terminal {
            return None;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, Some(parent), depth, messages));
        self[parent].children.push(id);
        Some(id)
    }

    /// Append a message to a node's own messages.
    pub fn push_message(&mut self, id: NodeId, message: Message) {
        self[id].messages.push(message);
    }

    /// Ids from `id` up to and including the root.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = self[id].parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self[parent].parent;
        }
        path
    }

    /// Full transcript: every ancestor's own messages followed by this node's.
    pub fn transcript(&self, id: NodeId) -> Vec<Message> {
        self.path_to_root(id)
            .into_iter()
            .rev()
            .flat_map(|n| self[n].messages.iter().cloned())
            .collect()
    }

    /// Children still reachable by selection.
    pub fn active_children(&self, id: NodeId) -> Vec<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .filter(|c| !self[*c].pruned)
            .collect()
    }

    /// Detach a subtree from the search frontier.
    pub fn prune(&mut self, id: NodeId) {
        self[id].pruned = true;
    }

    /// First terminal node with full reward, in creation order.
    pub fn find_success(&self) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.is_success()).map(|n| n.id)
    }

    /// Highest-reward node anywhere in the tree.
    ///
    /// Ties prefer terminal nodes, then higher value, then earlier creation.
    pub fn best_reward_node(&self) -> NodeId {
        let mut best = &self.nodes[0];
        for node in &self.nodes[1..] {
            let better = node.reward > best.reward
                || (node.reward == best.reward && node.is_terminal && !best.is_terminal)
                || (node.reward == best.reward
                    && node.is_terminal == best.is_terminal
                    && node.value > best.value);
            if better {
                best = node;
            }
        }
        best.id
    }

    /// Serialize the whole tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot_from(self.root())
    }

    fn snapshot_from(&self, id: NodeId) -> NodeSnapshot {
        let node = &self[id];
        NodeSnapshot {
            messages: node.messages.clone(),
            transition: node.transition.clone(),
            observation: node.observation.clone(),
            depth: node.depth,
            visits: node.visits,
            value: node.value,
            is_terminal: node.is_terminal,
            reward: node.reward,
            state: node.state(),
            auxiliary: node.auxiliary.clone(),
            pruned: node.pruned,
            children: node.children.iter().map(|c| self.snapshot_from(*c)).collect(),
        }
    }

    /// Rebuild a tree with the shape of `snapshot`. Depths are recomputed.
    pub fn from_snapshot(snapshot: &NodeSnapshot) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.restore(snapshot, None, 0);
        tree
    }

    fn restore(&mut self, snapshot: &NodeSnapshot, parent: Option<NodeId>, depth: usize) {
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(id, parent, depth, snapshot.messages.clone());
        node.transition = snapshot.transition.clone();
        node.observation = snapshot.observation.clone();
        node.visits = snapshot.visits;
        node.value = snapshot.value;
        node.is_terminal = snapshot.is_terminal;
        node.reward = snapshot.reward;
        node.auxiliary = snapshot.auxiliary.clone();
        node.pruned = snapshot.pruned;
        node.state.set(snapshot.state);
        self.nodes.push(node);
        if let Some(parent) = parent {
            self[parent].children.push(id);
        }
        for child in &snapshot.children {
            self.restore(child, Some(id), depth + 1);
        }
    }
}

impl Index<NodeId> for SearchTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for SearchTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}
