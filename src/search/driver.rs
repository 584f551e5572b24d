use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::node::{NodeId, NodeState};
use super::observation::Observer;
use super::policy::select;
use super::rollout::{backpropagate, best_candidate, score_children};
use super::tree::SearchTree;
use super::SearchCore;
use crate::events::{Event, NodeView};
use crate::session::SessionEnv;

/// Result of one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Successful terminal node, or the best node seen at exhaustion
    pub node: NodeId,
    pub success: bool,
    /// Outer iterations performed
    pub iterations: usize,
    /// Reflections written during this run
    pub reflections: Vec<String>,
}

/// The outer select / expand / evaluate / rollout / backpropagate loop.
#[derive(Clone)]
pub struct LatsSearch {
    core: SearchCore,
    env: Arc<SessionEnv>,
}

impl LatsSearch {
    pub fn new(core: SearchCore, env: Arc<SessionEnv>) -> Self {
        Self { core, env }
    }

    #[inline]
    pub fn core(&self) -> &SearchCore {
        &self.core
    }

    #[inline]
    pub fn env(&self) -> &Arc<SessionEnv> {
        &self.env
    }

    pub(super) fn observer(&self) -> Observer {
        Observer::new(self.core.clone(), self.env.clone())
    }

    pub(super) fn emit_update(&self, tree: &SearchTree, id: NodeId) {
        self.env.emit(Event::UpdateNode {
            session_id: self.env.session_id().to_string(),
            node: NodeView::from(&tree[id]),
        });
    }

    fn succeed(&self, tree: &SearchTree, node: NodeId, iterations: usize, reflections: Vec<String>) -> SearchOutcome {
        tree[node].state_cell().set(NodeState::Success);
        self.emit_update(tree, node);
        info!(
            session_id = %self.env.session_id(),
            node = %node,
            iterations = iterations,
            "Search succeeded"
        );
        SearchOutcome {
            node,
            success: true,
            iterations,
            reflections,
        }
    }

    /// Run the search on `tree` until a full-reward terminal node is found or
    /// the iteration budget is spent.
    pub async fn run(&self, tree: &mut SearchTree) -> SearchOutcome {
        let start = Instant::now();
        let budget = self.core.settings().depth_threshold;
        let mut reflections = Vec::new();

        info!(
            session_id = %self.env.session_id(),
            budget = budget,
            branch_count = self.core.settings().branch_count,
            "Starting search"
        );

        for iteration in 1..=budget {
            let selected = select(tree);
            debug!(iteration = iteration, node = %selected, depth = tree[selected].depth(), "Selected node");
            if tree[selected].is_success() {
                return self.succeed(tree, selected, iteration, reflections);
            }

            let children = {
                let _running = tree[selected].enter_state(NodeState::Running);
                self.expand(tree, selected).await
            };
            if let Some(success) = tree.find_success() {
                return self.succeed(tree, success, iteration, reflections);
            }
            if children.is_empty() {
                debug!(iteration = iteration, node = %selected, "Expansion produced no children");
                continue;
            }

            let scores = score_children(self, tree, selected, &children).await;
            let Some((best, score)) = best_candidate(tree, &children, &scores) else {
                debug!(iteration = iteration, "No parseable child to roll out");
                continue;
            };
            debug!(iteration = iteration, node = %best, score = score, "Rolling out best child");

            let (reward, terminal) = self.rollout(tree, best).await;
            if tree[terminal].is_success() {
                return self.succeed(tree, terminal, iteration, reflections);
            }

            if let Some(reflection) = self.reflect(tree, terminal).await {
                reflections.push(reflection);
            }

            backpropagate(tree, terminal, reward);
            for id in tree.path_to_root(terminal) {
                self.emit_update(tree, id);
            }

            if let Some(success) = tree.find_success() {
                return self.succeed(tree, success, iteration, reflections);
            }
        }

        let best = tree.best_reward_node();
        info!(
            session_id = %self.env.session_id(),
            node = %best,
            reward = tree[best].reward,
            nodes = tree.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search exhausted"
        );
        SearchOutcome {
            node: best,
            success: false,
            iterations: budget,
            reflections,
        }
    }

    async fn reflect(&self, tree: &mut SearchTree, node: NodeId) -> Option<String> {
        let _guard = tree[node].enter_state(NodeState::Reflecting);
        let transcript = tree.transcript(node);
        match self.core.evaluator().reflect(&transcript).await {
            Ok(reflection) if !reflection.is_empty() => {
                tree[node]
                    .auxiliary
                    .insert("reflection".to_string(), serde_json::Value::from(reflection.clone()));
                Some(reflection)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(node = %node, error = %e, "Reflection failed");
                None
            }
        }
    }
}
