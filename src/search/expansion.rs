use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::driver::LatsSearch;
use super::node::{NodeId, NodeState, StateCell, StateGuard};
use super::observation::{ObservationOutcome, ObservationRequest};
use super::transition::Transition;
use super::tree::SearchTree;
use crate::config::RunMode;
use crate::events::{Event, NodeView};
use crate::oracle::Message;
use crate::prompts::{observation_message, parse_failure_message, OBSERVATION_STOP};

struct Dispatch {
    node: NodeId,
    cell: StateCell,
    request: ObservationRequest,
}

impl LatsSearch {
    /// Expand `id` into oracle candidates and observe them.
    ///
    /// Returns the new children in candidate order. A node at the depth
    /// ceiling becomes terminal instead. Children are all committed before
    /// any observation starts.
    pub async fn expand(&self, tree: &mut SearchTree, id: NodeId) -> Vec<NodeId> {
        if tree[id].is_terminal {
            return Vec::new();
        }

        let settings = self.core().settings();
        if tree[id].depth() >= settings.depth_threshold {
            debug!(node = %id, depth = tree[id].depth(), "Depth ceiling reached");
            tree[id].is_terminal = true;
            self.emit_update(tree, id);
            return Vec::new();
        }

        let _guard = tree[id].enter_state(NodeState::Expanding);
        let transcript = tree.transcript(id);
        let candidates = match self
            .core()
            .oracle()
            .propose(&transcript, &[OBSERVATION_STOP], settings.branch_count)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                // The root stays open so a later iteration can retry it.
                if tree[id].parent().is_none() {
                    warn!(node = %id, error = %e, "Candidate generation failed at the root");
                    return Vec::new();
                }
                warn!(node = %id, error = %e, "Candidate generation failed, closing branch");
                tree[id].finish(0.0);
                self.emit_update(tree, id);
                return Vec::new();
            }
        };

        let (children, dispatches) = self.commit_candidates(tree, id, candidates);
        debug!(
            node = %id,
            children = children.len(),
            dispatched = dispatches.len(),
            "Candidates committed"
        );

        self.observe_all(tree, dispatches).await;
        children
    }

    fn commit_candidates(
        &self,
        tree: &mut SearchTree,
        parent: NodeId,
        candidates: Vec<Message>,
    ) -> (Vec<NodeId>, Vec<Dispatch>) {
        let mut seen = HashSet::new();
        let mut children = Vec::new();
        let mut dispatches = Vec::new();

        for candidate in candidates {
            let parsed = Transition::parse(&candidate.text);
            if let Ok(transition) = &parsed {
                if let Some(key) = transition.dedup_key() {
                    if !seen.insert(key) {
                        debug!(parent = %parent, "Duplicate candidate dropped");
                        continue;
                    }
                }
            }

            let Some(child) = tree.add_child(parent, vec![candidate]) else {
                break;
            };
            match parsed {
                Ok(transition) => {
                    tree[child].transition = transition.clone();
                    dispatches.push(Dispatch {
                        node: child,
                        cell: tree[child].state_cell().clone(),
                        request: ObservationRequest {
                            transition,
                            transcript: tree.transcript(child),
                            depth: tree[child].depth(),
                        },
                    });
                }
                Err(e) => {
                    let text = parse_failure_message(&e.to_string());
                    let depth = tree[child].depth();
                    tree.push_message(child, Message::user(observation_message(depth, &text)));
                    tree[child].observation = Some(text);
                }
            }

            children.push(child);
            self.env().emit(Event::AddNode {
                session_id: self.env().session_id().to_string(),
                parent: parent.0,
                node: NodeView::from(&tree[child]),
            });
        }

        (children, dispatches)
    }

    /// Run observation for every dispatch and fold the outcomes into the tree.
    async fn observe_all(&self, tree: &mut SearchTree, dispatches: Vec<Dispatch>) {
        if dispatches.is_empty() {
            return;
        }

        let mut pending: HashSet<NodeId> = dispatches.iter().map(|d| d.node).collect();
        let observer = self.observer();

        if self.core().settings().run_mode == RunMode::Interactive {
            for dispatch in dispatches {
                let result = {
                    let _running = StateGuard::enter(&dispatch.cell, NodeState::Running);
                    observer.observe(dispatch.request).await
                };
                match result {
                    Ok(outcome) => {
                        pending.remove(&dispatch.node);
                        self.apply_outcome(tree, dispatch.node, outcome);
                    }
                    Err(e) => warn!(node = %dispatch.node, error = %e, "Observation failed"),
                }
            }
        } else {
            let limit = Arc::new(Semaphore::new(self.core().settings().branch_count.max(1)));
            let mut tasks = JoinSet::new();
            for dispatch in dispatches {
                let observer = observer.clone();
                let limit = limit.clone();
                tasks.spawn(async move {
                    let _permit = limit.acquire_owned().await;
                    let _running = StateGuard::enter(&dispatch.cell, NodeState::Running);
                    (dispatch.node, observer.observe(dispatch.request).await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((node, Ok(outcome))) => {
                        pending.remove(&node);
                        self.apply_outcome(tree, node, outcome);
                    }
                    Ok((node, Err(e))) => warn!(node = %node, error = %e, "Observation failed"),
                    Err(e) => warn!(error = %e, "Observation task panicked"),
                }
            }
        }

        for node in pending {
            tree[node].finish(0.0);
            self.emit_update(tree, node);
        }
    }

    fn apply_outcome(&self, tree: &mut SearchTree, id: NodeId, outcome: ObservationOutcome) {
        let node = &mut tree[id];
        node.messages.extend(outcome.messages);
        if outcome.observation.is_some() {
            node.observation = outcome.observation;
        }
        node.auxiliary.extend(outcome.auxiliary);
        if let Some(reward) = outcome.terminal_reward {
            node.finish(reward);
            if node.is_success() {
                node.state_cell().set(NodeState::Success);
            }
        }
        self.emit_update(tree, id);
    }
}
