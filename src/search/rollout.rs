use tracing::{debug, warn};

use super::driver::LatsSearch;
use super::node::{NodeId, NodeState};
use super::tree::SearchTree;

/// Score every child of one parent and store the scores as initial values.
///
/// Returns the scores in child order; on oracle failure all children score 0.
pub(super) async fn score_children(
    search: &LatsSearch,
    tree: &mut SearchTree,
    parent: NodeId,
    children: &[NodeId],
) -> Vec<f64> {
    let _guard = tree[parent].enter_state(NodeState::Evaluating);
    let context = tree.transcript(parent);
    let fragments: Vec<String> = children.iter().map(|c| tree[*c].own_text()).collect();

    let scores = match search
        .core()
        .evaluator()
        .score_siblings(&context, &fragments)
        .await
    {
        Ok(scores) => scores,
        Err(e) => {
            warn!(node = %parent, error = %e, "Sibling scoring failed");
            vec![0.0; children.len()]
        }
    };

    for (child, score) in children.iter().zip(&scores) {
        let node = &mut tree[*child];
        node.auxiliary.insert("score".to_string(), serde_json::Value::from(*score));
        if node.visits == 0 && !node.is_terminal {
            node.value = *score;
        }
    }
    scores
}

/// Highest-scoring child whose transition parsed; the first wins ties.
pub(super) fn best_candidate(tree: &SearchTree, children: &[NodeId], scores: &[f64]) -> Option<(NodeId, f64)> {
    let mut best: Option<(NodeId, f64)> = None;
    for (child, score) in children.iter().zip(scores) {
        if tree[*child].transition.is_none() {
            continue;
        }
        if best.map_or(true, |(_, s)| *score > s) {
            best = Some((*child, *score));
        }
    }
    best
}

impl LatsSearch {
    /// Greedy simulated continuation from `start`.
    ///
    /// Returns the mean of the per-step best scores and the node where the
    /// walk stopped. Reaching a terminal child returns that child's reward;
    /// running out of steps yields -1.
    pub async fn rollout(&self, tree: &mut SearchTree, start: NodeId) -> (f64, NodeId) {
        if tree[start].is_terminal {
            return (tree[start].reward, start);
        }

        let _guard = tree[start].enter_state(NodeState::Rollout);
        let threshold = self.core().settings().rollout_threshold;
        let mut scores: Vec<f64> = Vec::new();
        let mut current = start;
        let mut steps = 0;

        while !tree[current].is_terminal {
            if steps >= threshold {
                debug!(node = %current, steps = steps, "Rollout step budget exhausted");
                scores = vec![-1.0];
                break;
            }
            steps += 1;

            let children = self.expand(tree, current).await;
            if tree[current].is_terminal {
                break;
            }

            let terminal = children
                .iter()
                .copied()
                .filter(|c| tree[*c].is_terminal)
                .fold(None::<NodeId>, |best, c| match best {
                    Some(b) if tree[b].reward >= tree[c].reward => Some(b),
                    _ => Some(c),
                });
            if let Some(terminal) = terminal {
                debug!(node = %terminal, reward = tree[terminal].reward, "Rollout reached a terminal child");
                return (tree[terminal].reward, terminal);
            }

            if children.is_empty() {
                continue;
            }
            let step_scores = score_children(self, tree, current, &children).await;
            match best_candidate(tree, &children, &step_scores) {
                Some((child, score)) => {
                    scores.push(score);
                    current = child;
                }
                None => debug!(node = %current, "No parseable child to descend into"),
            }
        }

        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        (mean, current)
    }
}

/// Propagate `value` from `id` up to the root as a running mean.
///
/// A terminal node with reward 0 is a confirmed dead end: it and every
/// ancestor blend toward -1 instead of `value`.
pub fn backpropagate(tree: &mut SearchTree, id: NodeId, value: f64) {
    let dead_end = tree[id].is_terminal && tree[id].reward == 0.0;

    for n in tree.path_to_root(id) {
        let node = &mut tree[n];
        node.visits += 1;
        let target = if dead_end || (node.is_terminal && node.reward == 0.0) {
            -1.0
        } else {
            value
        };
        let visits = f64::from(node.visits);
        node.value = (node.value * (visits - 1.0) + target) / visits;
    }
}
