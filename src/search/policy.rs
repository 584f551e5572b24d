use tracing::debug;

use super::node::NodeId;
use super::tree::SearchTree;

/// Upper confidence bound of a child.
///
/// Unvisited nodes use their value alone.
pub fn uct(value: f64, visits: u32, parent_visits: u32) -> f64 {
    if visits == 0 {
        return value;
    }
    let parent = f64::from(parent_visits.max(1));
    value + (2.0 * parent.ln() / f64::from(visits)).sqrt()
}

/// Walk from the root to the node that should be expanded next.
///
/// A node whose active children are all terminal is exhausted: it is pruned
/// and the walk resumes at its parent. A terminal child with full reward is
/// returned immediately.
pub fn select(tree: &mut SearchTree) -> NodeId {
    let mut current = tree.root();

    loop {
        let active = tree.active_children(current);
        if active.is_empty() {
            return current;
        }

        if active.iter().all(|c| tree[*c].is_terminal) {
            match tree[current].parent() {
                Some(parent) => {
                    debug!(node = %current, "Subtree exhausted, backtracking");
                    tree.prune(current);
                    current = parent;
                    continue;
                }
                None => return current,
            }
        }

        if let Some(success) = active.iter().find(|c| tree[**c].is_success()) {
            return *success;
        }

        let parent_visits = tree[current].visits;
        let mut best: Option<(NodeId, f64)> = None;
        for child in active.into_iter().filter(|c| !tree[*c].is_terminal) {
            let node = &tree[child];
            let score = uct(node.value, node.visits, parent_visits);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((child, score));
            }
        }

        match best {
            Some((child, _)) => current = child,
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Message;

    fn tree_with_children(n: usize) -> (SearchTree, Vec<NodeId>) {
        let mut tree = SearchTree::new(vec![Message::user("q")]);
        let root = tree.root();
        let children = (0..n)
            .map(|i| tree.add_child(root, vec![Message::assistant(format!("c{i}"))]).unwrap())
            .collect();
        (tree, children)
    }

    #[test]
    fn test_uct_unvisited_uses_value() {
        assert_eq!(uct(0.3, 0, 10), 0.3);
    }

    #[test]
    fn test_uct_bonus_shrinks_with_visits() {
        let few = uct(0.5, 1, 10);
        let many = uct(0.5, 8, 10);
        assert!(few > many);
        assert!(many > 0.5);
    }

    #[test]
    fn test_select_leaf_root() {
        let mut tree = SearchTree::new(vec![Message::user("q")]);
        assert_eq!(select(&mut tree), tree.root());
    }

    #[test]
    fn test_select_prefers_highest_uct() {
        let (mut tree, children) = tree_with_children(3);
        tree[children[1]].value = 0.8;
        tree[children[2]].value = 0.2;
        assert_eq!(select(&mut tree), children[1]);
    }

    #[test]
    fn test_select_returns_successful_terminal_child() {
        let (mut tree, children) = tree_with_children(2);
        tree[children[0]].value = 0.9;
        tree[children[1]].finish(1.0);
        assert_eq!(select(&mut tree), children[1]);
    }

    #[test]
    fn test_select_skips_failed_terminal_child() {
        let (mut tree, children) = tree_with_children(2);
        tree[children[0]].value = 0.9;
        tree[children[0]].finish(0.0);
        tree[children[1]].value = 0.1;
        assert_eq!(select(&mut tree), children[1]);
    }

    #[test]
    fn test_select_backtracks_from_exhausted_subtree() {
        let (mut tree, children) = tree_with_children(2);
        let (a, b) = (children[0], children[1]);
        tree[a].value = 0.9;
        tree[b].value = 0.1;
        let a1 = tree.add_child(a, vec![Message::assistant("a1")]).unwrap();
        let a2 = tree.add_child(a, vec![Message::assistant("a2")]).unwrap();
        tree[a1].finish(0.0);
        tree[a2].finish(0.2);

        assert_eq!(select(&mut tree), b);
        assert!(tree[a].pruned);
        // The exhausted subtree stays unreachable.
        tree[a].value = 10.0;
        assert_eq!(select(&mut tree), b);
    }
}
