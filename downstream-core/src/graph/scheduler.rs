//! Update Scheduler
//!
//! The scheduler decides which streams to consider after a write, and in
//! which order, so that every parent has had its chance to update before any
//! of its children is evaluated.
//!
//! # Algorithm
//!
//! 1. Walk the graph depth-first from the written stream along child edges,
//!    recording every visit. Diamond-shaped graphs record a node once per
//!    path that reaches it.
//! 2. Keep only the last occurrence of each node, in traversal order.
//!
//! In a DAG, the last visit of a node comes after every path through its
//! ancestors has been recorded, so the surviving order is topological.
//!
//! ```text
//!   s -> s2 -> s4
//!   s -> s3 -> s4
//!
//!   traversal:  [s, s2, s4, s3, s4]
//!   order:      [s, s2,     s3, s4]
//! ```
//!
//! Step 2 is a single reverse pass with a seen-set. Cycles are not
//! detected; a cyclic graph never finishes step 1.

use std::collections::HashSet;
use std::sync::Arc;

use super::node::NodeRef;

/// Compute the propagation order for a write to `root`. `root` comes first.
pub(crate) fn update_order(root: &NodeRef) -> Vec<NodeRef> {
    let mut traversal = Vec::new();
    let mut stack = vec![Arc::clone(root)];

    // Iterative pre-order DFS; children are pushed in reverse so the first
    // child is visited first.
    while let Some(node) = stack.pop() {
        stack.extend(node.live_children().into_iter().rev());
        traversal.push(node);
    }

    let mut seen = HashSet::with_capacity(traversal.len());
    let mut order: Vec<NodeRef> = traversal
        .into_iter()
        .rev()
        .filter(|node| seen.insert(node.id()))
        .collect();
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{link, Node, NodeId};
    use crate::reactive::operator::{ParentEnded, Update};

    fn node() -> NodeRef {
        Arc::new(Node::new(0, Update::Source, ParentEnded::EndSelf, None, 0))
    }

    fn ids(order: &[NodeRef]) -> Vec<NodeId> {
        order.iter().map(|n| n.id()).collect()
    }

    #[test]
    fn single_node_orders_itself() {
        let root = node();
        assert_eq!(ids(&update_order(&root)), vec![root.id()]);
    }

    #[test]
    fn chain_is_ordered_parent_first() {
        let a = node();
        let b = node();
        let c = node();
        link(&a, &b);
        link(&b, &c);

        assert_eq!(ids(&update_order(&a)), vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn diamond_keeps_last_occurrence() {
        // s -> s2 -> s4, s -> s3 -> s4
        let s = node();
        let s2 = node();
        let s3 = node();
        let s4 = node();
        link(&s, &s2);
        link(&s, &s3);
        link(&s2, &s4);
        link(&s3, &s4);

        assert_eq!(
            ids(&update_order(&s)),
            vec![s.id(), s2.id(), s3.id(), s4.id()]
        );
    }

    #[test]
    fn direct_edge_to_grandchild_is_scheduled_after_intermediate() {
        // a -> c is linked before a -> b -> c exists.
        let a = node();
        let b = node();
        let c = node();
        link(&a, &b);
        link(&a, &c);
        link(&b, &c);

        let order = ids(&update_order(&a));
        let pos_b = order.iter().position(|id| *id == b.id());
        let pos_c = order.iter().position(|id| *id == c.id());
        assert!(pos_b < pos_c);
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn only_descendants_are_scheduled() {
        let a = node();
        let b = node();
        let unrelated = node();
        link(&a, &b);
        link(&unrelated, &b);

        assert_eq!(ids(&update_order(&a)), vec![a.id(), b.id()]);
    }
}
