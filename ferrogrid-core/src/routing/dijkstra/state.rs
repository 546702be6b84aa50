use std::cmp::Ordering;

use petgraph::graph::NodeIndex;

use crate::Seconds;

/// Heap entry of the search. Costs are never NaN.
#[derive(Copy, Clone, PartialEq)]
pub(super) struct State {
    pub(super) cost: Seconds,
    pub(super) node: NodeIndex,
}

impl Eq for State {}

// Implement Ord for State to use in BinaryHeap
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost (reversed from standard Rust BinaryHeap),
        // ties go to the lower vertex index
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
