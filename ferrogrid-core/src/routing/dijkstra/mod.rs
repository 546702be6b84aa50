mod state;

use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use petgraph::{graph::NodeIndex, visit::EdgeRef};
use rayon::prelude::*;

use self::state::State;
use super::RoutingGraph;
use crate::Seconds;

/// Marker of a vertex not reached within the cutoff.
///
/// Kept out of the valid range on purpose: every reached vertex has a
/// finite cost, so `is_finite` is the reachability test.
pub const UNREACHED: Seconds = f64::INFINITY;

/// Travel times from one origin to every vertex of a [`RoutingGraph`]
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceVector {
    costs: Vec<Seconds>,
}

impl DistanceVector {
    pub fn unreached(len: usize) -> Self {
        Self {
            costs: vec![UNREACHED; len],
        }
    }

    /// Travel time to `vertex`, `None` if not reached
    pub fn get(&self, vertex: NodeIndex) -> Option<Seconds> {
        self.costs
            .get(vertex.index())
            .copied()
            .filter(|cost| cost.is_finite())
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn reached_count(&self) -> usize {
        self.costs.iter().filter(|cost| cost.is_finite()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Seconds>> + '_ {
        self.costs
            .iter()
            .map(|cost| Some(*cost).filter(|c| c.is_finite()))
    }

    /// Raw costs, [`UNREACHED`] for vertices out of reach
    pub fn as_slice(&self) -> &[Seconds] {
        &self.costs
    }
}

/// Dijkstra's algorithm bounded by `max_cost`.
///
/// A vertex whose tentative cost exceeds `max_cost` is neither labelled nor
/// expanded, so every entry of the result is the origin (0), a finite cost
/// not above `max_cost`, or [`UNREACHED`].
pub fn shortest_paths(graph: &RoutingGraph, source: NodeIndex, max_cost: Seconds) -> DistanceVector {
    let vertex_count = graph.vertex_count();
    let mut distances = DistanceVector::unreached(vertex_count);
    if source.index() >= vertex_count || max_cost.is_nan() || max_cost < 0.0 {
        return distances;
    }

    let costs = &mut distances.costs;
    let mut settled = FixedBitSet::with_capacity(vertex_count);
    let mut heap = BinaryHeap::with_capacity(vertex_count.min(1024));

    // Start node has distance 0
    costs[source.index()] = 0.0;
    heap.push(State {
        cost: 0.0,
        node: source,
    });

    while let Some(State { cost, node }) = heap.pop() {
        // Skip stale entries of vertices settled through a better path
        if settled.put(node.index()) {
            continue;
        }

        // Examine neighbors
        for edge in graph.graph.edges(node) {
            let next = edge.target();
            let next_cost = cost + edge.weight().weight;

            if next_cost > max_cost || settled.contains(next.index()) {
                continue;
            }

            if next_cost < costs[next.index()] {
                costs[next.index()] = next_cost;
                heap.push(State {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    distances
}

/// Runs one bounded search per origin in parallel.
/// The result is ordered like `sources`.
pub fn multi_source_shortest_paths(
    graph: &RoutingGraph,
    sources: &[NodeIndex],
    max_cost: Seconds,
) -> Vec<DistanceVector> {
    sources
        .par_iter()
        .map(|source| shortest_paths(graph, *source, max_cost))
        .collect()
}
