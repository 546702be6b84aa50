//! Graph construction and shortest path search over an extracted
//! sub-network.

pub mod dijkstra;
pub mod graph;

pub use dijkstra::{DistanceVector, UNREACHED, multi_source_shortest_paths, shortest_paths};
pub use graph::{GraphArc, RoutingGraph, WeightModel};
