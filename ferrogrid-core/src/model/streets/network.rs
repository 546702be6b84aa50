use geo::Point;
use hashbrown::HashSet;
use rstar::primitives::GeomWithData;

use super::{StreetEdge, StreetNode};
use crate::StreetNodeId;

/// R-tree entry of a node position with its id
pub type IndexedPoint = GeomWithData<[f64; 2], StreetNodeId>;

/// Edge and node tables of a part of the street network.
///
/// As a cache partition it holds the nodes inside one coarse cell and the
/// edges starting at those nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkPartition {
    pub edges: Vec<StreetEdge>,
    pub nodes: Vec<StreetNode>,
}

impl NetworkPartition {
    pub fn new(edges: Vec<StreetEdge>, nodes: Vec<StreetNode>) -> Self {
        Self { edges, nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Unites partitions, keeping the first occurrence of every edge and node id
    pub fn merge(partitions: impl IntoIterator<Item = NetworkPartition>) -> Self {
        let mut seen_edges = HashSet::new();
        let mut seen_nodes = HashSet::new();
        let mut merged = NetworkPartition::default();

        for partition in partitions {
            merged.edges.extend(
                partition
                    .edges
                    .into_iter()
                    .filter(|edge| seen_edges.insert(edge.id)),
            );
            merged.nodes.extend(
                partition
                    .nodes
                    .into_iter()
                    .filter(|node| seen_nodes.insert(node.id)),
            );
        }

        merged
    }

    pub fn node_points(&self) -> impl Iterator<Item = IndexedPoint> + '_ {
        self.nodes
            .iter()
            .map(|node| IndexedPoint::new([node.geometry.x(), node.geometry.y()], node.id))
    }

    pub fn node_position(&self, id: StreetNodeId) -> Option<Point<f64>> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .map(|node| node.geometry)
    }
}

#[cfg(test)]
mod tests {
    use geo::line_string;

    use super::*;

    fn edge(id: i64, source: i64, target: i64) -> StreetEdge {
        StreetEdge {
            id,
            source,
            target,
            cost: 1.0,
            reverse_cost: 1.0,
            length: 1.0,
            geometry: line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
        }
    }

    #[test]
    fn merge_drops_duplicate_ids() {
        let node = StreetNode {
            id: 1,
            geometry: Point::new(0.0, 0.0),
        };
        let first = NetworkPartition::new(vec![edge(1, 1, 2), edge(2, 2, 3)], vec![node.clone()]);
        let second = NetworkPartition::new(vec![edge(2, 2, 3), edge(3, 3, 4)], vec![node]);

        let merged = NetworkPartition::merge([first, second]);
        let ids: Vec<_> = merged.edges.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(merged.node_count(), 1);
    }
}
