use geo::Point;
use h3o::CellIndex;
use hashbrown::HashMap;
use log::{debug, info};

use crate::grid::{GridIndex, from_mercator};
use crate::model::{NetworkPartition, StreetEdge, StreetNode};
use crate::{Error, StreetNodeId};

/// Source of truth of a street network, queried per coarse cell when the
/// cache does not hold the partition
pub trait NetworkSource: Send + Sync {
    /// Identifier of the network, part of every cache key
    fn network_id(&self) -> &str;

    /// Nodes inside `cell` and the edges starting at them
    fn fetch_partition(&self, cell: CellIndex, grid: &GridIndex)
    -> Result<NetworkPartition, Error>;
}

/// Full network held in memory and partitioned on demand
#[derive(Debug, Clone)]
pub struct InMemoryNetworkSource {
    network_id: String,
    edges: Vec<StreetEdge>,
    nodes: Vec<StreetNode>,
    node_positions: HashMap<StreetNodeId, Point<f64>>,
}

impl InMemoryNetworkSource {
    pub fn new(
        network_id: impl Into<String>,
        edges: Vec<StreetEdge>,
        nodes: Vec<StreetNode>,
    ) -> Result<Self, Error> {
        let node_positions: HashMap<StreetNodeId, Point<f64>> =
            nodes.iter().map(|node| (node.id, node.geometry)).collect();

        if let Some(edge) = edges.iter().find(|edge| {
            !node_positions.contains_key(&edge.source) || !node_positions.contains_key(&edge.target)
        }) {
            return Err(Error::InvalidData(format!(
                "Edge {} references a node missing from the node table",
                edge.id
            )));
        }

        let network_id = network_id.into();
        info!(
            "Loaded street network '{network_id}' with {} edges and {} nodes",
            edges.len(),
            nodes.len()
        );

        Ok(Self {
            network_id,
            edges,
            nodes,
            node_positions,
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn coarse_cell_of(&self, position: Point<f64>, grid: &GridIndex) -> Result<CellIndex, Error> {
        from_mercator(position.0).map(|latlng| grid.coarse_cell(latlng))
    }
}

impl NetworkSource for InMemoryNetworkSource {
    fn network_id(&self) -> &str {
        &self.network_id
    }

    fn fetch_partition(
        &self,
        cell: CellIndex,
        grid: &GridIndex,
    ) -> Result<NetworkPartition, Error> {
        let mut nodes = Vec::new();
        for node in &self.nodes {
            if self.coarse_cell_of(node.geometry, grid)? == cell {
                nodes.push(node.clone());
            }
        }

        let mut edges = Vec::new();
        for edge in &self.edges {
            let source = self.node_positions[&edge.source];
            if self.coarse_cell_of(source, grid)? == cell {
                edges.push(edge.clone());
            }
        }

        debug!(
            "Fetched {} edges and {} nodes of cell {cell} from source",
            edges.len(),
            nodes.len()
        );
        Ok(NetworkPartition::new(edges, nodes))
    }
}

#[cfg(test)]
mod tests {
    use geo::line_string;
    use h3o::LatLng;

    use super::*;
    use crate::grid::to_mercator;

    fn node(id: i64, lat: f64, lng: f64) -> StreetNode {
        StreetNode {
            id,
            geometry: Point::from(to_mercator(LatLng::new(lat, lng).unwrap())),
        }
    }

    #[test]
    fn partitions_follow_source_nodes() {
        let nodes = vec![node(1, 48.137, 11.575), node(2, 52.52, 13.405)];
        let edges = vec![StreetEdge {
            id: 7,
            source: 1,
            target: 2,
            cost: 1.0,
            reverse_cost: 1.0,
            length: 1.0,
            geometry: line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)],
        }];
        let source = InMemoryNetworkSource::new("net", edges, nodes).unwrap();
        let grid = GridIndex::default();

        let munich = grid.coarse_cell(LatLng::new(48.137, 11.575).unwrap());
        let berlin = grid.coarse_cell(LatLng::new(52.52, 13.405).unwrap());

        let first = source.fetch_partition(munich, &grid).unwrap();
        assert_eq!(first.edge_count(), 1);
        assert_eq!(first.node_count(), 1);

        let second = source.fetch_partition(berlin, &grid).unwrap();
        assert!(second.is_empty());
        assert_eq!(second.node_count(), 1);
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let edges = vec![StreetEdge {
            id: 1,
            source: 1,
            target: 99,
            cost: 1.0,
            reverse_cost: 1.0,
            length: 1.0,
            geometry: line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)],
        }];
        assert!(InMemoryNetworkSource::new("net", edges, vec![node(1, 0.0, 0.0)]).is_err());
    }
}
