use hashbrown::HashMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::model::StreetEdge;
use crate::{CostUnit, Error, Seconds, StreetNodeId, TravelCost};

/// Conversion of stored edge costs into travel time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightModel {
    /// Stored costs already are seconds
    Seconds,
    /// Stored costs are metres, travelled at the given speed in m/s
    MetresAtSpeed(f64),
}

impl WeightModel {
    pub fn new(unit: CostUnit, travel_cost: &TravelCost) -> Result<Self, Error> {
        match unit {
            CostUnit::Seconds => Ok(WeightModel::Seconds),
            CostUnit::Metres => {
                let speed = travel_cost.speed_mps();
                if speed.is_finite() && speed > 0.0 {
                    Ok(WeightModel::MetresAtSpeed(speed))
                } else {
                    Err(Error::InvalidData(format!(
                        "Speed must be positive, got {} km/h",
                        travel_cost.speed
                    )))
                }
            }
        }
    }

    fn seconds(self, cost: f64) -> Seconds {
        match self {
            WeightModel::Seconds => cost,
            WeightModel::MetresAtSpeed(speed) => cost / speed,
        }
    }
}

/// Directed arc of the routing graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphArc {
    /// Traversal time in seconds
    pub weight: Seconds,
    /// Index of the street edge in the table the graph was built from
    pub edge: usize,
}

/// Directed routing graph over a compacted vertex space.
///
/// Vertex indices are only meaningful together with the edge table the
/// graph was built from. Parallel arcs are kept since every street edge
/// has its own geometry.
#[derive(Debug, Clone)]
pub struct RoutingGraph {
    pub graph: DiGraph<StreetNodeId, GraphArc>,
    vertices: HashMap<StreetNodeId, NodeIndex>,
    /// (source, target) vertices of every street edge, by edge index
    endpoints: Vec<(NodeIndex, NodeIndex)>,
}

impl RoutingGraph {
    /// Builds the graph from an edge table
    ///
    /// # Errors
    ///
    /// `Error::GraphConstruction` on negative or NaN costs and lengths, and
    /// on geometries with less than two points
    pub fn build(edges: &[StreetEdge], weights: WeightModel) -> Result<Self, Error> {
        let mut graph = DiGraph::with_capacity(edges.len(), edges.len() * 2);
        let mut vertices: HashMap<StreetNodeId, NodeIndex> = HashMap::with_capacity(edges.len());
        let mut endpoints = Vec::with_capacity(edges.len());

        for (index, edge) in edges.iter().enumerate() {
            validate_edge(edge)?;

            let source = *vertices
                .entry(edge.source)
                .or_insert_with(|| graph.add_node(edge.source));
            let target = *vertices
                .entry(edge.target)
                .or_insert_with(|| graph.add_node(edge.target));
            endpoints.push((source, target));

            if edge.cost.is_finite() {
                graph.add_edge(
                    source,
                    target,
                    GraphArc {
                        weight: weights.seconds(edge.cost),
                        edge: index,
                    },
                );
            }
            if edge.reverse_cost.is_finite() {
                graph.add_edge(
                    target,
                    source,
                    GraphArc {
                        weight: weights.seconds(edge.reverse_cost),
                        edge: index,
                    },
                );
            }
        }

        Ok(Self {
            graph,
            vertices,
            endpoints,
        })
    }

    pub fn vertex(&self, node: StreetNodeId) -> Option<NodeIndex> {
        self.vertices.get(&node).copied()
    }

    pub fn node_id(&self, vertex: NodeIndex) -> Option<StreetNodeId> {
        self.graph.node_weight(vertex).copied()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn arc_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of street edges the graph was built from
    pub fn street_edge_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Source and target vertex of the street edge at `edge`
    pub fn edge_endpoints(&self, edge: usize) -> Option<(NodeIndex, NodeIndex)> {
        self.endpoints.get(edge).copied()
    }
}

fn validate_edge(edge: &StreetEdge) -> Result<(), Error> {
    for (name, cost) in [("cost", edge.cost), ("reverse_cost", edge.reverse_cost)] {
        if cost.is_nan() || cost < 0.0 {
            return Err(Error::GraphConstruction(format!(
                "Edge {} has invalid {name} {cost}",
                edge.id
            )));
        }
    }
    if !edge.length.is_finite() || edge.length < 0.0 {
        return Err(Error::GraphConstruction(format!(
            "Edge {} has invalid length {}",
            edge.id, edge.length
        )));
    }
    if edge.geometry.0.len() < 2 {
        return Err(Error::GraphConstruction(format!(
            "Edge {} has a degenerate geometry",
            edge.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::line_string;
    use petgraph::visit::EdgeRef;

    use super::*;

    fn edge(id: i64, source: i64, target: i64, cost: f64, reverse_cost: f64) -> StreetEdge {
        StreetEdge {
            id,
            source,
            target,
            cost,
            reverse_cost,
            length: 10.0,
            geometry: line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)],
        }
    }

    fn arcs(graph: &RoutingGraph) -> Vec<(i64, i64, f64)> {
        graph
            .graph
            .edge_references()
            .map(|arc| {
                (
                    graph.graph[arc.source()],
                    graph.graph[arc.target()],
                    arc.weight().weight,
                )
            })
            .collect()
    }

    #[test]
    fn one_way_edge_produces_forward_arc_only() {
        let graph =
            RoutingGraph::build(&[edge(1, 10, 20, 5.0, f64::INFINITY)], WeightModel::Seconds).unwrap();
        assert_eq!(arcs(&graph), vec![(10, 20, 5.0)]);
    }

    #[test]
    fn two_way_edge_produces_both_arcs() {
        let graph = RoutingGraph::build(&[edge(1, 10, 20, 5.0, 7.0)], WeightModel::Seconds).unwrap();
        assert_eq!(arcs(&graph), vec![(10, 20, 5.0), (20, 10, 7.0)]);
    }

    #[test]
    fn impassable_edge_keeps_its_vertices() {
        let graph = RoutingGraph::build(
            &[edge(1, 10, 20, f64::INFINITY, f64::INFINITY)],
            WeightModel::Seconds,
        )
        .unwrap();
        assert_eq!(graph.arc_count(), 0);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.street_edge_count(), 1);
    }

    #[test]
    fn parallel_edges_are_preserved() {
        let graph = RoutingGraph::build(
            &[
                edge(1, 10, 20, 5.0, f64::INFINITY),
                edge(2, 10, 20, 3.0, f64::INFINITY),
            ],
            WeightModel::Seconds,
        )
        .unwrap();
        assert_eq!(arcs(&graph), vec![(10, 20, 5.0), (10, 20, 3.0)]);
    }

    #[test]
    fn vertex_ids_are_dense_and_bijective() {
        let graph = RoutingGraph::build(
            &[edge(1, 100, 7, 1.0, 1.0), edge(2, 7, 55, 1.0, 1.0)],
            WeightModel::Seconds,
        )
        .unwrap();
        assert_eq!(graph.vertex_count(), 3);
        for node in [100, 7, 55] {
            let vertex = graph.vertex(node).unwrap();
            assert!(vertex.index() < 3);
            assert_eq!(graph.node_id(vertex), Some(node));
        }
    }

    #[test]
    fn metre_costs_are_scaled_by_speed() {
        let graph =
            RoutingGraph::build(&[edge(1, 1, 2, 100.0, 100.0)], WeightModel::MetresAtSpeed(2.0))
                .unwrap();
        assert_eq!(arcs(&graph), vec![(1, 2, 50.0), (2, 1, 50.0)]);
    }

    #[test]
    fn malformed_edges_are_rejected() {
        let negative = edge(1, 1, 2, -1.0, 1.0);
        let nan = edge(2, 1, 2, 1.0, f64::NAN);
        let mut degenerate = edge(3, 1, 2, 1.0, 1.0);
        degenerate.geometry = line_string![(x: 0.0, y: 0.0)];
        let mut endless = edge(4, 1, 2, 1.0, 1.0);
        endless.length = f64::INFINITY;
        let mut unmeasured = edge(5, 1, 2, 1.0, 1.0);
        unmeasured.length = f64::NAN;

        for bad in [negative, nan, degenerate, endless, unmeasured] {
            assert!(matches!(
                RoutingGraph::build(&[bad], WeightModel::Seconds),
                Err(Error::GraphConstruction(_))
            ));
        }
    }
}
