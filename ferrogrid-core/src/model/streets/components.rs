//! Street network components - nodes and edges

use geo::{LineString, Point};

use crate::{StreetEdgeId, StreetNodeId};

/// Street graph node
#[derive(Debug, Clone, PartialEq)]
pub struct StreetNode {
    /// Source id of the node
    pub id: StreetNodeId,
    /// Node coordinates in Web Mercator metres
    pub geometry: Point<f64>,
}

/// Street graph edge (street segment)
#[derive(Debug, Clone, PartialEq)]
pub struct StreetEdge {
    pub id: StreetEdgeId,
    pub source: StreetNodeId,
    pub target: StreetNodeId,
    /// Cost of traversing from `source` to `target`, infinite if forbidden
    pub cost: f64,
    /// Cost of traversing from `target` to `source`, infinite if forbidden
    pub reverse_cost: f64,
    /// Length in metres
    pub length: f64,
    /// Geometry in Web Mercator metres, ordered from source to target
    pub geometry: LineString<f64>,
}

impl StreetEdge {
    /// Planar length of the geometry in mercator units
    pub fn geometry_length(&self) -> f64 {
        self.geometry
            .lines()
            .map(|line| (line.end.x - line.start.x).hypot(line.end.y - line.start.y))
            .sum()
    }
}
