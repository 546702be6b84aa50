//! Sub-network extraction.
//!
//! Loads the coarse partitions around a batch of origins, cached or fetched
//! from the source, keeps the edges within reach of the origins and snaps
//! every origin onto its nearest network node.

use geo::{Coord, Intersects, Rect};
use h3o::{CellIndex, LatLng};
use hashbrown::HashSet;
use log::{debug, trace, warn};
use rayon::prelude::*;
use rstar::{PointDistance, RTree};

use crate::grid::{mercator_scale, to_mercator};
use crate::model::{IndexedPoint, NetworkPartition};
use crate::{Context, Error, StreetNodeId, TravelCost};

/// Metres per degree of latitude
const METRES_PER_DEGREE: f64 = 111_320.0;

/// What to do with an origin that has no network node within the snapping
/// radius
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapPolicy {
    /// Fail the whole extraction
    Strict,
    /// Leave the origin out of the result
    Skip,
}

/// Entry point of an origin into the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginConnector {
    /// Index of the origin in the request
    pub origin: usize,
    pub node: StreetNodeId,
    pub fine_cell: CellIndex,
    pub coarse_cell: CellIndex,
}

/// Network around a batch of origins
#[derive(Debug, Clone)]
pub struct SubNetwork {
    pub network: NetworkPartition,
    pub connectors: Vec<OriginConnector>,
    /// Reach of the request in metres
    pub buffer_distance: f64,
}

pub struct Extractor<'a> {
    ctx: &'a Context,
}

impl<'a> Extractor<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Extracts the network reachable from `origins` within `travel_cost`
    ///
    /// # Errors
    ///
    /// `Error::NoReachableNetwork` if an origin cannot be snapped under
    /// `SnapPolicy::Strict`, cache and source errors otherwise.
    pub fn extract(
        &self,
        origins: &[LatLng],
        travel_cost: &TravelCost,
        policy: SnapPolicy,
    ) -> Result<SubNetwork, Error> {
        if origins.is_empty() {
            return Err(Error::InvalidData("No origins provided".to_string()));
        }

        let buffer_distance = travel_cost.buffer_distance();
        let bounds = buffered_bounds(origins, buffer_distance);
        let cells = self.ctx.grid.coarse_cells_in_bounds(bounds)?;
        debug!(
            "Extracting network for {} origins from {} coarse cells, buffer {buffer_distance:.0} m",
            origins.len(),
            cells.len()
        );

        let partitions = cells
            .iter()
            .map(|cell| self.load_partition(*cell))
            .collect::<Result<Vec<_>, Error>>()?;
        let mut network = NetworkPartition::merge(partitions);

        let mercator_bounds = Rect::new(
            to_mercator(latlng(bounds.min())?),
            to_mercator(latlng(bounds.max())?),
        );
        network
            .edges
            .retain(|edge| edge.geometry.intersects(&mercator_bounds));
        let used_nodes: HashSet<StreetNodeId> = network
            .edges
            .iter()
            .flat_map(|edge| [edge.source, edge.target])
            .collect();
        network.nodes.retain(|node| used_nodes.contains(&node.id));

        if network.is_empty() && policy == SnapPolicy::Strict {
            return Err(Error::NoReachableNetwork(format!(
                "No street network within {buffer_distance:.0} m of the origins"
            )));
        }

        let connectors = self.snap_origins(origins, &network, policy)?;
        debug!(
            "Extracted {} edges, {} of {} origins snapped",
            network.edge_count(),
            connectors.len(),
            origins.len()
        );

        Ok(SubNetwork {
            network,
            connectors,
            buffer_distance,
        })
    }

    /// Reads a partition from cache, recomputing and caching it on a miss
    /// or a corrupt entry
    pub fn load_partition(&self, cell: CellIndex) -> Result<NetworkPartition, Error> {
        let network_id = self.ctx.network_id();
        match self.ctx.cache.try_read(network_id, cell) {
            Ok(Some(partition)) => return Ok(partition),
            Ok(None) => trace!("Cell {cell} not cached"),
            Err(e) => warn!("{e}, recomputing partition"),
        }

        let partition = self.ctx.source.fetch_partition(cell, &self.ctx.grid)?;
        self.ctx.cache.write(network_id, cell, &partition)?;
        Ok(partition)
    }

    fn snap_origins(
        &self,
        origins: &[LatLng],
        network: &NetworkPartition,
        policy: SnapPolicy,
    ) -> Result<Vec<OriginConnector>, Error> {
        let routable: HashSet<StreetNodeId> = network
            .edges
            .iter()
            .filter(|edge| edge.cost.is_finite() || edge.reverse_cost.is_finite())
            .flat_map(|edge| [edge.source, edge.target])
            .collect();
        let rtree = RTree::bulk_load(
            network
                .node_points()
                .filter(|point| routable.contains(&point.data))
                .collect::<Vec<IndexedPoint>>(),
        );
        let max_snap_distance = self.ctx.config.routing.max_snap_distance;
        let grid = &self.ctx.grid;

        let snapped = origins
            .par_iter()
            .enumerate()
            .map(|(index, origin)| {
                let query = to_mercator(*origin);
                let query = [query.x, query.y];
                let max_distance = max_snap_distance * mercator_scale(origin.lat());

                let nearest = rtree
                    .nearest_neighbor(&query)
                    .filter(|point| point.distance_2(&query) <= max_distance * max_distance);

                match (nearest, policy) {
                    (Some(point), _) => Ok(Some(OriginConnector {
                        origin: index,
                        node: point.data,
                        fine_cell: grid.fine_cell(*origin),
                        coarse_cell: grid.coarse_cell(*origin),
                    })),
                    (None, SnapPolicy::Skip) => {
                        trace!("Origin {index} at {origin:?} has no street within {max_snap_distance} m");
                        Ok(None)
                    }
                    (None, SnapPolicy::Strict) => Err(Error::NoReachableNetwork(format!(
                        "Origin {index} at {origin:?} has no street within {max_snap_distance} m"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(snapped.into_iter().flatten().collect())
    }
}

/// Bounding rectangle of the origins in degrees grown by `distance` metres
fn buffered_bounds(origins: &[LatLng], distance: f64) -> Rect<f64> {
    let (mut min_lat, mut max_lat) = (f64::MAX, f64::MIN);
    let (mut min_lng, mut max_lng) = (f64::MAX, f64::MIN);
    for origin in origins {
        min_lat = min_lat.min(origin.lat());
        max_lat = max_lat.max(origin.lat());
        min_lng = min_lng.min(origin.lng());
        max_lng = max_lng.max(origin.lng());
    }

    let widest = min_lat.abs().max(max_lat.abs()).min(85.0);
    let dlat = distance / METRES_PER_DEGREE;
    let dlng = distance / (METRES_PER_DEGREE * widest.to_radians().cos());

    Rect::new(
        Coord {
            x: (min_lng - dlng).max(-180.0),
            y: (min_lat - dlat).max(-85.0),
        },
        Coord {
            x: (max_lng + dlng).min(180.0),
            y: (max_lat + dlat).min(85.0),
        },
    )
}

fn latlng(coord: Coord<f64>) -> Result<LatLng, Error> {
    LatLng::new(coord.y, coord.x)
        .map_err(|e| Error::InvalidData(format!("Invalid coordinate {coord:?}: {e}")))
}
