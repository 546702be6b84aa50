//! CSV export of the routing network tables.
//!
//! `edges.csv` columns: `id,source,target,cost,reverse_cost,length,geom`
//! where `geom` is a WKT `LINESTRING` in Web Mercator. `nodes.csv`
//! columns: `id,x,y`. A negative cost marks a forbidden direction, as in
//! pgRouting exports, and is loaded as an infinite cost.

use std::fs::File;
use std::path::Path;

use geo::{LineString, Point};
use serde::Deserialize;
use wkt::TryFromWkt;

use super::InMemoryNetworkSource;
use crate::model::{StreetEdge, StreetNode};
use crate::{Error, StreetEdgeId, StreetNodeId};

#[derive(Debug, Deserialize)]
struct RawEdge {
    id: StreetEdgeId,
    source: StreetNodeId,
    target: StreetNodeId,
    cost: f64,
    reverse_cost: f64,
    length: f64,
    geom: String,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: StreetNodeId,
    x: f64,
    y: f64,
}

/// Loads a street network from edge and node CSV files
pub fn load_csv_network(
    network_id: &str,
    edges_path: &Path,
    nodes_path: &Path,
) -> Result<InMemoryNetworkSource, Error> {
    let edges = deserialize_csv_file::<RawEdge>(edges_path)?
        .into_iter()
        .map(|raw| {
            let geometry = LineString::<f64>::try_from_wkt_str(&raw.geom).map_err(|e| {
                Error::InvalidData(format!("Invalid geometry of edge {}: {e}", raw.id))
            })?;
            Ok(StreetEdge {
                id: raw.id,
                source: raw.source,
                target: raw.target,
                cost: forbidden_as_infinite(raw.cost),
                reverse_cost: forbidden_as_infinite(raw.reverse_cost),
                length: raw.length,
                geometry,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let nodes = deserialize_csv_file::<RawNode>(nodes_path)?
        .into_iter()
        .map(|raw| StreetNode {
            id: raw.id,
            geometry: Point::new(raw.x, raw.y),
        })
        .collect();

    InMemoryNetworkSource::new(network_id, edges, nodes)
}

fn deserialize_csv_file<T>(path: &Path) -> Result<Vec<T>, Error>
where
    T: for<'de> Deserialize<'de>,
{
    let file = File::open(path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to open file '{}': {}", path.display(), e),
        )
    })?;
    csv::Reader::from_reader(file)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(Error::from)
}

fn forbidden_as_infinite(cost: f64) -> f64 {
    if cost < 0.0 { f64::INFINITY } else { cost }
}
