//! Isochrone requests: travel time from a set of origins projected onto
//! fine H3 cells, returned either per cell or dissolved into a polygon.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use h3o::{CellIndex, LatLng, geom::SolventBuilder};
use log::{debug, error, info};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::algo::projection::{CellCosts, ProjectionIndex, TargetGrid};
use crate::extract::{Extractor, SnapPolicy};
use crate::grid::{ShortCell, from_mercator};
use crate::routing::{RoutingGraph, WeightModel, multi_source_shortest_paths};
use crate::{Context, Error, RoutingMode, Seconds, TravelCost};

/// Shape of an isochrone result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsochroneOutput {
    /// Reached cells dissolved into one multipolygon
    #[default]
    Polygon,
    /// Travel time per reached cell
    Grid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneRequest {
    pub id: String,
    pub origins: Vec<LatLng>,
    pub mode: RoutingMode,
    /// Overrides the default travel cost of `mode`
    pub travel_cost: Option<TravelCost>,
    pub output: IsochroneOutput,
}

#[derive(Deserialize)]
struct RawRequest {
    id: String,
    /// `[lng, lat]` pairs
    origins: Vec<[f64; 2]>,
    #[serde(default)]
    mode: RoutingMode,
    #[serde(default)]
    travel_cost: Option<TravelCost>,
    #[serde(default)]
    output: IsochroneOutput,
}

impl IsochroneRequest {
    /// Parses a request, origins given as `[lng, lat]` pairs
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let raw: RawRequest =
            serde_json::from_str(json).map_err(|e| Error::InvalidData(e.to_string()))?;
        let origins = raw
            .origins
            .iter()
            .map(|[lng, lat]| {
                LatLng::new(*lat, *lng).map_err(|e| {
                    Error::InvalidData(format!("Invalid origin [{lng}, {lat}]: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: raw.id,
            origins,
            mode: raw.mode,
            travel_cost: raw.travel_cost,
            output: raw.output,
        })
    }

    pub fn travel_cost(&self) -> TravelCost {
        self.travel_cost
            .unwrap_or_else(|| self.mode.default_travel_cost())
    }
}

/// Travel time to one fine cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellCost {
    pub cell: CellIndex,
    pub cost: Seconds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IsochroneResult {
    /// Reached cells ordered by cell index
    Grid(Vec<CellCost>),
    /// Reached area in WGS84 degrees
    Polygon(MultiPolygon),
}

impl IsochroneResult {
    /// Converts the result to a `GeoJSON` `FeatureCollection`: one feature
    /// for a polygon, one hexagon per cell for a grid
    pub fn to_geojson(&self) -> Result<FeatureCollection, Error> {
        let features = match self {
            IsochroneResult::Polygon(polygon) => {
                let value = json!({
                    "type": "Feature",
                    "geometry": Geometry::new(GeoJsonValue::from(polygon)),
                    "properties": {},
                });
                vec![Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))?]
            }
            IsochroneResult::Grid(cells) => cells
                .iter()
                .map(|cell| {
                    let value = json!({
                        "type": "Feature",
                        "geometry": Geometry::new(GeoJsonValue::from(&cell_polygon(cell.cell))),
                        "properties": {
                            "cell": ShortCell::from_cell(cell.cell).value(),
                            "h3_index": cell.cell.to_string(),
                            "cost": cell.cost,
                        },
                    });
                    Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }

    pub fn to_geojson_string(&self) -> Result<String, Error> {
        serde_json::to_string(&self.to_geojson()?).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

/// Hexagon of a cell in WGS84 degrees
fn cell_polygon(cell: CellIndex) -> Polygon {
    let mut ring = cell
        .boundary()
        .iter()
        .map(|vertex| Coord {
            x: vertex.lng(),
            y: vertex.lat(),
        })
        .collect::<Vec<_>>();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    Polygon::new(LineString::new(ring), vec![])
}

/// Final state of a request as reported back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStatus {
    pub request_id: String,
    pub outcome: RequestOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed(IsochroneResult),
    Failed(String),
}

impl RequestStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RequestOutcome::Completed(_))
    }
}

/// Travel time per fine cell from the nearest of the request origins
pub fn compute_cell_costs(ctx: &Context, request: &IsochroneRequest) -> Result<CellCosts, Error> {
    let travel_cost = request.travel_cost();
    let max_cost = travel_cost.max_cost();

    let sub = Extractor::new(ctx).extract(&request.origins, &travel_cost, SnapPolicy::Strict)?;
    let weights = WeightModel::new(ctx.config.routing.cost_unit, &travel_cost)?;
    let graph = RoutingGraph::build(&sub.network.edges, weights)?;

    let sources = sub
        .connectors
        .iter()
        .map(|connector| {
            graph.vertex(connector.node).ok_or_else(|| {
                Error::NoReachableNetwork(format!(
                    "Origin {} snapped to node {} outside the routing graph",
                    connector.origin, connector.node
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let distances = multi_source_shortest_paths(&graph, &sources, max_cost);

    // Everything reached lies within the buffer of a snapped node, not
    // necessarily of the origin itself
    let anchors = sub
        .connectors
        .iter()
        .map(|connector| {
            sub.network
                .node_position(connector.node)
                .ok_or_else(|| {
                    Error::InvalidData(format!("Node {} has no position", connector.node))
                })
                .and_then(|point| from_mercator(point.0))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let target = TargetGrid::around_points(&ctx.grid, &anchors, sub.buffer_distance)?;
    let index = ProjectionIndex::new(&sub.network.edges, &graph, &target, ctx.sample_spacing())?;
    let speed = travel_cost.speed_mps();

    let costs = distances
        .par_iter()
        .map(|vector| index.project(vector, speed, max_cost))
        .reduce(CellCosts::new, merge_minimum);

    debug!(
        "Request {}: {} vertices, {} of {} target cells reached",
        request.id,
        graph.vertex_count(),
        costs.len(),
        target.len()
    );
    Ok(costs)
}

fn merge_minimum(mut into: CellCosts, from: CellCosts) -> CellCosts {
    for (cell, cost) in from {
        into.entry(cell)
            .and_modify(|best| *best = best.min(cost))
            .or_insert(cost);
    }
    into
}

/// Computes the isochrone of a request in the requested output shape
pub fn compute_isochrone(ctx: &Context, request: &IsochroneRequest) -> Result<IsochroneResult, Error> {
    let costs = compute_cell_costs(ctx, request)?;
    let fine = ctx.grid.fine;

    let mut cells = costs
        .into_iter()
        .map(|(short, cost)| {
            ShortCell::new(short, fine)
                .to_cell()
                .map(|cell| CellCost { cell, cost })
        })
        .collect::<Result<Vec<_>, _>>()?;
    cells.sort_unstable_by_key(|cell| cell.cell);

    match request.output {
        IsochroneOutput::Grid => Ok(IsochroneResult::Grid(cells)),
        IsochroneOutput::Polygon => {
            let solvent = SolventBuilder::new().build();
            solvent
                .dissolve(cells.iter().map(|cell| cell.cell))
                .map(IsochroneResult::Polygon)
                .map_err(|e| Error::IsochroneError(e.to_string()))
        }
    }
}

/// Runs a request to completion and reports its final state. Failures are
/// reported in the status, never returned or raised.
pub fn run(ctx: &Context, request: &IsochroneRequest) -> RequestStatus {
    info!(
        "Running isochrone request {} with {} origins ({})",
        request.id,
        request.origins.len(),
        request.mode.as_str()
    );

    let outcome = match compute_isochrone(ctx, request) {
        Ok(result) => {
            info!("Isochrone request {} completed", request.id);
            RequestOutcome::Completed(result)
        }
        Err(e) => {
            error!("Isochrone request {} failed: {e}", request.id);
            RequestOutcome::Failed(e.to_string())
        }
    };

    RequestStatus {
        request_id: request.id.clone(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use geo::BoundingRect;
    use tempfile::tempdir;

    use super::*;
    use crate::testing::{MUNICH, lattice_context};

    fn request(origins: Vec<LatLng>, output: IsochroneOutput) -> IsochroneRequest {
        IsochroneRequest {
            id: "test".to_string(),
            origins,
            mode: RoutingMode::Walking,
            travel_cost: Some(TravelCost {
                max_traveltime: 5,
                speed: 5.0,
            }),
            output,
        }
    }

    fn munich() -> LatLng {
        LatLng::new(MUNICH.0, MUNICH.1).unwrap()
    }

    #[test]
    fn grid_costs_start_at_zero_and_respect_cutoff() {
        let dir = tempdir().unwrap();
        let ctx = lattice_context(dir.path(), 21, 21, 100.0);
        let request = request(vec![munich()], IsochroneOutput::Grid);

        let IsochroneResult::Grid(cells) = compute_isochrone(&ctx, &request).unwrap() else {
            panic!("expected grid output");
        };

        assert!(!cells.is_empty());
        let max_cost = request.travel_cost().max_cost();
        assert!(cells.iter().all(|cell| cell.cost >= 0.0 && cell.cost <= max_cost));
        assert!(cells.iter().any(|cell| cell.cost == 0.0));
        assert!(cells.windows(2).all(|pair| pair[0].cell < pair[1].cell));
    }

    #[test]
    fn several_origins_never_do_worse_than_one() {
        let dir = tempdir().unwrap();
        let ctx = lattice_context(dir.path(), 31, 31, 100.0);
        let west = LatLng::new(MUNICH.0, MUNICH.1 - 0.006).unwrap();
        let east = LatLng::new(MUNICH.0, MUNICH.1 + 0.006).unwrap();

        let both =
            compute_cell_costs(&ctx, &request(vec![west, east], IsochroneOutput::Grid)).unwrap();
        for origin in [west, east] {
            let single = compute_cell_costs(&ctx, &request(vec![origin], IsochroneOutput::Grid))
                .unwrap();
            assert!(!single.is_empty());
            for (cell, cost) in &single {
                assert!(both[cell] <= cost + 1e-9, "cell {cell}");
            }
        }
    }

    #[test]
    fn merge_keeps_the_minimum() {
        let a = CellCosts::from_iter([(1, 10.0), (2, 30.0)]);
        let b = CellCosts::from_iter([(2, 20.0), (3, 5.0)]);

        let merged = merge_minimum(a, b);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[&1], 10.0);
        assert_eq!(merged[&2], 20.0);
        assert_eq!(merged[&3], 5.0);
    }

    #[test]
    fn polygon_covers_the_origin() {
        let dir = tempdir().unwrap();
        let ctx = lattice_context(dir.path(), 21, 21, 100.0);
        let request = request(vec![munich()], IsochroneOutput::Polygon);

        let IsochroneResult::Polygon(polygon) = compute_isochrone(&ctx, &request).unwrap() else {
            panic!("expected polygon output");
        };

        let bounds = polygon.bounding_rect().unwrap();
        assert!(bounds.min().x < MUNICH.1 && MUNICH.1 < bounds.max().x);
        assert!(bounds.min().y < MUNICH.0 && MUNICH.0 < bounds.max().y);

        let collection = IsochroneResult::Polygon(polygon).to_geojson().unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[test]
    fn run_reports_failure_without_panicking() {
        let dir = tempdir().unwrap();
        let ctx = lattice_context(dir.path(), 5, 5, 100.0);
        let far = LatLng::new(MUNICH.0 + 0.2, MUNICH.1).unwrap();
        let request = request(vec![far], IsochroneOutput::Grid);

        let status = run(&ctx, &request);
        assert_eq!(status.request_id, "test");
        assert!(matches!(status.outcome, RequestOutcome::Failed(_)));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let dir = tempdir().unwrap();
        let ctx = lattice_context(dir.path(), 21, 21, 100.0);
        let request = request(vec![munich()], IsochroneOutput::Grid);

        let first = run(&ctx, &request);
        let second = run(&ctx, &request);
        assert!(first.is_completed());
        assert_eq!(first, second);
    }

    #[test]
    fn parses_request_json() {
        let request = IsochroneRequest::from_json(
            r#"{"id": "42", "origins": [[11.575, 48.137]], "mode": "bicycle", "output": "grid"}"#,
        )
        .unwrap();

        assert_eq!(request.id, "42");
        assert_eq!(request.mode, RoutingMode::Bicycle);
        assert_eq!(request.output, IsochroneOutput::Grid);
        assert!((request.origins[0].lat() - 48.137).abs() < 1e-9);
        assert!((request.travel_cost().speed - 15.0).abs() < f64::EPSILON);

        assert!(IsochroneRequest::from_json(r#"{"id": "x", "origins": [[11.0, 95.0]]}"#).is_err());
    }
}
