//! Projection of network travel times onto fine grid cells.
//!
//! Edges are sampled along their geometry once per sub-network; every sample
//! remembers the fine cell whose centroid is nearest to it. Projecting the
//! distance vector of an origin then only walks the samples of the edges
//! with a reached endpoint.

use geo::{Coord, LineString};
use h3o::{CellIndex, LatLng};
use hashbrown::{HashMap, HashSet};
use rstar::{PointDistance, RTree, primitives::GeomWithData};

use crate::grid::{GridIndex, ShortCell, mercator_scale, to_mercator};
use crate::model::StreetEdge;
use crate::routing::{DistanceVector, RoutingGraph};
use crate::{Error, Seconds};

/// Travel time per fine cell, keyed by short cell id. Only reached cells
/// are present.
pub type CellCosts = HashMap<i64, Seconds>;

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

/// Fine cells that may receive a cost, indexed by centroid
#[derive(Clone)]
pub struct TargetGrid {
    cells: Vec<CellIndex>,
    short_ids: Vec<i64>,
    rtree: RTree<IndexedCentroid>,
    /// Samples farther than this from every centroid (mercator units) lie
    /// outside the grid
    snap_radius: f64,
}

impl TargetGrid {
    pub fn new(mut cells: Vec<CellIndex>) -> Result<Self, Error> {
        cells.sort_unstable();
        cells.dedup();
        let Some(first) = cells.first() else {
            return Err(Error::InvalidData("Target grid has no cells".to_string()));
        };

        // Circumradius of an average cell at the latitude of the grid
        let resolution = first.resolution();
        let lat = LatLng::from(cells[cells.len() / 2]).lat();
        let snap_radius = resolution.edge_length_m() * mercator_scale(lat);

        let centroids = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let centroid = GridIndex::centroid_mercator(*cell);
                IndexedCentroid::new([centroid.x, centroid.y], index)
            })
            .collect::<Vec<_>>();
        let short_ids = cells
            .iter()
            .map(|cell| ShortCell::from_cell(*cell).value())
            .collect();

        Ok(Self {
            cells,
            short_ids,
            rtree: RTree::bulk_load(centroids),
            snap_radius,
        })
    }

    /// Fine cells around a medium cell, wide enough for everything within
    /// `buffer` metres of any point inside it
    pub fn around_cell(grid: &GridIndex, medium: CellIndex, buffer: f64) -> Result<Self, Error> {
        let center = grid.fine_center_child(medium)?;
        let k = ring_count(grid, grid.medium_edge_length() + buffer);
        Self::new(GridIndex::disk(center, k))
    }

    /// Fine cells around a set of points, wide enough for `buffer` metres
    /// plus one ring
    pub fn around_points(grid: &GridIndex, points: &[LatLng], buffer: f64) -> Result<Self, Error> {
        let k = ring_count(grid, buffer) + 1;
        let origins: HashSet<CellIndex> = points.iter().map(|p| grid.fine_cell(*p)).collect();
        let cells = origins
            .into_iter()
            .flat_map(|cell| GridIndex::disk(cell, k))
            .collect();
        Self::new(cells)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[CellIndex] {
        &self.cells
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.cells.binary_search(&cell).is_ok()
    }

    /// Index of the cell with the nearest centroid, if within the grid
    fn nearest(&self, point: Coord<f64>) -> Option<usize> {
        let query = [point.x, point.y];
        self.rtree
            .nearest_neighbor(&query)
            .filter(|centroid| centroid.distance_2(&query) <= self.snap_radius * self.snap_radius)
            .map(|centroid| centroid.data)
    }
}

impl std::fmt::Debug for TargetGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetGrid")
            .field("cells", &self.cells.len())
            .field("snap_radius", &self.snap_radius)
            .finish()
    }
}

/// Number of rings of fine cells needed to cover `distance` metres in every
/// direction
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ring_count(grid: &GridIndex, distance: f64) -> u32 {
    // A disk of k rings is a hexagon whose inscribed radius is k * 1.5 edges
    let spacing = grid.fine_edge_length() * 1.5;
    (distance / spacing).ceil().max(0.0) as u32
}

/// A point sampled along a street edge
#[derive(Debug, Clone, Copy)]
struct Sample {
    /// Index into the target grid
    cell: usize,
    /// Distance from the edge source in metres
    along: f64,
}

#[derive(Debug, Clone)]
struct EdgeSamples {
    edge: usize,
    length: f64,
    samples: Vec<Sample>,
}

/// Edge samples of one sub-network snapped onto a target grid
#[derive(Debug, Clone)]
pub struct ProjectionIndex<'g> {
    graph: &'g RoutingGraph,
    grid: &'g TargetGrid,
    edges: Vec<EdgeSamples>,
}

impl<'g> ProjectionIndex<'g> {
    /// Samples `edges` (the table `graph` was built from) every
    /// `sample_spacing` metres, endpoints included
    pub fn new(
        edges: &[StreetEdge],
        graph: &'g RoutingGraph,
        grid: &'g TargetGrid,
        sample_spacing: f64,
    ) -> Result<Self, Error> {
        if !(sample_spacing.is_finite() && sample_spacing > 0.0) {
            return Err(Error::InvalidData(format!(
                "Sample spacing must be positive, got {sample_spacing}"
            )));
        }

        let edges = edges
            .iter()
            .enumerate()
            .filter_map(|(index, edge)| {
                let samples = sample_edge(edge, sample_spacing)
                    .into_iter()
                    .filter_map(|(point, along)| {
                        grid.nearest(point).map(|cell| Sample { cell, along })
                    })
                    .collect::<Vec<_>>();
                (!samples.is_empty()).then_some(EdgeSamples {
                    edge: index,
                    length: edge.length,
                    samples,
                })
            })
            .collect();

        Ok(Self { graph, grid, edges })
    }

    /// Travel time per fine cell for one origin.
    ///
    /// A sample is reached from either endpoint of its edge at `speed`
    /// metres per second; cells keep the minimum over all samples and cells
    /// above `max_cost` are left out.
    pub fn project(&self, distances: &DistanceVector, speed: f64, max_cost: Seconds) -> CellCosts {
        let mut costs = CellCosts::new();

        for edge in &self.edges {
            let Some((source, target)) = self.graph.edge_endpoints(edge.edge) else {
                continue;
            };
            let from_source = distances.get(source);
            let from_target = distances.get(target);
            if from_source.is_none() && from_target.is_none() {
                continue;
            }

            for sample in &edge.samples {
                let via_source = from_source.map(|cost| cost + sample.along / speed);
                let via_target =
                    from_target.map(|cost| cost + (edge.length - sample.along).max(0.0) / speed);
                let cost = match (via_source, via_target) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => continue,
                };
                if cost > max_cost {
                    continue;
                }

                costs
                    .entry(self.grid.short_ids[sample.cell])
                    .and_modify(|best| *best = best.min(cost))
                    .or_insert(cost);
            }
        }

        costs
    }
}

/// Projects one distance vector without keeping the sample index around
pub fn project(
    edges: &[StreetEdge],
    graph: &RoutingGraph,
    distances: &DistanceVector,
    grid: &TargetGrid,
    speed: f64,
    max_cost: Seconds,
    sample_spacing: f64,
) -> Result<CellCosts, Error> {
    ProjectionIndex::new(edges, graph, grid, sample_spacing)
        .map(|index| index.project(distances, speed, max_cost))
}

/// Upper bound of the samples taken along a single edge
const MAX_EDGE_SEGMENTS: usize = 10_000;

/// Points along the edge geometry every `spacing` metres with their
/// distance from the source in metres. Both endpoints are always included;
/// very long edges are sampled more coarsely.
fn sample_edge(edge: &StreetEdge, spacing: f64) -> Vec<(Coord<f64>, f64)> {
    let planar_length = edge.geometry_length();
    let length = if edge.length.is_finite() {
        edge.length.max(0.0)
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let segments = ((length / spacing).ceil() as usize).clamp(1, MAX_EDGE_SEGMENTS);
    #[allow(clippy::cast_precision_loss)]
    (0..=segments)
        .map(|step| {
            let fraction = step as f64 / segments as f64;
            (
                interpolate(&edge.geometry, planar_length, fraction),
                fraction * length,
            )
        })
        .collect()
}

/// Point at `fraction` of the planar length of `line`
fn interpolate(line: &LineString<f64>, planar_length: f64, fraction: f64) -> Coord<f64> {
    let coords = &line.0;
    let Some(&first) = coords.first() else {
        return Coord { x: 0.0, y: 0.0 };
    };
    if planar_length <= 0.0 || fraction <= 0.0 {
        return first;
    }

    let mut remaining = fraction * planar_length;
    for segment in line.lines() {
        let dx = segment.end.x - segment.start.x;
        let dy = segment.end.y - segment.start.y;
        let segment_length = dx.hypot(dy);
        if remaining <= segment_length && segment_length > 0.0 {
            let t = remaining / segment_length;
            return Coord {
                x: segment.start.x + dx * t,
                y: segment.start.y + dy * t,
            };
        }
        remaining -= segment_length;
    }

    coords.last().copied().unwrap_or(first)
}
