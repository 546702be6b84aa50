//! Synthetic street networks for tests and benchmarks.

use std::path::Path;
use std::sync::Arc;

use geo::{Coord, LineString, Point};
use h3o::LatLng;

use crate::grid::{mercator_scale, to_mercator};
use crate::loading::InMemoryNetworkSource;
use crate::model::{StreetEdge, StreetNode};
use crate::{CacheConfig, Config, Context, CostUnit, RoutingConfig};

/// (lat, lng) of the lattice centre used across tests
pub const MUNICH: (f64, f64) = (48.137, 11.575);

/// Square lattice of two-way streets centred on `MUNICH`.
///
/// Node ids are `row * cols + col`, costs and lengths equal the spacing in
/// metres.
pub fn lattice_network(rows: usize, cols: usize, spacing: f64) -> (Vec<StreetEdge>, Vec<StreetNode>) {
    let center = to_mercator(LatLng::new(MUNICH.0, MUNICH.1).expect("valid centre"));
    let step = spacing * mercator_scale(MUNICH.0);
    #[allow(clippy::cast_precision_loss)]
    let position = |row: usize, col: usize| Coord {
        x: center.x + (col as f64 - (cols / 2) as f64) * step,
        y: center.y + (row as f64 - (rows / 2) as f64) * step,
    };
    #[allow(clippy::cast_possible_wrap)]
    let node_id = |row: usize, col: usize| (row * cols + col) as i64;

    let mut nodes = Vec::with_capacity(rows * cols);
    let mut edges = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            nodes.push(StreetNode {
                id: node_id(row, col),
                geometry: Point::from(position(row, col)),
            });

            let neighbours = [(row, col + 1), (row + 1, col)];
            for (next_row, next_col) in neighbours {
                if next_row >= rows || next_col >= cols {
                    continue;
                }
                #[allow(clippy::cast_possible_wrap)]
                edges.push(StreetEdge {
                    id: edges.len() as i64,
                    source: node_id(row, col),
                    target: node_id(next_row, next_col),
                    cost: spacing,
                    reverse_cost: spacing,
                    length: spacing,
                    geometry: LineString::new(vec![
                        position(row, col),
                        position(next_row, next_col),
                    ]),
                });
            }
        }
    }

    (edges, nodes)
}

/// Context over a lattice network with its cache in `cache_dir`
pub fn lattice_context(cache_dir: &Path, rows: usize, cols: usize, spacing: f64) -> Context {
    let (edges, nodes) = lattice_network(rows, cols, spacing);
    let source = InMemoryNetworkSource::new("lattice", edges, nodes).expect("valid lattice");
    let config = Config {
        cache: CacheConfig {
            dir: cache_dir.to_path_buf(),
        },
        routing: RoutingConfig {
            cost_unit: CostUnit::Metres,
            ..RoutingConfig::default()
        },
        ..Config::default()
    };
    Context::new(config, Arc::new(source)).expect("valid context")
}
