//! Graph construction, bounded search and projection on synthetic lattices.
//!
//! Run with:
//! ```
//! cargo bench -p ferrogrid_core --bench bench_main
//! ```

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ferrogrid_core::algo::projection::{ProjectionIndex, TargetGrid};
use ferrogrid_core::grid::GridIndex;
use ferrogrid_core::routing::{RoutingGraph, WeightModel, shortest_paths};
use ferrogrid_core::testing::{MUNICH, lattice_network};
use h3o::LatLng;

const SPEED: f64 = 5.0 / 3.6;

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/build");
    for side in [50, 150] {
        let (edges, _) = lattice_network(side, side, 50.0);
        group.bench_with_input(BenchmarkId::from_parameter(side), &edges, |b, edges| {
            b.iter(|| {
                black_box(RoutingGraph::build(edges, WeightModel::MetresAtSpeed(SPEED)).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_bounded_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("dijkstra/bounded");
    let side = 150;
    let (edges, _) = lattice_network(side, side, 50.0);
    let graph = RoutingGraph::build(&edges, WeightModel::MetresAtSpeed(SPEED)).unwrap();
    #[allow(clippy::cast_possible_wrap)]
    let center = graph.vertex((side / 2 * side + side / 2) as i64).unwrap();

    for minutes in [5.0, 20.0] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{minutes}min")),
            &(minutes * 60.0),
            |b, max_cost| b.iter(|| black_box(shortest_paths(&graph, center, *max_cost))),
        );
    }
    group.finish();
}

fn bench_projection(c: &mut Criterion) {
    let side = 80;
    let max_cost = 600.0;
    let (edges, _) = lattice_network(side, side, 50.0);
    let graph = RoutingGraph::build(&edges, WeightModel::MetresAtSpeed(SPEED)).unwrap();
    #[allow(clippy::cast_possible_wrap)]
    let center = graph.vertex((side / 2 * side + side / 2) as i64).unwrap();
    let distances = shortest_paths(&graph, center, max_cost);

    let grid = GridIndex::default();
    let origin = LatLng::new(MUNICH.0, MUNICH.1).unwrap();
    let target = TargetGrid::around_points(&grid, &[origin], max_cost * SPEED).unwrap();
    let index = ProjectionIndex::new(&edges, &graph, &target, grid.fine_edge_length() / 2.0).unwrap();

    c.bench_function("projection/one_origin", |b| {
        b.iter(|| black_box(index.project(&distances, SPEED, max_cost)));
    });
}

criterion_group!(benches, bench_graph_build, bench_bounded_search, bench_projection);
criterion_main!(benches);
