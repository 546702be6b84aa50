//! End-to-end runs over a street network loaded from CSV tables.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use geo::{Rect, coord};
use h3o::LatLng;
use tempfile::{TempDir, tempdir};

use ferrogrid_core::algo::isochrone::{self, IsochroneRequest, IsochroneResult, RequestOutcome};
use ferrogrid_core::loading::load_csv_network;
use ferrogrid_core::matrix::{ArrowSinkFactory, Chunk, HeatmapMatrix, PolygonRegions, SinkFactory};
use ferrogrid_core::testing::{MUNICH, lattice_network};
use ferrogrid_core::{CacheConfig, Config, Context, TravelCost};

/// Writes a lattice as `edges.csv` and `nodes.csv` into `dir`
fn write_lattice_csv(dir: &Path, side: usize) {
    let (edges, nodes) = lattice_network(side, side, 100.0);

    let mut out = BufWriter::new(File::create(dir.join("edges.csv")).unwrap());
    writeln!(out, "id,source,target,cost,reverse_cost,length,geom").unwrap();
    for edge in &edges {
        let coords = edge
            .geometry
            .coords()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            out,
            "{},{},{},{},{},{},\"LINESTRING({coords})\"",
            edge.id, edge.source, edge.target, edge.cost, edge.reverse_cost, edge.length
        )
        .unwrap();
    }
    out.flush().unwrap();

    let mut out = BufWriter::new(File::create(dir.join("nodes.csv")).unwrap());
    writeln!(out, "id,x,y").unwrap();
    for node in &nodes {
        writeln!(out, "{},{},{}", node.id, node.geometry.x(), node.geometry.y()).unwrap();
    }
    out.flush().unwrap();
}

fn csv_context(dir: &TempDir, side: usize) -> Context {
    write_lattice_csv(dir.path(), side);
    let source = load_csv_network(
        "csv-lattice",
        &dir.path().join("edges.csv"),
        &dir.path().join("nodes.csv"),
    )
    .unwrap();

    let mut config = Config {
        cache: CacheConfig {
            dir: dir.path().join("cache"),
        },
        ..Config::default()
    };
    config.routing.travel_cost = Some(TravelCost {
        max_traveltime: 5,
        speed: 5.0,
    });
    config.matrix.workers = 2;
    Context::new(config, Arc::new(source)).unwrap()
}

#[test]
fn isochrone_from_csv_network() {
    let dir = tempdir().unwrap();
    let ctx = csv_context(&dir, 21);
    let request = IsochroneRequest::from_json(&format!(
        r#"{{"id": "csv", "origins": [[{}, {}]], "travel_cost": {{"max_traveltime": 5, "speed": 5.0}}, "output": "grid"}}"#,
        MUNICH.1, MUNICH.0
    ))
    .unwrap();

    let status = isochrone::run(&ctx, &request);
    let RequestOutcome::Completed(IsochroneResult::Grid(cells)) = &status.outcome else {
        panic!("expected a grid result, got {:?}", status.outcome);
    };

    let origin_cell = LatLng::new(MUNICH.0, MUNICH.1).unwrap().to_cell(ctx.grid.fine);
    assert!(cells.iter().any(|c| c.cell == origin_cell));
    assert!(cells.iter().all(|c| c.cost <= 300.0));

    // Partitions fetched for the request were cached
    let coarse = ctx.grid.coarse_cell(LatLng::new(MUNICH.0, MUNICH.1).unwrap());
    assert!(ctx.cache.exists(ctx.network_id(), coarse));

    let geojson = status_geojson(&status.outcome);
    assert!(geojson.contains("FeatureCollection"));
}

fn status_geojson(outcome: &RequestOutcome) -> String {
    match outcome {
        RequestOutcome::Completed(result) => result.to_geojson_string().unwrap(),
        RequestOutcome::Failed(e) => panic!("request failed: {e}"),
    }
}

#[test]
fn matrix_chunk_writes_arrow_table() {
    let dir = tempdir().unwrap();
    let ctx = csv_context(&dir, 21);
    let factory = ArrowSinkFactory::new(dir.path().join("out"), "traveltime_matrix_walking");
    let matrix = HeatmapMatrix::new(&ctx, &factory);
    let medium = LatLng::new(MUNICH.0, MUNICH.1).unwrap().to_cell(ctx.grid.medium);

    factory.prepare().unwrap();
    let report = matrix
        .process_chunk(&Chunk {
            worker: 0,
            cells: vec![medium],
        })
        .unwrap();

    let rows = factory.read_rows().unwrap();
    assert_eq!(report.cells, 1);
    assert_eq!(rows.len(), report.rows);
    assert!(!rows.is_empty());
    assert_eq!(factory.files().unwrap().len(), 1);
    for row in &rows {
        assert_eq!(row.origin.parent(ctx.grid.medium), Some(medium));
        assert!(row.cost <= 5);
        assert!(row.destinations.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn matrix_run_over_region_is_reproducible() {
    let dir = tempdir().unwrap();
    let ctx = csv_context(&dir, 21);
    let factory = ArrowSinkFactory::new(dir.path().join("out"), "traveltime_matrix_walking");
    let mut regions = PolygonRegions::new();
    regions.push(
        "centre",
        Rect::new(
            coord! { x: MUNICH.1 - 0.005, y: MUNICH.0 - 0.005 },
            coord! { x: MUNICH.1 + 0.005, y: MUNICH.0 + 0.005 },
        )
        .to_polygon(),
    );

    let matrix = HeatmapMatrix::new(&ctx, &factory);
    let first = matrix.run(&regions).unwrap();
    let mut first_rows = factory.read_rows().unwrap();

    let second = matrix.run(&regions).unwrap();
    let mut second_rows = factory.read_rows().unwrap();

    assert!(first.is_success());
    assert_eq!(first.regions.len(), 1);
    assert_eq!(first.regions[0].processed, first.regions[0].cells);
    assert_eq!(first.rows(), first_rows.len());
    assert!(!first_rows.is_empty());

    // A new run replaces the table instead of appending to it
    assert_eq!(second.rows(), second_rows.len());
    first_rows.sort();
    second_rows.sort();
    assert_eq!(first_rows, second_rows);
}

#[test]
fn workers_share_an_empty_cache() {
    let dir = tempdir().unwrap();
    let mut ctx = csv_context(&dir, 41);
    ctx.config.matrix.workers = 6;
    let factory = ArrowSinkFactory::new(dir.path().join("out"), "traveltime_matrix_walking");
    let mut regions = PolygonRegions::new();
    regions.push(
        "wide",
        Rect::new(
            coord! { x: MUNICH.1 - 0.03, y: MUNICH.0 - 0.03 },
            coord! { x: MUNICH.1 + 0.03, y: MUNICH.0 + 0.03 },
        )
        .to_polygon(),
    );

    let report = HeatmapMatrix::new(&ctx, &factory).run(&regions).unwrap();

    let region = &report.regions[0];
    assert!(report.is_success(), "{:?}", region.failures);
    assert!(region.cells > 1);
    assert_eq!(region.processed, region.cells);
    assert_eq!(factory.read_rows().unwrap().len(), report.rows());

    // The partition survived the concurrent writers
    let coarse = ctx.grid.coarse_cell(LatLng::new(MUNICH.0, MUNICH.1).unwrap());
    assert!(ctx.cache.exists(ctx.network_id(), coarse));
}
