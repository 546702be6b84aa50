use std::path::PathBuf;
use std::str::FromStr;

use ferrogrid_core::prelude::*;
use geo::Geometry;
use h3o::CellIndex;
use pyo3::prelude::*;
use serde_json::json;
use wkt::TryFromWkt;

use crate::model::PyRoutingEngine;

fn parse_cells(cells: &[String]) -> PyResult<Vec<CellIndex>> {
    cells
        .iter()
        .map(|cell| {
            CellIndex::from_str(cell).map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                    "Invalid H3 cell {cell}: {e}"
                ))
            })
        })
        .collect()
}

/// Split H3 cells into `workers` contiguous chunks whose sizes differ by
/// at most one
#[pyfunction]
pub fn split_cells_into_chunks(cells: Vec<String>, workers: usize) -> PyResult<Vec<Vec<String>>> {
    let cells = parse_cells(&cells)?;
    Ok(split_into_chunks(&cells, workers)
        .into_iter()
        .map(|chunk| chunk.cells.iter().map(ToString::to_string).collect())
        .collect())
}

/// Process one chunk of medium H3 cells as worker `worker`
///
/// Rows are written to a new Arrow stream file `{table}_{worker}_{part}.arrow`
/// in `out_dir` and committed after every cell. Processing stops at the
/// first failing cell.
///
/// Returns
/// -------
/// tuple[int, int]
///     Processed cells and written rows
#[pyfunction]
#[pyo3(signature = (engine, worker, cells, out_dir, table=None))]
pub fn process_cells(
    py: Python<'_>,
    engine: &PyRoutingEngine,
    worker: usize,
    cells: Vec<String>,
    out_dir: PathBuf,
    table: Option<String>,
) -> PyResult<(usize, usize)> {
    let chunk = Chunk {
        worker,
        cells: parse_cells(&cells)?,
    };
    let table = table.unwrap_or_else(|| engine.ctx.config.matrix.table.clone());

    py.detach(|| {
        let factory = ArrowSinkFactory::new(out_dir, table);
        HeatmapMatrix::new(&engine.ctx, &factory)
            .process_chunk(&chunk)
            .map(|report| (report.cells, report.rows))
            .map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                    "Worker {worker} failed: {e}"
                ))
            })
    })
}

/// Prepare the heatmap travel-time matrix of a list of regions
///
/// Parameters
/// ----------
/// engine : RoutingEngine
/// regions : list[tuple[str, str]]
///     (name, WKT polygon in WGS84 degrees) in processing order
/// out_dir : str
///     Directory of the Arrow result files, recreated on every run
///
/// Returns
/// -------
/// str
///     JSON report with processed cells and rows per region
///
/// Raises
/// ------
/// RuntimeError
///     If a region failed; regions before it stay written
#[pyfunction]
pub fn run_heatmap_matrix(
    py: Python<'_>,
    engine: &PyRoutingEngine,
    regions: Vec<(String, String)>,
    out_dir: PathBuf,
) -> PyResult<String> {
    let mut polygons = PolygonRegions::new();
    for (name, wkt) in regions {
        match Geometry::<f64>::try_from_wkt_str(&wkt) {
            Ok(Geometry::Polygon(polygon)) => polygons.push(name, polygon),
            Ok(Geometry::MultiPolygon(multi)) => polygons.push(name, multi),
            Ok(_) => {
                return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                    "Region {name} is not a polygon"
                )));
            }
            Err(e) => {
                return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                    "Failed to parse WKT of region {name}: {e}"
                )));
            }
        }
    }

    let ctx = &engine.ctx;
    let table = format!(
        "{}_{}",
        ctx.config.matrix.table,
        ctx.config.routing.mode.as_str()
    );
    let report = py
        .detach(|| {
            let factory = ArrowSinkFactory::new(out_dir, table);
            HeatmapMatrix::new(ctx, &factory).run(&polygons)
        })
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string()))?;

    if let Some(failed) = report.regions.iter().find(|region| !region.is_success()) {
        return Err(PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
            "Region {} failed: {}",
            failed.name,
            failed.failures.join("; ")
        )));
    }

    let regions = report
        .regions
        .iter()
        .map(|region| {
            json!({
                "name": region.name,
                "cells": region.cells,
                "processed": region.processed,
                "rows": region.rows,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "regions": regions, "rows": report.rows() }).to_string())
}
