use pyo3::prelude::*;

use isochrone::{PyRequestStatus, calculate_isochrone, run_isochrone};
use matrix::{process_cells, run_heatmap_matrix, split_cells_into_chunks};
use model::{PyRoutingEngine, create_routing_engine};

pub mod isochrone;
pub mod matrix;
pub mod model;

/// A Python module implemented in Rust.
#[pymodule]
fn ferrogrid(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<PyRoutingEngine>()?;
    m.add_function(wrap_pyfunction!(create_routing_engine, m)?)?;

    m.add_class::<PyRequestStatus>()?;
    m.add_function(wrap_pyfunction!(run_isochrone, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_isochrone, m)?)?;

    m.add_function(wrap_pyfunction!(split_cells_into_chunks, m)?)?;
    m.add_function(wrap_pyfunction!(process_cells, m)?)?;
    m.add_function(wrap_pyfunction!(run_heatmap_matrix, m)?)?;
    Ok(())
}
