use std::path::PathBuf;
use std::sync::Arc;

use ferrogrid_core::prelude::*;
use pyo3::prelude::*;

/// RoutingEngine
///
/// A street network together with the grid, cache and routing settings
/// used by every isochrone and matrix computation.
///
/// The network tables are read once when the engine is created. Network
/// partitions are cached on disk per coarse H3 cell, so engines created in
/// several worker processes share their cache directory.
///
/// Example:
///
/// .. code-block:: python
///
///     engine = create_routing_engine("munich", "edges.csv", "nodes.csv")
///     status = run_isochrone(engine, request_json)
#[pyclass(name = "RoutingEngine")]
pub struct PyRoutingEngine {
    pub(crate) ctx: Context,
}

#[pymethods]
impl PyRoutingEngine {
    pub fn network_id(&self) -> String {
        self.ctx.network_id().to_string()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.ctx.cache.dir().to_path_buf()
    }

    pub fn routing_mode(&self) -> String {
        self.ctx.config.routing.mode.as_str().to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "RoutingEngine for network {} ({}, cache in {})",
            self.ctx.network_id(),
            self.ctx.config.routing.mode.as_str(),
            self.ctx.cache.dir().display()
        )
    }

    fn __str__(&self) -> String {
        self.__repr__()
    }
}

/// Create a routing engine from CSV edge and node tables
///
/// Parameters
/// ----------
/// network_id : str
///     Identifier of the network, part of every cache file name
/// edges_path : str
///     CSV file with columns id, source, target, cost, reverse_cost, length
///     and geom (WKT line string in EPSG:3857)
/// nodes_path : str
///     CSV file with columns id, x and y (EPSG:3857)
/// config : str, optional
///     JSON configuration; sections grid, cache, routing and matrix, every
///     field optional
///
/// Returns
/// -------
/// RoutingEngine
///
/// Raises
/// ------
/// ValueError
///     If the configuration is invalid
/// RuntimeError
///     If the network tables cannot be read
#[pyfunction]
#[pyo3(name = "create_routing_engine", signature = (network_id, edges_path, nodes_path, config=None))]
pub fn create_routing_engine(
    py: Python<'_>,
    network_id: &str,
    edges_path: PathBuf,
    nodes_path: PathBuf,
    config: Option<&str>,
) -> PyResult<PyRoutingEngine> {
    let config = config
        .map(Config::from_json)
        .transpose()
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?
        .unwrap_or_default();

    let ctx = py.detach(|| {
        load_csv_network(network_id, &edges_path, &nodes_path)
            .and_then(|source| Context::new(config, Arc::new(source)))
            .map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                    "Failed to create routing engine: {e}"
                ))
            })
    })?;

    Ok(PyRoutingEngine { ctx })
}
