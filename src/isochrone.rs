use ferrogrid_core::prelude::*;
use h3o::LatLng;
use pyo3::prelude::*;

use crate::model::PyRoutingEngine;

/// Final state of an isochrone request
#[pyclass(name = "RequestStatus")]
pub struct PyRequestStatus {
    #[pyo3(get)]
    request_id: String,
    #[pyo3(get)]
    completed: bool,
    /// GeoJSON feature collection of a completed request
    #[pyo3(get)]
    result: Option<String>,
    /// Error message of a failed request
    #[pyo3(get)]
    error: Option<String>,
}

#[pymethods]
impl PyRequestStatus {
    fn __repr__(&self) -> String {
        let state = if self.completed { "completed" } else { "failed" };
        format!("RequestStatus({}, {state})", self.request_id)
    }
}

/// Run an isochrone request given as JSON and report its final state.
///
/// The request has the keys id, origins (list of [lng, lat]), mode
/// (walking, bicycle or pedelec), travel_cost ({max_traveltime, speed},
/// optional) and output (polygon or grid). A failing request is reported
/// in the returned status, never raised.
#[pyfunction]
pub fn run_isochrone(
    py: Python<'_>,
    engine: &PyRoutingEngine,
    request: &str,
) -> PyResult<PyRequestStatus> {
    let request = IsochroneRequest::from_json(request)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?;

    Ok(py.detach(|| {
        let status = run(&engine.ctx, &request);
        match status.outcome {
            RequestOutcome::Completed(result) => match result.to_geojson_string() {
                Ok(geojson) => PyRequestStatus {
                    request_id: status.request_id,
                    completed: true,
                    result: Some(geojson),
                    error: None,
                },
                Err(e) => PyRequestStatus {
                    request_id: status.request_id,
                    completed: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            },
            RequestOutcome::Failed(message) => PyRequestStatus {
                request_id: status.request_id,
                completed: false,
                result: None,
                error: Some(message),
            },
        }
    }))
}

/// Calculate an isochrone around one or more origins
///
/// Parameters
/// ----------
/// engine : RoutingEngine
/// origins : list[tuple[float, float]]
///     (lat, lng) pairs in WGS84 degrees
/// mode : str
///     walking, bicycle or pedelec
/// max_traveltime : int, optional
///     Minutes, the mode default if omitted
/// grid : bool
///     Return one hexagon per reached cell instead of one polygon
///
/// Returns
/// -------
/// str
///     GeoJSON feature collection
#[pyfunction]
#[pyo3(signature = (engine, origins, mode="walking", max_traveltime=None, grid=false))]
pub fn calculate_isochrone(
    py: Python<'_>,
    engine: &PyRoutingEngine,
    origins: Vec<(f64, f64)>,
    mode: &str,
    max_traveltime: Option<u32>,
    grid: bool,
) -> PyResult<String> {
    let value_error = |e: String| PyErr::new::<pyo3::exceptions::PyValueError, _>(e);
    let mode: RoutingMode = mode.parse().map_err(|e: Error| value_error(e.to_string()))?;
    let origins = origins
        .into_iter()
        .map(|(lat, lng)| LatLng::new(lat, lng))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| value_error(format!("Invalid origin: {e}")))?;

    let travel_cost = max_traveltime.map(|minutes| TravelCost {
        max_traveltime: minutes,
        ..mode.default_travel_cost()
    });
    let request = IsochroneRequest {
        id: String::new(),
        origins,
        mode,
        travel_cost,
        output: if grid {
            IsochroneOutput::Grid
        } else {
            IsochroneOutput::Polygon
        },
    };

    py.detach(|| {
        compute_isochrone(&engine.ctx, &request)
            .and_then(|result| result.to_geojson_string())
            .map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                    "Failed to calculate isochrone: {e}"
                ))
            })
    })
}
