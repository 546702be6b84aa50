use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    CacheRead(#[from] CacheReadError),
    #[error(transparent)]
    CacheWrite(#[from] CacheWriteError),
    #[error("No reachable street network: {0}")]
    NoReachableNetwork(String),
    #[error("Graph construction failed: {0}")]
    GraphConstruction(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Result sink error: {0}")]
    Sink(String),
    #[error("Isochrone error: {0}")]
    IsochroneError(String),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("H3 error: {0}")]
    H3Error(#[from] h3o::error::InvalidGeometry),
    #[error("Invalid H3 resolution: {0}")]
    InvalidResolution(#[from] h3o::error::InvalidResolution),
}

/// Failure to read a cached network partition.
///
/// Neither variant means "the partition is empty": the caller has to
/// recompute the partition from its source.
#[derive(Error, Debug)]
pub enum CacheReadError {
    #[error("Partition {cell} of network {network_id} is not cached")]
    Missing {
        network_id: String,
        cell: h3o::CellIndex,
    },
    #[error("Cached partition file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Failure to write a network partition into the cache. The partially
/// written file has already been removed when this error is returned.
#[derive(Error, Debug)]
#[error("Failed to write cache file {}: {reason}", path.display())]
pub struct CacheWriteError {
    pub path: PathBuf,
    pub reason: String,
}
