//! Travel-time accessibility on a street network indexed by the H3 grid.
//!
//! The crate extracts the part of a street network relevant to a set of
//! origins, runs cutoff-bounded shortest path searches over it and projects
//! the reached network onto fine H3 cells. [`matrix::HeatmapMatrix`] runs
//! that pipeline for whole regions in parallel workers and writes bucketed
//! travel-time rows into a [`matrix::MatrixSink`].

pub mod algo;
pub mod cache;
pub mod config;
mod context;
mod error;
pub mod extract;
pub mod grid;
pub mod loading;
pub mod matrix;
pub mod model;
pub mod prelude;
pub mod routing;
#[doc(hidden)]
pub mod testing;

pub use config::{
    CacheConfig, Config, CostUnit, GridConfig, MatrixConfig, RoutingConfig, RoutingMode,
    TravelCost,
};
pub use context::Context;
pub use error::{CacheReadError, CacheWriteError, Error};

/// Identifier of a street network node as stored in the source tables
pub type StreetNodeId = i64;
/// Identifier of a street network edge as stored in the source tables
pub type StreetEdgeId = i64;
/// Travel cost in seconds
pub type Seconds = f64;
