//! Heatmap travel-time matrix preparation.
//!
//! The medium cells of every region are split into one chunk per worker.
//! Each worker routes from the fine children of its cells and writes the
//! reached destinations, grouped by travel-time bucket, into its own
//! [`MatrixSink`].

mod chunk;
mod heatmap;
mod region;
mod rows;
pub mod sink;

pub use chunk::{Chunk, split_into_chunks};
pub use heatmap::{ChunkReport, HeatmapMatrix, MatrixReport, RegionReport};
pub use region::{PolygonRegions, RegionSource};
pub use rows::{HeatmapRow, bucket_costs};
pub use sink::{ArrowSink, ArrowSinkFactory, MatrixSink, MemorySink, MemorySinkFactory, SinkFactory};
