//! Data model of the street network
//!
//! Contains the edge and node tables and their per-partition grouping.

pub mod streets;

pub use streets::{IndexedPoint, NetworkPartition, StreetEdge, StreetNode};
