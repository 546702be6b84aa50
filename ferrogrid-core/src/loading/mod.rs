//! This module is responsible for loading the street network from its
//! source tables and serving it partition by partition on cache misses.

mod tables;
mod source;

pub use tables::load_csv_network;
pub use source::{InMemoryNetworkSource, NetworkSource};
