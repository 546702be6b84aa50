// Re-export key components
pub use crate::algo::isochrone::{
    CellCost, IsochroneOutput, IsochroneRequest, IsochroneResult, RequestOutcome, RequestStatus,
    compute_isochrone, run,
};
pub use crate::algo::projection::{CellCosts, TargetGrid, project};
pub use crate::cache::StreetNetworkCache;
pub use crate::extract::{Extractor, OriginConnector, SnapPolicy, SubNetwork};
pub use crate::grid::{GridIndex, ShortCell};
pub use crate::loading::{InMemoryNetworkSource, NetworkSource, load_csv_network};
pub use crate::matrix::{
    ArrowSinkFactory, Chunk, HeatmapMatrix, HeatmapRow, MatrixReport, MatrixSink,
    MemorySinkFactory, PolygonRegions, RegionSource, SinkFactory, split_into_chunks,
};
pub use crate::model::{NetworkPartition, StreetEdge, StreetNode};
pub use crate::routing::{DistanceVector, RoutingGraph, WeightModel, multi_source_shortest_paths};
pub use crate::{Config, Context, Error, RoutingMode, TravelCost};

// Core types for the street network
pub use crate::Seconds;
pub use crate::StreetEdgeId;
pub use crate::StreetNodeId;
