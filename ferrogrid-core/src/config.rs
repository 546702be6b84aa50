//! Configuration of the routing engine, the grid, the network cache and
//! the heatmap matrix preparation.
//!
//! All structures deserialize with defaults so a configuration file only
//! needs to mention what differs from them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Seconds;

/// Active mobility routing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Walking,
    Bicycle,
    Pedelec,
}

impl RoutingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingMode::Walking => "walking",
            RoutingMode::Bicycle => "bicycle",
            RoutingMode::Pedelec => "pedelec",
        }
    }

    /// Travel cost used for heatmap matrices of this mode
    pub fn default_travel_cost(self) -> TravelCost {
        let speed = match self {
            RoutingMode::Walking => 5.0,
            RoutingMode::Bicycle => 15.0,
            RoutingMode::Pedelec => 23.0,
        };
        TravelCost {
            max_traveltime: 20,
            speed,
        }
    }
}

impl std::str::FromStr for RoutingMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walking" => Ok(RoutingMode::Walking),
            "bicycle" => Ok(RoutingMode::Bicycle),
            "pedelec" => Ok(RoutingMode::Pedelec),
            other => Err(crate::Error::InvalidData(format!(
                "Unknown routing mode '{other}'"
            ))),
        }
    }
}

/// Maximum travel time and speed of a request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelCost {
    /// Maximum travel time in minutes
    pub max_traveltime: u32,
    /// Speed in km/h
    pub speed: f64,
}

impl TravelCost {
    /// Maximum travel time in seconds
    pub fn max_cost(&self) -> Seconds {
        f64::from(self.max_traveltime) * 60.0
    }

    /// Speed in metres per second
    pub fn speed_mps(&self) -> f64 {
        self.speed / 3.6
    }

    /// Distance in metres that can be covered within the maximum travel time
    pub fn buffer_distance(&self) -> f64 {
        self.max_cost() * self.speed_mps()
    }
}

/// Unit of the `cost` and `reverse_cost` columns of the edge table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostUnit {
    /// Costs are travel times in seconds
    Seconds,
    /// Costs are distances in metres and get divided by the mode speed
    #[default]
    Metres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    /// Overrides the default travel cost of `mode`
    pub travel_cost: Option<TravelCost>,
    pub cost_unit: CostUnit,
    /// Origins farther than this many metres from the network are not routed
    pub max_snap_distance: f64,
    /// Spacing in metres of the samples taken along edges during projection.
    /// Defaults to half the fine cell edge length.
    pub sample_spacing: Option<f64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Walking,
            travel_cost: None,
            cost_unit: CostUnit::Metres,
            max_snap_distance: 500.0,
            sample_spacing: None,
        }
    }
}

impl RoutingConfig {
    pub fn travel_cost(&self) -> TravelCost {
        self.travel_cost
            .unwrap_or_else(|| self.mode.default_travel_cost())
    }
}

/// H3 resolutions used for partitioning, batching and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub coarse: u8,
    pub medium: u8,
    pub fine: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            coarse: 3,
            medium: 6,
            fine: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".cache/street_network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Number of parallel workers, one chunk of medium cells each
    pub workers: usize,
    /// Buffered rows that trigger a flush into the sink
    pub insert_batch_size: usize,
    /// Width of a cost bucket in seconds
    pub bucket_seconds: u32,
    /// Name of the result table
    pub table: String,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            workers: 12,
            insert_batch_size: 800,
            bucket_seconds: 60,
            table: "traveltime_matrix".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub cache: CacheConfig,
    pub routing: RoutingConfig,
    pub matrix: MatrixConfig,
}

impl Config {
    /// Parses a JSON configuration, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(json).map_err(|e| crate::Error::InvalidData(e.to_string()))
    }
}
