//! TOML configuration of a command line run.
//!
//! The engine settings (`grid`, `cache`, `routing`, `matrix`) sit at the top
//! level next to the network tables, the regions and the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use ferrogrid_core::matrix::PolygonRegions;
use ferrogrid_core::{Config, Error};
use geo::Geometry;
use serde::Deserialize;
use wkt::TryFromWkt;

/// Edge and node tables of the street network
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkFiles {
    /// Identifier of the network in cache file names
    pub id: String,
    pub edges: PathBuf,
    pub nodes: PathBuf,
}

/// Region of a matrix run as a WKT polygon in WGS84 degrees
#[derive(Debug, Clone, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    pub wkt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub network: NetworkFiles,
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(flatten)]
    pub engine: Config,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| {
            Error::InvalidData(format!("Invalid configuration {}: {e}", path.display()))
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::InvalidData(e.to_string()))
    }

    /// Parses the configured regions in file order
    pub fn regions(&self) -> Result<PolygonRegions, Error> {
        let mut regions = PolygonRegions::new();
        for entry in &self.regions {
            let geometry = Geometry::<f64>::try_from_wkt_str(&entry.wkt).map_err(|e| {
                Error::InvalidData(format!("Invalid WKT of region {}: {e}", entry.name))
            })?;
            match geometry {
                Geometry::Polygon(polygon) => regions.push(entry.name.clone(), polygon),
                Geometry::MultiPolygon(polygons) => regions.push(entry.name.clone(), polygons),
                _ => {
                    return Err(Error::InvalidData(format!(
                        "Region {} is not a polygon",
                        entry.name
                    )));
                }
            }
        }
        Ok(regions)
    }
}
