use std::sync::Arc;

use crate::cache::StreetNetworkCache;
use crate::grid::GridIndex;
use crate::loading::NetworkSource;
use crate::{Config, Error, TravelCost};

/// Configuration and open resources of one process or worker.
///
/// Passed explicitly to every stage of the pipeline. Cloning is cheap and
/// shares the read-only network source.
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub grid: GridIndex,
    pub cache: StreetNetworkCache,
    pub source: Arc<dyn NetworkSource>,
}

impl Context {
    pub fn new(config: Config, source: Arc<dyn NetworkSource>) -> Result<Self, Error> {
        let grid = GridIndex::new(&config.grid)?;
        let cache = StreetNetworkCache::new(&config.cache)?;

        Ok(Self {
            config,
            grid,
            cache,
            source,
        })
    }

    pub fn network_id(&self) -> &str {
        self.source.network_id()
    }

    pub fn travel_cost(&self) -> TravelCost {
        self.config.routing.travel_cost()
    }

    /// Spacing in metres of the samples taken along edges during projection
    pub fn sample_spacing(&self) -> f64 {
        self.config
            .routing
            .sample_spacing
            .unwrap_or_else(|| self.grid.fine_edge_length() / 2.0)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("grid", &self.grid)
            .field("cache", &self.cache)
            .field("network_id", &self.network_id())
            .finish()
    }
}
