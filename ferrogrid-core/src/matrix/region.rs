use geo::MultiPolygon;
use h3o::CellIndex;

use crate::Error;
use crate::grid::GridIndex;

/// Regions whose medium cells make up the work of a matrix run
pub trait RegionSource {
    /// Region names in processing order
    fn names(&self) -> Vec<String>;

    /// Medium cells filling the region at `index`, ordered and unique
    fn medium_cells(&self, index: usize, grid: &GridIndex) -> Result<Vec<CellIndex>, Error>;
}

/// Regions given as polygons in WGS84 degrees
#[derive(Debug, Clone, Default)]
pub struct PolygonRegions {
    regions: Vec<(String, MultiPolygon)>,
}

impl PolygonRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, area: impl Into<MultiPolygon>) {
        self.regions.push((name.into(), area.into()));
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl RegionSource for PolygonRegions {
    fn names(&self) -> Vec<String> {
        self.regions.iter().map(|(name, _)| name.clone()).collect()
    }

    fn medium_cells(&self, index: usize, grid: &GridIndex) -> Result<Vec<CellIndex>, Error> {
        let (name, area) = self
            .regions
            .get(index)
            .ok_or_else(|| Error::InvalidData(format!("No region with index {index}")))?;

        let mut cells = Vec::new();
        for polygon in area.iter() {
            cells.extend(GridIndex::coverage(polygon.clone(), grid.medium)?);
        }
        cells.sort_unstable();
        cells.dedup();

        log::info!("Region {name}: {} medium cells to process", cells.len());
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use geo::{Rect, coord};

    use super::*;

    #[test]
    fn overlapping_polygons_yield_unique_cells() {
        let grid = GridIndex::default();
        let rect = Rect::new(coord! { x: 11.5, y: 48.1 }, coord! { x: 11.6, y: 48.2 });
        let area = MultiPolygon::new(vec![rect.to_polygon(), rect.to_polygon()]);

        let mut regions = PolygonRegions::new();
        regions.push("munich", area);

        let cells = regions.medium_cells(0, &grid).unwrap();
        assert!(!cells.is_empty());
        assert!(cells.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(cells.iter().all(|cell| cell.resolution() == grid.medium));
        assert_eq!(regions.names(), vec!["munich".to_string()]);
        assert!(regions.medium_cells(1, &grid).is_err());
    }
}
