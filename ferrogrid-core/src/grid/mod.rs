//! Hierarchical hexagonal grid used for partitioning, batching and output.
//!
//! Three H3 resolutions are in play: coarse cells partition the street
//! network cache, medium cells are the unit of work of the matrix
//! preparation and fine cells are the output granularity.

mod mercator;
mod short;

use geo::{Coord, LineString, Point, Polygon, Rect};
use h3o::{
    CellIndex, LatLng, Resolution,
    geom::{ContainmentMode, TilerBuilder},
};

pub use mercator::{from_mercator, mercator_scale, to_mercator};
pub use short::ShortCell;

use crate::{Error, GridConfig};

/// Resolved grid resolutions and the cell operations the pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIndex {
    pub coarse: Resolution,
    pub medium: Resolution,
    pub fine: Resolution,
}

impl GridIndex {
    pub fn new(config: &GridConfig) -> Result<Self, Error> {
        let coarse = Resolution::try_from(config.coarse)?;
        let medium = Resolution::try_from(config.medium)?;
        let fine = Resolution::try_from(config.fine)?;

        if !(coarse < medium && medium < fine) {
            return Err(Error::InvalidData(format!(
                "Grid resolutions must be strictly increasing, got {coarse}/{medium}/{fine}"
            )));
        }

        Ok(Self {
            coarse,
            medium,
            fine,
        })
    }

    pub fn cell(point: LatLng, resolution: Resolution) -> CellIndex {
        point.to_cell(resolution)
    }

    pub fn coarse_cell(&self, point: LatLng) -> CellIndex {
        point.to_cell(self.coarse)
    }

    pub fn fine_cell(&self, point: LatLng) -> CellIndex {
        point.to_cell(self.fine)
    }

    /// Coarse ancestor of a cell. Cells coarser than the partition
    /// resolution have no such ancestor.
    pub fn coarse_parent(&self, cell: CellIndex) -> Result<CellIndex, Error> {
        cell.parent(self.coarse).ok_or_else(|| {
            Error::InvalidData(format!(
                "Cell {cell} is coarser than partition resolution {}",
                self.coarse
            ))
        })
    }

    pub fn fine_children(&self, cell: CellIndex) -> Vec<CellIndex> {
        cell.children(self.fine).collect()
    }

    pub fn fine_center_child(&self, cell: CellIndex) -> Result<CellIndex, Error> {
        cell.center_child(self.fine).ok_or_else(|| {
            Error::InvalidData(format!(
                "Cell {cell} is finer than output resolution {}",
                self.fine
            ))
        })
    }

    pub fn disk(cell: CellIndex, k: u32) -> Vec<CellIndex> {
        cell.grid_disk::<Vec<_>>(k)
    }

    pub fn centroid(cell: CellIndex) -> LatLng {
        LatLng::from(cell)
    }

    pub fn centroid_mercator(cell: CellIndex) -> Coord<f64> {
        to_mercator(LatLng::from(cell))
    }

    /// Cells of the given resolution covering a polygon in WGS84 degrees
    pub fn coverage(area: Polygon, resolution: Resolution) -> Result<Vec<CellIndex>, Error> {
        let mut tiler = TilerBuilder::new(resolution)
            .containment_mode(ContainmentMode::Covers)
            .build();
        tiler.add(area)?;

        Ok(tiler.into_coverage().collect::<Vec<_>>())
    }

    /// Coarse cells covering a bounding rectangle in WGS84 degrees
    pub fn coarse_cells_in_bounds(&self, bounds: Rect<f64>) -> Result<Vec<CellIndex>, Error> {
        let mut cells = Self::coverage(bounds.to_polygon(), self.coarse)?;
        // The tiler only reports cells touching the rectangle, corners are
        // added explicitly so a degenerate rectangle still yields its cell.
        for corner in rect_corners(bounds) {
            let point = LatLng::new(corner.y(), corner.x()).map_err(|e| {
                Error::InvalidData(format!("Invalid bounds corner {corner:?}: {e}"))
            })?;
            cells.push(self.coarse_cell(point));
        }
        cells.sort_unstable();
        cells.dedup();
        Ok(cells)
    }

    /// Average edge length of fine cells in metres
    pub fn fine_edge_length(&self) -> f64 {
        self.fine.edge_length_m()
    }

    /// Average edge length of medium cells in metres
    pub fn medium_edge_length(&self) -> f64 {
        self.medium.edge_length_m()
    }
}

impl Default for GridIndex {
    fn default() -> Self {
        Self {
            coarse: Resolution::Three,
            medium: Resolution::Six,
            fine: Resolution::Ten,
        }
    }
}

fn rect_corners(rect: Rect<f64>) -> [Point<f64>; 4] {
    let (min, max) = (rect.min(), rect.max());
    [
        Point::new(min.x, min.y),
        Point::new(max.x, min.y),
        Point::new(max.x, max.y),
        Point::new(min.x, max.y),
    ]
}

/// Converts a mercator line string into WGS84 degrees (x = lng, y = lat)
pub fn line_to_degrees(line: &LineString<f64>) -> Result<LineString<f64>, Error> {
    line.coords()
        .map(|coord| {
            from_mercator(*coord).map(|latlng| Coord {
                x: latlng.lng(),
                y: latlng.lat(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

#[cfg(test)]
mod tests {
    use geo::coord;

    use super::*;

    #[test]
    fn rejects_non_increasing_resolutions() {
        let config = GridConfig {
            coarse: 6,
            medium: 6,
            fine: 10,
        };
        assert!(GridIndex::new(&config).is_err());
        assert!(GridIndex::new(&GridConfig::default()).is_ok());
    }

    #[test]
    fn every_fine_child_has_the_coarse_parent_of_its_medium_cell() {
        let grid = GridIndex::default();
        let medium = LatLng::new(48.2, 16.37).unwrap().to_cell(grid.medium);
        let coarse = grid.coarse_parent(medium).unwrap();
        let children = grid.fine_children(medium);

        assert_eq!(children.len(), 7_usize.pow(4));
        for child in children {
            assert_eq!(grid.coarse_parent(child).unwrap(), coarse);
        }
    }

    #[test]
    fn bounds_inside_one_cell_yield_that_cell() {
        let grid = GridIndex::default();
        let point = LatLng::new(52.52, 13.405).unwrap();
        let bounds = Rect::new(
            coord! { x: 13.405, y: 52.52 },
            coord! { x: 13.4051, y: 52.5201 },
        );
        let cells = grid.coarse_cells_in_bounds(bounds).unwrap();
        assert!(cells.contains(&grid.coarse_cell(point)));
    }
}
