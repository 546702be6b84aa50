//! Isochrone requests and the projection of travel times onto the grid.

pub mod isochrone;
pub mod projection;
