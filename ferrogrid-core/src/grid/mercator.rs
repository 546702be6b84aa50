//! Spherical Web Mercator (EPSG:3857) helpers.
//!
//! Network geometries are stored in Web Mercator metres, grid cells are
//! addressed in WGS84 degrees.

use geo::Coord;
use h3o::LatLng;

use crate::Error;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

pub fn to_mercator(point: LatLng) -> Coord<f64> {
    let lat = point.lat().clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS * point.lng().to_radians(),
        y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

pub fn from_mercator(coord: Coord<f64>) -> Result<LatLng, Error> {
    let lng = (coord.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    LatLng::new(lat, lng).map_err(|e| {
        Error::InvalidData(format!(
            "Mercator coordinate ({}, {}) is out of range: {e}",
            coord.x, coord.y
        ))
    })
}

/// Mercator units per true metre at the given latitude
pub fn mercator_scale(lat: f64) -> f64 {
    1.0 / lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians().cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_round_trip() {
        let point = LatLng::new(48.137, 11.575).unwrap();
        let back = from_mercator(to_mercator(point)).unwrap();
        assert!((back.lat() - point.lat()).abs() < 1e-9);
        assert!((back.lng() - point.lng()).abs() < 1e-9);
    }

    #[test]
    fn scale_grows_towards_poles() {
        assert!((mercator_scale(0.0) - 1.0).abs() < 1e-12);
        assert!((mercator_scale(60.0) - 2.0).abs() < 1e-9);
    }
}
