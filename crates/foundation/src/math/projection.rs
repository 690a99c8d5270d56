//! 2D map projections the map view can be expressed in.

use super::WGS84_A;

/// Latitude limit of the square Web Mercator world.
pub const MERCATOR_MAX_LAT_DEG: f64 = 85.051_128_779_806_59;

/// Meters per degree on the authalic sphere used by EPSG:4326 map units.
pub const METERS_PER_DEGREE: f64 = 2.0 * std::f64::consts::PI * 6_370_997.0 / 360.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// EPSG:3857, map units are meters on a sphere of radius `WGS84_A`.
    #[default]
    WebMercator,
    /// EPSG:4326, map units are degrees `[lon, lat]`.
    Geographic,
}

impl Projection {
    pub fn code(self) -> &'static str {
        match self {
            Projection::WebMercator => "EPSG:3857",
            Projection::Geographic => "EPSG:4326",
        }
    }

    pub fn meters_per_unit(self) -> f64 {
        match self {
            Projection::WebMercator => 1.0,
            Projection::Geographic => METERS_PER_DEGREE,
        }
    }

    /// Map coordinate to `[lon, lat]` degrees.
    pub fn to_lon_lat(self, xy: [f64; 2]) -> [f64; 2] {
        match self {
            Projection::WebMercator => {
                let lon = (xy[0] / WGS84_A).to_degrees();
                let lat = (2.0 * (xy[1] / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                [lon, lat]
            }
            Projection::Geographic => xy,
        }
    }

    /// `[lon, lat]` degrees to map coordinate. Mercator clamps latitude to the
    /// projection's valid band.
    pub fn from_lon_lat(self, lon_lat: [f64; 2]) -> [f64; 2] {
        match self {
            Projection::WebMercator => {
                let lat = lon_lat[1]
                    .clamp(-MERCATOR_MAX_LAT_DEG, MERCATOR_MAX_LAT_DEG)
                    .to_radians();
                let x = WGS84_A * lon_lat[0].to_radians();
                let y = WGS84_A * (0.5 * (std::f64::consts::FRAC_PI_2 + lat)).tan().ln();
                [x, y]
            }
            Projection::Geographic => lon_lat,
        }
    }
}
