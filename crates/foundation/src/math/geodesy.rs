use super::Vec3;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// WGS84 second eccentricity squared.
pub const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    /// Builds from a `[lon, lat]` pair in degrees, the order map projections use.
    pub fn from_lon_lat_deg(lon_lat: [f64; 2], alt_m: f64) -> Self {
        Self::new(lon_lat[1].to_radians(), lon_lat[0].to_radians(), alt_m)
    }

    pub fn lon_lat_deg(self) -> [f64; 2] {
        [self.lon_rad.to_degrees(), self.lat_rad.to_degrees()]
    }

    pub fn with_alt(self, alt_m: f64) -> Self {
        Self { alt_m, ..self }
    }
}

pub fn geodetic_to_ecef(geo: Geodetic) -> Vec3 {
    let sin_lat = geo.lat_rad.sin();
    let cos_lat = geo.lat_rad.cos();
    let sin_lon = geo.lon_rad.sin();
    let cos_lon = geo.lon_rad.cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let x = (n + geo.alt_m) * cos_lat * cos_lon;
    let y = (n + geo.alt_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - WGS84_E2) + geo.alt_m) * sin_lat;

    Vec3::new(x, y, z)
}

/// Bowring's closed form; accurate to well below a millimeter near the surface.
pub fn ecef_to_geodetic(ecef: Vec3) -> Geodetic {
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let theta = (ecef.z * WGS84_A).atan2(p * WGS84_B);
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    let lat = (ecef.z + WGS84_EP2 * WGS84_B * sin_theta * sin_theta * sin_theta)
        .atan2(p - WGS84_E2 * WGS84_A * cos_theta * cos_theta * cos_theta);

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let alt = if lat.cos().abs() > 1e-10 {
        p / lat.cos() - n
    } else {
        ecef.z.abs() - WGS84_B
    };

    Geodetic::new(lat, lon, alt)
}

/// Outward ellipsoid normal at (or above) `p`.
///
/// Gradient of `x²/A² + y²/A² + z²/B²`; returns `None` at the ellipsoid center.
pub fn geodetic_surface_normal(p: Vec3) -> Option<Vec3> {
    let a2 = WGS84_A * WGS84_A;
    let b2 = WGS84_B * WGS84_B;
    Vec3::new(p.x / a2, p.y / a2, p.z / b2).try_normalize()
}

/// Nearest non-negative ray parameter `t` where `origin + t * direction` meets
/// the WGS84 ellipsoid surface.
///
/// `direction` does not need to be normalized; `t` is expressed in multiples of
/// it. Returns `None` when the ray misses or points away from the ellipsoid.
pub fn ray_ellipsoid_intersection(origin: Vec3, direction: Vec3) -> Option<f64> {
    // Scale into unit-sphere space so the quadratic stays well conditioned.
    let o = Vec3::new(origin.x / WGS84_A, origin.y / WGS84_A, origin.z / WGS84_B);
    let d = Vec3::new(
        direction.x / WGS84_A,
        direction.y / WGS84_A,
        direction.z / WGS84_B,
    );

    let a = d.dot(d);
    if !(a > 0.0) {
        return None;
    }
    let b = 2.0 * o.dot(d);
    let c = o.dot(o) - 1.0;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || !disc.is_finite() {
        return None;
    }

    let sqrt_disc = disc.sqrt();
    let q = if b < 0.0 {
        -0.5 * (b - sqrt_disc)
    } else {
        -0.5 * (b + sqrt_disc)
    };
    if q == 0.0 {
        return if c == 0.0 { Some(0.0) } else { None };
    }

    let t0 = q / a;
    let t1 = c / q;
    let (near, far) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        // Origin inside the ellipsoid.
        Some(far)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Geodetic, WGS84_A, WGS84_B, ecef_to_geodetic, geodetic_surface_normal, geodetic_to_ecef,
        ray_ellipsoid_intersection,
    };
    use crate::math::Vec3;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn geodetic_to_ecef_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(Geodetic::new(0.0, 0.0, 0.0));
        assert_close(ecef.x, WGS84_A, 1e-6);
        assert_close(ecef.y, 0.0, 1e-6);
        assert_close(ecef.z, 0.0, 1e-6);
    }

    #[test]
    fn round_trip_geodetic_ecef() {
        let geo = Geodetic::new(
            std::f64::consts::FRAC_PI_6,
            -std::f64::consts::FRAC_PI_3,
            120.0,
        );
        let geo_rt = ecef_to_geodetic(geodetic_to_ecef(geo));
        assert_close(geo_rt.lat_rad, geo.lat_rad, 1e-9);
        assert_close(geo_rt.lon_rad, geo.lon_rad, 1e-9);
        assert_close(geo_rt.alt_m, geo.alt_m, 1e-6);
    }

    #[test]
    fn lon_lat_degrees_keep_map_axis_order() {
        let geo = Geodetic::from_lon_lat_deg([8.5, 47.25], 0.0);
        assert_close(geo.lon_rad, 8.5f64.to_radians(), 1e-15);
        assert_close(geo.lat_rad, 47.25f64.to_radians(), 1e-15);
        let back = geo.lon_lat_deg();
        assert_close(back[0], 8.5, 1e-12);
        assert_close(back[1], 47.25, 1e-12);
    }

    #[test]
    fn poles_have_polar_normal() {
        let n = geodetic_surface_normal(Vec3::new(0.0, 0.0, WGS84_B)).unwrap();
        assert_close(n.z, 1.0, 1e-12);
        assert!(geodetic_surface_normal(Vec3::ZERO).is_none());
    }

    #[test]
    fn ray_straight_down_hits_surface() {
        let origin = Vec3::new(WGS84_A + 1000.0, 0.0, 0.0);
        let t = ray_ellipsoid_intersection(origin, Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert_close(t, 1000.0, 1e-6);
    }

    #[test]
    fn ray_towards_sky_misses() {
        let origin = Vec3::new(WGS84_A + 1000.0, 0.0, 0.0);
        assert!(ray_ellipsoid_intersection(origin, Vec3::new(1.0, 0.0, 0.0)).is_none());
        assert!(ray_ellipsoid_intersection(origin, Vec3::new(0.0, 0.0, 1.0)).is_none());
    }
}
