use super::{Geodetic, Vec3, geodetic_to_ecef};

/// Local East-North-Up coordinates (meters).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Enu {
    pub east: f64,
    pub north: f64,
    pub up: f64,
}

impl Enu {
    pub fn new(east: f64, north: f64, up: f64) -> Self {
        Self { east, north, up }
    }

    pub fn length(self) -> f64 {
        (self.east * self.east + self.north * self.north + self.up * self.up).sqrt()
    }
}

/// Orthonormal East-North-Up basis anchored at a geodetic origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EnuFrame {
    pub origin: Vec3,
    pub east: Vec3,
    pub north: Vec3,
    pub up: Vec3,
}

impl EnuFrame {
    pub fn at(origin: Geodetic) -> Self {
        let sin_lat = origin.lat_rad.sin();
        let cos_lat = origin.lat_rad.cos();
        let sin_lon = origin.lon_rad.sin();
        let cos_lon = origin.lon_rad.cos();

        Self {
            origin: geodetic_to_ecef(origin),
            east: Vec3::new(-sin_lon, cos_lon, 0.0),
            north: Vec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
            up: Vec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
        }
    }

    /// Expresses a direction (not a point) in this frame.
    pub fn vector_to_local(&self, v: Vec3) -> Enu {
        Enu::new(v.dot(self.east), v.dot(self.north), v.dot(self.up))
    }

    /// Expresses a local direction (not a point) in ECEF.
    pub fn vector_to_world(&self, v: Enu) -> Vec3 {
        self.east * v.east + self.north * v.north + self.up * v.up
    }

    /// Direction and up vectors for a camera with the given heading (clockwise
    /// from north) and pitch (negative below the horizon), zero roll.
    pub fn orientation(&self, heading: f64, pitch: f64) -> (Vec3, Vec3) {
        let (sh, ch) = heading.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let direction = self.vector_to_world(Enu::new(sh * cp, ch * cp, sp));
        let up = self.vector_to_world(Enu::new(-sh * sp, -ch * sp, cp));
        (direction, up)
    }

    /// Inverse of [`EnuFrame::orientation`], assuming zero roll.
    ///
    /// Heading is derived from the horizontal parts of both vectors so it stays
    /// defined when looking straight down. Returns `(heading in [0, 2π), pitch)`.
    pub fn heading_pitch(&self, direction: Vec3, up: Vec3) -> (f64, f64) {
        let d = self.vector_to_local(direction);
        let u = self.vector_to_local(up);
        let pitch = d.up.clamp(-1.0, 1.0).asin();
        let (sp, cp) = pitch.sin_cos();
        let east = d.east * cp - u.east * sp;
        let north = d.north * cp - u.north * sp;
        let heading = east.atan2(north).rem_euclid(std::f64::consts::TAU);
        (heading, pitch)
    }
}

pub fn ecef_to_enu(point: Vec3, origin: Geodetic) -> Enu {
    let frame = EnuFrame::at(origin);
    frame.vector_to_local(point - frame.origin)
}

pub fn enu_to_ecef(enu: Enu, origin: Geodetic) -> Vec3 {
    let frame = EnuFrame::at(origin);
    frame.origin + frame.vector_to_world(enu)
}
