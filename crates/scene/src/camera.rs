use foundation::math::{
    Enu, EnuFrame, Geodetic, Vec3, WGS84_A, ecef_to_geodetic, geodetic_to_ecef,
    ray_ellipsoid_intersection,
};

use crate::scene::SceneError;

/// Perspective frustum. `fov` is the angle of the wider canvas axis, as in
/// most globe renderers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub fov: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Frustum {
    fn default() -> Self {
        Self {
            fov: 60f64.to_radians(),
            aspect: 1.0,
            near: 1.0,
            far: 5.0e8,
        }
    }
}

impl Frustum {
    /// Vertical field of view.
    pub fn fovy(&self) -> f64 {
        if self.aspect <= 1.0 {
            self.fov
        } else {
            2.0 * ((0.5 * self.fov).tan() / self.aspect).atan()
        }
    }
}

/// Globe camera in ECEF meters.
///
/// `direction` and `up` are kept unit length and orthogonal by every setter.
/// `revision` changes with every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera3d {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
    pub frustum: Frustum,
    revision: u64,
}

impl Default for Camera3d {
    fn default() -> Self {
        // Looking straight down at (0, 0) from far away.
        Self {
            position: Vec3::new(3.0 * WGS84_A, 0.0, 0.0),
            direction: Vec3::new(-1.0, 0.0, 0.0),
            up: Vec3::UNIT_Z,
            frustum: Frustum::default(),
            revision: 0,
        }
    }
}

impl Camera3d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.up)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn position_geodetic(&self) -> Geodetic {
        ecef_to_geodetic(self.position)
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<(), SceneError> {
        if !position.is_finite() {
            return Err(SceneError::InvalidCameraState);
        }
        self.position = position;
        self.revision += 1;
        Ok(())
    }

    /// Sets the orientation, re-orthonormalizing `up` against `direction`.
    pub fn set_orientation(&mut self, direction: Vec3, up: Vec3) -> Result<(), SceneError> {
        let direction = direction
            .try_normalize()
            .ok_or(SceneError::InvalidCameraState)?;
        let up = (up - direction * direction.dot(up))
            .try_normalize()
            .ok_or(SceneError::InvalidCameraState)?;
        self.direction = direction;
        self.up = up;
        self.revision += 1;
        Ok(())
    }

    /// Places the camera at `destination` looking along `heading` (clockwise
    /// from north) and `pitch` (negative below the horizon) of the local ENU
    /// frame there.
    pub fn set_view(&mut self, destination: Geodetic, heading: f64, pitch: f64) -> Result<(), SceneError> {
        let frame = EnuFrame::at(destination);
        let (direction, up) = frame.orientation(heading, pitch);
        self.set_position(geodetic_to_ecef(destination))?;
        self.set_orientation(direction, up)
    }

    pub fn move_backward(&mut self, amount: f64) -> Result<(), SceneError> {
        self.set_position(self.position - self.direction * amount)
    }

    pub fn move_forward(&mut self, amount: f64) -> Result<(), SceneError> {
        self.set_position(self.position + self.direction * amount)
    }

    /// Places the camera at `offset` from `target`, expressed in the target's
    /// ENU frame, and aims at the target with zero roll.
    pub fn look_at(&mut self, target: Vec3, offset: Enu) -> Result<(), SceneError> {
        let frame = EnuFrame::at(ecef_to_geodetic(target));
        let position = target + frame.vector_to_world(offset);
        let direction = (target - position)
            .try_normalize()
            .ok_or(SceneError::InvalidCameraState)?;
        // Straight down has no horizontal component; fall back to north.
        let up = if direction.cross(frame.up).length_squared() < 1e-12 {
            frame.north
        } else {
            frame.up
        };
        self.set_position(position)?;
        self.set_orientation(direction, up)
    }

    /// Heading and pitch in the ENU frame at the camera position.
    pub fn heading_pitch(&self) -> (f64, f64) {
        EnuFrame::at(self.position_geodetic()).heading_pitch(self.direction, self.up)
    }

    pub fn heading(&self) -> f64 {
        self.heading_pitch().0
    }

    pub fn pitch(&self) -> f64 {
        self.heading_pitch().1
    }

    /// Distance along the view ray to the ellipsoid, if the camera looks at it.
    pub fn ground_hit_distance(&self) -> Option<f64> {
        ray_ellipsoid_intersection(self.position, self.direction)
    }

    /// Pixel coordinates (origin top-left) of `point` on a canvas of the given
    /// size, or `None` when the point is behind the near plane.
    pub fn project_to_canvas(&self, point: Vec3, width: f64, height: f64) -> Option<[f64; 2]> {
        let v = point - self.position;
        let z = v.dot(self.direction);
        if z <= self.frustum.near {
            return None;
        }
        let tan_y = (0.5 * self.frustum.fovy()).tan();
        let tan_x = tan_y * self.frustum.aspect;
        let ndc_x = v.dot(self.right()) / (z * tan_x);
        let ndc_y = v.dot(self.up) / (z * tan_y);
        Some([
            0.5 * (ndc_x + 1.0) * width,
            0.5 * (1.0 - ndc_y) * height,
        ])
    }

    /// True when the globe surface lies between the camera and `point`.
    pub fn is_occluded_by_globe(&self, point: Vec3) -> bool {
        match ray_ellipsoid_intersection(self.position, point - self.position) {
            Some(t) => t < 1.0 - 1e-6,
            None => false,
        }
    }
}
