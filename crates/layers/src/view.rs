use foundation::math::Projection;

use crate::map::MapError;

/// The 2D view: what part of the map is shown and how.
///
/// `revision` increases with every effective change so observers can poll
/// for view changes without callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct View2d {
    center: [f64; 2],
    resolution: f64,
    rotation: f64,
    projection: Projection,
    revision: u64,
}

impl View2d {
    pub fn new(projection: Projection, center: [f64; 2], resolution: f64) -> Result<Self, MapError> {
        let mut view = Self {
            center: [0.0, 0.0],
            resolution: 1.0,
            rotation: 0.0,
            projection,
            revision: 0,
        };
        view.set_center(center)?;
        view.set_resolution(resolution)?;
        view.revision = 0;
        Ok(view)
    }

    pub fn center(&self) -> [f64; 2] {
        self.center
    }

    /// Map units per pixel.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Radians, counter-clockwise, in `[0, 2π)`.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_center(&mut self, center: [f64; 2]) -> Result<(), MapError> {
        if !center.iter().all(|v| v.is_finite()) {
            return Err(MapError::InvalidCenter(center));
        }
        if center != self.center {
            self.center = center;
            self.revision += 1;
        }
        Ok(())
    }

    pub fn set_resolution(&mut self, resolution: f64) -> Result<(), MapError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(MapError::InvalidResolution(resolution));
        }
        if resolution != self.resolution {
            self.resolution = resolution;
            self.revision += 1;
        }
        Ok(())
    }

    pub fn set_rotation(&mut self, rotation: f64) -> Result<(), MapError> {
        if !rotation.is_finite() {
            return Err(MapError::InvalidRotation(rotation));
        }
        let mut normalized = rotation.rem_euclid(std::f64::consts::TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs.
        if normalized >= std::f64::consts::TAU {
            normalized = 0.0;
        }
        if normalized != self.rotation {
            self.rotation = normalized;
            self.revision += 1;
        }
        Ok(())
    }
}
