//! Two-way translation between the 2D view and the globe camera.
//!
//! The 2D view is `(center, resolution, rotation)`; the globe camera looks
//! at the ground point under the view center from a distance chosen so the
//! same number of meters fits the canvas height. Heading is the negated view
//! rotation, pitch is `tilt - π/2`.

use std::f64::consts::FRAC_PI_2;

use foundation::math::{EnuFrame, Geodetic, Vec3, ecef_to_geodetic, geodetic_surface_normal};
use layers::View2d;
use scene::{Camera3d, Scene3d};
use tracing::{debug, warn};

use crate::config::CameraOptions;
use crate::error::BridgeError;

/// Which side currently owns the camera position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Authority {
    /// 2D view changes are pushed into the globe camera.
    #[default]
    TwoD,
    /// Globe camera moves are pushed down into the 2D view.
    ThreeD,
}

/// Camera distance that shows `resolution * canvas_height` map units
/// vertically at `latitude`.
pub fn distance_for_resolution(
    resolution: f64,
    latitude: f64,
    canvas_height: f64,
    fovy: f64,
    meters_per_unit: f64,
) -> f64 {
    let visible_map_units = resolution * canvas_height;
    // Map units shrink towards the poles; compensate like the 2D projection.
    let relative_circumference = latitude.abs().cos();
    let visible_meters = visible_map_units * meters_per_unit * relative_circumference;
    (visible_meters / 2.0) / (fovy / 2.0).tan()
}

/// Exact inverse of [`distance_for_resolution`].
pub fn resolution_for_distance(
    distance: f64,
    latitude: f64,
    canvas_height: f64,
    fovy: f64,
    meters_per_unit: f64,
) -> f64 {
    let visible_meters = 2.0 * distance * (fovy / 2.0).tan();
    let relative_circumference = latitude.abs().cos();
    let visible_map_units = visible_meters / meters_per_unit / relative_circumference;
    visible_map_units / canvas_height
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct CameraSnapshot {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
}

impl CameraSnapshot {
    fn of(camera: &Camera3d) -> Self {
        Self {
            position: camera.position(),
            direction: camera.direction(),
            up: camera.up(),
        }
    }

    fn differs(&self, other: &Self, options: &CameraOptions) -> bool {
        self.position.distance(other.position) > options.position_epsilon_m
            || self.direction.max_abs_diff(other.direction) > options.orientation_epsilon
            || self.up.max_abs_diff(other.up) > options.orientation_epsilon
    }
}

/// Ground target of the camera: where its view ray meets the ellipsoid.
/// A camera below the surface has none.
fn ground_target(camera: &Camera3d) -> Option<Vec3> {
    if camera.position_geodetic().alt_m < 0.0 {
        return None;
    }
    let t = camera.ground_hit_distance()?;
    Some(camera.position() + camera.direction() * t)
}

#[derive(Debug, Clone)]
pub struct CameraBridge {
    options: CameraOptions,
    refresh_on_move_end_only: bool,
    /// 0 looks straight down.
    tilt: f64,
    distance: f64,
    last_snapshot: Option<CameraSnapshot>,
    seen_view_revision: Option<u64>,
    moving: bool,
    degenerate: bool,
    destroyed: bool,
}

impl CameraBridge {
    pub fn new(options: CameraOptions) -> Self {
        Self {
            options,
            refresh_on_move_end_only: false,
            tilt: 0.0,
            distance: 0.0,
            last_snapshot: None,
            seen_view_revision: None,
            moving: false,
            degenerate: false,
            destroyed: false,
        }
    }

    /// Places the globe camera from the 2D view.
    pub fn read_from_view(&mut self, view: &View2d, scene: &mut Scene3d) -> Result<(), BridgeError> {
        if self.destroyed {
            return Err(BridgeError::Destroyed);
        }
        let projection = view.projection();
        let lon_lat = projection.to_lon_lat(view.center());
        let target = Geodetic::from_lon_lat_deg(lon_lat, 0.0);
        let (_, canvas_height) = scene.canvas_size();
        let camera = scene.camera_mut();
        let distance = distance_for_resolution(
            view.resolution(),
            target.lat_rad,
            f64::from(canvas_height),
            camera.frustum.fovy(),
            projection.meters_per_unit(),
        );

        camera.set_view(target, -view.rotation(), self.tilt - FRAC_PI_2)?;
        camera.move_backward(distance)?;

        self.distance = distance;
        self.degenerate = false;
        self.seen_view_revision = Some(view.revision());
        self.last_snapshot = Some(CameraSnapshot::of(camera));
        debug!(distance, tilt = self.tilt, "camera read from 2D view");
        Ok(())
    }

    /// Sets the 2D view from the globe camera. Returns false and leaves the
    /// view untouched when the camera does not look at the ground.
    pub fn update_view(&mut self, view: &mut View2d, scene: &Scene3d) -> Result<bool, BridgeError> {
        if self.destroyed {
            return Err(BridgeError::Destroyed);
        }
        let camera = scene.camera();
        let Some(target) = ground_target(camera) else {
            if !self.degenerate {
                warn!("camera does not look at the ground; 2D view left unchanged");
            }
            self.degenerate = true;
            return Ok(false);
        };
        self.degenerate = false;

        let target_geo = ecef_to_geodetic(target);
        let distance = target.distance(camera.position());
        let projection = view.projection();
        let (_, canvas_height) = scene.canvas_size();
        let resolution = resolution_for_distance(
            distance,
            target_geo.lat_rad,
            f64::from(canvas_height),
            camera.frustum.fovy(),
            projection.meters_per_unit(),
        );

        let (heading, _) =
            EnuFrame::at(target_geo.with_alt(0.0)).heading_pitch(camera.direction(), camera.up());
        let tilt = geodetic_surface_normal(target)
            .zip((camera.position() - target).try_normalize())
            .map(|(normal, to_camera)| normal.dot(to_camera).clamp(-1.0, 1.0).acos())
            .filter(|t| t.is_finite())
            .unwrap_or(0.0);

        view.set_center(projection.from_lon_lat(target_geo.lon_lat_deg()))?;
        view.set_resolution(resolution)?;
        view.set_rotation(-heading)?;

        self.tilt = tilt;
        self.distance = distance;
        self.seen_view_revision = Some(view.revision());
        debug!(resolution, heading, tilt, "2D view updated from camera");
        Ok(true)
    }

    /// Per-frame check while the globe owns the camera. Pushes the camera
    /// into the 2D view when it moved beyond the motion thresholds, or once
    /// motion settles when refresh is batched to move end.
    pub fn check_camera_change(
        &mut self,
        authority: Authority,
        view: &mut View2d,
        scene: &Scene3d,
    ) -> Result<bool, BridgeError> {
        if self.destroyed {
            return Err(BridgeError::Destroyed);
        }
        if authority != Authority::ThreeD {
            return Ok(false);
        }
        let current = CameraSnapshot::of(scene.camera());
        let changed = self
            .last_snapshot
            .is_none_or(|last| last.differs(&current, &self.options));

        if changed {
            self.last_snapshot = Some(current);
            self.moving = true;
            if !self.refresh_on_move_end_only {
                self.update_view(view, scene)?;
            }
            return Ok(true);
        }
        if self.moving {
            self.moving = false;
            if self.refresh_on_move_end_only {
                debug!("camera move ended");
                self.update_view(view, scene)?;
            }
        }
        Ok(false)
    }

    /// Re-reads the 2D view if it changed since the last sync. No-op unless
    /// the 2D side owns the camera.
    pub fn sync_from_view(
        &mut self,
        authority: Authority,
        view: &View2d,
        scene: &mut Scene3d,
    ) -> Result<bool, BridgeError> {
        if authority != Authority::TwoD || self.seen_view_revision == Some(view.revision()) {
            return Ok(false);
        }
        self.read_from_view(view, scene)?;
        Ok(true)
    }

    /// Forgets the motion snapshot so the next check compares against the
    /// camera as it is now.
    pub fn record_snapshot(&mut self, scene: &Scene3d) {
        self.last_snapshot = Some(CameraSnapshot::of(scene.camera()));
        self.moving = false;
    }

    pub fn set_refresh_on_move_end_only(&mut self, enabled: bool) {
        self.refresh_on_move_end_only = enabled;
    }

    pub fn refresh_on_move_end_only(&self) -> bool {
        self.refresh_on_move_end_only
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Heading of the camera at its ground target, or at its own position
    /// when looking at the sky.
    pub fn heading(&self, scene: &Scene3d) -> f64 {
        let camera = scene.camera();
        match ground_target(camera) {
            Some(target) => {
                EnuFrame::at(ecef_to_geodetic(target)).heading_pitch(camera.direction(), camera.up()).0
            }
            None => camera.heading(),
        }
    }

    pub fn set_tilt(&mut self, tilt: f64, scene: &mut Scene3d) -> Result<bool, BridgeError> {
        if !(tilt.is_finite() && (0.0..=FRAC_PI_2).contains(&tilt)) {
            return Err(BridgeError::InvalidTilt(tilt));
        }
        let heading = self.heading(scene);
        self.orbit_target(scene, |bridge| {
            bridge.tilt = tilt;
            (heading, bridge.distance)
        })
    }

    pub fn set_distance(&mut self, distance: f64, scene: &mut Scene3d) -> Result<bool, BridgeError> {
        if !(distance.is_finite() && distance > 0.0) {
            return Err(BridgeError::InvalidDistance(distance));
        }
        let heading = self.heading(scene);
        self.orbit_target(scene, |_| (heading, distance))
    }

    pub fn set_heading(&mut self, heading: f64, scene: &mut Scene3d) -> Result<bool, BridgeError> {
        self.orbit_target(scene, |bridge| (heading, bridge.distance))
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.last_snapshot = None;
        self.seen_view_revision = None;
    }

    /// Re-places the camera around its current ground target. Returns false
    /// when there is no ground target.
    fn orbit_target(
        &mut self,
        scene: &mut Scene3d,
        place: impl FnOnce(&mut Self) -> (f64, f64),
    ) -> Result<bool, BridgeError> {
        if self.destroyed {
            return Err(BridgeError::Destroyed);
        }
        let Some(target) = ground_target(scene.camera()) else {
            self.degenerate = true;
            return Ok(false);
        };
        self.distance = target.distance(scene.camera().position());
        let (heading, distance) = place(self);
        let camera = scene.camera_mut();
        camera.set_view(ecef_to_geodetic(target).with_alt(0.0), heading, self.tilt - FRAC_PI_2)?;
        camera.move_backward(distance)?;
        self.distance = distance;
        Ok(true)
    }
}
