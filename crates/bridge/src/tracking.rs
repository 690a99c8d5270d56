use foundation::math::{Enu, EnuFrame, Vec3, ecef_to_geodetic};
use layers::{FeatureId, Map2d};
use scene::{Entity, EntityId, PointGraphics, Scene3d};
use tracing::{debug, info};

use crate::bounding::{BoundingVolume, BoundingVolumeFailure, BoundingVolumeResolver};
use crate::convert::map_to_ecef;
use crate::error::BridgeError;

/// Camera offset used when the camera sits on the tracked point.
const FALLBACK_RANGE_M: f64 = 1000.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackingDrop {
    FeatureRemoved(FeatureId),
    NotAPoint(FeatureId),
    Bounding(BoundingVolumeFailure),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackingUpdate {
    Idle,
    /// Bounding volume still pending; the camera is left alone.
    Waiting,
    Following,
    Dropped(TrackingDrop),
}

#[derive(Debug, Clone)]
struct Target {
    feature: FeatureId,
    entity: EntityId,
    /// Entity position the camera was last aimed at.
    anchor: Option<Vec3>,
}

/// Camera follow of one point feature through a hidden entity.
///
/// The feature is looked up by id every frame, so removing it from the map
/// needs no unregistration; tracking just drops on the next update.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    target: Option<Target>,
}

impl Tracker {
    pub fn feature(&self) -> Option<FeatureId> {
        self.target.as_ref().map(|t| t.feature)
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.target.as_ref().map(|t| t.entity)
    }

    pub fn start(
        &mut self,
        feature: FeatureId,
        map: &Map2d,
        scene: &mut Scene3d,
        resolver: &mut BoundingVolumeResolver,
    ) -> Result<EntityId, BridgeError> {
        let position = feature_position(map, feature)?;
        self.stop(scene, resolver);

        let entity = Entity::at(position)
            .named(format!("tracked {feature}"))
            .with_point(PointGraphics {
                pixel_size: 1.0,
                color: [0.0; 4],
            });
        let entity = scene.display_mut().add_entity(None, entity)?;
        self.target = Some(Target {
            feature,
            entity,
            anchor: None,
        });
        info!(%feature, %entity, "tracking feature");
        Ok(entity)
    }

    /// Clears tracking and releases the camera. Returns the feature that was
    /// tracked, if any.
    pub fn stop(&mut self, scene: &mut Scene3d, resolver: &mut BoundingVolumeResolver) -> Option<FeatureId> {
        let target = self.target.take()?;
        resolver.cancel(target.entity);
        scene.display_mut().remove_entity(target.entity);
        debug!(feature = %target.feature, "tracking cleared");
        Some(target.feature)
    }

    /// Moves the entity to the feature and, once its bounding volume is
    /// known, keeps the camera at its current offset from it.
    pub fn update(
        &mut self,
        map: &Map2d,
        scene: &mut Scene3d,
        resolver: &mut BoundingVolumeResolver,
    ) -> Result<TrackingUpdate, BridgeError> {
        let Some(target) = self.target.as_ref() else {
            return Ok(TrackingUpdate::Idle);
        };
        let feature = target.feature;
        let entity = target.entity;

        let position = match feature_position(map, feature) {
            Ok(p) => p,
            Err(BridgeError::UnknownFeature(_)) => {
                self.stop(scene, resolver);
                return Ok(TrackingUpdate::Dropped(TrackingDrop::FeatureRemoved(feature)));
            }
            Err(_) => {
                self.stop(scene, resolver);
                return Ok(TrackingUpdate::Dropped(TrackingDrop::NotAPoint(feature)));
            }
        };
        if let Some(e) = scene.display_mut().entity_mut(entity) {
            e.position = Some(position);
        }

        resolver.poll(scene.display());
        match resolver.compute(entity, scene.display()) {
            BoundingVolume::Pending => Ok(TrackingUpdate::Waiting),
            BoundingVolume::Failed(reason) => {
                self.stop(scene, resolver);
                Ok(TrackingUpdate::Dropped(TrackingDrop::Bounding(reason)))
            }
            BoundingVolume::Done(_) => {
                let camera = scene.camera_mut();
                let anchor = self
                    .target
                    .as_ref()
                    .and_then(|t| t.anchor)
                    .unwrap_or(position);
                let frame = EnuFrame::at(ecef_to_geodetic(anchor));
                let mut offset = frame.vector_to_local(camera.position() - anchor);
                if offset.length() < 1.0 {
                    offset = Enu::new(0.0, 0.0, FALLBACK_RANGE_M);
                }
                camera.look_at(position, offset)?;
                if let Some(t) = self.target.as_mut() {
                    t.anchor = Some(position);
                }
                Ok(TrackingUpdate::Following)
            }
        }
    }
}

/// ECEF ground position of a point feature.
fn feature_position(map: &Map2d, feature: FeatureId) -> Result<Vec3, BridgeError> {
    let f = map.feature(feature).ok_or(BridgeError::UnknownFeature(feature))?;
    let point = f
        .geometry
        .as_ref()
        .and_then(|g| g.as_point())
        .ok_or(BridgeError::NotAPointFeature(feature))?;
    map_to_ecef(map.view().projection(), point, 0.0)
        .map_err(|_| BridgeError::NotAPointFeature(feature))
}
