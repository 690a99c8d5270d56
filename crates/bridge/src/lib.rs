//! Keeps a 2D map and a 3D globe scene in step: layer synchronizers, the
//! camera bridge, render-loop control, bounding-volume resolution, feature
//! tracking and the [`Bridge`] that ties them to a host frame clock.

pub mod bounding;
pub mod camera;
pub mod config;
pub mod convert;
pub mod error;
pub mod orchestrator;
pub mod render_loop;
pub mod synchronizer;
pub mod tracking;

#[cfg(test)]
mod testing;

pub use bounding::{BoundingVolume, BoundingVolumeFailure, BoundingVolumeResolver, BoundingVolumeState};
pub use camera::{Authority, CameraBridge, distance_for_resolution, resolution_for_distance};
pub use config::{BridgeOptions, CameraOptions, ConfigError, RenderOptions, SyncOptions, TrackingOptions};
pub use convert::{ConvertError, geometry_to_primitives, map_to_ecef};
pub use error::BridgeError;
pub use orchestrator::{Bridge, TickReport, WarmUpEnd};
pub use render_loop::{AutoRenderLoop, FrameRate, FrameRateLimiter};
pub use synchronizer::{
    LayerSynchronizer, OverlaySynchronizer, RasterSynchronizer, SyncContext, SyncReport, Synchronizer,
    VectorSynchronizer,
};
pub use tracking::{Tracker, TrackingDrop, TrackingUpdate};
