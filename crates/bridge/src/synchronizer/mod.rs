//! Mirrors of 2D layers into the 3D scene.
//!
//! Each synchronizer reads the map's change log through its own cursor and
//! reconciles by identity: counterparts are created, updated or destroyed,
//! never rebuilt when nothing about them changed.

mod overlay;
mod raster;
mod vector;

use std::fmt;

use layers::{ChangeBatch, ChangeCursor, Map2d, MapChange};
use runtime::{EventBus, Frame, FrameBudget, Metrics};
use scene::Scene3d;

pub use overlay::OverlaySynchronizer;
pub use raster::RasterSynchronizer;
pub use vector::VectorSynchronizer;

/// Everything a synchronizer may touch during one frame.
pub struct SyncContext<'a> {
    pub map: &'a Map2d,
    pub scene: &'a mut Scene3d,
    pub bus: &'a mut EventBus,
    pub metrics: &'a mut Metrics,
    pub frame: Frame,
    /// Shared across synchronizers; work left over waits for the next frame.
    pub budget: &'a mut FrameBudget,
}

/// What one `synchronize` call did.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub skipped: usize,
    /// Work deferred to later frames.
    pub pending: usize,
}

impl SyncReport {
    /// Anything visible changed.
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.destroyed > 0
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.destroyed += other.destroyed;
        self.skipped += other.skipped;
        self.pending += other.pending;
    }
}

/// A mirror of one category of 2D content.
pub trait Synchronizer {
    fn name(&self) -> &'static str;

    /// Brings the scene in line with the map. Calling it again without map
    /// changes must not touch the scene.
    fn synchronize(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport;

    /// Releases every counterpart this synchronizer created. Idempotent.
    /// Returns how many were released.
    fn destroy_all(&mut self, scene: &mut Scene3d) -> usize;

    /// Called after the 3D camera moved.
    fn camera_changed(&mut self, _scene: &mut Scene3d) {}

    fn has_pending_work(&self) -> bool {
        false
    }
}

/// The synchronizers a bridge runs, dispatched by tag.
pub enum LayerSynchronizer {
    Raster(RasterSynchronizer),
    Vector(VectorSynchronizer),
    Overlay(OverlaySynchronizer),
    Custom(Box<dyn Synchronizer>),
}

impl LayerSynchronizer {
    /// Raster, vector then overlay, in draw order.
    pub fn defaults(map: &Map2d) -> Vec<LayerSynchronizer> {
        vec![
            LayerSynchronizer::Raster(RasterSynchronizer::new(map)),
            LayerSynchronizer::Vector(VectorSynchronizer::new(map)),
            LayerSynchronizer::Overlay(OverlaySynchronizer::new(map)),
        ]
    }

    fn inner(&self) -> &dyn Synchronizer {
        match self {
            LayerSynchronizer::Raster(s) => s,
            LayerSynchronizer::Vector(s) => s,
            LayerSynchronizer::Overlay(s) => s,
            LayerSynchronizer::Custom(s) => s.as_ref(),
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Synchronizer {
        match self {
            LayerSynchronizer::Raster(s) => s,
            LayerSynchronizer::Vector(s) => s,
            LayerSynchronizer::Overlay(s) => s,
            LayerSynchronizer::Custom(s) => s.as_mut(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    pub fn synchronize(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport {
        self.inner_mut().synchronize(ctx)
    }

    pub fn destroy_all(&mut self, scene: &mut Scene3d) -> usize {
        self.inner_mut().destroy_all(scene)
    }

    pub fn camera_changed(&mut self, scene: &mut Scene3d) {
        self.inner_mut().camera_changed(scene);
    }

    pub fn has_pending_work(&self) -> bool {
        self.inner().has_pending_work()
    }
}

impl fmt::Debug for LayerSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LayerSynchronizer").field(&self.name()).finish()
    }
}

/// Drains a cursor. `None` means the log lagged and only a full reconcile
/// is safe.
pub(crate) fn read_changes(map: &Map2d, cursor: &mut ChangeCursor) -> Option<Vec<MapChange>> {
    if !map.changes().has_unread(cursor) {
        return Some(Vec::new());
    }
    match map.read_changes(cursor) {
        ChangeBatch::Changes(changes) => Some(changes),
        ChangeBatch::Lagged => None,
    }
}

pub(crate) fn is_layer_change(change: &MapChange) -> bool {
    change.is_structural() || matches!(change, MapChange::LayerChanged { .. })
}

/// True when `current` does not list `desired` in the same relative order.
pub(crate) fn order_differs<T: PartialEq + Copy>(current: &[T], desired: &[T]) -> bool {
    let current: Vec<T> = current.iter().copied().filter(|id| desired.contains(id)).collect();
    current != desired
}
