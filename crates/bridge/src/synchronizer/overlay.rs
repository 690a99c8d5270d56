use std::collections::{BTreeMap, BTreeSet};

use layers::{ChangeCursor, Map2d, MapChange, Overlay, OverlayId};
use scene::{AnchorId, OverlayAnchor, Scene3d};
use tracing::debug;

use super::{SyncContext, SyncReport, Synchronizer, read_changes};
use crate::convert::map_to_ecef;

#[derive(Debug, Clone)]
struct AnchorEntry {
    anchor: AnchorId,
    /// Overlay state the anchor was built from.
    mirrored: Overlay,
}

/// Screen-space anchors for map overlays. Canvas positions are recomputed
/// whenever the camera moves.
#[derive(Debug)]
pub struct OverlaySynchronizer {
    cursor: ChangeCursor,
    reconcile_pending: bool,
    entries: BTreeMap<OverlayId, AnchorEntry>,
}

impl OverlaySynchronizer {
    pub fn new(map: &Map2d) -> Self {
        Self {
            cursor: map.subscribe(),
            reconcile_pending: true,
            entries: BTreeMap::new(),
        }
    }

    pub fn anchor(&self, overlay: OverlayId) -> Option<AnchorId> {
        self.entries.get(&overlay).map(|e| e.anchor)
    }

    fn sync_overlay(&mut self, ctx: &mut SyncContext<'_>, id: OverlayId, report: &mut SyncReport) {
        let Some(overlay) = ctx.map.overlay(id) else {
            if let Some(entry) = self.entries.remove(&id) {
                ctx.scene.anchors_mut().remove(entry.anchor);
                report.destroyed += 1;
            }
            return;
        };
        if self.entries.get(&id).is_some_and(|e| e.mirrored == *overlay) {
            return;
        }

        let projection = ctx.map.view().projection();
        let ground = match overlay.position.map(|p| map_to_ecef(projection, p, 0.0)) {
            Some(Ok(ground)) => Some(ground),
            Some(Err(err)) => {
                report.skipped += 1;
                ctx.bus.warn(
                    Some(ctx.frame),
                    "overlay.skipped",
                    format!("{id} has an unusable position: {err}"),
                );
                None
            }
            None => None,
        };

        match self.entries.get_mut(&id) {
            Some(entry) => {
                if let Some(anchor) = ctx.scene.anchors_mut().get_mut(entry.anchor) {
                    anchor.element.clone_from(&overlay.element);
                    anchor.ground = ground;
                    anchor.offset = element_offset(overlay);
                }
                entry.mirrored = overlay.clone();
                report.updated += 1;
            }
            None => {
                let anchor = ctx.scene.anchors_mut().add(OverlayAnchor::new(
                    overlay.element.clone(),
                    ground,
                    element_offset(overlay),
                ));
                self.entries.insert(
                    id,
                    AnchorEntry {
                        anchor,
                        mirrored: overlay.clone(),
                    },
                );
                report.created += 1;
                debug!(overlay = %id, %anchor, "overlay anchor created");
            }
        }
    }
}

/// Canvas offset of the element's top-left corner from the anchor point.
fn element_offset(overlay: &Overlay) -> [f64; 2] {
    let shift = overlay.placement_shift();
    [overlay.offset[0] + shift[0], overlay.offset[1] + shift[1]]
}

impl Synchronizer for OverlaySynchronizer {
    fn name(&self) -> &'static str {
        "overlay"
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>) -> SyncReport {
        let mut dirty = BTreeSet::new();
        match read_changes(ctx.map, &mut self.cursor) {
            None => self.reconcile_pending = true,
            Some(changes) => {
                for change in changes {
                    if let MapChange::OverlayAdded(id)
                    | MapChange::OverlayRemoved(id)
                    | MapChange::OverlayChanged(id) = change
                    {
                        dirty.insert(id);
                    }
                }
            }
        }
        if self.reconcile_pending {
            self.reconcile_pending = false;
            dirty.extend(ctx.map.overlays().map(|(id, _)| id));
            dirty.extend(self.entries.keys().copied());
        }

        let mut report = SyncReport::default();
        for id in dirty {
            self.sync_overlay(ctx, id, &mut report);
        }
        if report.changed() {
            ctx.scene.reposition_anchors();
        }
        ctx.metrics.set_gauge("overlay.anchors", self.entries.len() as i64);
        report
    }

    fn destroy_all(&mut self, scene: &mut Scene3d) -> usize {
        let released = self.entries.len();
        for (_, entry) in std::mem::take(&mut self.entries) {
            scene.anchors_mut().remove(entry.anchor);
        }
        self.reconcile_pending = true;
        released
    }

    fn camera_changed(&mut self, scene: &mut Scene3d) {
        if !self.entries.is_empty() {
            scene.reposition_anchors();
        }
    }
}
