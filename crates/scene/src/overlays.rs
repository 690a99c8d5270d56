use std::collections::BTreeMap;

use foundation::define_id;
use foundation::ids::IdAllocator;
use foundation::math::Vec3;

use crate::camera::Camera3d;

define_id!(AnchorId);

/// A screen-space element pinned to a point on the globe.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayAnchor {
    pub element: String,
    /// ECEF ground position; `None` hides the anchor.
    pub ground: Option<Vec3>,
    /// Pixel offset added to the projected position, y down. Includes the
    /// shift that puts the element's top-left corner in place.
    pub offset: [f64; 2],
    canvas_position: Option<[f64; 2]>,
    visible: bool,
}

impl OverlayAnchor {
    pub fn new(element: impl Into<String>, ground: Option<Vec3>, offset: [f64; 2]) -> Self {
        Self {
            element: element.into(),
            ground,
            offset,
            canvas_position: None,
            visible: false,
        }
    }

    pub fn canvas_position(&self) -> Option<[f64; 2]> {
        self.canvas_position
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Recomputes the canvas position for `camera`. Anchors behind the globe
    /// or behind the camera are hidden.
    pub fn reposition(&mut self, camera: &Camera3d, width: f64, height: f64) {
        let projected = self
            .ground
            .filter(|g| !camera.is_occluded_by_globe(*g))
            .and_then(|g| camera.project_to_canvas(g, width, height));
        match projected {
            Some(px) => {
                self.canvas_position = Some([px[0] + self.offset[0], px[1] + self.offset[1]]);
                self.visible = true;
            }
            None => {
                self.canvas_position = None;
                self.visible = false;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayAnchors {
    ids: IdAllocator,
    anchors: BTreeMap<AnchorId, OverlayAnchor>,
}

impl OverlayAnchors {
    pub fn add(&mut self, anchor: OverlayAnchor) -> AnchorId {
        let id = AnchorId(self.ids.next_raw());
        self.anchors.insert(id, anchor);
        id
    }

    pub fn remove(&mut self, id: AnchorId) -> Option<OverlayAnchor> {
        self.anchors.remove(&id)
    }

    pub fn get(&self, id: AnchorId) -> Option<&OverlayAnchor> {
        self.anchors.get(&id)
    }

    pub fn get_mut(&mut self, id: AnchorId) -> Option<&mut OverlayAnchor> {
        self.anchors.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnchorId, &OverlayAnchor)> + '_ {
        self.anchors.iter().map(|(id, a)| (*id, a))
    }

    pub fn reposition_all(&mut self, camera: &Camera3d, width: f64, height: f64) {
        for anchor in self.anchors.values_mut() {
            anchor.reposition(camera, width, height);
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::OverlayAnchor;
    use crate::camera::Camera3d;
    use foundation::math::{Vec3, WGS84_A};

    #[test]
    fn visible_anchor_gets_offset_position() {
        let cam = Camera3d::new();
        let mut anchor = OverlayAnchor::new("popup", Some(Vec3::new(WGS84_A, 0.0, 0.0)), [5.0, -3.0]);
        anchor.reposition(&cam, 200.0, 100.0);
        assert!(anchor.is_visible());
        assert_eq!(anchor.canvas_position(), Some([105.0, 47.0]));
    }

    #[test]
    fn far_side_anchor_is_hidden() {
        let cam = Camera3d::new();
        let mut anchor = OverlayAnchor::new("popup", Some(Vec3::new(-WGS84_A, 0.0, 0.0)), [0.0, 0.0]);
        anchor.reposition(&cam, 200.0, 100.0);
        assert!(!anchor.is_visible());
        assert!(anchor.canvas_position().is_none());

        let mut unplaced = OverlayAnchor::new("popup", None, [0.0, 0.0]);
        unplaced.reposition(&cam, 200.0, 100.0);
        assert!(!unplaced.is_visible());
    }
}
