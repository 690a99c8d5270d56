use foundation::time::Time;

use crate::camera::Camera3d;
use crate::display::DataSourceDisplay;
use crate::entity::{DataSourceCollection, DataSourceId};
use crate::globe::Globe;
use crate::imagery::ImageryLayerCollection;
use crate::overlays::OverlayAnchors;
use crate::primitives::PrimitiveCollections;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("scene has been destroyed")]
    Destroyed,
    #[error("camera position or orientation is degenerate")]
    InvalidCameraState,
    #[error("resolution scale must be in (0, 1], got {0}")]
    InvalidResolutionScale(f64),
    #[error("canvas size {0}x{1} is empty")]
    InvalidCanvasSize(u32, u32),
    #[error("unknown data source {0}")]
    UnknownDataSource(DataSourceId),
}

/// Whether and where the scene is being drawn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Inactive,
    /// Rendering into a hidden canvas (warm-up).
    OffScreen,
    Visible,
}

/// The 3D globe scene.
#[derive(Debug, Clone)]
pub struct Scene3d {
    camera: Camera3d,
    imagery: ImageryLayerCollection,
    primitives: PrimitiveCollections,
    anchors: OverlayAnchors,
    display: DataSourceDisplay,
    globe: Globe,
    activation: Activation,
    canvas: (u32, u32),
    resolution_scale: f64,
    frames_rendered: u64,
    last_render: Option<Time>,
    destroyed: bool,
}

impl Scene3d {
    pub fn new(width: u32, height: u32) -> Result<Self, SceneError> {
        let mut scene = Self {
            camera: Camera3d::new(),
            imagery: ImageryLayerCollection::default(),
            primitives: PrimitiveCollections::default(),
            anchors: OverlayAnchors::default(),
            display: DataSourceDisplay::default(),
            globe: Globe::default(),
            activation: Activation::Inactive,
            canvas: (1, 1),
            resolution_scale: 1.0,
            frames_rendered: 0,
            last_render: None,
            destroyed: false,
        };
        scene.set_canvas_size(width, height)?;
        Ok(scene)
    }

    pub fn camera(&self) -> &Camera3d {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera3d {
        &mut self.camera
    }

    pub fn imagery(&self) -> &ImageryLayerCollection {
        &self.imagery
    }

    pub fn imagery_mut(&mut self) -> &mut ImageryLayerCollection {
        &mut self.imagery
    }

    pub fn primitives(&self) -> &PrimitiveCollections {
        &self.primitives
    }

    pub fn primitives_mut(&mut self) -> &mut PrimitiveCollections {
        &mut self.primitives
    }

    pub fn anchors(&self) -> &OverlayAnchors {
        &self.anchors
    }

    pub fn anchors_mut(&mut self) -> &mut OverlayAnchors {
        &mut self.anchors
    }

    pub fn display(&self) -> &DataSourceDisplay {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DataSourceDisplay {
        &mut self.display
    }

    pub fn data_sources(&self) -> &DataSourceCollection {
        self.display.data_sources()
    }

    pub fn globe(&self) -> &Globe {
        &self.globe
    }

    pub fn globe_mut(&mut self) -> &mut Globe {
        &mut self.globe
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    pub fn is_active(&self) -> bool {
        self.activation != Activation::Inactive
    }

    /// CSS size of the canvas in pixels.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) -> Result<(), SceneError> {
        if width == 0 || height == 0 {
            return Err(SceneError::InvalidCanvasSize(width, height));
        }
        self.canvas = (width, height);
        self.camera.frustum.aspect = f64::from(width) / f64::from(height);
        Ok(())
    }

    /// Size of the drawing buffer after resolution scaling, at least 1x1.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((f64::from(v) * self.resolution_scale).round() as u32).max(1);
        (scale(self.canvas.0), scale(self.canvas.1))
    }

    pub fn resolution_scale(&self) -> f64 {
        self.resolution_scale
    }

    pub fn set_resolution_scale(&mut self, scale: f64) -> Result<(), SceneError> {
        if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
            return Err(SceneError::InvalidResolutionScale(scale));
        }
        self.resolution_scale = scale;
        Ok(())
    }

    /// Recomputes every overlay anchor for the current camera.
    pub fn reposition_anchors(&mut self) {
        let (w, h) = self.canvas;
        self.anchors
            .reposition_all(&self.camera, f64::from(w), f64::from(h));
    }

    /// Draws one frame. Tile loading advances by one step per frame.
    pub fn render(&mut self, time: Time) -> Result<(), SceneError> {
        if self.destroyed {
            return Err(SceneError::Destroyed);
        }
        self.globe.advance();
        self.frames_rendered += 1;
        self.last_render = Some(time);
        Ok(())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn last_render(&self) -> Option<Time> {
        self.last_render
    }

    /// Tiles still loading or entities not yet visualized.
    pub fn has_pending_work(&self) -> bool {
        !self.globe.tiles_loaded() || !self.display.is_ready()
    }

    /// Releases every scene resource. Idempotent.
    pub fn destroy(&mut self) {
        self.imagery.clear();
        self.primitives.clear();
        self.anchors.clear();
        self.display.clear();
        self.globe.cancel_pending();
        self.activation = Activation::Inactive;
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::{Activation, Scene3d, SceneError};
    use foundation::time::Time;

    #[test]
    fn canvas_drives_aspect_and_buffer() {
        let mut scene = Scene3d::new(800, 400).unwrap();
        assert_eq!(scene.camera().frustum.aspect, 2.0);
        scene.set_resolution_scale(0.5).unwrap();
        assert_eq!(scene.drawing_buffer_size(), (400, 200));
        assert_eq!(
            scene.set_resolution_scale(1.5),
            Err(SceneError::InvalidResolutionScale(1.5))
        );
        assert!(Scene3d::new(0, 10).is_err());
    }

    #[test]
    fn render_advances_tiles_until_destroyed() {
        let mut scene = Scene3d::new(10, 10).unwrap();
        scene.globe_mut().request_tiles(2);
        assert!(scene.has_pending_work());
        scene.render(Time(0.1)).unwrap();
        assert!(!scene.has_pending_work());
        assert_eq!(scene.frames_rendered(), 1);

        scene.set_activation(Activation::Visible);
        scene.destroy();
        assert!(!scene.is_active());
        assert_eq!(scene.render(Time(0.2)), Err(SceneError::Destroyed));
    }
}
