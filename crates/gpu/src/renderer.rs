use foundation::time::Time;
use scene::{AnchorId, ImageryLayerId, PrimitiveCollectionId, Scene3d};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Globe,
    Imagery {
        layer: ImageryLayerId,
        alpha: f64,
        texture_revision: u64,
    },
    Primitives {
        collection: PrimitiveCollectionId,
        alpha: f64,
        count: usize,
    },
    Overlay {
        anchor: AnchorId,
        canvas_position: [f64; 2],
    },
}

/// Draw commands for one frame, bottom to top.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub time: Time,
    /// Drawing buffer size, after resolution scaling.
    pub width: u32,
    pub height: u32,
    pub camera_revision: u64,
    pub commands: Vec<RenderCommand>,
}

impl RenderFrame {
    pub fn count<F: Fn(&RenderCommand) -> bool>(&self, pred: F) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }
}

/// Receives every frame the scene draws.
pub trait RenderSink {
    fn present(&mut self, frame: &RenderFrame);
}

/// Keeps the last presented frame and a frame count.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    pub presented: u64,
    pub last: Option<RenderFrame>,
}

impl RenderSink for FrameRecorder {
    fn present(&mut self, frame: &RenderFrame) {
        self.presented += 1;
        self.last = Some(frame.clone());
    }
}

pub struct Renderer;

impl Renderer {
    /// Hidden layers, hidden collections and hidden anchors emit nothing.
    pub fn collect(scene: &Scene3d, time: Time) -> RenderFrame {
        let (width, height) = scene.drawing_buffer_size();
        let mut frame = RenderFrame {
            time,
            width,
            height,
            camera_revision: scene.camera().revision(),
            commands: Vec::new(),
        };
        if scene.globe().show {
            frame.commands.push(RenderCommand::Globe);
        }
        for layer in scene.imagery().iter().filter(|l| l.show) {
            frame.commands.push(RenderCommand::Imagery {
                layer: layer.id,
                alpha: layer.alpha,
                texture_revision: layer.texture_revision(),
            });
        }
        for collection in scene.primitives().iter().filter(|c| c.show) {
            frame.commands.push(RenderCommand::Primitives {
                collection: collection.id,
                alpha: collection.alpha,
                count: collection.len(),
            });
        }
        for (anchor, overlay) in scene.anchors().iter() {
            if let Some(canvas_position) = overlay.canvas_position()
                && overlay.is_visible()
            {
                frame.commands.push(RenderCommand::Overlay {
                    anchor,
                    canvas_position,
                });
            }
        }
        frame
    }
}
