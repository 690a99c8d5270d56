use foundation::define_id;

define_id!(OverlayId);

/// Which point of the overlay element sits on the anchor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Positioning {
    #[default]
    TopLeft,
    TopCenter,
    CenterCenter,
    BottomCenter,
    BottomLeft,
}

impl Positioning {
    /// Fraction of the element size, `[x, y]` from its top-left corner, of
    /// the point that sits on the anchor.
    pub fn align(self) -> [f64; 2] {
        match self {
            Positioning::TopLeft => [0.0, 0.0],
            Positioning::TopCenter => [0.5, 0.0],
            Positioning::CenterCenter => [0.5, 0.5],
            Positioning::BottomCenter => [0.5, 1.0],
            Positioning::BottomLeft => [0.0, 1.0],
        }
    }
}

/// A screen-space element (popup, label) pinned to a map coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Host element handle; opaque to the map.
    pub element: String,
    /// `None` hides the overlay.
    pub position: Option<[f64; 2]>,
    /// Pixel offset `[x, y]`, y pointing down.
    pub offset: [f64; 2],
    pub positioning: Positioning,
    /// Rendered element size in pixels.
    pub size: [f64; 2],
}

impl Overlay {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            position: None,
            offset: [0.0, 0.0],
            positioning: Positioning::default(),
            size: [0.0, 0.0],
        }
    }

    pub fn at(mut self, position: [f64; 2]) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_offset(mut self, offset: [f64; 2]) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_positioning(mut self, positioning: Positioning) -> Self {
        self.positioning = positioning;
        self
    }

    pub fn with_size(mut self, size: [f64; 2]) -> Self {
        self.size = size;
        self
    }

    /// Pixel shift from the anchor point to the element's top-left corner.
    pub fn placement_shift(&self) -> [f64; 2] {
        let [ax, ay] = self.positioning.align();
        [-ax * self.size[0], -ay * self.size[1]]
    }
}
