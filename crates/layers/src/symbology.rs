/// Drawing style of a vector feature.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FeatureStyle {
    pub fill: [f32; 4],
    pub stroke: [f32; 4],
    pub stroke_width: f32,
    /// Point marker radius in screen pixels.
    pub point_radius: f32,
}

impl FeatureStyle {
    pub const fn new(fill: [f32; 4], stroke: [f32; 4], stroke_width: f32, point_radius: f32) -> Self {
        Self {
            fill,
            stroke,
            stroke_width,
            point_radius,
        }
    }
}

impl Default for FeatureStyle {
    fn default() -> Self {
        // Matches the usual 2D default: translucent white fill, blue stroke.
        Self {
            fill: [1.0, 1.0, 1.0, 0.4],
            stroke: [0.2, 0.6, 0.8, 1.0],
            stroke_width: 1.25,
            point_radius: 5.0,
        }
    }
}
