use serde::{Deserialize, Serialize};

use crate::render_loop::FrameRate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("render.resolution_scale must be in (0, 1], got {0}")]
    ResolutionScale(f64),
    #[error("render.target_frame_rate must be positive, got {0}")]
    FrameRate(f64),
    #[error("camera.{name} must be finite and non-negative, got {value}")]
    Epsilon { name: &'static str, value: f64 },
    #[error("sync.vector_features_per_frame must be at least 1")]
    FeaturesPerFrame,
    #[error("tracking.max_pending_frames must be at least 1")]
    MaxPendingFrames,
}

/// Motion thresholds used to decide that the 3D camera moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Meters the camera position may drift before it counts as a move.
    pub position_epsilon_m: f64,
    /// Per-component tolerance on the unit direction and up vectors.
    pub orientation_epsilon: f64,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            position_epsilon_m: 1e-2,
            orientation_epsilon: 1e-5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Vector features converted per frame; larger diffs span several frames.
    pub vector_features_per_frame: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            vector_features_per_frame: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub resolution_scale: f64,
    /// `None` renders on every host frame.
    pub target_frame_rate: Option<f64>,
    pub auto_render_loop: bool,
    pub refresh_2d_after_camera_move_end_only: bool,
    pub block_rendering: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            target_frame_rate: None,
            auto_render_loop: false,
            refresh_2d_after_camera_move_end_only: false,
            block_rendering: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    /// Polls a bounding volume may stay pending before it fails.
    pub max_pending_frames: u32,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            max_pending_frames: 120,
        }
    }
}

/// Options of a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Host element for the 3D canvas. `None` draws the globe over the map,
    /// which pauses 2D interactions while 3D is enabled.
    pub target: Option<String>,
    /// Keep pointer events on the globe from reaching the 2D map.
    pub stop_pointer_propagation: bool,
    pub camera: CameraOptions,
    pub sync: SyncOptions,
    pub render: RenderOptions,
    pub tracking: TrackingOptions,
}

impl BridgeOptions {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scale = self.render.resolution_scale;
        if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
            return Err(ConfigError::ResolutionScale(scale));
        }
        if let Some(fps) = self.render.target_frame_rate
            && !(fps.is_finite() && fps > 0.0)
        {
            return Err(ConfigError::FrameRate(fps));
        }
        for (name, value) in [
            ("position_epsilon_m", self.camera.position_epsilon_m),
            ("orientation_epsilon", self.camera.orientation_epsilon),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Epsilon { name, value });
            }
        }
        if self.sync.vector_features_per_frame == 0 {
            return Err(ConfigError::FeaturesPerFrame);
        }
        if self.tracking.max_pending_frames == 0 {
            return Err(ConfigError::MaxPendingFrames);
        }
        Ok(())
    }

    pub fn frame_rate(&self) -> FrameRate {
        match self.render.target_frame_rate {
            Some(fps) => FrameRate::Fps(fps),
            None => FrameRate::Unbounded,
        }
    }

    /// Over-map mode: no dedicated target element.
    pub fn is_overlay(&self) -> bool {
        self.target.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeOptions, ConfigError};
    use crate::render_loop::FrameRate;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_keeps_defaults() {
        let options = BridgeOptions::from_json(
            r#"{ "target": "globe", "render": { "target_frame_rate": 30 } }"#,
        )
        .unwrap();
        assert_eq!(options.target.as_deref(), Some("globe"));
        assert_eq!(options.frame_rate(), FrameRate::Fps(30.0));
        assert_eq!(options.render.resolution_scale, 1.0);
        assert_eq!(options.sync, Default::default());
        assert!(!options.is_overlay());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut options = BridgeOptions::default();
        options.render.resolution_scale = 0.0;
        assert!(matches!(options.validate(), Err(ConfigError::ResolutionScale(_))));

        let mut options = BridgeOptions::default();
        options.render.target_frame_rate = Some(-5.0);
        assert!(matches!(options.validate(), Err(ConfigError::FrameRate(_))));

        let mut options = BridgeOptions::default();
        options.camera.orientation_epsilon = f64::NAN;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::Epsilon {
                name: "orientation_epsilon",
                ..
            })
        ));

        assert!(matches!(
            BridgeOptions::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
