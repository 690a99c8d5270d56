use layers::{FeatureId, MapError};
use scene::SceneError;

use crate::config::ConfigError;

/// Errors returned synchronously to callers of the bridge.
///
/// Per-item problems (a malformed feature, an unsupported source, a failed
/// bounding volume) never surface here; they go to the event bus.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("the bridge has been destroyed")]
    Destroyed,
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),
    #[error("resolution scale must be in (0, 1], got {0}")]
    InvalidResolutionScale(f64),
    #[error("target frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
    #[error("warm-up is only available while 3D is disabled")]
    WarmUpWhileEnabled,
    #[error("a warm-up is already running")]
    WarmUpInProgress,
    #[error("warm-up needs a finite height and a non-negative timeout, got {height} m / {timeout_ms} ms")]
    InvalidWarmUp { height: f64, timeout_ms: f64 },
    #[error("tilt must be in [0, pi/2], got {0}")]
    InvalidTilt(f64),
    #[error("camera distance must be finite and positive, got {0}")]
    InvalidDistance(f64),
    #[error("unknown feature {0}")]
    UnknownFeature(FeatureId),
    #[error("feature {0} has no point geometry")]
    NotAPointFeature(FeatureId),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}
