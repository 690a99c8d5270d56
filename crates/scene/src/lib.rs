//! In-memory 3D globe scene: camera, imagery, primitives, screen anchors,
//! entities and data sources, globe tile state.

pub mod camera;
pub mod display;
pub mod entity;
pub mod globe;
pub mod imagery;
pub mod overlays;
pub mod primitives;
pub mod scene;

pub use camera::*;
pub use display::*;
pub use entity::*;
pub use globe::*;
pub use imagery::*;
pub use overlays::*;
pub use primitives::*;
pub use scene::*;
