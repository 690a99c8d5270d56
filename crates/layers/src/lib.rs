//! In-memory 2D map model: view, layer tree, features, overlays and an
//! observable change log.

pub mod changes;
pub mod layer;
pub mod map;
pub mod overlay;
pub mod raster;
pub mod symbology;
pub mod vector;
pub mod view;

pub use changes::*;
pub use layer::*;
pub use map::*;
pub use overlay::*;
pub use raster::*;
pub use symbology::*;
pub use vector::*;
pub use view::*;
