pub mod geodesy;
pub mod local;
pub mod projection;
pub mod vec;

pub use geodesy::*;
pub use local::*;
pub use projection::*;
pub use vec::*;
