//! Utility helpers including spatial algebra, math extensions, logging, and profiling.

pub mod logging;
pub mod math;
pub mod profiling;
pub mod spatial;

pub use math::*;
pub use spatial::{SpatialInertia, SpatialVec};
