//! Low-level building blocks for custom alignment pipelines.
//!
//! These expose the correlation kernel, the nearest-neighbor index and the
//! homography primitives behind the high-level `AlignmentPipeline`. Most
//! users should prefer the top-level types.

pub use crate::homography::dlt::fit_dlt;
pub use crate::homography::project_point;
pub use crate::image::pyramid::{PyramidLevel, ScalePyramid};
pub use crate::kernel::{Kernel, PatchPlan, Placement, ZnccScalar};
pub use crate::matching::kdforest::{KdForest, Neighbor};
pub use crate::region::validate_regions;
