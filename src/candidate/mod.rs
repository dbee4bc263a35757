//! Corner candidate selection and pruning.
//!
//! Includes 3x3 non-maximum suppression on a per-level response map and a
//! deterministic strongest-N cap across levels.

pub(crate) mod nms;
pub(crate) mod topk;
