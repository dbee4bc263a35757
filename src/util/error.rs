//! Error types for roialign.

use thiserror::Error;

/// Result alias for roialign operations.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

/// Errors that can occur when configuring or running the alignment pipeline.
///
/// Per-image conditions that are expected during normal operation
/// (unreadable candidates, too few correspondences, low similarity) are not
/// errors; they are reported as [`crate::RejectReason`] values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlignError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is too small for the requested view.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A pixel ROI does not fit inside the image.
    #[error(
        "roi ({x}, {y}, {width}x{height}) out of bounds for {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// A region rectangle is empty after normalization.
    #[error("region '{region}' has an empty rectangle")]
    EmptyRegion { region: String },
    /// A region rectangle does not fit inside the template/aligned canvas.
    #[error(
        "region '{region}' ({left}, {top})-({right}, {bottom}) does not fit inside {img_width}x{img_height}"
    )]
    RegionOutOfBounds {
        region: String,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        img_width: u32,
        img_height: u32,
    },
    /// Two regions of one model share an identifier.
    #[error("duplicate region id '{0}'")]
    DuplicateRegion(String),
    /// Reading or writing an image failed.
    #[error("image io error for '{path}': {reason}")]
    ImageIo { path: String, reason: String },
    /// Writing an artifact would overwrite an existing file.
    #[error("artifact already exists at '{0}'")]
    ArtifactExists(String),
    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No model with the requested id exists.
    #[error("unknown model {0}")]
    UnknownModel(u64),
    /// No run with the requested id exists.
    #[error("unknown run {0}")]
    UnknownRun(u64),
    /// No region with the requested id exists on the model.
    #[error("unknown region '{0}'")]
    UnknownRegion(String),
    /// The model is in a state that does not allow the requested transition.
    #[error("model {model} is {actual}, expected {expected}")]
    InvalidState {
        model: u64,
        actual: &'static str,
        expected: &'static str,
    },
    /// Model setup is missing a required input.
    #[error("model {model} setup incomplete: {missing}")]
    SetupIncomplete { model: u64, missing: String },
    /// A batch worker thread could not be started.
    #[error("worker pool: {0}")]
    WorkerPool(String),
    /// An external collaborator (store, classifier, trainer) failed.
    #[error("{collaborator} failed: {reason}")]
    External {
        collaborator: &'static str,
        reason: String,
    },
}
