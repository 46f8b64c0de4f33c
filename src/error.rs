use thiserror::Error;

use crate::bounds::BoundsError;
use crate::map::Pixel;

/// Error types for the specmap-rs library.
#[derive(Error, Debug)]
pub enum MapError {
    /// A pixel address outside the map grid.
    #[error("Pixel {pixel} is outside the {nx}x{ny} map")]
    PixelOutOfBounds { pixel: Pixel, nx: usize, ny: usize },

    /// An integration or spectral window that is inverted or outside the resolution.
    #[error("Invalid interval [{lower}, {upper}) for resolution {resolution}")]
    InvalidInterval {
        lower: usize,
        upper: usize,
        resolution: usize,
    },

    /// The operation is only defined for maps of another dimension.
    #[error("Operation '{operation}' is not supported on {dimension}D maps")]
    UnsupportedDimension {
        operation: &'static str,
        dimension: usize,
    },

    /// A data channel index that does not exist on the map.
    #[error("Data index {index} is out of range ({count} channels available)")]
    InvalidDataIndex { index: usize, count: usize },

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// A user-entered field that could not be read.
    #[error("Could not read {field}: {message}")]
    Parse { field: String, message: String },

    /// A single-pixel fit that did not converge.
    #[error("Fitting failed for pixel {pixel}: {reason}")]
    FitFailed { pixel: Pixel, reason: String },

    /// Error indicating the algorithm failed to converge.
    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// A map id that is not registered in the collection.
    #[error("No map with id {0}")]
    UnknownMap(u32),

    /// A snapshot written by an incompatible version.
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion { found: u32, expected: u32 },

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MapError {
    /// Whether the error is scoped to a single pixel fit and a batch may carry on.
    pub fn is_fit_failure(&self) -> bool {
        matches!(self, MapError::FitFailed { .. })
    }
}

/// Result type alias for specmap-rs operations.
pub type Result<T> = std::result::Result<T, MapError>;
