//! Error types shared by the deconvolution core, the I/O layer and the processing pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the numerical core (PSF construction and Wiener filtering).
///
/// All of them are caller errors or degenerate numerics; none is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeconvolutionError {
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("numerically degenerate result: {0}")]
    NumericDegenerate(String),
}

impl DeconvolutionError {
    pub(crate) fn parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        DeconvolutionError::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Errors raised while reading or writing images and settings.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("npy read error: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),
    #[error("npy write error: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),
    #[error("npz error: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("inconsistent stack: {0}")]
    InconsistentStack(String),
    #[error("layer {layer} out of range for a stack of {layers} layers")]
    LayerOutOfRange { layer: usize, layers: usize },
}

impl IoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Any failure of a processing run on one image.
#[derive(Error, Debug)]
pub enum WienerError {
    #[error(transparent)]
    Deconvolution(#[from] DeconvolutionError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
