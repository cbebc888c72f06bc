//! Wiener deconvolution of confocal/STED fluorescence microscopy images.
//!
//! The point spread function is modeled as a mixture of a wide confocal Gaussian and a
//! narrow STED Gaussian. [`filters::deconvolution::deconvolve`] is the numerical core; the
//! remaining modules read images, run the filter pipeline on single files or whole folders
//! and persist settings.

pub mod batch;
pub mod config;
pub mod data_container;
pub mod error;
pub mod filters;
pub mod io;
pub mod math_tools;
pub mod processing;
