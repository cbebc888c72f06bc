//! Processing filters for confocal/STED microscopy images.
//!
//! Filters are organized by their domain of operation and processing order.
//!
//! # Filter Categories
//!
//! * **Spatial Filters**: Applied to raw pixel values first.
//!
//! * **Frequency Domain Filters**: Work on the image spectrum, after the spatial filters.
//!
//! Each filter implements the `Filter` trait defined in the `filter` module.

/// Constant background removal with clipping at zero.
pub mod background;

/// Wiener deconvolution with the composite confocal/STED point spread function.
pub mod deconvolution;

/// Core filter interfaces and the registry of built-in filters.
pub mod filter;

/// Gaussian point spread function model.
pub mod psf;
