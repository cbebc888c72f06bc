//! Gaussian point-spread-function model for confocal/STED images.
//!
//! The PSF is a mixture of a wide confocal Gaussian and a narrow STED Gaussian, each
//! sampled on the full image grid and normalized to unit mass.

use crate::error::DeconvolutionError;
use ndarray::Array2;

/// Ratio between a Gaussian's full width at half maximum and its standard deviation.
pub const FWHM_TO_SIGMA: f64 = 2.35482;

/// Converts a spread given in physical units (nm) into pixel units.
///
/// The physical value is divided by `FWHM_TO_SIGMA * pixel_size`.
pub fn sigma_to_pixels(sigma: f64, pixel_size: f64) -> f64 {
    sigma / (FWHM_TO_SIGMA * pixel_size)
}

/// Unnormalized isotropic 2D Gaussian, `exp(-(x² + y²) / (2 sigma²))`.
pub fn gaussian_value(x: f64, y: f64, sigma: f64) -> f64 {
    (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
}

/// Builds a Gaussian kernel of the given shape centered on the middle of the array.
///
/// Coordinates along an axis of length `n` run from `-n / 2` in unit steps, so for even
/// `n` the peak sits on index `n / 2` and for odd `n` it falls between two samples.
///
/// # Arguments
/// - `shape`: `(rows, cols)` of the kernel, usually the shape of the image to filter.
/// - `sigma`: spread in pixels. Very small values give a near-impulse.
/// - `normalize`: divide the kernel by its sum so that its total mass is 1.
///
/// When normalizing, the exponent is taken relative to the grid point closest to the
/// center. The normalized kernel is unchanged, but it keeps its mass for any `sigma`: a
/// vanishing spread concentrates it on the sample(s) nearest the center.
///
/// # Errors
/// - `InvalidShape` for an empty shape.
/// - `InvalidParameter` for a non-positive or non-finite `sigma`.
pub fn gaussian_kernel(
    shape: (usize, usize),
    sigma: f64,
    normalize: bool,
) -> Result<Array2<f64>, DeconvolutionError> {
    let (rows, cols) = shape;
    if rows == 0 || cols == 0 {
        return Err(DeconvolutionError::InvalidShape(format!(
            "kernel shape {rows}x{cols} is empty"
        )));
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(DeconvolutionError::parameter(
            "sigma",
            sigma,
            "must be positive and finite",
        ));
    }

    let x_half = rows as f64 / 2.0;
    let y_half = cols as f64 / 2.0;
    if !normalize {
        return Ok(Array2::from_shape_fn(shape, |(i, j)| {
            gaussian_value(i as f64 - x_half, j as f64 - y_half, sigma)
        }));
    }

    let r2_min = min_squared_offset(rows) + min_squared_offset(cols);
    let mut kernel = Array2::from_shape_fn(shape, |(i, j)| {
        let x = i as f64 - x_half;
        let y = j as f64 - y_half;
        (-(x * x + y * y - r2_min) / (2.0 * sigma * sigma)).exp()
    });
    let total = kernel.sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(DeconvolutionError::NumericDegenerate(format!(
            "gaussian kernel with sigma {sigma} has no mass on a {rows}x{cols} grid"
        )));
    }
    kernel.mapv_inplace(|v| v / total);
    Ok(kernel)
}

/// Smallest squared coordinate on an axis of length `n` (0 for even, 0.25 for odd `n`).
fn min_squared_offset(n: usize) -> f64 {
    let half = n as f64 / 2.0;
    (0..n)
        .map(|i| (i as f64 - half).powi(2))
        .fold(f64::INFINITY, f64::min)
}

/// Composite confocal/STED PSF: `ratio * K(sigma_sted) + (1 - ratio) * K(sigma_confocal)`.
///
/// Both kernels are normalized before mixing, so for `ratio` in `[0, 1]` the result sums
/// to 1. Spreads are in pixels; `ratio` is validated by the caller.
pub fn composite_psf(
    shape: (usize, usize),
    sigma_confocal_pixels: f64,
    sigma_sted_pixels: f64,
    ratio: f64,
) -> Result<Array2<f64>, DeconvolutionError> {
    let psf_confocal = gaussian_kernel(shape, sigma_confocal_pixels, true)?;
    let psf_sted = gaussian_kernel(shape, sigma_sted_pixels, true)?;
    Ok(psf_sted * ratio + psf_confocal * (1.0 - ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gaussian_value_peaks_at_origin() {
        assert_abs_diff_eq!(gaussian_value(0.0, 0.0, 2.0), 1.0);
        assert_abs_diff_eq!(
            gaussian_value(2.0, 0.0, 2.0),
            (-0.5f64).exp(),
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(
            gaussian_value(1.0, -1.0, 1.0),
            gaussian_value(-1.0, 1.0, 1.0)
        );
    }

    #[test]
    fn test_normalized_kernel_sums_to_one() {
        for &shape in &[(1, 1), (8, 8), (32, 17), (5, 64), (63, 63)] {
            for &sigma in &[0.05, 0.7, 3.0, 40.0] {
                let kernel = gaussian_kernel(shape, sigma, true).unwrap();
                assert_eq!(kernel.dim(), shape);
                assert_abs_diff_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
                assert!(kernel.iter().all(|&v| v >= 0.0));
            }
        }
    }

    #[test]
    fn test_kernel_peak_on_center_for_even_shape() {
        let kernel = gaussian_kernel((16, 10), 2.0, false).unwrap();
        assert_abs_diff_eq!(kernel[[8, 5]], 1.0);
        let max = kernel.iter().cloned().fold(f64::MIN, f64::max);
        assert_abs_diff_eq!(max, 1.0);
        // symmetric around the center
        assert_abs_diff_eq!(kernel[[7, 5]], kernel[[9, 5]], epsilon = 1e-15);
        assert_abs_diff_eq!(kernel[[8, 3]], kernel[[8, 7]], epsilon = 1e-15);
    }

    #[test]
    fn test_tiny_sigma_degenerates_to_impulse() {
        let kernel = gaussian_kernel((8, 8), 1e-3, true).unwrap();
        assert_abs_diff_eq!(kernel[[4, 4]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kernel_rejects_bad_inputs() {
        assert!(matches!(
            gaussian_kernel((8, 8), 0.0, true),
            Err(DeconvolutionError::InvalidParameter { name: "sigma", .. })
        ));
        assert!(matches!(
            gaussian_kernel((8, 8), f64::NAN, true),
            Err(DeconvolutionError::InvalidParameter { .. })
        ));
        assert!(matches!(
            gaussian_kernel((0, 8), 1.0, true),
            Err(DeconvolutionError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_tiny_sigma_on_odd_grid_splits_between_center_samples() {
        // no sample on the center, the four nearest share the mass
        let kernel = gaussian_kernel((5, 5), 1e-3, true).unwrap();
        assert_abs_diff_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
        for &(i, j) in &[(2, 2), (2, 3), (3, 2), (3, 3)] {
            assert_abs_diff_eq!(kernel[[i, j]], 0.25, epsilon = 1e-12);
        }

        let kernel = gaussian_kernel((33, 8), 0.017, true).unwrap();
        assert_abs_diff_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kernel[[16, 4]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(kernel[[17, 4]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_exponent_keeps_normalized_values() {
        let shifted = gaussian_kernel((7, 9), 1.3, true).unwrap();
        let plain = gaussian_kernel((7, 9), 1.3, false).unwrap();
        let total = plain.sum();
        for (a, b) in shifted.iter().zip(plain.iter()) {
            assert_abs_diff_eq!(*a, *b / total, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_composite_psf_sums_to_one() {
        for &ratio in &[0.0, 0.25, 0.5, 0.9, 1.0] {
            let psf = composite_psf((40, 24), 7.4, 0.7, ratio).unwrap();
            assert_abs_diff_eq!(psf.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_composite_psf_limits_match_single_kernels() {
        let shape = (20, 20);
        let confocal = gaussian_kernel(shape, 5.0, true).unwrap();
        let sted = gaussian_kernel(shape, 1.0, true).unwrap();

        let only_confocal = composite_psf(shape, 5.0, 1.0, 0.0).unwrap();
        let only_sted = composite_psf(shape, 5.0, 1.0, 1.0).unwrap();

        for (a, b) in only_confocal.iter().zip(confocal.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
        }
        for (a, b) in only_sted.iter().zip(sted.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_sigma_to_pixels() {
        assert_abs_diff_eq!(
            sigma_to_pixels(350.0, 20.0),
            350.0 / 47.0964,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(sigma_to_pixels(FWHM_TO_SIGMA, 1.0), 1.0);
    }
}
