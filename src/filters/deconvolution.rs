//! Wiener deconvolution with the composite confocal/STED PSF.
//!
//! The image and the re-centered PSF are transformed with a 2D DFT, the spectrum is
//! multiplied by the regularized inverse `conj(H) / (|H|² + nsr)` and transformed back.
//! The magnitude of the complex result is returned, so the output is never negative.

use crate::config::WienerSettings;
use crate::data_container::ImageData;
use crate::error::DeconvolutionError;
use crate::filters::filter::{Filter, FilterConfig, FilterDomain};
use crate::filters::psf::{composite_psf, sigma_to_pixels};
use crate::math_tools::{fftshift, Fft2d};
use ndarray::{Array2, ArrayView2, ArrayViewD, Ix2, Zip};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

/// Scalar inputs of the Wiener filter. Lengths are physical (nm).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WienerParameters {
    pub pixel_size: f64,
    pub sigma_confocal: f64,
    pub sigma_sted: f64,
    pub noise_to_signal: f64,
    /// Weight of the STED kernel in the composite PSF.
    pub ratio: f64,
}

impl WienerParameters {
    pub fn validate(&self) -> Result<(), DeconvolutionError> {
        let positive = [
            ("pixel_size", self.pixel_size),
            ("sigma_confocal", self.sigma_confocal),
            ("sigma_sted", self.sigma_sted),
            ("noise_to_signal", self.noise_to_signal),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DeconvolutionError::parameter(
                    name,
                    value,
                    "must be positive and finite",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(DeconvolutionError::parameter(
                "ratio",
                self.ratio,
                "must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    /// `(confocal, sted)` spreads in pixels.
    pub fn sigma_pixels(&self) -> (f64, f64) {
        (
            sigma_to_pixels(self.sigma_confocal, self.pixel_size),
            sigma_to_pixels(self.sigma_sted, self.pixel_size),
        )
    }

    /// Composite PSF sampled on a grid of `shape`, centered on the middle of the array.
    pub fn psf(&self, shape: (usize, usize)) -> Result<Array2<f64>, DeconvolutionError> {
        let (sigma_confocal, sigma_sted) = self.sigma_pixels();
        composite_psf(shape, sigma_confocal, sigma_sted, self.ratio)
    }
}

/// Deconvolves `image` with the composite PSF described by `params`.
///
/// Any real sample type is accepted; computation runs in `f64` and the result is cast to
/// `f32`. The output has the shape of the input.
///
/// # Errors
/// - `InvalidParameter` if `params` fails [`WienerParameters::validate`].
/// - `InvalidShape` for an empty image.
/// - `NumericDegenerate` if the PSF has no mass or the result is not finite.
pub fn deconvolve<T>(
    image: &ArrayView2<T>,
    params: &WienerParameters,
) -> Result<Array2<f32>, DeconvolutionError>
where
    T: AsPrimitive<f64>,
{
    params.validate()?;
    check_not_empty(image.dim())?;

    let image = image.mapv(|v| v.as_());
    let psf = params.psf(image.dim())?;
    log::debug!(
        "deconvolving {:?} image, sigma (px) confocal {:.3} / sted {:.3}",
        image.dim(),
        params.sigma_pixels().0,
        params.sigma_pixels().1
    );
    wiener_filter(&image.view(), &psf.view(), params.noise_to_signal)
}

/// Same as [`deconvolve`] for arrays of dynamic dimensionality, which must be 2D.
pub fn deconvolve_dyn(
    image: &ArrayViewD<f64>,
    params: &WienerParameters,
) -> Result<Array2<f32>, DeconvolutionError> {
    let image = image.view().into_dimensionality::<Ix2>().map_err(|_| {
        DeconvolutionError::InvalidShape(format!(
            "expected a 2D image, got shape {:?}",
            image.shape()
        ))
    })?;
    deconvolve(&image, params)
}

/// Wiener filter with an explicit PSF of the same shape as `image`.
///
/// `psf` is expected centered on the middle of the array (as built by the PSF builder);
/// it is shifted to the origin before the transform.
pub fn wiener_filter(
    image: &ArrayView2<f64>,
    psf: &ArrayView2<f64>,
    noise_to_signal: f64,
) -> Result<Array2<f32>, DeconvolutionError> {
    check_not_empty(image.dim())?;
    if image.dim() != psf.dim() {
        return Err(DeconvolutionError::InvalidShape(format!(
            "psf shape {:?} does not match image shape {:?}",
            psf.dim(),
            image.dim()
        )));
    }
    if !noise_to_signal.is_finite() || noise_to_signal <= 0.0 {
        return Err(DeconvolutionError::parameter(
            "noise_to_signal",
            noise_to_signal,
            "must be positive and finite",
        ));
    }

    let fft = Fft2d::new(image.dim());
    let mut spectrum = fft.forward_real(image);
    let kernel = fft.forward_real(&fftshift(psf).view());

    Zip::from(&mut spectrum).and(&kernel).for_each(|s, k| {
        *s *= k.conj() / (k.norm_sqr() + noise_to_signal);
    });
    fft.inverse(&mut spectrum);

    let filtered = spectrum.mapv(|c| c.norm() as f32);
    if filtered.iter().any(|v| !v.is_finite()) {
        return Err(DeconvolutionError::NumericDegenerate(format!(
            "non-finite values after filtering with noise-to-signal ratio {noise_to_signal}"
        )));
    }
    Ok(filtered)
}

fn check_not_empty((rows, cols): (usize, usize)) -> Result<(), DeconvolutionError> {
    if rows == 0 || cols == 0 {
        return Err(DeconvolutionError::InvalidShape(format!(
            "image shape {rows}x{cols} is empty"
        )));
    }
    Ok(())
}

/// Pipeline stage running [`deconvolve`] with the run's settings.
#[derive(Debug, Clone)]
pub struct WienerDeconvolution;

impl Filter for WienerDeconvolution {
    fn new() -> Self {
        WienerDeconvolution
    }

    fn config(&self) -> FilterConfig {
        FilterConfig {
            name: "Wiener Deconvolution".to_string(),
            description: "Inverts a mixed confocal/STED Gaussian PSF in the frequency domain, \
                regularized by the noise-to-signal ratio."
                .to_string(),
            hyperlink: Some((
                Some("Wiener deconvolution".to_string()),
                "https://en.wikipedia.org/wiki/Wiener_deconvolution".to_string(),
            )),
            domain: FilterDomain::Frequency,
        }
    }

    fn filter(
        &self,
        input: &ImageData,
        settings: &WienerSettings,
    ) -> Result<ImageData, DeconvolutionError> {
        let filtered = deconvolve(&input.data.view(), &settings.parameters())?;
        Ok(input.with_data(filtered.mapv(f64::from)))
    }
}
