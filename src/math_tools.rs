//! Two-dimensional FFT helpers on `ndarray` arrays: forward and inverse transforms,
//! the numpy-style `fftshift` and circular convolution with a centered kernel.

use ndarray::{Array2, ArrayView2, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse FFT plans for one 2D shape.
///
/// The transform is separable: every row is transformed with the row plan, then every
/// column with the column plan. The inverse is scaled by `1 / (rows * cols)` so that
/// `inverse(forward(x)) == x`, matching numpy's `fft2` / `ifft2` pair.
pub struct Fft2d {
    rows: usize,
    cols: usize,
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new((rows, cols): (usize, usize)) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Fft2d {
            rows,
            cols,
            row_forward: planner.plan_fft_forward(cols),
            col_forward: planner.plan_fft_forward(rows),
            row_inverse: planner.plan_fft_inverse(cols),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// In-place forward 2D DFT.
    pub fn forward(&self, data: &mut Array2<Complex64>) {
        debug_assert_eq!(data.dim(), self.shape());
        transform_lanes(data, Axis(0), &self.row_forward);
        transform_lanes(data, Axis(1), &self.col_forward);
    }

    /// In-place normalized inverse 2D DFT.
    pub fn inverse(&self, data: &mut Array2<Complex64>) {
        debug_assert_eq!(data.dim(), self.shape());
        transform_lanes(data, Axis(0), &self.row_inverse);
        transform_lanes(data, Axis(1), &self.col_inverse);
        let scale = 1.0 / (self.rows * self.cols) as f64;
        data.mapv_inplace(|c| c * scale);
    }

    /// Forward transform of a real-valued array.
    pub fn forward_real(&self, data: &ArrayView2<f64>) -> Array2<Complex64> {
        let mut spectrum = data.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut spectrum);
        spectrum
    }
}

/// Runs `fft` over every lane obtained by iterating along `axis`.
///
/// `Axis(0)` yields the rows (each transformed along the columns), `Axis(1)` the columns.
fn transform_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &Arc<dyn Fft<f64>>) {
    let lane_len = data.len_of(Axis(1 - axis.index()));
    let mut buffer = vec![Complex64::new(0.0, 0.0); lane_len];
    let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    for mut lane in data.axis_iter_mut(axis) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }
}

/// Shifts the zero-frequency component to the center of the array, per axis.
///
/// Same convention as `numpy.fft.fftshift`: every axis of length `n` is rolled by
/// `n / 2`, so element `i` lands at index `(i + n / 2) % n`. For even lengths this is
/// its own inverse; it also moves a kernel centered at `n / 2` onto index 0.
pub fn fftshift<T: Clone>(data: &ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let (row_shift, col_shift) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let src_i = (i + rows - row_shift) % rows;
        let src_j = (j + cols - col_shift) % cols;
        data[[src_i, src_j]].clone()
    })
}

/// Circular convolution of `image` with a kernel centered like a PSF from the PSF builder.
///
/// This is the forward imaging model the Wiener filter inverts. Returns the real part.
pub fn circular_convolve(image: &ArrayView2<f64>, kernel: &ArrayView2<f64>) -> Array2<f64> {
    assert_eq!(
        image.dim(),
        kernel.dim(),
        "image and kernel must have the same shape"
    );
    let fft = Fft2d::new(image.dim());
    let mut spectrum = fft.forward_real(image);
    let kernel_spectrum = fft.forward_real(&fftshift(kernel).view());
    spectrum.zip_mut_with(&kernel_spectrum, |s, k| *s *= *k);
    fft.inverse(&mut spectrum);
    spectrum.mapv(|c| c.re)
}
