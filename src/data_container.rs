//! This module defines the image containers passed between the I/O layer and the filters:
//! raw (possibly stacked) images as read from disk and the single planes the filters work on.

use crate::error::IoError;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Offset added by some 16-bit cameras to every sample.
pub const UNSIGNED_16_BIT_OFFSET: f64 = 32768.0;

/// Sample type of an image as stored on disk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    U8,
    #[default]
    U16,
    U32,
    U64,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Display for SampleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::U32 => "u32",
            SampleType::U64 => "u64",
            SampleType::I16 => "i16",
            SampleType::I32 => "i32",
            SampleType::I64 => "i64",
            SampleType::F32 => "f32",
            SampleType::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// An image as read from disk.
///
/// # Fields
/// - `name`: file name the image was read from.
/// - `frames`: samples of shape `(layers, rows, cols)`; a plain 2D image has one layer.
/// - `sample_type`: the type the samples were stored with.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub name: String,
    pub frames: Array3<f64>,
    pub sample_type: SampleType,
}

impl RawImage {
    pub fn from_frame(
        name: impl Into<String>,
        frame: Array2<f64>,
        sample_type: SampleType,
    ) -> Self {
        RawImage {
            name: name.into(),
            frames: frame.insert_axis(Axis(0)),
            sample_type,
        }
    }

    pub fn layers(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    /// `(rows, cols)` of one layer.
    pub fn frame_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.frames.dim();
        (rows, cols)
    }

    /// Selects the plane to filter.
    ///
    /// A single image ignores `layer`; a stack requires `layer < layers`.
    pub fn choose_layer(&self, layer: usize) -> Result<ImageData, IoError> {
        let layers = self.layers();
        let index = if layers == 1 { 0 } else { layer };
        if index >= layers {
            return Err(IoError::LayerOutOfRange { layer, layers });
        }
        Ok(ImageData {
            name: self.name.clone(),
            data: self.frames.index_axis(Axis(0), index).to_owned(),
            sample_type: self.sample_type,
        })
    }

    /// Removes the 2¹⁵ offset of unsigned 16-bit images whose minimum lies at or above it.
    ///
    /// Returns whether the offset was removed.
    pub fn remove_unsigned_offset(&mut self) -> bool {
        if self.sample_type != SampleType::U16 || self.frames.is_empty() {
            return false;
        }
        let min = self.frames.iter().cloned().fold(f64::INFINITY, f64::min);
        if min < UNSIGNED_16_BIT_OFFSET {
            return false;
        }
        self.frames.mapv_inplace(|v| v - UNSIGNED_16_BIT_OFFSET);
        log::debug!("removed 16-bit offset from \"{}\"", self.name);
        true
    }
}

/// A single image plane flowing through the filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub name: String,
    pub data: Array2<f64>,
    pub sample_type: SampleType,
}

impl ImageData {
    /// Plane of floating point samples.
    pub fn new(name: impl Into<String>, data: Array2<f64>) -> Self {
        ImageData {
            name: name.into(),
            data,
            sample_type: SampleType::F64,
        }
    }

    /// Copy of this image with its samples replaced.
    pub fn with_data(&self, data: Array2<f64>) -> Self {
        ImageData {
            name: self.name.clone(),
            data,
            sample_type: self.sample_type,
        }
    }
}
