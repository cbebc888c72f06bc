//! Reading raw images and writing filtered results, settings records and output folders.
//!
//! Supported inputs are TIFF (single or multi-page, grayscale), NumPy `.npy` / `.npz` and
//! the common raster formats handled by the `image` crate. Results are written as 32-bit
//! float TIFF or `.npy`.

use crate::config::WienerSettings;
use crate::data_container::{RawImage, SampleType};
use crate::error::IoError;
use chrono::Utc;
use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError, ReadableElement};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// File extensions (lower case) accepted by [`read_image`].
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    "tif", "tiff", "npy", "npz", "png", "bmp", "jpg", "jpeg", "gif",
];

/// Suffix appended to the stem of every filtered output.
pub const OUTPUT_SUFFIX: &str = "_wiener";

/// Name of the settings record written once per batch.
pub const BATCH_SETTINGS_FILE: &str = "settings_batch.json";

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Reads the image at `path`, dispatching on its extension.
///
/// Unsigned 16-bit images carrying the 2¹⁵ camera offset are corrected on the way in.
pub fn read_image(path: &Path) -> Result<RawImage, IoError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension_of(path).unwrap_or_default();

    let (frames, sample_type) = match extension.as_str() {
        "tif" | "tiff" => read_tiff(path)?,
        "npy" => read_npy_stack(path)?,
        "npz" => read_npz_stack(path)?,
        "png" | "bmp" | "jpg" | "jpeg" | "gif" => read_raster(path)?,
        _ => {
            return Err(IoError::UnsupportedFormat(format!(
                "{path:?}: unknown file extension \"{extension}\""
            )))
        }
    };

    let mut raw = RawImage {
        name,
        frames,
        sample_type,
    };
    raw.remove_unsigned_offset();
    log::debug!(
        "read {:?}: {} layer(s) of {:?} {}",
        path,
        raw.layers(),
        raw.frame_shape(),
        raw.sample_type
    );
    Ok(raw)
}

fn decoded_samples(result: DecodingResult) -> Result<(Vec<f64>, SampleType), IoError> {
    fn widen<T: AsPrimitive<f64>>(samples: Vec<T>) -> Vec<f64> {
        samples.into_iter().map(|v| v.as_()).collect()
    }
    Ok(match result {
        DecodingResult::U8(v) => (widen(v), SampleType::U8),
        DecodingResult::U16(v) => (widen(v), SampleType::U16),
        DecodingResult::U32(v) => (widen(v), SampleType::U32),
        DecodingResult::U64(v) => (widen(v), SampleType::U64),
        DecodingResult::I16(v) => (widen(v), SampleType::I16),
        DecodingResult::I32(v) => (widen(v), SampleType::I32),
        DecodingResult::I64(v) => (widen(v), SampleType::I64),
        DecodingResult::F32(v) => (widen(v), SampleType::F32),
        DecodingResult::F64(v) => (v, SampleType::F64),
        _ => return Err(IoError::UnsupportedFormat("tiff sample format".to_string())),
    })
}

/// Reads every page of a grayscale TIFF into a stack.
fn read_tiff(path: &Path) -> Result<(Array3<f64>, SampleType), IoError> {
    let file = File::open(path).map_err(|err| IoError::io(path, err))?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let mut pages: Vec<Array2<f64>> = Vec::new();
    let mut stack_type: Option<SampleType> = None;
    loop {
        let (width, height) = decoder.dimensions()?;
        match decoder.colortype()? {
            tiff::ColorType::Gray(_) => {}
            other => {
                return Err(IoError::UnsupportedFormat(format!(
                    "{path:?}: tiff color type {other:?}, only grayscale is supported"
                )))
            }
        }
        let (samples, sample_type) = decoded_samples(decoder.read_image()?)?;
        let page = Array2::from_shape_vec((height as usize, width as usize), samples)
            .map_err(|err| IoError::InconsistentStack(err.to_string()))?;

        if let Some(first) = pages.first() {
            if first.dim() != page.dim() {
                return Err(IoError::InconsistentStack(format!(
                    "page {} has shape {:?}, first page {:?}",
                    pages.len(),
                    page.dim(),
                    first.dim()
                )));
            }
        }
        if stack_type.is_some_and(|t| t != sample_type) {
            return Err(IoError::InconsistentStack(format!(
                "page {} has sample type {sample_type}",
                pages.len()
            )));
        }
        stack_type = Some(sample_type);
        pages.push(page);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let views: Vec<_> = pages.iter().map(|p| p.view()).collect();
    let frames = ndarray::stack(Axis(0), &views)
        .map_err(|err| IoError::InconsistentStack(err.to_string()))?;
    Ok((frames, stack_type.unwrap_or_default()))
}

/// Turns a 2D or 3D array into a stack of frames.
fn into_stack(array: ArrayD<f64>) -> Result<Array3<f64>, IoError> {
    match array.ndim() {
        2 => Ok(array
            .into_dimensionality::<Ix2>()
            .map_err(|err| IoError::InconsistentStack(err.to_string()))?
            .insert_axis(Axis(0))),
        3 => array
            .into_dimensionality::<Ix3>()
            .map_err(|err| IoError::InconsistentStack(err.to_string())),
        ndim => Err(IoError::UnsupportedFormat(format!(
            "array with {ndim} dimensions, expected 2 or 3"
        ))),
    }
}

type NpyAttempt = fn(&Path) -> Result<Option<ArrayD<f64>>, IoError>;
type NpzAttempt = fn(&mut NpzReader<File>) -> Result<Option<ArrayD<f64>>, IoError>;

/// Tried in order; the first dtype matching the file's header wins.
const NPY_DTYPES: [(SampleType, NpyAttempt, NpzAttempt); 9] = [
    (SampleType::F64, npy_as::<f64>, npz_first_as::<f64>),
    (SampleType::F32, npy_as::<f32>, npz_first_as::<f32>),
    (SampleType::U16, npy_as::<u16>, npz_first_as::<u16>),
    (SampleType::U8, npy_as::<u8>, npz_first_as::<u8>),
    (SampleType::I16, npy_as::<i16>, npz_first_as::<i16>),
    (SampleType::I32, npy_as::<i32>, npz_first_as::<i32>),
    (SampleType::U32, npy_as::<u32>, npz_first_as::<u32>),
    (SampleType::U64, npy_as::<u64>, npz_first_as::<u64>),
    (SampleType::I64, npy_as::<i64>, npz_first_as::<i64>),
];

fn npy_as<T>(path: &Path) -> Result<Option<ArrayD<f64>>, IoError>
where
    T: ReadableElement + AsPrimitive<f64>,
{
    match ndarray_npy::read_npy::<_, ArrayD<T>>(path) {
        Ok(array) => Ok(Some(array.mapv(|v| v.as_()))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn npz_first_as<T>(npz: &mut NpzReader<File>) -> Result<Option<ArrayD<f64>>, IoError>
where
    T: ReadableElement + AsPrimitive<f64>,
{
    match npz.by_index::<ndarray::OwnedRepr<T>, ndarray::IxDyn>(0) {
        Ok(array) => Ok(Some(array.mapv(|v| v.as_()))),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_npy_stack(path: &Path) -> Result<(Array3<f64>, SampleType), IoError> {
    for (sample_type, attempt, _) in NPY_DTYPES {
        if let Some(array) = attempt(path)? {
            return Ok((into_stack(array)?, sample_type));
        }
    }
    Err(IoError::UnsupportedFormat(format!(
        "{path:?}: npy dtype is not a real number type"
    )))
}

/// Reads the first array stored in an `.npz` archive.
fn read_npz_stack(path: &Path) -> Result<(Array3<f64>, SampleType), IoError> {
    let file = File::open(path).map_err(|err| IoError::io(path, err))?;
    let mut npz = NpzReader::new(file)?;
    if npz.is_empty() {
        return Err(IoError::UnsupportedFormat(format!(
            "{path:?}: npz archive is empty"
        )));
    }
    for (sample_type, _, attempt) in NPY_DTYPES {
        if let Some(array) = attempt(&mut npz)? {
            return Ok((into_stack(array)?, sample_type));
        }
    }
    Err(IoError::UnsupportedFormat(format!(
        "{path:?}: npz dtype is not a real number type"
    )))
}

/// Reads a raster image, converted to grayscale at 8 or 16 bit depending on the source.
fn read_raster(path: &Path) -> Result<(Array3<f64>, SampleType), IoError> {
    let image = image::open(path)?;
    let color = image.color();
    let deep = color.bytes_per_pixel() / color.channel_count().max(1) >= 2;

    let ((width, height), samples, sample_type) = if deep {
        let luma = image.to_luma16();
        let samples: Vec<f64> = luma.as_raw().iter().map(|&v| f64::from(v)).collect();
        (luma.dimensions(), samples, SampleType::U16)
    } else {
        let luma = image.to_luma8();
        let samples: Vec<f64> = luma.as_raw().iter().map(|&v| f64::from(v)).collect();
        (luma.dimensions(), samples, SampleType::U8)
    };
    let frame = Array2::from_shape_vec((height as usize, width as usize), samples)
        .map_err(|err| IoError::InconsistentStack(err.to_string()))?;
    Ok((frame.insert_axis(Axis(0)), sample_type))
}

/// Writes `image` as a single-page 32-bit float grayscale TIFF.
pub fn write_tiff_f32(path: &Path, image: &Array2<f32>) -> Result<(), IoError> {
    let (rows, cols) = image.dim();
    let samples: Vec<f32> = image.iter().copied().collect();
    let file = File::create(path).map_err(|err| IoError::io(path, err))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    encoder.write_image::<colortype::Gray32Float>(cols as u32, rows as u32, &samples)?;
    Ok(())
}

pub fn write_npy(path: &Path, image: &Array2<f32>) -> Result<(), IoError> {
    ndarray_npy::write_npy(path, image)?;
    Ok(())
}

/// File name of a filtered output: the source name up to its first `.`, then `_wiener`.
///
/// `cells.tif` with extension `tif` gives `cells_wiener.tif`; `a.b.c` gives `a_wiener.<ext>`.
pub fn output_file_name(source: &str, extension: &str) -> String {
    let stem = stem_before_first_dot(source);
    format!("{stem}{OUTPUT_SUFFIX}.{extension}")
}

fn stem_before_first_dot(name: &str) -> &str {
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

/// Everything needed to reproduce a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SettingsRecord {
    pub settings: WienerSettings,
    /// Source file of a single-image run; `None` for batches.
    pub source: Option<String>,
    pub batch: bool,
    /// RFC 3339 UTC timestamp.
    pub created: String,
    pub version: String,
}

impl SettingsRecord {
    pub fn single(source: impl Into<String>, settings: &WienerSettings) -> Self {
        SettingsRecord {
            settings: settings.clone(),
            source: Some(source.into()),
            batch: false,
            created: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn batch(settings: &WienerSettings) -> Self {
        SettingsRecord {
            settings: settings.clone(),
            source: None,
            batch: true,
            created: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// `settings_batch.json` for batches, `<stem>_settings.json` otherwise.
    pub fn file_name(&self) -> String {
        match (&self.source, self.batch) {
            (Some(source), false) => format!("{}_settings.json", stem_before_first_dot(source)),
            _ => BATCH_SETTINGS_FILE.to_string(),
        }
    }

    /// Writes the record into `dir` and returns the file written.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, IoError> {
        let path = dir.join(self.file_name());
        let file = File::create(&path).map_err(|err| IoError::io(&path, err))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self, IoError> {
        let file = File::open(path).map_err(|err| IoError::io(path, err))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// First of `path`, `path(1)`, `path(2)`, … that is not an existing directory.
pub fn unused_folder_name(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    let mut num = 1;
    while candidate.is_dir() {
        let mut name = OsString::from(path.as_os_str());
        name.push(format!("({num})"));
        candidate = PathBuf::from(name);
        num += 1;
    }
    candidate
}

/// Creates the folder at `path` and returns it.
///
/// With `force_new` an unused name is chosen so that an existing folder is never reused.
pub fn create_folder(path: &Path, force_new: bool) -> Result<PathBuf, IoError> {
    let path = if force_new {
        unused_folder_name(path)
    } else {
        path.to_path_buf()
    };
    if !path.is_dir() {
        std::fs::create_dir_all(&path).map_err(|err| IoError::io(&path, err))?;
        log::debug!("created folder {path:?}");
    }
    Ok(path)
}

/// Supported image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    let entries = std::fs::read_dir(dir).map_err(|err| IoError::io(dir, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| IoError::io(dir, err))?.path();
        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
