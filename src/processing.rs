//! Single-image runs: layer selection, the filter pipeline and saving per output mode.

use crate::config::{OutputMode, WienerSettings};
use crate::data_container::{RawImage, SampleType};
use crate::error::WienerError;
use crate::filters::filter::FILTER_REGISTRY;
use crate::io::{output_file_name, read_image, write_npy, write_tiff_f32, SettingsRecord};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Result of filtering one image.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub name: String,
    /// Sample type of the source file.
    pub sample_type: SampleType,
    /// The selected layer, before background subtraction.
    pub raw: Array2<f64>,
    pub filtered: Array2<f32>,
}

/// Runs the filter pipeline on the configured layer of `raw`.
pub fn process_image(
    raw: &RawImage,
    settings: &WienerSettings,
) -> Result<ProcessedImage, WienerError> {
    settings.validate()?;
    let plane = raw.choose_layer(settings.layer)?;
    let filtered = FILTER_REGISTRY.apply(&plane, settings)?;
    Ok(ProcessedImage {
        name: plane.name,
        sample_type: plane.sample_type,
        raw: plane.data,
        filtered: filtered.data.mapv(|v| v as f32),
    })
}

/// Writes `image` into `dir` as `<stem>_wiener.<ext>` and returns the written path.
pub fn save_filtered(
    image: &ProcessedImage,
    dir: &Path,
    extension: &str,
) -> Result<PathBuf, WienerError> {
    let path = dir.join(output_file_name(&image.name, extension));
    match extension {
        "npy" => write_npy(&path, &image.filtered)?,
        _ => write_tiff_f32(&path, &image.filtered)?,
    }
    Ok(path)
}

/// Reads, filters and saves one file according to `settings.output_mode`.
///
/// Returns the processed image and the files written.
pub fn process_file(
    path: &Path,
    settings: &WienerSettings,
    output_dir: &Path,
) -> Result<(ProcessedImage, Vec<PathBuf>), WienerError> {
    let raw = read_image(path)?;
    let processed = process_image(&raw, settings)?;

    let mut written = Vec::new();
    match settings.output_mode {
        OutputMode::DontSave => {}
        OutputMode::Tiff => written.push(save_filtered(&processed, output_dir, "tif")?),
        OutputMode::Npy => written.push(save_filtered(&processed, output_dir, "npy")?),
        OutputMode::Settings => {
            let record = SettingsRecord::single(&raw.name, settings);
            written.push(record.write(output_dir)?);
        }
    }
    log::info!(
        "processed \"{}\" ({} samples, {} file(s) written)",
        processed.name,
        processed.sample_type,
        written.len()
    );
    Ok((processed, written))
}
