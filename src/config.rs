//! Run configuration: the validated filter settings, output choices, folder layout and the
//! persisted user defaults.

use crate::error::DeconvolutionError;
use crate::filters::deconvolution::WienerParameters;
use clap::ValueEnum;
use preferences::{AppInfo, Preferences, PreferencesError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const APP_INFO: AppInfo = AppInfo {
    name: "sted-wiener",
    author: "sted-wiener",
};

/// Preferences key under which the last remembered settings are stored.
pub const PREFS_KEY: &str = "config/settings";

/// What a single-image run writes next to the filtered result.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Only compute and report.
    DontSave,
    /// Write the filtered image as a 32-bit float TIFF.
    #[default]
    Tiff,
    /// Write the filtered image as a `.npy` array.
    Npy,
    /// Write the settings record only.
    Settings,
}

/// Array format of batch outputs.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Tiff,
    Npy,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tiff => "tif",
            OutputFormat::Npy => "npy",
        }
    }

    /// Sub-folder of the output directory that receives batch results.
    pub fn batch_folder(&self) -> &'static str {
        match self {
            OutputFormat::Tiff => "batch_tif",
            OutputFormat::Npy => "batch_npy",
        }
    }
}

/// How a batch reacts to a failing image.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Record the failure and keep processing the remaining images.
    #[default]
    ContinueOnError,
    /// Stop scheduling new images and return the first error.
    FailFast,
}

impl Display for BatchPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPolicy::ContinueOnError => write!(f, "continue on error"),
            BatchPolicy::FailFast => write!(f, "fail fast"),
        }
    }
}

/// All user-facing settings of a deconvolution run.
///
/// Physical lengths (`pixel_size`, both sigmas) are in nm.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct WienerSettings {
    pub pixel_size: f64,
    pub background_subtraction: f64,
    /// Weight of the STED component in the composite PSF, in `[0, 1]`.
    pub ratio: f64,
    pub noise_to_signal: f64,
    pub sigma_confocal: f64,
    pub sigma_sted: f64,
    /// Layer of a z-stack to filter; ignored for single images.
    pub layer: usize,
    pub output_mode: OutputMode,
}

impl Default for WienerSettings {
    fn default() -> Self {
        WienerSettings {
            pixel_size: 20.0,
            background_subtraction: 0.0,
            ratio: 0.5,
            noise_to_signal: 0.5,
            sigma_confocal: 350.0,
            sigma_sted: 33.0,
            layer: 0,
            output_mode: OutputMode::Tiff,
        }
    }
}

/// Ranges the filter was tuned for. Values outside still work but get a warning.
const PIXEL_SIZE_RANGE: RangeInclusive<f64> = 1.0..=50.0;
const BACKGROUND_RANGE: RangeInclusive<f64> = 0.0..=1000.0;
const NOISE_TO_SIGNAL_RANGE: RangeInclusive<f64> = 0.01..=0.5;
const SIGMA_CONFOCAL_RANGE: RangeInclusive<f64> = 180.0..=500.0;
const SIGMA_STED_RANGE: RangeInclusive<f64> = 10.0..=120.0;
const MAX_LAYER: usize = 100;

impl WienerSettings {
    /// The scalar parameters consumed by the Wiener filter.
    pub fn parameters(&self) -> WienerParameters {
        WienerParameters {
            pixel_size: self.pixel_size,
            sigma_confocal: self.sigma_confocal,
            sigma_sted: self.sigma_sted,
            noise_to_signal: self.noise_to_signal,
            ratio: self.ratio,
        }
    }

    pub fn validate(&self) -> Result<(), DeconvolutionError> {
        self.parameters().validate()?;
        if !self.background_subtraction.is_finite() || self.background_subtraction < 0.0 {
            return Err(DeconvolutionError::parameter(
                "background_subtraction",
                self.background_subtraction,
                "must be zero or positive",
            ));
        }
        Ok(())
    }

    /// Human readable notes for every value outside the tuned ranges.
    pub fn out_of_range_warnings(&self) -> Vec<String> {
        let checks = [
            ("pixel size", self.pixel_size, PIXEL_SIZE_RANGE),
            (
                "background subtraction",
                self.background_subtraction,
                BACKGROUND_RANGE,
            ),
            (
                "noise-to-signal ratio",
                self.noise_to_signal,
                NOISE_TO_SIGNAL_RANGE,
            ),
            ("confocal FWHM", self.sigma_confocal, SIGMA_CONFOCAL_RANGE),
            ("STED FWHM", self.sigma_sted, SIGMA_STED_RANGE),
        ];
        let mut warnings: Vec<String> = checks
            .into_iter()
            .filter(|(_, value, range)| !range.contains(value))
            .map(|(name, value, range)| {
                format!(
                    "{name} {value} is outside the usual range {}..={}",
                    range.start(),
                    range.end()
                )
            })
            .collect();
        if self.layer > MAX_LAYER {
            warnings.push(format!(
                "layer {} is outside the usual range 0..={MAX_LAYER}",
                self.layer
            ));
        }
        warnings
    }

    /// Loads the remembered settings, falling back to (and storing) the defaults.
    pub fn load_or_default() -> Self {
        match WienerSettings::load(&APP_INFO, PREFS_KEY) {
            Ok(settings) => settings,
            Err(err) => {
                log::debug!("no stored settings ({err:?}), using defaults");
                let settings = WienerSettings::default();
                if let Err(err) = settings.save(&APP_INFO, PREFS_KEY) {
                    log::error!("error in saving default settings: {err:?}");
                }
                settings
            }
        }
    }

    /// Stores these settings as the defaults of the next run.
    pub fn remember(&self) -> Result<(), PreferencesError> {
        self.save(&APP_INFO, PREFS_KEY)
    }
}

/// Where input images are read from and results are written to.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderLayout {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl FolderLayout {
    /// Layout writing into `<input_dir>_wiener` unless an explicit output is given.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let output_dir = output_dir.unwrap_or_else(|| Self::default_output_dir(&input_dir));
        FolderLayout {
            input_dir,
            output_dir,
        }
    }

    /// `<input_dir>_wiener` next to the input folder.
    ///
    /// Relative inputs such as `.` are resolved first; an input that cannot be resolved is
    /// used as given.
    pub fn default_output_dir(input_dir: &Path) -> PathBuf {
        let input_dir = input_dir
            .canonicalize()
            .unwrap_or_else(|_| input_dir.to_path_buf());
        let name = input_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        input_dir.with_file_name(format!("{name}_wiener"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid_and_in_range() {
        let settings = WienerSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.out_of_range_warnings().is_empty());
    }

    #[test]
    fn test_validate_rejects_negative_background() {
        let settings = WienerSettings {
            background_subtraction: -1.0,
            ..WienerSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(DeconvolutionError::InvalidParameter {
                name: "background_subtraction",
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_values_warn() {
        let settings = WienerSettings {
            noise_to_signal: 2.0,
            sigma_sted: 5.0,
            layer: 150,
            ..WienerSettings::default()
        };
        assert!(settings.validate().is_ok());
        let warnings = settings.out_of_range_warnings();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("noise-to-signal"));
        assert!(warnings[1].contains("STED"));
        assert!(warnings[2].contains("layer"));
    }

    #[test]
    fn test_settings_deserialize_with_missing_fields() {
        let settings: WienerSettings =
            serde_json::from_str(r#"{"pixel_size": 15.0, "output_mode": "npy"}"#).unwrap();
        assert_eq!(settings.pixel_size, 15.0);
        assert_eq!(settings.output_mode, OutputMode::Npy);
        assert_eq!(settings.sigma_sted, 33.0);
    }

    #[test]
    fn test_default_output_dir_is_sibling_folder() {
        let layout = FolderLayout::new("/data/cells", None);
        assert_eq!(layout.output_dir, PathBuf::from("/data/cells_wiener"));

        let explicit = FolderLayout::new("/data/cells", Some(PathBuf::from("/tmp/out")));
        assert_eq!(explicit.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_default_output_dir_resolves_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let cells = dir.path().join("cells");
        std::fs::create_dir_all(cells.join("sub")).unwrap();
        let resolved = cells.canonicalize().unwrap();

        // `..` has no file name of its own
        let layout = FolderLayout::new(cells.join("sub").join(".."), None);
        assert_eq!(layout.output_dir, resolved.with_file_name("cells_wiener"));
    }
}
