//! Folder batch runs: every supported image of a folder is filtered with the same settings,
//! in parallel on a Rayon pool, and written into one batch sub-folder.

use crate::config::{BatchPolicy, FolderLayout, OutputFormat, WienerSettings};
use crate::error::WienerError;
use crate::io::{create_folder, list_images, read_image, SettingsRecord};
use crate::processing::{process_image, save_filtered};
use cancellable_loops::par_map_cancellable;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub format: OutputFormat,
    pub policy: BatchPolicy,
    /// Worker threads; `None` uses one per core.
    pub threads: Option<usize>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Folder the results were written to.
    pub output_dir: PathBuf,
    /// Written result files, in input order.
    pub processed: Vec<PathBuf>,
    /// Inputs that failed, with their error.
    pub failed: Vec<(PathBuf, WienerError)>,
    /// Inputs never started because the batch was aborted.
    pub skipped: usize,
}

/// Filters every supported image directly inside `layout.input_dir`.
///
/// Results go to a fresh `batch_tif` (or `batch_npy`) folder inside `layout.output_dir`,
/// next to a `settings_batch.json` record. With [`BatchPolicy::ContinueOnError`] failures
/// are collected in the report; with [`BatchPolicy::FailFast`] no new image is started
/// after the first failure and that error is returned.
pub fn run_batch(
    layout: &FolderLayout,
    settings: &WienerSettings,
    options: &BatchOptions,
) -> Result<BatchReport, WienerError> {
    settings.validate()?;
    let files = list_images(&layout.input_dir)?;
    if files.is_empty() {
        log::warn!("no supported images in {:?}", layout.input_dir);
        return Ok(BatchReport {
            output_dir: layout.output_dir.clone(),
            ..BatchReport::default()
        });
    }

    create_folder(&layout.output_dir, false)?;
    let batch_dir = create_folder(&layout.output_dir.join(options.format.batch_folder()), true)?;
    SettingsRecord::batch(settings).write(&batch_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.unwrap_or(0))
        .build()?;
    log::info!(
        "batch of {} image(s) into {:?} on {} thread(s), {}",
        files.len(),
        batch_dir,
        pool.current_num_threads(),
        options.policy
    );

    let abort_flag = AtomicBool::new(false);
    let extension = options.format.extension();
    let start = Instant::now();
    let results = pool.install(|| {
        par_map_cancellable(&files, &abort_flag, |path| {
            let result = read_image(path)
                .map_err(WienerError::from)
                .and_then(|raw| process_image(&raw, settings))
                .and_then(|processed| save_filtered(&processed, &batch_dir, extension));
            if result.is_err() && options.policy == BatchPolicy::FailFast {
                abort_flag.store(true, Ordering::Relaxed);
            }
            result
        })
    });

    let mut report = BatchReport {
        output_dir: batch_dir,
        ..BatchReport::default()
    };
    let mut first_error = None;
    for (path, outcome) in files.iter().zip(results) {
        match outcome {
            Some(Ok(written)) => {
                log::info!("{path:?} -> {written:?}");
                report.processed.push(written);
            }
            Some(Err(err)) => {
                log::warn!("failed to process {path:?}: {err}");
                if options.policy == BatchPolicy::FailFast && first_error.is_none() {
                    first_error = Some(err);
                } else {
                    report.failed.push((path.clone(), err));
                }
            }
            None => report.skipped += 1,
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    log::info!(
        "batch done in {:?}: {} processed, {} failed",
        start.elapsed(),
        report.processed.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use crate::io::BATCH_SETTINGS_FILE;
    use ndarray::Array2;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_inputs(dir: &Path) {
        let image = Array2::from_shape_fn((16, 16), |(i, j)| ((i * j) % 7) as f64 * 10.0);
        ndarray_npy::write_npy(dir.join("b.npy"), &image).unwrap();
        ndarray_npy::write_npy(dir.join("c.npy"), &image.t().to_owned()).unwrap();
        std::fs::write(dir.join("a_broken.tif"), b"not a tiff").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    }

    #[test]
    fn test_continue_on_error_collects_failures() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_inputs(input.path());
        let layout = FolderLayout::new(input.path(), Some(output.path().join("results")));

        let options = BatchOptions::default();
        let report = run_batch(&layout, &WienerSettings::default(), &options).unwrap();

        assert_eq!(
            report.output_dir,
            output.path().join("results").join("batch_tif")
        );
        assert_eq!(
            report.processed,
            vec![
                report.output_dir.join("b_wiener.tif"),
                report.output_dir.join("c_wiener.tif")
            ]
        );
        assert!(report.processed.iter().all(|p| p.is_file()));
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("a_broken.tif"));
        assert_eq!(report.skipped, 0);
        assert!(report.output_dir.join(BATCH_SETTINGS_FILE).is_file());
    }

    #[test]
    fn test_second_batch_gets_numbered_folder() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_inputs(input.path());
        let layout = FolderLayout::new(input.path(), Some(output.path().to_path_buf()));
        let options = BatchOptions {
            format: OutputFormat::Npy,
            threads: Some(2),
            ..BatchOptions::default()
        };

        let first = run_batch(&layout, &WienerSettings::default(), &options).unwrap();
        let second = run_batch(&layout, &WienerSettings::default(), &options).unwrap();
        assert_eq!(first.output_dir, output.path().join("batch_npy"));
        assert_eq!(second.output_dir, output.path().join("batch_npy(1)"));
        assert!(second.output_dir.join("b_wiener.npy").is_file());
    }

    #[test]
    fn test_fail_fast_returns_first_error() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_inputs(input.path());
        let layout = FolderLayout::new(input.path(), Some(output.path().to_path_buf()));
        let options = BatchOptions {
            policy: BatchPolicy::FailFast,
            threads: Some(1),
            ..BatchOptions::default()
        };

        let result = run_batch(&layout, &WienerSettings::default(), &options);
        assert!(matches!(result, Err(WienerError::Io(IoError::Tiff(_)))));
    }

    #[test]
    fn test_invalid_settings_fail_before_any_output() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_inputs(input.path());
        let layout = FolderLayout::new(input.path(), Some(output.path().join("never")));
        let settings = WienerSettings {
            pixel_size: 0.0,
            ..WienerSettings::default()
        };

        assert!(matches!(
            run_batch(&layout, &settings, &BatchOptions::default()),
            Err(WienerError::Deconvolution(_))
        ));
        assert!(!output.path().join("never").exists());
    }

    #[test]
    fn test_empty_folder_is_not_an_error() {
        let input = tempdir().unwrap();
        let layout = FolderLayout::new(input.path(), None);
        let options = BatchOptions::default();
        let report = run_batch(&layout, &WienerSettings::default(), &options).unwrap();
        assert!(report.processed.is_empty());
        assert!(report.failed.is_empty());
    }
}
