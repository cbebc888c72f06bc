//! This module provides the `Filter` trait and related structures describing the stages of the
//! processing pipeline. Filters are applied to a single image plane (`ImageData`) and read
//! their parameters from the run's `WienerSettings`.
//! It also provides the global, immutable registry that orders the built-in filters.

use crate::config::WienerSettings;
use crate::data_container::ImageData;
use crate::error::DeconvolutionError;
use crate::filters::background::BackgroundSubtraction;
use crate::filters::deconvolution::WienerDeconvolution;
use once_cell::sync::Lazy;
use std::fmt::Debug;
use std::time::Instant;

/// The `Filter` trait defines the structure and behavior of a pipeline stage.
///
/// Filters must implement:
/// - A `new` function to initialize a filter.
/// - A `config` function to provide metadata for the filter.
/// - A `filter` function to apply the filter to an `ImageData`.
///
/// Filters are stateless: every parameter comes from the `WienerSettings` passed to
/// `filter`, so one instance can be shared by all threads of a batch.
///
/// To add a filter, implement the trait and add it to
/// [`FilterRegistry::with_builtin_filters`]; the registry sorts it into the pipeline by its
/// [`FilterDomain`].
pub trait Filter: Send + Sync + Debug {
    /// Creates a new instance of the filter.
    fn new() -> Self
    where
        Self: Sized;

    /// Returns the filter configuration, including name, description and domain.
    fn config(&self) -> FilterConfig;

    /// Applies the filter to the given image.
    ///
    /// # Arguments
    ///
    /// - `input`: The image plane to be processed.
    /// - `settings`: The run's settings.
    ///
    /// # Returns
    /// A new `ImageData` of the same shape containing the filtered data.
    fn filter(
        &self,
        input: &ImageData,
        settings: &WienerSettings,
    ) -> Result<ImageData, DeconvolutionError>;
}

/// The `FilterDomain` enum specifies the domain and execution order of filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterDomain {
    /// Filters working on pixel values, run first.
    Spatial,
    /// Filters that operate in the frequency domain.
    Frequency,
}

/// A structure representing the configuration and metadata of a filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// The name of the filter, used for identification and display.
    pub name: String,
    /// A description of the filter, explaining its purpose and functionality.
    pub description: String,
    /// An optional hyperlink to a DOI or reference, with an optional label.
    pub hyperlink: Option<(Option<String>, String)>, // (optional_label, url)
    /// The domain in which the filter operates.
    pub domain: FilterDomain,
}

/// The ordered set of filters applied to every image.
#[derive(Debug)]
pub struct FilterRegistry {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        FilterRegistry {
            filters: Vec::new(),
        }
    }

    /// Background subtraction followed by Wiener deconvolution.
    pub fn with_builtin_filters() -> Self {
        let mut registry = FilterRegistry::new();
        registry.register_filter::<WienerDeconvolution>();
        registry.register_filter::<BackgroundSubtraction>();
        registry
    }

    /// Adds a filter of type `F`, keeping the registry sorted by domain.
    ///
    /// Filters of the same domain run in registration order.
    pub fn register_filter<F: Filter + 'static>(&mut self) {
        let filter = F::new();
        log::debug!("registering filter \"{}\"", filter.config().name);
        self.filters.push(Box::new(filter));
        // stable sort
        self.filters.sort_by_key(|f| f.config().domain);
    }

    /// Retrieves a registered filter by its name.
    pub fn get_filter(&self, name: &str) -> Option<&dyn Filter> {
        self.filters
            .iter()
            .find(|f| f.config().name == name)
            .map(|f| f.as_ref())
    }

    /// The filters in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Filter> {
        self.filters.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs every filter in order on `input` and returns the final image.
    pub fn apply(
        &self,
        input: &ImageData,
        settings: &WienerSettings,
    ) -> Result<ImageData, DeconvolutionError> {
        let mut data = input.clone();
        for filter in &self.filters {
            let start = Instant::now();
            data = filter.filter(&data, settings)?;
            log::debug!(
                "{} on \"{}\" took {:?}",
                filter.config().name,
                data.name,
                start.elapsed()
            );
        }
        Ok(data)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        FilterRegistry::with_builtin_filters()
    }
}

/// The global registry of built-in filters, built on first use.
pub static FILTER_REGISTRY: Lazy<FilterRegistry> =
    Lazy::new(FilterRegistry::with_builtin_filters);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[derive(Debug)]
    struct Doubling;

    impl Filter for Doubling {
        fn new() -> Self {
            Doubling
        }

        fn config(&self) -> FilterConfig {
            FilterConfig {
                name: "Doubling".to_string(),
                description: "Multiplies every pixel by two.".to_string(),
                hyperlink: None,
                domain: FilterDomain::Spatial,
            }
        }

        fn filter(
            &self,
            input: &ImageData,
            _settings: &WienerSettings,
        ) -> Result<ImageData, DeconvolutionError> {
            Ok(input.with_data(&input.data * 2.0))
        }
    }

    #[test]
    fn test_builtin_filters_are_ordered_by_domain() {
        let names: Vec<String> = FILTER_REGISTRY.iter().map(|f| f.config().name).collect();
        assert_eq!(
            names,
            vec!["Background Subtraction", "Wiener Deconvolution"]
        );
        assert!(FILTER_REGISTRY.get_filter("Wiener Deconvolution").is_some());
        assert!(FILTER_REGISTRY.get_filter("Tilt Compensation").is_none());
    }

    #[test]
    fn test_spatial_filters_run_before_frequency_filters() {
        let mut registry = FilterRegistry::new();
        registry.register_filter::<WienerDeconvolution>();
        registry.register_filter::<Doubling>();
        registry.register_filter::<BackgroundSubtraction>();
        let domains: Vec<FilterDomain> = registry.iter().map(|f| f.config().domain).collect();
        assert_eq!(
            domains,
            vec![
                FilterDomain::Spatial,
                FilterDomain::Spatial,
                FilterDomain::Frequency
            ]
        );
        // same domain keeps registration order
        assert_eq!(
            registry.iter().next().map(|f| f.config().name),
            Some("Doubling".to_string())
        );
    }

    #[test]
    fn test_apply_chains_filters() {
        let mut registry = FilterRegistry::new();
        registry.register_filter::<Doubling>();
        registry.register_filter::<BackgroundSubtraction>();
        let settings = WienerSettings {
            background_subtraction: 3.0,
            ..WienerSettings::default()
        };
        let input = ImageData::new(
            "ramp",
            Array2::from_shape_fn((2, 2), |(i, j)| (i * 2 + j) as f64),
        );
        let output = registry.apply(&input, &settings).unwrap();
        assert_eq!(output.data, ndarray::array![[0.0, 0.0], [1.0, 3.0]]);
    }

    #[test]
    fn test_apply_propagates_errors() {
        let settings = WienerSettings {
            noise_to_signal: -1.0,
            ..WienerSettings::default()
        };
        let input = ImageData::new("cells", Array2::<f64>::ones((8, 8)));
        assert!(matches!(
            FILTER_REGISTRY.apply(&input, &settings),
            Err(DeconvolutionError::InvalidParameter {
                name: "noise_to_signal",
                ..
            })
        ));
    }
}
